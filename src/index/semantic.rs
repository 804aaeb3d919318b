//! `build_semantic`: embed per-subject FTS documents into `literals_semantic`.

use duckdb::Connection;

use super::IndexError;
use crate::embedder::{EmbedKind, Embedder};

fn array_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

/// Iterate the `fts(s, values)` table in batches bounded by the embedder's
/// batch ceiling, embed each subject's document, and insert `(hash, vec)`
/// rows into `literals_semantic`. Requires `build_ftss` to have run first.
pub fn build_semantic(conn: &Connection, embedder: &dyn Embedder) -> Result<u64, IndexError> {
    let dim = embedder.dimension();
    conn.execute_batch("drop table if exists literals_semantic;")?;
    conn.execute(
        &format!("create table literals_semantic (hash ubigint, vec FLOAT[{dim}])"),
        [],
    )?;

    let mut stmt = conn.prepare("select s, values from fts where values is not null")?;
    let rows: Vec<(u64, String)> = stmt
        .query_map([], |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)))?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let batch_size = embedder.batch_ceiling();
    let mut embedded = 0u64;

    for chunk in rows.chunks(batch_size) {
        let texts: Vec<&str> = chunk.iter().map(|(_, v)| v.as_str()).collect();
        let vectors = embedder.embed(EmbedKind::Document, &texts)?;

        let mut stmt = conn.prepare(&format!(
            "insert into literals_semantic values (?, ?::FLOAT[{dim}])"
        ))?;
        for ((hash, _), vector) in chunk.iter().zip(vectors.iter()) {
            let literal = array_literal(vector);
            stmt.execute(duckdb::params![*hash as i64, literal])?;
            embedded += 1;
        }
    }

    Ok(embedded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::DeterministicEmbedder;
    use crate::index::{build, build_ftss, open_store};
    use crate::parser::Quad;

    fn quad(s: &str, p: &str, o: &str) -> Quad {
        Quad {
            s: s.to_string(),
            p: p.to_string(),
            o: o.to_string(),
            g: String::new(),
        }
    }

    #[test]
    fn embeds_each_subject_document() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_store(&dir.path().join("t.duckdb")).unwrap();
        let quads = vec![quad(
            "<http://example.org/a>",
            "<http://example.org/label>",
            "\"The quick brown fox\"@en",
        )];
        build(&conn, quads.into_iter(), &dir.path().join("triples"), &dir.path().join("maps"), "porter").unwrap();
        build_ftss(&conn, "porter").unwrap();

        let embedder = DeterministicEmbedder::new();
        let n = build_semantic(&conn, &embedder).unwrap();
        assert_eq!(n, 1);

        let count: i64 = conn.query_row("select count(*) from literals_semantic", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
