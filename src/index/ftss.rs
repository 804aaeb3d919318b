//! `build_ftss`: per-subject aggregated document + BM25 index.

use duckdb::Connection;

use super::IndexError;

/// Build the per-subject `fts(s, values)` table and its BM25 index.
///
/// Materializes one hop of literal propagation (a subject's own direct
/// literal objects, plus the direct literal objects of any subject reachable
/// as one of its direct objects), unions the two, and indexes the result
/// keyed by `s`. Mirrors SPEC_FULL.md §4.4's `build_ftss`.
pub fn build_ftss(conn: &Connection, stemmer: &str) -> Result<(), IndexError> {
    let stemmer = stemmer.replace('\'', "''");

    conn.execute_batch(
        "drop table if exists temp_fts1;
         create temporary table temp_fts1 as
         with list_values as (
           select s, list_distinct(list(value)) as value_list
           from triples T join literals L on T.o = L.hash
           group by s
         ),
         unnested as (
           select s, unnest(value_list) as val from list_values
         )
         select s, string_agg(val, '\n') as values
         from unnested group by s;",
    )?;

    conn.execute_batch(
        "drop table if exists temp_fts2;
         create temporary table temp_fts2 as
         select T.s, string_agg(R.values, '\n') as values
         from triples T join temp_fts1 R on T.o = R.s
         group by T.s;",
    )?;

    conn.execute_batch("drop table if exists fts;")?;
    conn.execute_batch(
        "create table fts as
         select s, string_agg(values, '\t') as values
         from (
           select s, values from temp_fts1
           union
           select s, values from temp_fts2
         )
         group by s;",
    )?;

    conn.execute(
        &format!("pragma create_fts_index('fts', 's', 'values', stemmer='{stemmer}')"),
        [],
    )?;

    conn.execute_batch("drop table if exists temp_fts1; drop table if exists temp_fts2;")?;

    Ok(())
}

/// Null the `fts.values` column to reclaim space once the BM25 index (and,
/// if requested, `build_semantic`) no longer need the materialized text —
/// the inverted index retains its own copy of the tokenized data.
///
/// Kept as a separate step rather than folded into `build_ftss` itself so
/// that `build_semantic`, which reads `fts.values`, can still run after
/// `build_ftss` without having to run before it.
pub fn reclaim_fts_space(conn: &Connection) -> Result<(), IndexError> {
    conn.execute_batch("update fts set values = null;")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{build, open_store};
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
    fn aggregates_direct_literals_per_subject() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_store(&dir.path().join("t.duckdb")).unwrap();
        let quads = vec![
            quad("<http://example.org/a>", "<http://example.org/label>", "\"The quick brown fox\"@en"),
        ];
        build(&conn, quads.into_iter(), &dir.path().join("triples"), &dir.path().join("maps"), "porter").unwrap();

        build_ftss(&conn, "porter").unwrap();

        let values: String = conn
            .query_row("select values from fts limit 1", [], |r| r.get(0))
            .unwrap();
        assert!(values.contains("quick brown fox"));
    }
}
