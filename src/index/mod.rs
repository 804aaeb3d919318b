//! IndexBuilder (C4): bulk load into DuckDB, BM25 and optional vector indices.

mod ftss;
mod semantic;

pub use ftss::{build_ftss, reclaim_fts_space};
pub use semantic::build_semantic;

use std::path::{Path, PathBuf};
use std::time::Instant;

use duckdb::{AccessMode, Config, Connection};
use thiserror::Error;

use crate::dict::{DictError, DictWriter};
use crate::parser::Quad;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("dictionary write error: {0}")]
    Dict(#[from] DictError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store already has {0} triples, refusing to re-ingest")]
    AlreadyPopulated(i64),
    #[error("embedding failed: {0}")]
    Embed(#[from] crate::embedder::EmbedderError),
}

/// Statistics returned from a successful bulk build.
#[derive(Debug, Clone, Copy)]
pub struct BuildStats {
    pub duration_secs: u64,
    pub count: u64,
}

/// Schema version written to `meta` at store creation (SPEC_FULL.md §3).
pub const SCHEMA_VERSION: i32 = 1;

/// Open (or create) the DuckDB-backed store at `path` for read-write access.
/// SPEC_FULL.md §5/§10.6: single-writer/multi-reader at the process level —
/// there must be at most one of these live against a given file at a time.
pub fn open_store(path: &Path) -> Result<Connection, IndexError> {
    let conn = Connection::open(path)?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Open an already-built store for read-only access. Any number of these may
/// coexist with each other, and with a single `open_store` writer, without
/// conflicting over the file's lock — unlike `open_store`, which takes it
/// exclusively (SPEC_FULL.md §5). Never runs `ensure_schema`: a read-only
/// connection can't create the schema, and by the time anything queries a
/// store it must already exist.
pub fn open_store_read_only(path: &Path) -> Result<Connection, IndexError> {
    let config = Config::default().access_mode(AccessMode::ReadOnly)?;
    Ok(Connection::open_with_flags(path, config)?)
}

fn ensure_schema(conn: &Connection) -> Result<(), IndexError> {
    conn.execute_batch(
        "create table if not exists literals (hash ubigint, value varchar);
         create table if not exists iris (hash ubigint, value varchar);
         create table if not exists triples (s ubigint, p ubigint, o ubigint, g ubigint);
         create table if not exists meta (key varchar, value varchar);",
    )?;
    let has_version: i64 = conn.query_row(
        "select count(*) from meta where key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    if has_version == 0 {
        conn.execute(
            "insert into meta(key, value) values ('schema_version', ?)",
            duckdb::params![SCHEMA_VERSION.to_string()],
        )?;
    }
    Ok(())
}

/// Escape a string for inline interpolation into a single-quoted SQL literal
/// or table-function path argument (DuckDB's `read_csv` takes its path as a
/// literal, not a bindable parameter).
fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Perform the full bulk load described in SPEC_FULL.md §4.4, steps 1-5.
///
/// Refuses (without making any changes) if `triples` is already non-empty.
pub fn build(
    conn: &Connection,
    quads: impl Iterator<Item = Quad>,
    triples_path: &Path,
    maps_path: &Path,
    stemmer: &str,
) -> Result<BuildStats, IndexError> {
    let start = Instant::now();
    ensure_schema(conn)?;

    let existing: i64 = conn.query_row("select count(*) from triples", [], |row| row.get(0))?;
    if existing > 0 {
        return Err(IndexError::AlreadyPopulated(existing));
    }

    let mut writer = DictWriter::create(triples_path, maps_path)?;
    for quad in quads {
        writer.write_quad(&quad)?;
    }
    let (triples_path, maps_path, count) = writer.finish()?;

    let result = load_files(conn, &triples_path, &maps_path, stemmer);

    // Always clean up the temp files, even on failure, to avoid leaving a
    // load half-applied without a diagnosable trace; on failure the error is
    // still surfaced.
    let _ = std::fs::remove_file(&triples_path);
    let _ = std::fs::remove_file(&maps_path);
    result?;

    Ok(BuildStats {
        duration_secs: start.elapsed().as_secs(),
        count,
    })
}

fn load_files(
    conn: &Connection,
    triples_path: &Path,
    maps_path: &Path,
    stemmer: &str,
) -> Result<(), IndexError> {
    let tp = escape_sql_literal(&triples_path.display().to_string());
    let mp = escape_sql_literal(&maps_path.display().to_string());
    let stemmer = escape_sql_literal(stemmer);

    conn.execute(
        &format!(
            "insert into triples(s,p,o,g)
             select ('0x' || column0).lower()::ubigint,
                    ('0x' || column1).lower()::ubigint,
                    ('0x' || column2).lower()::ubigint,
                    ('0x' || column3).lower()::ubigint
             from read_csv('{tp}', delim='\t', header=false)"
        ),
        [],
    )?;

    conn.execute(
        &format!(
            "insert into literals
             select ('0x' || column0).lower()::ubigint, ANY_VALUE(column1)
             from read_csv('{mp}', delim='\t|\t', header=false, max_line_size=5100000, quote='')
             where substr(column1, 1, 1) = '\"'
             group by column0"
        ),
        [],
    )?;

    conn.execute(
        &format!(
            "insert into iris
             select ('0x' || column0).lower()::ubigint, ANY_VALUE(column1)
             from read_csv('{mp}', delim='\t|\t', header=false, max_line_size=5100000, quote='')
             where substr(column1, 1, 1) != '\"'
             group by column0"
        ),
        [],
    )?;

    conn.execute(
        &format!("pragma create_fts_index('literals', 'hash', 'value', stemmer='{stemmer}')"),
        [],
    )?;

    Ok(())
}

/// Resolve the interim file paths to use for a build, applying the
/// `BIKIDATA_TRIPLE_PATH`/`BIKIDATA_MAP_PATH` configuration defaults.
pub fn default_temp_paths(triple_path: Option<&str>, map_path: Option<&str>) -> (PathBuf, PathBuf) {
    (
        PathBuf::from(triple_path.unwrap_or("triples")),
        PathBuf::from(map_path.unwrap_or("maps")),
    )
}
