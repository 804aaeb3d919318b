//! # bikidata
//!
//! An embeddable RDF triple store for bulk-ingesting large N-Triples/TriG
//! dumps into a hash-encoded columnar store (DuckDB), with BM25 full-text
//! and optional vector (cosine) indices, fronted by a declarative
//! filter/aggregate/order/paths query compiler and an optional ticketed job
//! dispatcher.
//!
//! ## Quick start
//!
//! ```no_run
//! use bikidata::{index, executor, embedder::DeterministicEmbedder, query::QueryRequest};
//!
//! # fn main() -> anyhow::Result<()> {
//! let conn = index::open_store(std::path::Path::new("bikidata.duckdb"))?;
//! let embedder = DeterministicEmbedder::new();
//! let req: QueryRequest = serde_json::from_str(r#"{"filters":[{"p":"<http://example.org/p>","o":"<http://example.org/c>"}]}"#)?;
//! let response = executor::execute(&conn, &embedder, &req)?;
//! println!("{response}");
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod compiler;
pub mod config;
pub mod dict;
pub mod dispatch;
pub mod embedder;
pub mod executor;
pub mod hash;
pub mod index;
pub mod parser;
pub mod query;
pub mod queue;

pub use compiler::CompileError;
pub use config::Config;
pub use dict::DictError;
pub use dispatch::DispatchError;
pub use embedder::{DeterministicEmbedder, EmbedderError, Embedder};
pub use executor::ExecError;
pub use hash::term_hash;
pub use index::IndexError;
pub use parser::{NtParser, ParseError, Quad};
pub use query::QueryRequest;
pub use queue::{InProcessQueue, JobQueue};

/// Crate-level aggregate error: each component owns its own error enum
/// (SPEC_FULL.md §7, §10.4); this aggregates them for callers that want a
/// single `Result` type without matching on which subsystem failed.
#[derive(Debug, thiserror::Error)]
pub enum BikidataError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Dict(#[from] DictError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Exec(#[from] ExecError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
