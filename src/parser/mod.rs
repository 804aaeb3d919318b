//! NTParser (C2): streaming N-Triples / TriG line parser.

mod term;
mod unicode;

pub use term::{is_blank_node, is_iri_shaped, is_literal, literal_to_parts};
pub use unicode::decode_unicode_escapes;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use thiserror::Error;

/// One parsed quad: subject, predicate, object, graph — all still in their
/// original surface syntax (not yet hashed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quad {
    pub s: String,
    pub p: String,
    pub o: String,
    pub g: String,
}

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("failed to open input {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
}

/// Streaming iterator over one or more N-Triples/TriG sources.
///
/// Each source is opened lazily as the previous one is exhausted. A source
/// that fails to open is logged and skipped; the iterator never aborts the
/// whole stream over one bad file.
pub struct NtParser {
    sources: std::vec::IntoIter<PathBuf>,
    current: Option<Box<dyn BufRead>>,
    graph: String,
    line_buf: Vec<u8>,
}

impl NtParser {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            sources: paths.into_iter(),
            current: None,
            graph: String::new(),
            line_buf: Vec::new(),
        }
    }

    fn open(path: &Path) -> Result<Box<dyn BufRead>, ParseError> {
        let file = File::open(path).map_err(|e| ParseError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        let is_gz = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("gz"))
            .unwrap_or(false);
        if is_gz {
            Ok(Box::new(BufReader::new(GzDecoder::new(file))))
        } else {
            Ok(Box::new(BufReader::new(file)))
        }
    }
}

impl Iterator for NtParser {
    type Item = Quad;

    fn next(&mut self) -> Option<Quad> {
        loop {
            if self.current.is_none() {
                let path = self.sources.next()?;
                match Self::open(&path) {
                    Ok(reader) => {
                        self.current = Some(reader);
                        self.graph = String::new();
                    }
                    Err(e) => {
                        tracing::warn!("{e}");
                        continue;
                    }
                }
            }

            let reader = self.current.as_mut().expect("just ensured Some");
            self.line_buf.clear();
            let n = match reader.read_until(b'\n', &mut self.line_buf) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("io error reading line, abandoning source: {e}");
                    self.current = None;
                    continue;
                }
            };
            if n == 0 {
                // exhausted this source
                self.current = None;
                continue;
            }

            if let Some(quad) = self.parse_line() {
                return Some(quad);
            }
        }
    }
}

impl NtParser {
    /// Apply the line semantics in SPEC_FULL.md §4.2 to the buffered raw line.
    fn parse_line(&mut self) -> Option<Quad> {
        let line = &self.line_buf;

        if line.ends_with(b" {\n") && line.starts_with(b"<") {
            if let Ok(text) = std::str::from_utf8(line) {
                let parts: Vec<&str> = text.split(' ').collect();
                if parts.len() == 2 {
                    self.graph = parts[0].to_string();
                }
            } else {
                tracing::warn!("non-utf8 graph header line skipped");
            }
            return None;
        }

        if !line.ends_with(b" .\n") {
            return None;
        }

        let text = match std::str::from_utf8(line) {
            Ok(t) => t,
            Err(_) => {
                tracing::warn!("non-utf8 term encountered, skipping triple");
                return None;
            }
        };

        let decoded = decode_unicode_escapes(text);
        let trimmed = decoded.trim_end();
        let body = trimmed.strip_suffix(" .")?;

        let parts: Vec<&str> = body.split(' ').collect();
        if parts.len() < 3 {
            return None;
        }
        let s = parts[0];
        let p = parts[1];
        let o = parts[2..].join(" ");

        if !is_iri_shaped(s) || !is_iri_shaped(p) {
            return None;
        }

        Some(Quad {
            s: s.to_string(),
            p: p.to_string(),
            o,
            g: self.graph.clone(),
        })
    }
}
