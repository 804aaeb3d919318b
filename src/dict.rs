//! DictWriter (C3): hash/string dictionary stream + hash-only triple stream.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::hash::term_hash_hex;
use crate::parser::Quad;

#[derive(Error, Debug)]
pub enum DictError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: String,
        source: std::io::Error,
    },
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

/// Writes the two interim files C4's bulk loader consumes:
/// - `triples_file`: `ss\tpp\too\tgg\n`, hex-encoded hashes.
/// - `maps_file`: three `hash\t|\tvalue` lines per triple (s, p, o), plus one
///   line per distinct graph term written once at the end.
pub struct DictWriter {
    triples_out: BufWriter<File>,
    maps_out: BufWriter<File>,
    triples_path: PathBuf,
    maps_path: PathBuf,
    graphs: HashSet<(String, String)>,
    count: u64,
}

impl DictWriter {
    pub fn create(triples_path: &Path, maps_path: &Path) -> Result<Self, DictError> {
        let triples_out = File::create(triples_path).map_err(|e| DictError::Create {
            path: triples_path.display().to_string(),
            source: e,
        })?;
        let maps_out = File::create(maps_path).map_err(|e| DictError::Create {
            path: maps_path.display().to_string(),
            source: e,
        })?;
        Ok(Self {
            triples_out: BufWriter::new(triples_out),
            maps_out: BufWriter::new(maps_out),
            triples_path: triples_path.to_path_buf(),
            maps_path: maps_path.to_path_buf(),
            graphs: HashSet::new(),
            count: 0,
        })
    }

    /// Write one quad's hash-encoded row and its three dictionary lines.
    pub fn write_quad(&mut self, quad: &Quad) -> Result<(), DictError> {
        let sh = term_hash_hex(&quad.s);
        let ph = term_hash_hex(&quad.p);
        let oh = term_hash_hex(&quad.o);
        let gh = term_hash_hex(&quad.g);

        writeln!(self.triples_out, "{sh}\t{ph}\t{oh}\t{gh}")?;
        writeln!(self.maps_out, "{sh}\t|\t{}", quad.s)?;
        writeln!(self.maps_out, "{ph}\t|\t{}", quad.p)?;
        writeln!(self.maps_out, "{oh}\t|\t{}", quad.o)?;

        self.graphs.insert((gh, quad.g.clone()));
        self.count += 1;
        Ok(())
    }

    /// Flush the accumulated graph dictionary lines and close both files,
    /// returning their paths for the bulk loader.
    pub fn finish(mut self) -> Result<(PathBuf, PathBuf, u64), DictError> {
        for (gh, g) in &self.graphs {
            writeln!(self.maps_out, "{gh}\t|\t{g}")?;
        }
        self.triples_out.flush()?;
        self.maps_out.flush()?;
        Ok((self.triples_path, self.maps_path, self.count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::term_hash;
    use std::io::BufRead;

    fn quad(s: &str, p: &str, o: &str, g: &str) -> Quad {
        Quad {
            s: s.to_string(),
            p: p.to_string(),
            o: o.to_string(),
            g: g.to_string(),
        }
    }

    #[test]
    fn writes_triples_file_as_tab_separated_hex() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("triples");
        let mp = dir.path().join("maps");
        let mut w = DictWriter::create(&tp, &mp).unwrap();
        w.write_quad(&quad(
            "<http://example.org/a>",
            "<http://example.org/p>",
            "<http://example.org/b>",
            "",
        ))
        .unwrap();
        let (tp, _mp, count) = w.finish().unwrap();
        assert_eq!(count, 1);

        let contents = std::fs::read_to_string(tp).unwrap();
        let line = contents.lines().next().unwrap();
        let cols: Vec<&str> = line.split('\t').collect();
        assert_eq!(cols.len(), 4);
        assert_eq!(cols.len(), 4);
        assert_eq!(cols[0].len(), 16);
        assert!(cols[0].chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(
            u64::from_str_radix(cols[0], 16).unwrap(),
            term_hash("<http://example.org/a>")
        );
    }

    #[test]
    fn maps_file_has_three_lines_per_triple_plus_graphs() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("triples");
        let mp = dir.path().join("maps");
        let mut w = DictWriter::create(&tp, &mp).unwrap();
        w.write_quad(&quad(
            "<http://example.org/a>",
            "<http://example.org/p>",
            "<http://example.org/b>",
            "<http://example.org/g1>",
        ))
        .unwrap();
        let (_tp, mp, _count) = w.finish().unwrap();

        let f = std::fs::File::open(mp).unwrap();
        let lines: Vec<String> = std::io::BufReader::new(f)
            .lines()
            .collect::<Result<_, _>>()
            .unwrap();
        // 3 term lines + 1 graph line
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().any(|l| l.ends_with("\t|\t<http://example.org/g1>")));
    }

    #[test]
    fn distinct_graphs_deduplicated() {
        let dir = tempfile::tempdir().unwrap();
        let tp = dir.path().join("triples");
        let mp = dir.path().join("maps");
        let mut w = DictWriter::create(&tp, &mp).unwrap();
        for _ in 0..3 {
            w.write_quad(&quad(
                "<http://example.org/a>",
                "<http://example.org/p>",
                "<http://example.org/b>",
                "<http://example.org/g1>",
            ))
            .unwrap();
        }
        let (_tp, mp, _count) = w.finish().unwrap();
        let contents = std::fs::read_to_string(mp).unwrap();
        let graph_lines = contents
            .lines()
            .filter(|l| l.ends_with("\t|\t<http://example.org/g1>"))
            .count();
        assert_eq!(graph_lines, 1);
    }
}
