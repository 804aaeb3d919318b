//! Embedder capability (SPEC_FULL.md §4.8): pluggable text → vector.
//!
//! The query compiler and `build_semantic` never depend on a specific model;
//! they only call `Embedder::embed`. The shipped implementation is a
//! deterministic hash-based embedding so the crate runs end to end without a
//! downloaded model; a real ONNX/HTTP-backed embedder is a drop-in behind the
//! same trait.

use rayon::prelude::*;
use thiserror::Error;

/// Fixed embedding dimension for `literals_semantic.vec`.
pub const EMBEDDING_DIM: usize = 128;

/// Batch ceiling for calls into the embedder, independent of any DB-side
/// insert batching `build_semantic` may additionally apply.
pub const EMBED_BATCH_CEILING: usize = 96;

#[derive(Error, Debug)]
pub enum EmbedderError {
    #[error("query cannot be empty")]
    EmptyQuery,
    #[error("embedding backend error: {0}")]
    Backend(String),
}

/// Distinguishes a query embedding from a document embedding, since some
/// real embedding models use different prefixes/heads for each (as the
/// ambient stack's own embedder does with "query: "/"passage: " prefixes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    Query,
    Document,
}

pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning one `Vec<f32>` of `dimension()` per
    /// input, in order.
    fn embed(&self, kind: EmbedKind, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError>;

    /// Dimension of vectors this embedder produces.
    fn dimension(&self) -> usize;

    /// Maximum batch size this embedder accepts per `embed` call.
    fn batch_ceiling(&self) -> usize {
        EMBED_BATCH_CEILING
    }
}

/// Deterministic, dependency-free stand-in embedder.
///
/// Hashes overlapping 3-character shingles of the (lowercased) input into
/// buckets of a fixed-size vector, then L2-normalizes. Same input always
/// produces the same vector; similar inputs (sharing shingles) produce
/// vectors with nontrivial cosine similarity, enough to exercise the
/// `semantic` clause and `build_semantic` meaningfully in tests without
/// downloading model weights.
pub struct DeterministicEmbedder {
    dim: usize,
}

impl DeterministicEmbedder {
    pub fn new() -> Self {
        Self { dim: EMBEDDING_DIM }
    }

    pub fn with_dimension(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let lower = text.to_lowercase();
        let chars: Vec<char> = lower.chars().collect();
        if chars.is_empty() {
            return v;
        }
        let window = 3.min(chars.len());
        for start in 0..=(chars.len() - window) {
            let shingle: String = chars[start..start + window].iter().collect();
            let h = crate::hash::term_hash(&shingle);
            let bucket = (h as usize) % self.dim;
            let sign = if (h >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize_l2(v)
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed(&self, _kind: EmbedKind, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedderError> {
        // Each text embeds independently, so a batch splits across rayon's
        // pool rather than running the shingle loop serially per call.
        texts
            .par_iter()
            .map(|t| {
                if t.trim().is_empty() {
                    Err(EmbedderError::EmptyQuery)
                } else {
                    Ok(self.embed_one(t))
                }
            })
            .collect()
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm_sq: f32 = v.iter().fold(0.0, |acc, &x| acc + x * x);
    if norm_sq > 0.0 {
        let inv_norm = 1.0 / norm_sq.sqrt();
        v.iter_mut().for_each(|x| *x *= inv_norm);
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_across_calls() {
        let e = DeterministicEmbedder::new();
        let a = e.embed(EmbedKind::Document, &["hello world"]).unwrap();
        let b = e.embed(EmbedKind::Document, &["hello world"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_text_is_rejected() {
        let e = DeterministicEmbedder::new();
        let result = e.embed(EmbedKind::Query, &[""]);
        assert!(matches!(result, Err(EmbedderError::EmptyQuery)));
    }

    #[test]
    fn vectors_are_unit_length() {
        let e = DeterministicEmbedder::new();
        let v = &e.embed(EmbedKind::Document, &["the quick brown fox"]).unwrap()[0];
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn similar_texts_are_more_similar_than_unrelated() {
        let e = DeterministicEmbedder::new();
        let a = &e.embed(EmbedKind::Document, &["the quick brown fox"]).unwrap()[0];
        let b = &e.embed(EmbedKind::Document, &["the quick brown dog"]).unwrap()[0];
        let c = &e.embed(EmbedKind::Document, &["completely unrelated text here"]).unwrap()[0];

        let dot = |x: &[f32], y: &[f32]| -> f32 { x.iter().zip(y).map(|(p, q)| p * q).sum() };
        assert!(dot(a, b) > dot(a, c));
    }
}
