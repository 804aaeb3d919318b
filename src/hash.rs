//! Term hashing (C1): stable 64-bit identities for RDF terms.

use xxhash_rust::xxh64::xxh64;

/// Hash a term's surface-syntax string to its 64-bit identity.
///
/// Uses xxhash64 with seed 0 over the term's UTF-8 bytes. This is the single
/// point of truth for term identity: every dictionary row and every column
/// of `triples` is keyed by this function's output.
///
/// The empty string is special-cased to hash `0` rather than whatever
/// xxhash64 happens to compute over zero bytes, so the empty/absent graph
/// term gets the reserved all-zero identity regardless of hash algorithm.
pub fn term_hash(term: &str) -> u64 {
    if term.is_empty() {
        return EMPTY_GRAPH_HASH;
    }
    xxh64(term.as_bytes(), 0)
}

/// Upper-case, zero-padded 16-hex-digit form used on the wire between the
/// parser/dict writer and the bulk loader.
pub fn term_hash_hex(term: &str) -> String {
    format!("{:016X}", term_hash(term))
}

/// The reserved hash representing the empty / absent graph.
pub const EMPTY_GRAPH_HASH: u64 = 0;
