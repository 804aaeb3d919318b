//! Term-shape helpers used by the parser, compiler and executor.

/// True if `s` is an IRI-shaped token: `<...>`.
pub fn is_iri_shaped(s: &str) -> bool {
    s.starts_with('<') && s.ends_with('>') && s.len() >= 2
}

/// True if `s` is a blank-node token: `_:name`.
pub fn is_blank_node(s: &str) -> bool {
    s.starts_with("_:")
}

/// True if `s` is a literal token: starts with `"`.
pub fn is_literal(s: &str) -> bool {
    s.starts_with('"')
}

/// Split a literal's surface form into `(value, language, datatype)`.
///
/// Exposed publicly but unused by the core query path (see SPEC_FULL.md §9,
/// open question 3) — retained as an external utility for callers that want
/// to inspect a literal's language tag or datatype IRI directly.
pub fn literal_to_parts(literal: &str) -> (Option<String>, Option<String>, Option<String>) {
    if !literal.starts_with('"') {
        return (None, None, None);
    }
    let Some(end_index) = literal.rfind('"').filter(|&i| i > 0) else {
        return (None, None, None);
    };
    let value = literal[1..end_index].to_string();
    let remainder = literal[end_index + 1..].trim();
    if let Some(lang) = remainder.strip_prefix('@') {
        (Some(value), Some(lang.to_string()), None)
    } else if let Some(dt) = remainder.strip_prefix("^^") {
        (Some(value), None, Some(dt.to_string()))
    } else {
        (Some(value), None, None)
    }
}
