//! Query request/response JSON dialect shared by the compiler, executor and
//! dispatcher (SPEC_FULL.md §4.6, §6).

use serde::Deserialize;

pub use crate::compiler::{ClauseOp, FilterClause};

fn default_size() -> usize {
    999
}

fn default_lang() -> Vec<String> {
    vec!["de".to_string(), "en".to_string()]
}

/// A single `order` rule. Only the first rule in `QueryRequest::order` drives
/// ordering (SPEC_FULL.md §4.6 "Ordering contract").
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRule {
    pub by: String,
    #[serde(default)]
    pub prop: Option<String>,
    #[serde(default)]
    pub via: Option<String>,
    #[serde(default = "default_lang")]
    pub lang: Vec<String>,
    #[serde(default)]
    pub dir: Dir,
    #[serde(default)]
    pub nulls: Nulls,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub natural: bool,
    #[serde(default)]
    pub clean: CleanOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nulls {
    First,
    #[default]
    Last,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Lex,
    Raw,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct CleanOptions {
    pub trim: bool,
    pub lower: bool,
    pub strip_punct: bool,
    pub collapse_space: bool,
    pub remove_quotes: bool,
}

/// An aggregate tag: the two reserved names, or an arbitrary predicate IRI
/// for per-value counts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum AggregateTag {
    Properties,
    Graphs,
    Predicate(String),
}

impl From<String> for AggregateTag {
    fn from(s: String) -> Self {
        match s.as_str() {
            "properties" => AggregateTag::Properties,
            "graphs" => AggregateTag::Graphs,
            _ => AggregateTag::Predicate(s),
        }
    }
}

impl AggregateTag {
    pub fn label(&self) -> String {
        match self {
            AggregateTag::Properties => "properties".to_string(),
            AggregateTag::Graphs => "graphs".to_string(),
            AggregateTag::Predicate(p) => p.clone(),
        }
    }
}

/// A query request, deserialized directly from the JSON dialect in
/// SPEC_FULL.md §6.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueryRequest {
    pub filters: Vec<FilterClause>,
    pub aggregates: Vec<AggregateTag>,
    pub paths: Vec<String>,
    pub order: Vec<OrderRule>,
    #[serde(default = "default_size")]
    pub size: usize,
    pub start: usize,
    pub exclude_properties: Vec<String>,
    pub use_cache: bool,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            aggregates: Vec::new(),
            paths: Vec::new(),
            order: Vec::new(),
            size: default_size(),
            start: 0,
            exclude_properties: Vec::new(),
            use_cache: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_request() {
        let req: QueryRequest = serde_json::from_str(r#"{"filters":[{"p":"<http://example.org/p>","o":"<http://example.org/c>"}]}"#).unwrap();
        assert_eq!(req.filters.len(), 1);
        assert_eq!(req.size, 999);
        assert_eq!(req.start, 0);
    }

    #[test]
    fn clause_op_aliases() {
        let req: QueryRequest = serde_json::from_str(
            r#"{"filters":[{"p":"<p>","o":"<c>","op":"and"},{"p":"<p>","o":"<b>","op":"not"}]}"#,
        )
        .unwrap();
        assert_eq!(req.filters[0].op, ClauseOp::Must);
        assert_eq!(req.filters[1].op, ClauseOp::Not);
    }

    #[test]
    fn aggregate_tag_recognizes_reserved_names() {
        let req: QueryRequest =
            serde_json::from_str(r#"{"aggregates":["properties","graphs","<http://example.org/p>"]}"#).unwrap();
        assert_eq!(req.aggregates[0], AggregateTag::Properties);
        assert_eq!(req.aggregates[1], AggregateTag::Graphs);
        assert_eq!(req.aggregates[2], AggregateTag::Predicate("<http://example.org/p>".to_string()));
    }

    #[test]
    fn order_rule_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"order":[{"by":"label"}]}"#).unwrap();
        let rule = &req.order[0];
        assert_eq!(rule.lang, vec!["de".to_string(), "en".to_string()]);
        assert_eq!(rule.dir, Dir::Asc);
        assert_eq!(rule.nulls, Nulls::Last);
        assert_eq!(rule.mode, Mode::Lex);
        assert!(!rule.natural);
    }
}
