//! QueryCompiler (C5): compile a single filter clause to a subject-yielding
//! SQL subquery. Purely syntactic — never consults the store, except to call
//! the `embedder` capability for `"semantic"` clauses (a pure function of the
//! query text, not of stored data).

use serde::Deserialize;
use thiserror::Error;

use crate::embedder::{EmbedKind, Embedder, EmbedderError};
use crate::hash::term_hash;

#[derive(Error, Debug)]
pub enum CompileError {
    #[error("clause has neither a recognized predicate form nor an IRI/blank-node object")]
    Unrecognized,
    #[error("invalid order.by tag: {0:?}")]
    InvalidOrderBy(String),
    #[error("embedding query text failed: {0}")]
    Embed(#[from] EmbedderError),
}

/// `op` on a filter clause: how it combines with the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClauseOp {
    #[serde(alias = "or")]
    Should,
    #[serde(alias = "and")]
    Must,
    Not,
}

impl Default for ClauseOp {
    fn default() -> Self {
        ClauseOp::Should
    }
}

/// One filter clause: `{p, o, g, op}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterClause {
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub o: String,
    #[serde(default)]
    pub g: String,
    #[serde(default)]
    pub op: ClauseOp,
}

/// A compiled clause: a SQL subquery yielding a bare `s` column (`set_sql`),
/// and — for FTS/semantic clauses only — a parallel query yielding `(s,
/// score)` (`score_sql`), per SPEC_FULL.md §4.5's `_extra_fts_fields` flag.
pub struct CompiledClause {
    pub set_sql: String,
    pub score_sql: Option<String>,
}

/// Escape a string for inline interpolation into a single-quoted SQL literal.
pub fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn graph_constraint(alias: &str, g: &str) -> String {
    let g = g.trim();
    if g.is_empty() {
        return String::new();
    }
    let hashes: Vec<String> = g.split_ascii_whitespace().map(|t| term_hash(t).to_string()).collect();
    format!(" and {alias}.g in ({})", hashes.join(","))
}

/// Graph scoping for clauses whose result column (`ftss`, `semantic`) is a
/// bare subject hash with no `g` column of its own to compare against
/// directly: scope it via a semi-join back to `triples` instead.
fn graph_constraint_on_subject(column: &str, g: &str) -> String {
    let g = g.trim();
    if g.is_empty() {
        return String::new();
    }
    let hashes: Vec<String> = g.split_ascii_whitespace().map(|t| term_hash(t).to_string()).collect();
    format!(
        " and {column} in (select distinct s from triples where g in ({}))",
        hashes.join(",")
    )
}

fn object_constraint(alias: &str, o: &str) -> String {
    let terms: Vec<&str> = o.split_ascii_whitespace().collect();
    if terms.len() > 1 {
        let hashes: Vec<String> = terms.iter().map(|t| term_hash(t).to_string()).collect();
        format!("{alias}.o in ({})", hashes.join(","))
    } else {
        format!("{alias}.o = {}", term_hash(o))
    }
}

fn array_literal(dim: usize, vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|x| x.to_string()).collect();
    format!("[{}]::FLOAT[{dim}]", parts.join(","))
}

/// Compile one filter clause per the table in SPEC_FULL.md §4.5.
pub fn compile_clause(clause: &FilterClause, embedder: &dyn Embedder) -> Result<CompiledClause, CompileError> {
    let p = clause.p.trim();
    let o = clause.o.trim();
    let g = graph_constraint("T0", &clause.g);

    if p.is_empty() && (o.starts_with('<') || o.starts_with("_:")) {
        let oc = object_constraint("T0", o);
        return Ok(CompiledClause {
            set_sql: format!("select distinct s from triples T0 where {oc}{g}"),
            score_sql: None,
        });
    }

    if p == "id" {
        if o.starts_with('<') {
            let h = term_hash(o);
            return Ok(CompiledClause {
                set_sql: format!("select distinct s from triples T0 where s = {h}{g}"),
                score_sql: None,
            });
        }
        if o.starts_with("random") || o.starts_with("sample") {
            let n: i64 = o
                .split_ascii_whitespace()
                .nth(1)
                .and_then(|count| count.parse().ok())
                .unwrap_or(1);
            return Ok(CompiledClause {
                set_sql: format!("select distinct s from triples T0 using sample {n}{g}"),
                score_sql: None,
            });
        }
        return Err(CompileError::Unrecognized);
    }

    if p == "semantic" {
        let vectors = embedder.embed(EmbedKind::Query, &[o])?;
        let literal = array_literal(embedder.dimension(), &vectors[0]);
        let g_on_hash = graph_constraint_on_subject("hash", &clause.g);
        let score_sql = format!(
            "select hash as s, 1.0 / distance as score from (\
                 select hash, array_cosine_distance(vec, {literal}) as distance from literals_semantic\
             ) d where distance < 0.5{g_on_hash}"
        );
        return Ok(CompiledClause {
            set_sql: format!("select s from ({score_sql})"),
            score_sql: Some(score_sql),
        });
    }

    if p == "regex" || p.starts_with("regex ") {
        let pattern = escape_sql_literal(o);
        let extra = p
            .strip_prefix("regex ")
            .map(|iri| format!(" and T0.p = {}", term_hash(iri.trim())))
            .unwrap_or_default();
        return Ok(CompiledClause {
            set_sql: format!(
                "select distinct T0.s as s from triples T0 join literals L on T0.o = L.hash \
                 where L.value similar to '{pattern}'{extra}{g}"
            ),
            score_sql: None,
        });
    }

    if p == "ftss" {
        let q = escape_sql_literal(o);
        let g_on_s = graph_constraint_on_subject("s", &clause.g);
        let score_sql = format!(
            "select s, score from (\
                 select s, fts_main_fts.match_bm25(s, '{q}') as score from fts\
             ) b where score is not null{g_on_s}"
        );
        return Ok(CompiledClause {
            set_sql: format!("select s from ({score_sql})"),
            score_sql: Some(score_sql),
        });
    }

    if p == "fts" || p.starts_with("fts ") {
        let hops: usize = p.strip_prefix("fts ").and_then(|n| n.trim().parse().ok()).unwrap_or(0);
        let q = escape_sql_literal(o);
        let mut score_sql = format!(
            "select T0.s as s, B.score as score from (\
                 select hash, fts_main_literals.match_bm25(hash, '{q}') as score from literals\
             ) B join triples T0 on T0.o = B.hash where B.score is not null{g}"
        );
        for hop in 0..hops {
            let next = hop + 1;
            score_sql = format!(
                "select T{next}.s as s, X.score as score from ({score_sql}) X join triples T{next} on T{next}.o = X.s"
            );
        }
        return Ok(CompiledClause {
            set_sql: format!("select s from ({score_sql})"),
            score_sql: Some(score_sql),
        });
    }

    if p.starts_with('<') {
        let ph = term_hash(p);
        if o.is_empty() {
            return Ok(CompiledClause {
                set_sql: format!("select distinct s from triples T0 where p = {ph}{g}"),
                score_sql: None,
            });
        }
        let oc = object_constraint("T0", o);
        return Ok(CompiledClause {
            set_sql: format!("select distinct s from triples T0 where p = {ph} and {oc}{g}"),
            score_sql: None,
        });
    }

    Err(CompileError::Unrecognized)
}

/// Fold a list of compiled set-queries left to right: `should`/`or` as
/// `UNION`, `must`/`and` as `INTERSECT`, with all `not` clauses deferred and
/// applied as a single trailing `EXCEPT` against the accumulated set.
///
/// When `scored_only` is set, clauses without a `score_sql` are skipped and
/// `not` clauses are ignored entirely (SPEC_FULL.md §4.6: the score table is
/// folded via UNION/INTERSECT only).
pub fn fold_clauses(
    clauses: &[FilterClause],
    embedder: &dyn Embedder,
    scored_only: bool,
) -> Result<Option<String>, CompileError> {
    let mut seed: Option<String> = None;
    let mut excepts: Vec<String> = Vec::new();

    for clause in clauses {
        let compiled = compile_clause(clause, embedder)?;
        let sql = if scored_only {
            match compiled.score_sql {
                Some(s) => s,
                None => continue,
            }
        } else {
            compiled.set_sql
        };

        if scored_only && clause.op == ClauseOp::Not {
            continue;
        }

        match clause.op {
            ClauseOp::Not => excepts.push(sql),
            ClauseOp::Should => {
                seed = Some(match seed {
                    None => sql,
                    Some(prev) => format!("({prev}) union ({sql})"),
                });
            }
            ClauseOp::Must => {
                seed = Some(match seed {
                    None => sql,
                    Some(prev) => format!("({prev}) intersect ({sql})"),
                });
            }
        }
    }

    let Some(mut combined) = seed else {
        return Ok(None);
    };
    for part in excepts {
        combined = format!("({combined}) except ({part})");
    }
    Ok(Some(combined))
}
