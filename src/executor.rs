//! QueryExecutor (C6): materialize, sort, paginate, aggregate, resolve.
//!
//! Every query opens its own `s_results`/`s_by_score`/`s_sorted`/`wanted`
//! temp tables scoped to the connection it runs against (SPEC_FULL.md §5).

use std::collections::{BTreeMap, HashMap, HashSet};

use duckdb::Connection;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::compiler::{fold_clauses, CompileError};
use crate::embedder::Embedder;
use crate::hash::term_hash;
use crate::query::{AggregateTag, Dir, Mode, Nulls, OrderRule, QueryRequest};

/// rdfs:label, used by `order.by == "label"` and `"object_label"`.
pub const RDFS_LABEL: &str = "<http://www.w3.org/2000/01/rdf-schema#label>";

#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
}

/// Run one query request to completion and return the JSON response shape
/// from SPEC_FULL.md §6.
///
/// An empty `filters` list is not "match everything": it short-circuits to
/// `total: 0` / `results: {}` without ever materializing `s_results`, mirroring
/// the original, which skips the entire query block when there are no clauses
/// to fold (`query.py:537`) and falls through to the `properties`/`graphs`
/// special aggregates instead of a real result set.
pub fn execute(conn: &Connection, embedder: &dyn Embedder, req: &QueryRequest) -> Result<Value, ExecError> {
    if req.filters.is_empty() {
        let mut response = Map::new();
        response.insert("results".into(), Value::Object(Map::new()));
        response.insert("total".into(), Value::from(0u64));
        response.insert("size".into(), Value::from(req.size));
        response.insert("start".into(), Value::from(req.start));
        if let Some(agg) = compute_special_aggregates(conn, req)? {
            response.insert("aggregates".into(), Value::Object(agg));
        }
        return Ok(Value::Object(response));
    }

    build_s_results(conn, req, embedder)?;
    let total = count_s_results(conn)?;
    let has_score = build_s_by_score(conn, req, embedder)?;

    match req.order.first() {
        Some(rule) => build_s_sorted(conn, rule)?,
        None => build_s_sorted_default(conn, has_score)?,
    }
    build_wanted(conn, req.size, req.start)?;

    let aggregates = compute_aggregates(conn, req)?;
    let triples = fetch_triples(conn, &req.exclude_properties)?;
    let path_results = if req.paths.is_empty() {
        HashMap::new()
    } else {
        fetch_paths(conn, &req.paths)?
    };

    let mut hashes: HashSet<u64> = HashSet::new();
    for &(s, p, o, g) in &triples {
        hashes.insert(s);
        hashes.insert(p);
        hashes.insert(o);
        hashes.insert(g);
    }
    for per_subject in path_results.values() {
        for (s, ancestors) in per_subject {
            hashes.insert(*s);
            hashes.extend(ancestors.iter().copied());
        }
    }
    let hash_vec: Vec<u64> = hashes.into_iter().collect();
    let strings = resolve_hashes(conn, &hash_vec)?;

    let results = build_entities(&triples, &path_results, &strings);

    let mut response = Map::new();
    response.insert("results".into(), Value::Object(results));
    response.insert("total".into(), Value::from(total));
    response.insert("size".into(), Value::from(req.size));
    response.insert("start".into(), Value::from(req.start));
    if let Some(agg) = aggregates {
        response.insert("aggregates".into(), Value::Object(agg));
    }
    Ok(Value::Object(response))
}

fn build_s_results(conn: &Connection, req: &QueryRequest, embedder: &dyn Embedder) -> Result<(), ExecError> {
    conn.execute_batch("drop table if exists s_results;")?;
    let combined = fold_clauses(&req.filters, embedder, false)?;
    let sql = match combined {
        Some(sql) => format!("create temp table s_results as select distinct s from ({sql}) r"),
        None => "create temp table s_results as select distinct s from triples".to_string(),
    };
    conn.execute_batch(&sql)?;
    Ok(())
}

fn count_s_results(conn: &Connection) -> Result<u64, ExecError> {
    let n: i64 = conn.query_row("select count(*) from s_results", [], |r| r.get(0))?;
    Ok(n as u64)
}

/// Fold any FTS/semantic clauses into a parallel `s_by_score(s, score)`
/// table, used only for default ordering when no explicit `order` is given.
fn build_s_by_score(conn: &Connection, req: &QueryRequest, embedder: &dyn Embedder) -> Result<bool, ExecError> {
    conn.execute_batch("drop table if exists s_by_score;")?;
    let combined = fold_clauses(&req.filters, embedder, true)?;
    match combined {
        Some(sql) => {
            conn.execute_batch(&format!(
                "create temp table s_by_score as select s, max(score) as score from ({sql}) x group by s"
            ))?;
            Ok(true)
        }
        None => {
            conn.execute_batch("create temp table s_by_score (s ubigint, score double);")?;
            Ok(false)
        }
    }
}

fn literal_value_expr(col: &str) -> String {
    format!("regexp_extract({col}, '^\"(.*)\"(@[A-Za-z-]+|\\^\\^<[^>]*>)?$', 1)")
}

fn lang_tag_expr(col: &str) -> String {
    format!("regexp_extract({col}, '@([A-Za-z-]+)$', 1)")
}

fn apply_clean(expr: String, clean: &crate::query::CleanOptions) -> String {
    let mut e = expr;
    if clean.trim {
        e = format!("trim({e})");
    }
    if clean.lower {
        e = format!("lower({e})");
    }
    if clean.strip_punct {
        e = format!("regexp_replace({e}, '[[:punct:]]', '', 'g')");
    }
    if clean.collapse_space {
        e = format!("regexp_replace({e}, '\\s+', ' ', 'g')");
    }
    if clean.remove_quotes {
        e = format!("replace({e}, '\"', '')");
    }
    e
}

fn lang_rank_case(lang_col_expr: &str, langs: &[String]) -> String {
    let mut arms = String::new();
    for (i, lang) in langs.iter().enumerate() {
        arms.push_str(&format!(
            "when {lang_col_expr} = '{}' then {i} ",
            crate::compiler::escape_sql_literal(lang)
        ));
    }
    let untagged_rank = langs.len();
    let unknown_rank = langs.len() + 1;
    format!(
        "case {arms}when {lang_col_expr} is null or {lang_col_expr} = '' then {untagged_rank} else {unknown_rank} end"
    )
}

/// Build the `(s, lang_rank, sort_label)` candidate CTE body for one order
/// rule, per SPEC_FULL.md §4.6's "Ordering contract".
fn label_candidates_sql(rule: &OrderRule) -> Result<String, ExecError> {
    let rdfs_label = term_hash(RDFS_LABEL);
    match rule.by.as_str() {
        "label" => {
            let sort_expr = apply_clean(literal_value_expr("L.value"), &rule.clean);
            let lang_rank = lang_rank_case(&lang_tag_expr("L.value"), &rule.lang);
            Ok(format!(
                "select T.s as s, {lang_rank} as lang_rank, {sort_expr} as sort_label
                 from triples T join literals L on T.o = L.hash
                 where T.p = {rdfs_label} and T.s in (select s from s_results)"
            ))
        }
        "property" => {
            let prop = rule
                .prop
                .as_deref()
                .ok_or_else(|| ExecError::Compile(CompileError::InvalidOrderBy("property".into())))?;
            let ph = term_hash(prop);
            let sort_expr = apply_clean(literal_value_expr("L.value"), &rule.clean);
            let lang_rank = lang_rank_case(&lang_tag_expr("L.value"), &rule.lang);
            let iri_clean = apply_clean("I.value".to_string(), &rule.clean);
            let fallback_rank = rule.lang.len() + 2;
            Ok(format!(
                "select T.s as s, {lang_rank} as lang_rank, {sort_expr} as sort_label
                 from triples T join literals L on T.o = L.hash
                 where T.p = {ph} and T.s in (select s from s_results)
                 union all
                 select T.s as s, {fallback_rank} as lang_rank, {iri_clean} as sort_label
                 from triples T join iris I on T.o = I.hash
                 where T.p = {ph} and T.s in (select s from s_results)"
            ))
        }
        "object_label" => {
            let via = rule
                .via
                .as_deref()
                .ok_or_else(|| ExecError::Compile(CompileError::InvalidOrderBy("object_label".into())))?;
            let vh = term_hash(via);
            let sort_expr = apply_clean(literal_value_expr("L.value"), &rule.clean);
            let lang_rank = lang_rank_case(&lang_tag_expr("L.value"), &rule.lang);
            Ok(format!(
                "select T.s as s, {lang_rank} as lang_rank, {sort_expr} as sort_label
                 from triples T
                 join triples T2 on T.o = T2.s and T2.p = {rdfs_label}
                 join literals L on T2.o = L.hash
                 where T.p = {vh} and T.s in (select s from s_results)"
            ))
        }
        other => Err(ExecError::Compile(CompileError::InvalidOrderBy(other.to_string()))),
    }
}

fn build_s_sorted(conn: &Connection, rule: &OrderRule) -> Result<(), ExecError> {
    let candidates = label_candidates_sql(rule)?;

    let mode_wrap = |e: &str| {
        if rule.mode == Mode::Lex {
            format!("lower({e})")
        } else {
            e.to_string()
        }
    };
    let dir = if rule.dir == Dir::Desc { "desc" } else { "asc" };
    let nulls = if rule.nulls == Nulls::First { "first" } else { "last" };

    let order_expr = if rule.natural {
        format!(
            "case when regexp_matches(w.sort_label, '^[0-9]+') then 0 else 1 end asc, \
             try_cast(regexp_extract(w.sort_label, '^[0-9]+', 0) as bigint) {dir} nulls last, \
             {key} {dir} nulls {nulls}",
            key = mode_wrap("w.sort_label")
        )
    } else {
        format!("{} {dir} nulls {nulls}", mode_wrap("w.sort_label"))
    };

    conn.execute_batch(&format!(
        "drop table if exists s_sorted;
         create temp table s_sorted as
         with cand as ({candidates}),
         ranked as (
           select s, sort_label, row_number() over (partition by s order by lang_rank, sort_label) as rn
           from cand
         ),
         winner as (select s, sort_label from ranked where rn = 1)
         select r.s as s, row_number() over (order by {order_expr}) as pos
         from s_results r left join winner w on r.s = w.s"
    ))?;
    Ok(())
}

fn build_s_sorted_default(conn: &Connection, has_score: bool) -> Result<(), ExecError> {
    conn.execute_batch("drop table if exists s_sorted;")?;
    let sql = if has_score {
        "create temp table s_sorted as
         select r.s as s, row_number() over (order by coalesce(b.score, -1e300) desc, r.s asc) as pos
         from s_results r left join s_by_score b on r.s = b.s"
    } else {
        "create temp table s_sorted as
         select s, row_number() over (order by s asc) as pos from s_results"
    };
    conn.execute_batch(sql)?;
    Ok(())
}

fn build_wanted(conn: &Connection, size: usize, start: usize) -> Result<(), ExecError> {
    conn.execute_batch(&format!(
        "drop table if exists wanted;
         create temp table wanted as
         select s, pos from s_sorted order by pos limit {size} offset {start}"
    ))?;
    Ok(())
}

fn resolve_hashes(conn: &Connection, hashes: &[u64]) -> Result<HashMap<u64, String>, ExecError> {
    let mut out = HashMap::new();
    out.insert(0u64, String::new());
    if hashes.is_empty() {
        return Ok(out);
    }
    let list = hashes
        .iter()
        .map(|h| (*h as i64).to_string())
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "select hash, value from iris where hash in ({list})
         union all
         select hash, value from literals where hash in ({list})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<(i64, String)> = stmt
        .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)))?
        .collect::<Result<_, _>>()?;
    out.extend(rows.into_iter().map(|(h, v)| (h as u64, v)));
    Ok(out)
}

fn rows_with_resolved_value(conn: &Connection, sql: &str) -> Result<Vec<Value>, ExecError> {
    let raw: Vec<(i64, i64)> = {
        let mut stmt = conn.prepare(sql)?;
        stmt.query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)))?
            .collect::<Result<_, _>>()?
    };
    let hashes: Vec<u64> = raw.iter().map(|(_, h)| *h as u64).collect();
    let resolved = resolve_hashes(conn, &hashes)?;
    Ok(raw
        .into_iter()
        .map(|(cnt, h)| {
            let val = resolved.get(&(h as u64)).cloned().unwrap_or_default();
            Value::Array(vec![Value::from(cnt), Value::String(val)])
        })
        .collect())
}

/// Aggregates for a non-empty filter set: `properties`/`graphs` are scoped to
/// `s_results`, and `Predicate(p)` aggregates (object-value histograms for a
/// given predicate) are available — only meaningful once there's a result
/// set to break down (SPEC_FULL.md §4.6).
fn compute_aggregates(conn: &Connection, req: &QueryRequest) -> Result<Option<Map<String, Value>>, ExecError> {
    if req.aggregates.is_empty() {
        return Ok(None);
    }
    let mut out = Map::new();
    for tag in &req.aggregates {
        let rows = match tag {
            AggregateTag::Properties => rows_with_resolved_value(
                conn,
                "select count(distinct s) as cnt, p as hash from triples where s in (select s from s_results) group by p order by cnt desc",
            )?,
            AggregateTag::Graphs => rows_with_resolved_value(
                conn,
                "select count(distinct s) as cnt, g as hash from triples where s in (select s from s_results) group by g order by cnt desc",
            )?,
            AggregateTag::Predicate(p) => {
                let ph = term_hash(p);
                rows_with_resolved_value(
                    conn,
                    &format!(
                        "select cnt, hash from (
                           select count(distinct s) as cnt, o as hash from triples
                           where p = {ph} and s in (select s from s_results) and o in (select hash from iris)
                           group by o
                           union all
                           select count(distinct s) as cnt, o as hash from triples
                           where p = {ph} and s in (select s from s_results) and o in (select hash from literals)
                           group by o
                         ) order by cnt desc"
                    ),
                )?
            }
        };
        out.insert(tag.label(), Value::Array(rows));
    }
    Ok(Some(out))
}

/// Aggregates for an empty filter set: only the `properties`/`graphs`
/// specials, computed over every triple in the store rather than a (absent)
/// result set; `Predicate(p)` aggregate tags are silently skipped, matching
/// the original's "Special aggregates" section which only ever populates
/// these two keys when there were no queries (`query.py:673-681`).
fn compute_special_aggregates(conn: &Connection, req: &QueryRequest) -> Result<Option<Map<String, Value>>, ExecError> {
    if req.aggregates.is_empty() {
        return Ok(None);
    }
    let mut out = Map::new();
    for tag in &req.aggregates {
        let rows = match tag {
            AggregateTag::Properties => rows_with_resolved_value(
                conn,
                "select count(distinct s) as cnt, p as hash from triples group by p order by cnt desc",
            )?,
            AggregateTag::Graphs => rows_with_resolved_value(
                conn,
                "select count(distinct s) as cnt, g as hash from triples group by g order by cnt desc",
            )?,
            AggregateTag::Predicate(_) => continue,
        };
        out.insert(tag.label(), Value::Array(rows));
    }
    if out.is_empty() {
        Ok(None)
    } else {
        Ok(Some(out))
    }
}

fn fetch_triples(conn: &Connection, exclude_properties: &[String]) -> Result<Vec<(u64, u64, u64, u64)>, ExecError> {
    let exclude_clause = if exclude_properties.is_empty() {
        String::new()
    } else {
        let hashes: Vec<String> = exclude_properties.iter().map(|p| term_hash(p).to_string()).collect();
        format!(" and p not in ({})", hashes.join(","))
    };
    let sql = format!("select s,p,o,g from triples where s in (select s from wanted){exclude_clause}");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, i64>(0)? as u64,
                r.get::<_, i64>(1)? as u64,
                r.get::<_, i64>(2)? as u64,
                r.get::<_, i64>(3)? as u64,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Recursive ancestry paths via each requested predicate, restricted to
/// sources in `wanted` (SPEC_FULL.md §4.6, step 7).
fn fetch_paths(conn: &Connection, predicates: &[String]) -> Result<HashMap<String, HashMap<u64, Vec<u64>>>, ExecError> {
    let mut out = HashMap::new();
    for pi in predicates {
        let ph = term_hash(pi);
        let sql = format!(
            "with recursive anc(source, cur, path) as (
               select s, o, [o] from triples where p = {ph} and s in (select s from wanted)
               union all
               select a.source, t.o, list_append(a.path, t.o)
               from anc a join triples t on a.cur = t.s and t.p = {ph}
             )
             select source, path from anc
             qualify row_number() over (partition by source order by len(path) desc) = 1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<(i64, Vec<i64>)> = stmt
            .query_map([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Vec<i64>>(1)?)))?
            .collect::<Result<_, _>>()?;
        let mapped: HashMap<u64, Vec<u64>> = rows
            .into_iter()
            .map(|(source, path)| (source as u64, path.into_iter().map(|h| h as u64).collect()))
            .collect();
        out.insert(pi.clone(), mapped);
    }
    Ok(out)
}

fn build_entities(
    triples: &[(u64, u64, u64, u64)],
    paths: &HashMap<String, HashMap<u64, Vec<u64>>>,
    strings: &HashMap<u64, String>,
) -> Map<String, Value> {
    let mut entities: BTreeMap<u64, Map<String, Value>> = BTreeMap::new();
    let resolve = |h: &u64| strings.get(h).cloned().unwrap_or_default();

    for &(s, p, o, g) in triples {
        let entry = entities.entry(s).or_insert_with(|| {
            let mut m = Map::new();
            m.insert("id".into(), Value::String(resolve(&s)));
            m.insert("graph".into(), Value::Array(vec![]));
            m
        });

        let p_str = resolve(&p);
        let o_str = resolve(&o);
        entry
            .entry(p_str)
            .or_insert_with(|| Value::Array(vec![]))
            .as_array_mut()
            .expect("property bag is always an array")
            .push(Value::String(o_str));

        if g != 0 {
            let g_str = resolve(&g);
            let graph_arr = entry
                .get_mut("graph")
                .and_then(|v| v.as_array_mut())
                .expect("graph bag is always an array");
            if !graph_arr.iter().any(|v| v.as_str() == Some(g_str.as_str())) {
                graph_arr.push(Value::String(g_str));
            }
        }
    }

    for (predicate, per_subject) in paths {
        for (s, ancestors) in per_subject {
            if let Some(entry) = entities.get_mut(s) {
                let paths_obj = entry
                    .entry("_paths")
                    .or_insert_with(|| Value::Object(Map::new()))
                    .as_object_mut()
                    .expect("_paths is always an object");
                let list: Vec<Value> = ancestors.iter().map(|h| Value::String(resolve(h))).collect();
                paths_obj.insert(predicate.clone(), Value::Array(list));
            }
        }
    }

    let mut out = Map::new();
    for (s, entry) in entities {
        out.insert(resolve(&s), Value::Object(entry));
    }
    out
}

// ---------------------------------------------------------------------
// Synchronous in-process API (SPEC_FULL.md §4.6): thin wrappers usable
// without going through the job dispatcher.
// ---------------------------------------------------------------------

/// Total row count of `triples`.
pub fn total(conn: &Connection) -> Result<u64, ExecError> {
    let n: i64 = conn.query_row("select count(*) from triples", [], |r| r.get(0))?;
    Ok(n as u64)
}

/// Distinct predicate IRIs present in `triples`.
pub fn properties(conn: &Connection) -> Result<Vec<String>, ExecError> {
    let hashes: Vec<i64> = {
        let mut stmt = conn.prepare("select distinct p from triples")?;
        stmt.query_map([], |r| r.get(0))?.collect::<Result<_, _>>()?
    };
    let resolved = resolve_hashes(conn, &hashes.iter().map(|h| *h as u64).collect::<Vec<_>>())?;
    Ok(hashes
        .into_iter()
        .map(|h| resolved.get(&(h as u64)).cloned().unwrap_or_default())
        .collect())
}

/// Distinct subject count for a given predicate.
pub fn count_by_property(conn: &Connection, iri: &str) -> Result<u64, ExecError> {
    let ph = term_hash(iri) as i64;
    let n: i64 = conn.query_row(
        "select count(distinct s) from triples where p = ?",
        duckdb::params![ph],
        |r| r.get(0),
    )?;
    Ok(n as u64)
}

/// Objects of a given `(subject, predicate)` pair, resolved to strings.
pub fn sp(conn: &Connection, s: &str, p: &str) -> Result<Vec<String>, ExecError> {
    let sh = term_hash(s) as i64;
    let ph = term_hash(p) as i64;
    let hashes: Vec<i64> = {
        let mut stmt = conn.prepare("select o from triples where s = ? and p = ?")?;
        stmt.query_map(duckdb::params![sh, ph], |r| r.get(0))?.collect::<Result<_, _>>()?
    };
    let resolved = resolve_hashes(conn, &hashes.iter().map(|h| *h as u64).collect::<Vec<_>>())?;
    Ok(hashes
        .into_iter()
        .map(|h| resolved.get(&(h as u64)).cloned().unwrap_or_default())
        .collect())
}

/// Raw triple lookup with any subset of columns bound.
pub fn spo(
    conn: &Connection,
    s: Option<&str>,
    p: Option<&str>,
    o: Option<&str>,
) -> Result<Vec<(String, String, String)>, ExecError> {
    let mut clauses = Vec::new();
    if let Some(s) = s {
        clauses.push(format!("s = {}", term_hash(s)));
    }
    if let Some(p) = p {
        clauses.push(format!("p = {}", term_hash(p)));
    }
    if let Some(o) = o {
        clauses.push(format!("o = {}", term_hash(o)));
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" where {}", clauses.join(" and "))
    };
    let sql = format!("select s,p,o from triples{where_clause}");
    let rows: Vec<(i64, i64, i64)> = {
        let mut stmt = conn.prepare(&sql)?;
        stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?
            .collect::<Result<_, _>>()?
    };
    let mut hashes = HashSet::new();
    for &(s, p, o) in &rows {
        hashes.insert(s as u64);
        hashes.insert(p as u64);
        hashes.insert(o as u64);
    }
    let resolved = resolve_hashes(conn, &hashes.into_iter().collect::<Vec<_>>())?;
    Ok(rows
        .into_iter()
        .map(|(s, p, o)| {
            (
                resolved.get(&(s as u64)).cloned().unwrap_or_default(),
                resolved.get(&(p as u64)).cloned().unwrap_or_default(),
                resolved.get(&(o as u64)).cloned().unwrap_or_default(),
            )
        })
        .collect())
}

/// Escape hatch: run arbitrary SQL and return rows as strings. Carries no
/// caching or ticketing semantics.
pub fn raw(conn: &Connection, sql: &str) -> Result<Vec<Vec<String>>, ExecError> {
    let mut stmt = conn.prepare(sql)?;
    let col_count = stmt.column_count();
    let mut out = Vec::new();
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let mut out_row = Vec::with_capacity(col_count);
        for i in 0..col_count {
            let v: duckdb::types::Value = row.get(i)?;
            out_row.push(format!("{v:?}"));
        }
        out.push(out_row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::DeterministicEmbedder;
    use crate::index::{build, open_store};
    use crate::parser::Quad;

    fn quad(s: &str, p: &str, o: &str, g: &str) -> Quad {
        Quad {
            s: s.to_string(),
            p: p.to_string(),
            o: o.to_string(),
            g: g.to_string(),
        }
    }

    fn store_with(quads: Vec<Quad>) -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_store(&dir.path().join("t.duckdb")).unwrap();
        build(&conn, quads.into_iter(), &dir.path().join("triples"), &dir.path().join("maps"), "porter").unwrap();
        (dir, conn)
    }

    fn req_from(json: &str) -> QueryRequest {
        serde_json::from_str(json).unwrap()
    }

    // S1
    #[test]
    fn scenario_s1_should_union() {
        let (_dir, conn) = store_with(vec![
            quad("<a>", "<p>", "<b>", ""),
            quad("<a>", "<p>", "<c>", ""),
            quad("<b>", "<p>", "<c>", ""),
        ]);
        let embedder = DeterministicEmbedder::new();
        let req = req_from(r#"{"filters":[{"p":"<p>","o":"<c>"}]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();
        assert_eq!(resp["total"], 2);
        let results = resp["results"].as_object().unwrap();
        assert!(results.contains_key("<a>"));
        assert!(results.contains_key("<b>"));
    }

    // S2
    #[test]
    fn scenario_s2_must_intersect() {
        let (_dir, conn) = store_with(vec![
            quad("<a>", "<p>", "<b>", ""),
            quad("<a>", "<p>", "<c>", ""),
            quad("<b>", "<p>", "<c>", ""),
        ]);
        let embedder = DeterministicEmbedder::new();
        let req = req_from(r#"{"filters":[{"p":"<p>","o":"<c>"},{"p":"<p>","o":"<b>","op":"and"}]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();
        assert_eq!(resp["total"], 1);
        let results = resp["results"].as_object().unwrap();
        assert!(results.contains_key("<a>"));
    }

    // S3
    #[test]
    fn scenario_s3_not_except() {
        let (_dir, conn) = store_with(vec![
            quad("<a>", "<p>", "<b>", ""),
            quad("<a>", "<p>", "<c>", ""),
            quad("<b>", "<p>", "<c>", ""),
        ]);
        let embedder = DeterministicEmbedder::new();
        let req = req_from(r#"{"filters":[{"p":"<p>","o":"<c>"},{"p":"<p>","o":"<b>","op":"not"}]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();
        assert_eq!(resp["total"], 1);
        let results = resp["results"].as_object().unwrap();
        assert!(results.contains_key("<b>"));
    }

    // S5
    #[test]
    fn scenario_s5_sample_clause() {
        let (_dir, conn) = store_with(vec![quad("<a>", "<p>", "<b>", ""), quad("<c>", "<p>", "<d>", "")]);
        let embedder = DeterministicEmbedder::new();
        let req = req_from(r#"{"filters":[{"p":"id","o":"sample 1"}]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();
        assert_eq!(resp["total"], 1);
    }

    // S6
    #[test]
    fn scenario_s6_fts_scores_drive_order() {
        let (_dir, conn) = store_with(vec![quad(
            "<a>",
            "<http://example.org/label>",
            "\"The quick brown fox\"@en",
            "",
        )]);
        let embedder = DeterministicEmbedder::new();
        let req = req_from(r#"{"filters":[{"p":"fts","o":"quick brown"}]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();
        assert_eq!(resp["total"], 1);
        assert!(resp["results"].as_object().unwrap().contains_key("<a>"));
    }

    #[test]
    fn pagination_stability() {
        let (_dir, conn) = store_with(vec![
            quad("<a>", "<p>", "<x>", ""),
            quad("<b>", "<p>", "<x>", ""),
            quad("<c>", "<p>", "<x>", ""),
            quad("<d>", "<p>", "<x>", ""),
        ]);
        let embedder = DeterministicEmbedder::new();
        let full = execute(&conn, &embedder, &req_from(r#"{"filters":[{"p":"<p>","o":"<x>"}],"size":4,"start":0}"#)).unwrap();
        let page1 = execute(&conn, &embedder, &req_from(r#"{"filters":[{"p":"<p>","o":"<x>"}],"size":2,"start":0}"#)).unwrap();
        let page2 = execute(&conn, &embedder, &req_from(r#"{"filters":[{"p":"<p>","o":"<x>"}],"size":2,"start":2}"#)).unwrap();
        let mut combined: Vec<String> = page1["results"].as_object().unwrap().keys().cloned().collect();
        combined.extend(page2["results"].as_object().unwrap().keys().cloned());
        combined.sort();
        let mut full_keys: Vec<String> = full["results"].as_object().unwrap().keys().cloned().collect();
        full_keys.sort();
        assert_eq!(combined, full_keys);
    }

    #[test]
    fn aggregates_over_properties() {
        let (_dir, conn) = store_with(vec![
            quad("<a>", "<p>", "<x>", ""),
            quad("<a>", "<q>", "<y>", ""),
        ]);
        let embedder = DeterministicEmbedder::new();
        let req = req_from(r#"{"aggregates":["properties"]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();
        let agg = resp["aggregates"]["properties"].as_array().unwrap();
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn empty_filters_short_circuits_to_zero_total_and_empty_results() {
        let (_dir, conn) = store_with(vec![
            quad("<a>", "<p>", "<x>", ""),
            quad("<a>", "<q>", "<y>", ""),
        ]);
        let embedder = DeterministicEmbedder::new();
        // No `filters` key at all, plus a `Predicate` aggregate tag that only
        // makes sense against a result set.
        let req = req_from(r#"{"aggregates":["properties","<p>"]}"#);
        let resp = execute(&conn, &embedder, &req).unwrap();

        assert_eq!(resp["total"], 0);
        assert_eq!(resp["results"].as_object().unwrap().len(), 0);

        let aggregates = resp["aggregates"].as_object().unwrap();
        assert_eq!(aggregates["properties"].as_array().unwrap().len(), 2);
        assert!(!aggregates.contains_key("<p>"), "predicate aggregates require a non-empty filter set");
    }

    #[test]
    fn sync_api_total_and_properties() {
        let (_dir, conn) = store_with(vec![quad("<a>", "<p>", "<b>", "")]);
        assert_eq!(total(&conn).unwrap(), 1);
        let props = properties(&conn).unwrap();
        assert_eq!(props, vec!["<p>".to_string()]);
        assert_eq!(count_by_property(&conn, "<p>").unwrap(), 1);
        assert_eq!(sp(&conn, "<a>", "<p>").unwrap(), vec!["<b>".to_string()]);
    }
}
