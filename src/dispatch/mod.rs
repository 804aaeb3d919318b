//! JobDispatcher (C7): ticketed async front-end over the synchronous
//! executor, with fingerprint-based result caching and a single-writer
//! insert/delete path (SPEC_FULL.md §4.7).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use duckdb::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::embedder::Embedder;
use crate::hash::term_hash;
use crate::index::{open_store, open_store_read_only, IndexError};
use crate::query::QueryRequest;
use crate::queue::JobQueue;

const INBOX_QUEUE: &str = "inbox";
const READY_QUEUE: &str = "ready";
const CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default client receive timeout (SPEC_FULL.md §5 "Cancellation and timeouts").
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("timed out waiting for a reply")]
    Timeout,
}

/// A partial `(s,p,o,g)` pattern: bound fields are exact-match, unbound
/// fields are wildcards (for delete) or required (for insert).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MutationOpts {
    pub s: Option<String>,
    pub p: Option<String>,
    pub o: Option<String>,
    pub g: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Envelope {
    ticket: String,
    opts: Value,
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

/// Ticketed wrapper around the executor and the single-writer mutation
/// handlers: a manager thread (the serialization point for writes) and N
/// worker threads (cache-or-execute queries), all coordinating over a
/// `JobQueue`.
///
/// Opens the store exactly twice — one read-write connection for the
/// manager, one read-only connection shared (via `try_clone`) across every
/// worker thread — rather than once per thread. DuckDB takes an exclusive OS
/// file lock per independently-opened read-write instance, so N independent
/// `Connection::open` calls against the same file can never all succeed at
/// once; `try_clone` instead hands out another handle onto the *same*
/// already-open connection (SPEC_FULL.md §5/§10.6 single-writer/multi-reader).
pub struct JobDispatcher {
    queue: Arc<dyn JobQueue>,
    writer: Connection,
    reader: Connection,
    embedder: Arc<dyn Embedder>,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl JobDispatcher {
    pub fn new(queue: Arc<dyn JobQueue>, db_path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self, DispatchError> {
        let db_path = db_path.as_ref();
        let writer = open_store(db_path)?;
        let reader = open_store_read_only(db_path)?;
        Ok(Self {
            queue,
            writer,
            reader,
            embedder,
            cache: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Spawn the manager thread: the single writer serialization point.
    pub fn spawn_manager(&self) -> Result<thread::JoinHandle<()>, DispatchError> {
        let queue = Arc::clone(&self.queue);
        let conn = self.writer.try_clone()?;
        let cache = Arc::clone(&self.cache);
        Ok(thread::spawn(move || run_manager(queue, conn, cache)))
    }

    /// Spawn `n` (minimum 1) worker threads, each a `try_clone` of the one
    /// shared read-only reader connection.
    pub fn spawn_workers(&self, n: usize) -> Result<Vec<thread::JoinHandle<()>>, DispatchError> {
        (0..n.max(1))
            .map(|_| {
                let queue = Arc::clone(&self.queue);
                let conn = self.reader.try_clone()?;
                let embedder = Arc::clone(&self.embedder);
                let cache = Arc::clone(&self.cache);
                Ok(thread::spawn(move || run_worker(queue, conn, embedder, cache)))
            })
            .collect()
    }

    /// Submit a raw opts payload to the inbox and return its ticket.
    pub fn submit(&self, opts: Value) -> String {
        let ticket = new_ticket();
        let envelope = Envelope {
            ticket: ticket.clone(),
            opts,
        };
        self.queue
            .push(INBOX_QUEUE, serde_json::to_vec(&envelope).unwrap_or_default());
        ticket
    }

    pub fn submit_query(&self, req: &QueryRequest) -> Result<String, DispatchError> {
        Ok(self.submit(serde_json::to_value(req)?))
    }

    pub fn submit_insert(&self, opts: MutationOpts) -> Result<String, DispatchError> {
        Ok(self.submit(tag_action(opts, "insert")?))
    }

    pub fn submit_delete(&self, opts: MutationOpts) -> Result<String, DispatchError> {
        Ok(self.submit(tag_action(opts, "delete")?))
    }

    /// Block for a reply on `ticket`, up to `timeout`.
    pub fn receive(&self, ticket: &str, timeout: Duration) -> Result<Value, DispatchError> {
        match self.queue.blpop(&reply_queue(ticket), timeout) {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(DispatchError::Timeout),
        }
    }
}

fn tag_action(opts: MutationOpts, action: &str) -> Result<Value, DispatchError> {
    let mut value = serde_json::to_value(opts)?;
    value
        .as_object_mut()
        .expect("MutationOpts always serializes as a JSON object")
        .insert("action".to_string(), Value::String(action.to_string()));
    Ok(value)
}

fn reply_queue(ticket: &str) -> String {
    format!("reply:{ticket}")
}

fn new_ticket() -> String {
    let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let salt: u64 = rand::random();
    format!("{ts}-{salt}")
}

fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> = map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).unwrap_or_default()
}

/// `md5(canonical_json(opts))`, used as the result-cache key.
pub fn fingerprint(opts: &Value) -> String {
    format!("{:x}", md5::compute(canonical_json(opts)))
}

fn error_json<E: std::fmt::Display + std::fmt::Debug>(err: &E) -> Value {
    json!({"error": err.to_string(), "trace": format!("{err:?}")})
}

fn run_manager(queue: Arc<dyn JobQueue>, conn: Connection, cache: Arc<Mutex<HashMap<String, CacheEntry>>>) {
    loop {
        let Some(bytes) = queue.blpop(INBOX_QUEUE, Duration::from_secs(1)) else {
            continue;
        };
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed envelope");
                continue;
            }
        };
        let action = envelope.opts.get("action").and_then(Value::as_str);
        match action {
            Some("insert") => {
                let reply = run_mutation(&conn, true, &envelope.opts);
                invalidate_cache(&cache);
                queue.push(&reply_queue(&envelope.ticket), serde_json::to_vec(&reply).unwrap_or_default());
            }
            Some("delete") => {
                let reply = run_mutation(&conn, false, &envelope.opts);
                invalidate_cache(&cache);
                queue.push(&reply_queue(&envelope.ticket), serde_json::to_vec(&reply).unwrap_or_default());
            }
            _ => queue.push(READY_QUEUE, bytes),
        }
    }
}

fn run_mutation(conn: &Connection, is_insert: bool, opts: &Value) -> Value {
    let pattern: MutationOpts = match serde_json::from_value(opts.clone()) {
        Ok(p) => p,
        Err(e) => return error_json(&e),
    };
    let result = if is_insert {
        handle_insert(conn, &pattern).map(|()| json!({"ok": true}))
    } else {
        handle_delete(conn, &pattern).map(|n| json!({"ok": true, "deleted": n}))
    };
    result.unwrap_or_else(|e| error_json(&e))
}

fn invalidate_cache(cache: &Mutex<HashMap<String, CacheEntry>>) {
    cache.lock().expect("cache lock poisoned").clear();
}

fn run_worker(
    queue: Arc<dyn JobQueue>,
    conn: Connection,
    embedder: Arc<dyn Embedder>,
    cache: Arc<Mutex<HashMap<String, CacheEntry>>>,
) {
    loop {
        let Some(bytes) = queue.blpop(READY_QUEUE, Duration::from_secs(1)) else {
            continue;
        };
        let envelope: Envelope = match serde_json::from_slice(&bytes) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed envelope");
                continue;
            }
        };
        let reply = process_query(&conn, embedder.as_ref(), &cache, &envelope.opts);
        queue.push(&reply_queue(&envelope.ticket), serde_json::to_vec(&reply).unwrap_or_default());
    }
}

fn process_query(
    conn: &Connection,
    embedder: &dyn Embedder,
    cache: &Mutex<HashMap<String, CacheEntry>>,
    opts: &Value,
) -> Value {
    let use_cache = opts.get("use_cache").and_then(Value::as_bool).unwrap_or(true);
    let fp = fingerprint(opts);
    if use_cache {
        if let Some(hit) = cached_value(cache, &fp) {
            return hit;
        }
    }
    let req: QueryRequest = match serde_json::from_value(opts.clone()) {
        Ok(r) => r,
        Err(e) => return error_json(&e),
    };
    let result = match crate::executor::execute(conn, embedder, &req) {
        Ok(v) => v,
        Err(e) => return error_json(&e),
    };
    store_cached(cache, fp, result.clone());
    result
}

fn cached_value(cache: &Mutex<HashMap<String, CacheEntry>>, fp: &str) -> Option<Value> {
    let mut guard = cache.lock().expect("cache lock poisoned");
    match guard.get(fp) {
        Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
        Some(_) => {
            guard.remove(fp);
            None
        }
        None => None,
    }
}

fn store_cached(cache: &Mutex<HashMap<String, CacheEntry>>, fp: String, value: Value) {
    let mut guard = cache.lock().expect("cache lock poisoned");
    guard.insert(
        fp,
        CacheEntry {
            value,
            expires_at: Instant::now() + CACHE_TTL,
        },
    );
}

fn upsert_term(conn: &Connection, term: &str) -> Result<u64, DispatchError> {
    let hash = term_hash(term) as i64;
    let table = if term.starts_with('"') { "literals" } else { "iris" };
    let exists: i64 = conn.query_row(&format!("select count(*) from {table} where hash = ?"), params![hash], |r| r.get(0))?;
    if exists == 0 {
        conn.execute(&format!("insert into {table}(hash, value) values (?, ?)"), params![hash, term])?;
    }
    Ok(hash as u64)
}

/// Hash and upsert each term, then insert `(s,p,o,g)` if not already present
/// (duplicate insert is a silent no-op, preserving the data model's
/// no-duplicate-quads invariant).
pub fn handle_insert(conn: &Connection, opts: &MutationOpts) -> Result<(), DispatchError> {
    let s = opts.s.as_deref().unwrap_or_default();
    let p = opts.p.as_deref().unwrap_or_default();
    let o = opts.o.as_deref().unwrap_or_default();
    let g = opts.g.as_deref().unwrap_or("");

    let sh = upsert_term(conn, s)? as i64;
    let ph = upsert_term(conn, p)? as i64;
    let oh = upsert_term(conn, o)? as i64;
    let gh = if g.is_empty() { 0 } else { upsert_term(conn, g)? as i64 };

    let already: i64 = conn.query_row(
        "select count(*) from triples where s = ? and p = ? and o = ? and g = ?",
        params![sh, ph, oh, gh],
        |r| r.get(0),
    )?;
    if already == 0 {
        conn.execute(
            "insert into triples(s,p,o,g) values (?,?,?,?)",
            params![sh, ph, oh, gh],
        )?;
    }
    Ok(())
}

/// Delete every row matching the given (non-null) pattern; unbound fields
/// are wildcards.
pub fn handle_delete(conn: &Connection, pattern: &MutationOpts) -> Result<u64, DispatchError> {
    let mut clauses = Vec::new();
    let mut binds: Vec<i64> = Vec::new();
    if let Some(s) = &pattern.s {
        clauses.push("s = ?");
        binds.push(term_hash(s) as i64);
    }
    if let Some(p) = &pattern.p {
        clauses.push("p = ?");
        binds.push(term_hash(p) as i64);
    }
    if let Some(o) = &pattern.o {
        clauses.push("o = ?");
        binds.push(term_hash(o) as i64);
    }
    if let Some(g) = &pattern.g {
        clauses.push("g = ?");
        binds.push(term_hash(g) as i64);
    }
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!(" where {}", clauses.join(" and "))
    };
    let sql = format!("delete from triples{where_clause}");
    let param_refs: Vec<&dyn duckdb::ToSql> = binds.iter().map(|b| b as &dyn duckdb::ToSql).collect();
    let n = conn.execute(&sql, param_refs.as_slice())?;
    Ok(n as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::DeterministicEmbedder;
    use crate::index::{build, open_store};
    use crate::parser::Quad;
    use crate::queue::InProcessQueue;

    fn quad(s: &str, p: &str, o: &str) -> Quad {
        Quad {
            s: s.to_string(),
            p: p.to_string(),
            o: o.to_string(),
            g: String::new(),
        }
    }

    #[test]
    fn fingerprint_is_stable_under_key_reordering() {
        let a = json!({"filters": [], "size": 5, "start": 0});
        let b = json!({"start": 0, "size": 5, "filters": []});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn handle_insert_then_delete_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open_store(&dir.path().join("t.duckdb")).unwrap();
        let opts = MutationOpts {
            s: Some("<http://example.org/a>".to_string()),
            p: Some("<http://example.org/p>".to_string()),
            o: Some("<http://example.org/b>".to_string()),
            g: None,
        };
        handle_insert(&conn, &opts).unwrap();
        let count: i64 = conn.query_row("select count(*) from triples", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);

        // duplicate insert is a no-op
        handle_insert(&conn, &opts).unwrap();
        let count: i64 = conn.query_row("select count(*) from triples", [], |r| r.get(0)).unwrap();
        assert_eq!(count, 1);

        let deleted = handle_delete(
            &conn,
            &MutationOpts {
                s: Some("<http://example.org/a>".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn dispatcher_round_trips_a_query_through_manager_and_worker() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("t.duckdb");
        {
            let conn = open_store(&db_path).unwrap();
            build(
                &conn,
                vec![quad("<http://example.org/a>", "<http://example.org/p>", "<http://example.org/b>")].into_iter(),
                &dir.path().join("triples"),
                &dir.path().join("maps"),
                "porter",
            )
            .unwrap();
        }

        let queue: Arc<dyn JobQueue> = Arc::new(InProcessQueue::new());
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new());
        let dispatcher = JobDispatcher::new(Arc::clone(&queue), db_path, embedder).unwrap();
        dispatcher.spawn_manager().unwrap();
        dispatcher.spawn_workers(1).unwrap();

        let req: QueryRequest = serde_json::from_str(
            r#"{"filters":[{"p":"<http://example.org/p>","o":"<http://example.org/b>"}]}"#,
        )
        .unwrap();
        let ticket = dispatcher.submit_query(&req).unwrap();
        let reply = dispatcher.receive(&ticket, Duration::from_secs(5)).unwrap();
        assert_eq!(reply["total"], 1);
    }

    #[test]
    fn receive_times_out_when_nothing_ever_replies() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("t.duckdb");
        open_store(&db_path).unwrap();
        let queue: Arc<dyn JobQueue> = Arc::new(InProcessQueue::new());
        let embedder: Arc<dyn Embedder> = Arc::new(DeterministicEmbedder::new());
        let dispatcher = JobDispatcher::new(queue, db_path, embedder).unwrap();
        let err = dispatcher.receive("nonexistent-ticket", Duration::from_millis(50));
        assert!(matches!(err, Err(DispatchError::Timeout)));
    }
}
