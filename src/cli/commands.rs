use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Config;
use crate::dispatch::JobDispatcher;
use crate::embedder::DeterministicEmbedder;
use crate::index::{self, open_store, open_store_read_only};
use crate::parser::NtParser;
use crate::query::QueryRequest;
use crate::queue::InProcessQueue;

/// Gather every `.gz`/`.nt`/`.trig` file under `path` if it's a directory,
/// or just `path` itself if it's a file, skipping any whose canonicalized
/// path matches `exclude` (a glob, e.g. `**/test-fixtures/**`).
fn gather_sources(path: &Path, exclude: Option<&str>) -> Result<Vec<PathBuf>> {
    let matcher = exclude
        .map(|pattern| globset::Glob::new(pattern).map(|g| g.compile_matcher()))
        .transpose()
        .with_context(|| format!("invalid --exclude glob {exclude:?}"))?;

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut sources = Vec::new();
    let mut walker = ignore::WalkBuilder::new(path);
    walker.standard_filters(false);
    for entry in walker.build() {
        let entry = entry.context("failed to walk input directory")?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let p = entry.path();
        let is_corpus_file = p
            .extension()
            .and_then(|e| e.to_str())
            .map(|ext| matches!(ext, "gz" | "nt" | "trig"))
            .unwrap_or(false);
        if !is_corpus_file {
            continue;
        }
        if let Some(matcher) = &matcher {
            if matcher.is_match(p) {
                continue;
            }
        }
        let canonical = dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
        sources.push(canonical);
    }
    sources.sort();
    Ok(sources)
}

pub fn cmd_build(config: &Config, path: &Path, stemmer: &str, exclude: Option<&str>) -> Result<()> {
    let sources = gather_sources(path, exclude)?;
    if sources.is_empty() {
        bail!("no .gz/.nt/.trig files found at {}", path.display());
    }
    tracing::info!(count = sources.len(), "ingesting source files");

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    spinner.set_message(format!("ingesting {} source file(s)", sources.len()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let conn = open_store(&config.db_or_default())?;
    let parser = NtParser::new(sources);
    let stats = index::build(
        &conn,
        parser,
        &config.triple_path_or_default(),
        &config.map_path_or_default(),
        stemmer,
    )?;

    spinner.finish_and_clear();
    println!(
        "{} ingested {} quads in {}s",
        "ok:".green().bold(),
        stats.count,
        stats.duration_secs
    );
    Ok(())
}

pub fn cmd_build_ftss(config: &Config, stemmer: &str) -> Result<()> {
    let conn = open_store(&config.db_or_default())?;
    index::build_ftss(&conn, stemmer)?;
    index::reclaim_fts_space(&conn)?;
    println!("{} built per-subject FTS index", "ok:".green().bold());
    Ok(())
}

pub fn cmd_build_semantic(config: &Config) -> Result<()> {
    let conn = open_store(&config.db_or_default())?;
    let embedder = DeterministicEmbedder::new();

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    spinner.set_message("embedding subject documents");
    spinner.enable_steady_tick(Duration::from_millis(120));

    let n = index::build_semantic(&conn, &embedder)?;

    spinner.finish_and_clear();
    println!("{} embedded {n} subject documents", "ok:".green().bold());
    Ok(())
}

pub fn cmd_worker(config: &Config, workers: usize) -> Result<()> {
    tracing::info!(redis_host = %config.redis_host_or_default(), "job queue host (currently inert, in-process queue used)");

    let queue = Arc::new(InProcessQueue::new());
    let embedder = Arc::new(DeterministicEmbedder::new());
    let dispatcher = JobDispatcher::new(queue, config.db_or_default(), embedder)?;

    dispatcher.spawn_manager()?;
    dispatcher.spawn_workers(workers)?;

    println!("dispatcher running with {workers} worker(s); press Ctrl+C to exit");
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}

pub fn cmd_query(config: &Config, request: &str) -> Result<()> {
    let body = if let Some(path) = request.strip_prefix('@') {
        std::fs::read_to_string(path).with_context(|| format!("failed to read query file {path}"))?
    } else {
        request.to_string()
    };

    let req: QueryRequest = serde_json::from_str(&body).context("failed to parse query request JSON")?;
    let conn = open_store_read_only(&config.db_or_default())?;
    let embedder = DeterministicEmbedder::new();

    let response = crate::executor::execute(&conn, &embedder, &req)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
