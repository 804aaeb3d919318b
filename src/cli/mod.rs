//! CLI surface (SPEC_FULL.md §6, §10.1).

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "bikidata")]
#[command(about = "Embeddable RDF triple store: bulk ingest, BM25/vector indices, a filter/aggregate/order query compiler")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override BIKIDATA_DB
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Show debug info (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a file, or every .gz/.nt/.trig file in a directory
    Build {
        path: PathBuf,
        /// FTS stemmer for the literal-value index
        #[arg(long, default_value = "porter")]
        stemmer: String,
        /// Skip any gathered source file whose path matches this glob
        #[arg(long)]
        exclude: Option<String>,
    },
    /// Build the optional per-subject FTS aggregation against an existing store
    BuildFtss {
        #[arg(long, default_value = "porter")]
        stemmer: String,
    },
    /// Build the optional embedding pass against an existing store
    BuildSemantic,
    /// Start N dispatcher workers plus the manager thread, in-process
    Worker {
        #[arg(default_value_t = 1)]
        workers: usize,
    },
    /// Run a single query request synchronously and print the JSON response
    Query {
        /// A JSON object, or `@path` to read it from a file
        request: String,
    },
    /// Print a shell completion script to stdout
    Completions {
        shell: clap_complete::Shell,
    },
}

pub fn run_with(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "bikidata", &mut std::io::stdout());
        return Ok(());
    }

    let config = Config::from_env().with_db_override(cli.db.clone());

    match cli.command {
        Commands::Build { path, stemmer, exclude } => commands::cmd_build(&config, &path, &stemmer, exclude.as_deref()),
        Commands::BuildFtss { stemmer } => commands::cmd_build_ftss(&config, &stemmer),
        Commands::BuildSemantic => commands::cmd_build_semantic(&config),
        Commands::Worker { workers } => commands::cmd_worker(&config, workers),
        Commands::Query { request } => commands::cmd_query(&config, &request),
        Commands::Completions { .. } => unreachable!("handled above"),
    }
}
