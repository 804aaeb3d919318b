//! Environment-variable configuration (SPEC_FULL.md §10.3).
//!
//! The original system has no config file; all settings come from the
//! environment, read once into a `Config` and optionally overridden by CLI
//! flags via [`Config::with_db_override`].

use std::path::PathBuf;

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub db: Option<PathBuf>,
    pub triple_path: Option<PathBuf>,
    pub map_path: Option<PathBuf>,
    pub redis_host: Option<String>,
    pub cohere_api_key: Option<String>,
    pub debug: bool,
}

impl Config {
    /// Default storage file when `BIKIDATA_DB` is unset.
    pub const DEFAULT_DB: &'static str = "bikidata.duckdb";
    /// Default interim triples stream path when `BIKIDATA_TRIPLE_PATH` is unset.
    pub const DEFAULT_TRIPLE_PATH: &'static str = "triples";
    /// Default interim maps stream path when `BIKIDATA_MAP_PATH` is unset.
    pub const DEFAULT_MAP_PATH: &'static str = "maps";
    /// Default job queue host when `REDIS_HOST` is unset (currently inert —
    /// the shipped queue is in-process, see SPEC_FULL.md §4.8).
    pub const DEFAULT_REDIS_HOST: &'static str = "localhost";

    /// Read every recognized variable from the process environment
    /// (SPEC_FULL.md §6 "Configuration (environment)").
    pub fn from_env() -> Self {
        let debug = std::env::var("DEBUG").map(|v| v != "0" && !v.is_empty()).unwrap_or(false);
        let config = Self {
            db: std::env::var("BIKIDATA_DB").ok().map(PathBuf::from),
            triple_path: std::env::var("BIKIDATA_TRIPLE_PATH").ok().map(PathBuf::from),
            map_path: std::env::var("BIKIDATA_MAP_PATH").ok().map(PathBuf::from),
            redis_host: std::env::var("REDIS_HOST").ok(),
            cohere_api_key: std::env::var("COHERE_API_KEY").ok(),
            debug,
        };
        tracing::debug!(
            db = ?config.db,
            triple_path = ?config.triple_path,
            map_path = ?config.map_path,
            redis_host = ?config.redis_host,
            has_cohere_key = config.cohere_api_key.is_some(),
            debug = config.debug,
            "loaded configuration from environment"
        );
        config
    }

    /// Layer a CLI `--db` override on top, mirroring the existing config
    /// layer's merge-with-later-wins pattern.
    pub fn with_db_override(mut self, db: Option<PathBuf>) -> Self {
        if db.is_some() {
            self.db = db;
        }
        self
    }

    pub fn db_or_default(&self) -> PathBuf {
        self.db.clone().unwrap_or_else(|| PathBuf::from(Self::DEFAULT_DB))
    }

    pub fn triple_path_or_default(&self) -> PathBuf {
        self.triple_path.clone().unwrap_or_else(|| PathBuf::from(Self::DEFAULT_TRIPLE_PATH))
    }

    pub fn map_path_or_default(&self) -> PathBuf {
        self.map_path.clone().unwrap_or_else(|| PathBuf::from(Self::DEFAULT_MAP_PATH))
    }

    pub fn redis_host_or_default(&self) -> String {
        self.redis_host.clone().unwrap_or_else(|| Self::DEFAULT_REDIS_HOST.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn defaults_apply_when_environment_is_unset() {
        std::env::remove_var("BIKIDATA_DB");
        std::env::remove_var("BIKIDATA_TRIPLE_PATH");
        std::env::remove_var("BIKIDATA_MAP_PATH");
        std::env::remove_var("REDIS_HOST");
        std::env::remove_var("DEBUG");

        let config = Config::from_env();
        assert_eq!(config.db_or_default(), PathBuf::from("bikidata.duckdb"));
        assert_eq!(config.triple_path_or_default(), PathBuf::from("triples"));
        assert_eq!(config.map_path_or_default(), PathBuf::from("maps"));
        assert_eq!(config.redis_host_or_default(), "localhost");
        assert!(!config.debug);
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        std::env::set_var("BIKIDATA_DB", "/tmp/custom.duckdb");
        std::env::set_var("DEBUG", "1");

        let config = Config::from_env();
        assert_eq!(config.db_or_default(), PathBuf::from("/tmp/custom.duckdb"));
        assert!(config.debug);

        std::env::remove_var("BIKIDATA_DB");
        std::env::remove_var("DEBUG");
    }

    #[test]
    fn cli_db_override_wins_over_environment() {
        let config = Config {
            db: Some(PathBuf::from("env.duckdb")),
            ..Default::default()
        };
        let overridden = config.with_db_override(Some(PathBuf::from("cli.duckdb")));
        assert_eq!(overridden.db_or_default(), PathBuf::from("cli.duckdb"));
    }

    #[test]
    fn no_cli_override_keeps_environment_value() {
        let config = Config {
            db: Some(PathBuf::from("env.duckdb")),
            ..Default::default()
        };
        let unchanged = config.with_db_override(None);
        assert_eq!(unchanged.db_or_default(), PathBuf::from("env.duckdb"));
    }
}
