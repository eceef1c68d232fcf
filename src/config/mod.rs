mod file_config;

pub use file_config::{CacheConfig, FileConfig, FlushConfig};

use crate::background_jobs::DEFAULT_FLUSH_INTERVAL;
use crate::server::RequestsLoggingLevel;
use crate::view_cache::VIEW_EXPIRY;
use crate::views::ClearStrategy;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_PURGE_INTERVAL_SECS: u64 = 60;

/// Upper bound for every configured duration (10 years).
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub flush_interval_secs: u64,
    pub clear_strategy: ClearStrategy,
    pub view_ttl_secs: u64,
    pub purge_interval_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            db_dir: None,
            port: 3001,
            metrics_port: 9091,
            logging_level: RequestsLoggingLevel::default(),
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL.as_secs(),
            clear_strategy: ClearStrategy::default(),
            view_ttl_secs: VIEW_EXPIRY.as_secs(),
            purge_interval_secs: DEFAULT_PURGE_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub flush: FlushSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlushSettings {
    pub interval: Duration,
    pub clear_strategy: ClearStrategy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    /// Sliding expiry of each user's viewed set.
    pub view_ttl: Duration,
    pub purge_interval: Duration,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s).ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid logging_level {:?}, expected \"none\", \"path\" or \"headers\"",
                    s
                )
            })?,
            None => cli.logging_level.clone(),
        };

        let flush_file = file.flush.unwrap_or_default();
        let flush_interval_secs = flush_file
            .interval_secs
            .unwrap_or(cli.flush_interval_secs);
        let clear_strategy = match flush_file.clear_strategy {
            Some(s) => parse_clear_strategy(&s)?,
            None => cli.clear_strategy,
        };

        let cache_file = file.cache.unwrap_or_default();
        let view_ttl_secs = cache_file.view_ttl_secs.unwrap_or(cli.view_ttl_secs);
        let purge_interval_secs = cache_file
            .purge_interval_secs
            .unwrap_or(cli.purge_interval_secs);

        require_duration_secs("flush interval_secs", flush_interval_secs)?;
        require_duration_secs("cache view_ttl_secs", view_ttl_secs)?;
        require_duration_secs("cache purge_interval_secs", purge_interval_secs)?;

        Ok(Self {
            db_dir,
            port,
            metrics_port,
            logging_level,
            flush: FlushSettings {
                interval: Duration::from_secs(flush_interval_secs),
                clear_strategy,
            },
            cache: CacheSettings {
                view_ttl: Duration::from_secs(view_ttl_secs),
                purge_interval: Duration::from_secs(purge_interval_secs),
            },
        })
    }

    pub fn views_db_path(&self) -> PathBuf {
        self.db_dir.join("views.db")
    }
}

fn require_duration_secs(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        bail!("{} must be greater than 0", name);
    }
    if value > MAX_DURATION_SECS {
        bail!("{} must be at most {} seconds", name, MAX_DURATION_SECS);
    }
    Ok(())
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}

fn parse_clear_strategy(s: &str) -> Result<ClearStrategy> {
    ClearStrategy::from_str(s, true).map_err(|_| {
        anyhow::anyhow!(
            "Invalid flush clear_strategy {:?}, expected \"snapshot\" or \"whole_log\"",
            s
        )
    })
}
