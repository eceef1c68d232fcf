use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use std::{fmt::Debug, path::PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use view_tracker::background_jobs::create_flush_scheduler;
use view_tracker::config;
use view_tracker::server::{metrics, run_server, RequestsLoggingLevel, ServerConfig, ServerState};
use view_tracker::view_cache::{MemoryViewCache, ViewCache};
use view_tracker::view_store::SqliteViewStore;
use view_tracker::views::{ClearStrategy, ViewFlusher, ViewTracker};

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing the views database (views.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// The port to listen on.
    #[clap(short, long, default_value_t = 3001)]
    pub port: u16,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// The level of logging to perform on each request.
    #[clap(long, default_value = "path")]
    pub logging_level: RequestsLoggingLevel,

    /// Seconds between flushes of pending views to the database.
    #[clap(long, default_value_t = 300)]
    pub flush_interval_secs: u64,

    /// How the pending log is cleared after a flush.
    #[clap(long, value_enum, default_value_t = ClearStrategy::Snapshot)]
    pub clear_strategy: ClearStrategy,

    /// Expiry in seconds of each user's viewed set, refreshed on every view.
    #[clap(long, default_value_t = 604800)]
    pub view_ttl_secs: u64,

    /// Seconds between sweeps of expired cache keys.
    #[clap(long, default_value_t = 60)]
    pub purge_interval_secs: u64,
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            port: args.port,
            metrics_port: args.metrics_port,
            logging_level: args.logging_level.clone(),
            flush_interval_secs: args.flush_interval_secs,
            clear_strategy: args.clear_strategy,
            view_ttl_secs: args.view_ttl_secs,
            purge_interval_secs: args.purge_interval_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!("  port: {}", app_config.port);
    info!("  flush interval: {:?}", app_config.flush.interval);
    info!("  clear strategy: {}", app_config.flush.clear_strategy);
    info!("  view ttl: {:?}", app_config.cache.view_ttl);

    info!("Initializing metrics...");
    metrics::init_metrics();

    let view_store = Arc::new(SqliteViewStore::new(app_config.views_db_path())?);
    let view_cache = Arc::new(MemoryViewCache::new());

    let view_tracker = Arc::new(ViewTracker::with_view_ttl(
        view_cache.clone(),
        app_config.cache.view_ttl,
    ));
    let flusher = Arc::new(ViewFlusher::new(
        view_cache.clone(),
        view_store,
        app_config.flush.clear_strategy,
    ));

    let shutdown_token = CancellationToken::new();
    let (mut scheduler, flush_handle) =
        create_flush_scheduler(flusher, app_config.flush.interval, shutdown_token.clone());

    // Sweep expired viewed sets so idle users do not pin memory
    let purge_cache = view_cache.clone();
    let purge_interval = app_config.cache.purge_interval;
    let purge_token = shutdown_token.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match purge_cache.purge_expired() {
                        Ok(count) if count > 0 => debug!("Purged {} expired cache keys", count),
                        Ok(_) => {}
                        Err(e) => error!("Failed to purge expired cache keys: {}", e),
                    }
                }
                _ = purge_token.cancelled() => break,
            }
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: app_config.logging_level.clone(),
        port: app_config.port,
        metrics_port: app_config.metrics_port,
    };
    let server_state = ServerState::new(server_config, view_tracker, Some(flush_handle));

    // Run HTTP server and flush scheduler concurrently
    let result = tokio::select! {
        result = run_server(server_state, shutdown_token.clone()) => {
            info!("HTTP server stopped: {:?}", result);
            shutdown_token.cancel();
            result
        },
        _ = scheduler.run() => {
            info!("Scheduler stopped");
            Ok(())
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            // Give the servers a moment to shut down gracefully
            tokio::time::sleep(Duration::from_millis(100)).await;
            Ok(())
        }
    };

    if let Err(e) = view_cache.close().await {
        error!("Failed to close view cache: {}", e);
    }
    info!("Shutdown complete");
    result
}
