//! Test server lifecycle management
//!
//! Each test gets an isolated server with its own cache, database and flush
//! scheduler.

use super::constants::*;
use super::fixtures::SwitchableStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::{CancellationToken, DropGuard};
use view_tracker::background_jobs::create_flush_scheduler;
use view_tracker::server::{make_app, RequestsLoggingLevel, ServerConfig, ServerState};
use view_tracker::view_cache::MemoryViewCache;
use view_tracker::views::{ClearStrategy, ViewFlusher, ViewTracker};

/// Test server instance with an isolated pipeline.
///
/// When dropped, the server and its scheduler shut down and temp resources are cleaned up.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    pub port: u16,

    /// Store for direct database access in tests
    pub store: Arc<SwitchableStore>,

    pub cache: Arc<MemoryViewCache>,

    // Private fields - keep resources alive until drop
    _temp_db_dir: TempDir,
    _shutdown_guard: DropGuard,
}

impl TestServer {
    /// Spawns a new test server on a random port with a scheduler that only
    /// flushes on demand.
    pub async fn spawn() -> Self {
        let temp_db_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(SwitchableStore::open(
            &temp_db_dir.path().join("views.db"),
        ));
        let cache = Arc::new(MemoryViewCache::new());

        let shutdown_token = CancellationToken::new();
        let flusher = Arc::new(ViewFlusher::new(
            cache.clone(),
            store.clone(),
            ClearStrategy::Snapshot,
        ));
        let (mut scheduler, flush_handle) = create_flush_scheduler(
            flusher,
            Duration::from_secs(3600),
            shutdown_token.clone(),
        );
        tokio::spawn(async move { scheduler.run().await });
        // Let the startup tick pass so tests control every later flush
        while flush_handle.last_run().await.is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let config = ServerConfig {
            requests_logging_level: RequestsLoggingLevel::None,
            port,
            metrics_port: 0,
        };
        let state = ServerState::new(
            config,
            Arc::new(ViewTracker::new(cache.clone())),
            Some(flush_handle),
        );
        let app = make_app(state);

        let server_token = shutdown_token.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(server_token.cancelled_owned())
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url,
            port,
            store,
            cache,
            _temp_db_dir: temp_db_dir,
            _shutdown_guard: shutdown_token.drop_guard(),
        };

        server.wait_for_ready().await;

        server
    }

    /// Waits for the server to become ready by polling the home endpoint
    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);

        while start.elapsed() < timeout {
            if let Ok(response) = client.get(format!("{}/", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        panic!("Test server did not become ready within {:?}", timeout);
    }
}
