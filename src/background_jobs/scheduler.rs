use super::handle::{
    FlushCommand, FlushHandle, FlushRunInfo, FlushRunStatus, FlushState, FlushTriggerError,
    SharedFlushState,
};
use crate::server::metrics;
use crate::views::ViewFlusher;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Periodically drains the pending log into durable storage.
///
/// The loop alternates between `Flushing` and `Sleeping` until the shutdown
/// token is cancelled. A flush that fails is logged and retried on the next
/// tick; errors never leave the loop.
pub struct FlushScheduler {
    flusher: Arc<ViewFlusher>,
    interval: Duration,

    /// Shared state accessible by FlushHandle
    shared_state: Arc<RwLock<SharedFlushState>>,

    /// Receiver for commands from FlushHandle
    command_receiver: mpsc::Receiver<FlushCommand>,

    shutdown_token: CancellationToken,
}

impl FlushScheduler {
    fn new(
        flusher: Arc<ViewFlusher>,
        interval: Duration,
        command_receiver: mpsc::Receiver<FlushCommand>,
        shutdown_token: CancellationToken,
        shared_state: Arc<RwLock<SharedFlushState>>,
    ) -> Self {
        Self {
            flusher,
            interval,
            shared_state,
            command_receiver,
            shutdown_token,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Main scheduler loop. Flushes once on startup, then once per interval.
    pub async fn run(&mut self) {
        info!(
            "Starting view flush scheduler (interval: {:?}, clear strategy: {})",
            self.interval,
            self.flusher.clear_strategy()
        );

        'ticks: loop {
            if self.flush_unless_cancelled("schedule").await.is_none() {
                break;
            }

            debug!("Flush scheduler sleeping for {:?}", self.interval);
            let wake = tokio::time::sleep(self.interval);
            tokio::pin!(wake);

            // Manual flushes are served while sleeping without moving the next tick
            loop {
                tokio::select! {
                    biased;
                    _ = self.shutdown_token.cancelled() => {
                        info!("Flush scheduler received shutdown signal");
                        break 'ticks;
                    }
                    _ = &mut wake => break,
                    Some(cmd) = self.command_receiver.recv() => {
                        if !self.handle_command(cmd).await {
                            break 'ticks;
                        }
                    }
                }
            }
        }

        self.shared_state.write().await.state = FlushState::Sleeping;
        info!("View flush scheduler stopped");
    }

    /// Handle a command from the FlushHandle. Returns false if shutdown interrupted it.
    async fn handle_command(&self, cmd: FlushCommand) -> bool {
        match cmd {
            FlushCommand::FlushNow { response } => {
                info!("Manual flush requested");
                match self.flush_unless_cancelled("manual").await {
                    Some(run) => {
                        let result = match run.status {
                            FlushRunStatus::Failed => Err(FlushTriggerError::FlushFailed(
                                run.error_message.clone().unwrap_or_default(),
                            )),
                            _ => Ok(run),
                        };
                        let _ = response.send(result);
                        true
                    }
                    None => {
                        let _ = response.send(Err(FlushTriggerError::Cancelled));
                        false
                    }
                }
            }
        }
    }

    /// Runs one tick unless the shutdown token fires first; an in-flight tick is abandoned.
    async fn flush_unless_cancelled(&self, triggered_by: &str) -> Option<FlushRunInfo> {
        tokio::select! {
            biased;
            _ = self.shutdown_token.cancelled() => {
                info!("Flush scheduler received shutdown signal");
                None
            }
            run = self.tick(triggered_by) => Some(run),
        }
    }

    async fn tick(&self, triggered_by: &str) -> FlushRunInfo {
        self.shared_state.write().await.state = FlushState::Flushing;
        let started_at = Utc::now();
        let timer = Instant::now();

        let run = match self.flusher.run_flush().await {
            Ok(outcome) => {
                if outcome.flushed > 0 {
                    info!("Flushed {} views to database", outcome.flushed);
                } else if outcome.is_empty() {
                    debug!("No pending views to flush");
                }
                if outcome.discarded > 0 {
                    warn!("Discarded {} malformed pending views", outcome.discarded);
                }
                metrics::record_flush_outcome(&outcome);
                FlushRunInfo::from_outcome(started_at, triggered_by, &outcome)
            }
            Err(e) => {
                error!("Error flushing views: {}", e);
                metrics::record_flush_failure(timer.elapsed());
                FlushRunInfo::failed(started_at, triggered_by, e.to_string())
            }
        };

        match self.flusher.pending_count().await {
            Ok(pending) => metrics::set_pending_views(pending),
            Err(e) => debug!("Could not read pending view count: {}", e),
        }

        let mut state = self.shared_state.write().await;
        state.state = FlushState::Sleeping;
        if run.status == FlushRunStatus::Failed {
            state.consecutive_failures += 1;
        } else {
            state.consecutive_failures = 0;
            state.total_flushed += run.flushed as u64;
        }
        state.last_run = Some(run.clone());
        run
    }
}

/// Create a flush scheduler and return a handle for interacting with it.
pub fn create_flush_scheduler(
    flusher: Arc<ViewFlusher>,
    interval: Duration,
    shutdown_token: CancellationToken,
) -> (FlushScheduler, FlushHandle) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let shared_state = Arc::new(RwLock::new(SharedFlushState::default()));

    let scheduler = FlushScheduler::new(
        Arc::clone(&flusher),
        interval,
        command_rx,
        shutdown_token,
        Arc::clone(&shared_state),
    );
    let handle = FlushHandle::new(command_tx, shared_state, flusher);

    (scheduler, handle)
}
