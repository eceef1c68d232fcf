use crate::view_cache::CacheError;
use crate::views::{FlushOutcome, ViewFlusher};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// What the scheduler loop is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushState {
    Sleeping,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushRunStatus {
    /// Pending views were written and cleared.
    Completed,
    /// The pending log was empty.
    Empty,
    Failed,
}

impl FlushRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlushRunStatus::Completed => "completed",
            FlushRunStatus::Empty => "empty",
            FlushRunStatus::Failed => "failed",
        }
    }
}

/// Serializable summary of one flush tick.
#[derive(Debug, Clone, Serialize)]
pub struct FlushRunInfo {
    pub started_at: String,
    pub finished_at: String,
    pub status: FlushRunStatus,
    pub flushed: usize,
    pub discarded: usize,
    pub inserted: usize,
    pub duration_ms: u64,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl FlushRunInfo {
    pub(super) fn from_outcome(
        started_at: DateTime<Utc>,
        triggered_by: &str,
        outcome: &FlushOutcome,
    ) -> Self {
        let status = if outcome.is_empty() {
            FlushRunStatus::Empty
        } else {
            FlushRunStatus::Completed
        };
        Self {
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            status,
            flushed: outcome.flushed,
            discarded: outcome.discarded,
            inserted: outcome.inserted,
            duration_ms: outcome.duration.as_millis() as u64,
            error_message: None,
            triggered_by: triggered_by.to_string(),
        }
    }

    pub(super) fn failed(started_at: DateTime<Utc>, triggered_by: &str, error: String) -> Self {
        let finished_at = Utc::now();
        Self {
            started_at: started_at.to_rfc3339(),
            finished_at: finished_at.to_rfc3339(),
            status: FlushRunStatus::Failed,
            flushed: 0,
            discarded: 0,
            inserted: 0,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            error_message: Some(error),
            triggered_by: triggered_by.to_string(),
        }
    }
}

/// Errors returned when triggering a flush through a [`FlushHandle`].
#[derive(Debug)]
pub enum FlushTriggerError {
    SchedulerUnavailable,
    Cancelled,
    FlushFailed(String),
}

impl std::fmt::Display for FlushTriggerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushTriggerError::SchedulerUnavailable => write!(f, "Flush scheduler not available"),
            FlushTriggerError::Cancelled => write!(f, "Flush was cancelled by shutdown"),
            FlushTriggerError::FlushFailed(msg) => write!(f, "Flush failed: {}", msg),
        }
    }
}

impl std::error::Error for FlushTriggerError {}

/// Command sent to the scheduler.
pub enum FlushCommand {
    FlushNow {
        response: oneshot::Sender<Result<FlushRunInfo, FlushTriggerError>>,
    },
}

/// Shared state between scheduler and handle.
pub struct SharedFlushState {
    pub state: FlushState,
    pub last_run: Option<FlushRunInfo>,
    /// Entries written since the scheduler started.
    pub total_flushed: u64,
    pub consecutive_failures: u32,
}

impl Default for SharedFlushState {
    fn default() -> Self {
        Self {
            state: FlushState::Sleeping,
            last_run: None,
            total_flushed: 0,
            consecutive_failures: 0,
        }
    }
}

/// Serializable snapshot of the scheduler for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FlushStatus {
    pub state: FlushState,
    pub pending: usize,
    pub total_flushed: u64,
    pub consecutive_failures: u32,
    pub last_run: Option<FlushRunInfo>,
}

/// Handle to interact with the flush scheduler from other tasks.
#[derive(Clone)]
pub struct FlushHandle {
    command_tx: mpsc::Sender<FlushCommand>,
    shared_state: Arc<RwLock<SharedFlushState>>,
    flusher: Arc<ViewFlusher>,
}

impl FlushHandle {
    pub(super) fn new(
        command_tx: mpsc::Sender<FlushCommand>,
        shared_state: Arc<RwLock<SharedFlushState>>,
        flusher: Arc<ViewFlusher>,
    ) -> Self {
        Self {
            command_tx,
            shared_state,
            flusher,
        }
    }

    /// Asks the scheduler to flush immediately and waits for the result.
    ///
    /// The regular interval is not reset by a manual flush.
    pub async fn flush_now(&self) -> Result<FlushRunInfo, FlushTriggerError> {
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(FlushCommand::FlushNow {
                response: response_tx,
            })
            .await
            .map_err(|_| FlushTriggerError::SchedulerUnavailable)?;

        response_rx
            .await
            .map_err(|_| FlushTriggerError::SchedulerUnavailable)?
    }

    /// Number of entries currently waiting in the pending log.
    pub async fn pending_count(&self) -> Result<usize, CacheError> {
        self.flusher.pending_count().await
    }

    pub async fn state(&self) -> FlushState {
        self.shared_state.read().await.state
    }

    pub async fn last_run(&self) -> Option<FlushRunInfo> {
        self.shared_state.read().await.last_run.clone()
    }

    pub async fn status(&self) -> Result<FlushStatus, CacheError> {
        let pending = self.pending_count().await?;
        let state = self.shared_state.read().await;
        Ok(FlushStatus {
            state: state.state,
            pending,
            total_flushed: state.total_flushed,
            consecutive_failures: state.consecutive_failures,
            last_run: state.last_run.clone(),
        })
    }
}
