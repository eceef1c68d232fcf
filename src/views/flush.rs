use super::pending::PendingView;
use crate::view_cache::{CacheError, ViewCache, PENDING_VIEWS_KEY};
use crate::view_store::{ViewRecord, ViewStore};
use clap::ValueEnum;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// How the pending log is cleared after a successful durable write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ClearStrategy {
    /// Remove exactly the entries that were read and written.
    #[default]
    Snapshot,
    /// Delete the whole pending key. Entries added between the read and the
    /// delete are lost.
    #[value(name = "whole_log", alias = "whole-log")]
    WholeLog,
}

impl ClearStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearStrategy::Snapshot => "snapshot",
            ClearStrategy::WholeLog => "whole_log",
        }
    }
}

impl std::fmt::Display for ClearStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Failed to write views to durable store: {0}")]
    Store(String),

    #[error("Durable store task failed: {0}")]
    Join(String),
}

/// Result of one successful drain of the pending log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushOutcome {
    /// Entries parsed and handed to the durable store.
    pub flushed: usize,
    /// Malformed entries dropped from the log.
    pub discarded: usize,
    /// Rows the store actually inserted; duplicates of earlier views are not counted.
    pub inserted: usize,
    pub duration: Duration,
}

impl FlushOutcome {
    pub fn is_empty(&self) -> bool {
        self.flushed == 0 && self.discarded == 0
    }
}

/// Drains the pending log into the durable store.
pub struct ViewFlusher {
    cache: Arc<dyn ViewCache>,
    store: Arc<dyn ViewStore>,
    clear_strategy: ClearStrategy,
}

impl ViewFlusher {
    pub fn new(
        cache: Arc<dyn ViewCache>,
        store: Arc<dyn ViewStore>,
        clear_strategy: ClearStrategy,
    ) -> Self {
        Self {
            cache,
            store,
            clear_strategy,
        }
    }

    pub fn clear_strategy(&self) -> ClearStrategy {
        self.clear_strategy
    }

    /// Flushes the pending log and returns the number of entries written.
    pub async fn flush_to_db(&self) -> Result<usize, FlushError> {
        self.run_flush().await.map(|outcome| outcome.flushed)
    }

    /// Reads the pending log once, writes every parseable entry in a single
    /// transaction, then clears what was read.
    ///
    /// The log is left untouched when the write fails, so the same entries
    /// are retried on the next call. Malformed entries are never retried.
    pub async fn run_flush(&self) -> Result<FlushOutcome, FlushError> {
        let start = Instant::now();
        let snapshot = self.cache.smembers(PENDING_VIEWS_KEY).await?;
        if snapshot.is_empty() {
            return Ok(FlushOutcome {
                duration: start.elapsed(),
                ..Default::default()
            });
        }

        let mut records: Vec<ViewRecord> = Vec::with_capacity(snapshot.len());
        let mut discarded = 0;
        for entry in &snapshot {
            match PendingView::parse(entry).and_then(|view| view.to_record()) {
                Ok(record) => records.push(record),
                Err(e) => {
                    discarded += 1;
                    warn!("Discarding malformed pending view {:?}: {}", entry, e);
                }
            }
        }

        // Oldest first, so insert-or-ignore keeps the earliest view of each pair
        records.sort_by_key(|record| record.viewed_at);

        let flushed = records.len();
        let inserted = if records.is_empty() {
            0
        } else {
            let store = Arc::clone(&self.store);
            tokio::task::spawn_blocking(move || store.bulk_insert_ignore_duplicates(&records))
                .await
                .map_err(|e| FlushError::Join(e.to_string()))?
                .map_err(|e| FlushError::Store(format!("{:#}", e)))?
        };

        self.clear(snapshot.into_iter().collect()).await?;

        let outcome = FlushOutcome {
            flushed,
            discarded,
            inserted,
            duration: start.elapsed(),
        };
        debug!(
            "Flush wrote {} entries ({} new rows), discarded {}",
            outcome.flushed, outcome.inserted, outcome.discarded
        );
        Ok(outcome)
    }

    /// Current size of the pending log.
    pub async fn pending_count(&self) -> Result<usize, CacheError> {
        self.cache.scard(PENDING_VIEWS_KEY).await
    }

    async fn clear(&self, snapshot: Vec<String>) -> Result<(), CacheError> {
        match self.clear_strategy {
            ClearStrategy::Snapshot => {
                self.cache.srem(PENDING_VIEWS_KEY, &snapshot).await?;
            }
            ClearStrategy::WholeLog => {
                self.cache.delete(PENDING_VIEWS_KEY).await?;
            }
        }
        Ok(())
    }
}
