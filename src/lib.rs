//! View Tracker Library
//!
//! Records "user viewed post" events in a write-back cache, answers fast
//! membership queries against them, and periodically persists them to a
//! durable SQLite store.

pub mod background_jobs;
pub mod config;
pub mod server;
pub mod sqlite_persistence;
pub mod view_cache;
pub mod view_store;
pub mod views;

// Re-export commonly used types for convenience
pub use background_jobs::{create_flush_scheduler, FlushHandle, FlushScheduler};
pub use view_cache::{CacheError, MemoryViewCache, ViewCache};
pub use view_store::{SqliteViewStore, ViewRecord, ViewStore};
pub use views::{ClearStrategy, FlushError, FlushOutcome, PendingView, ViewFlusher, ViewTracker};
