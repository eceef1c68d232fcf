//! Recurring flush of pending views into durable storage.
//!
//! The scheduler runs as a single task owned by the host process. A
//! [`FlushHandle`] lets other tasks trigger an immediate flush and inspect the
//! scheduler's state while it runs.

mod handle;
mod scheduler;

pub use handle::{
    FlushHandle, FlushRunInfo, FlushRunStatus, FlushState, FlushStatus, FlushTriggerError,
};
pub use scheduler::{create_flush_scheduler, FlushScheduler, DEFAULT_FLUSH_INTERVAL};
