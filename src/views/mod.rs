//! View tracking: the cache-side write/read path and the flush to durable storage.

mod flush;
mod pending;
mod tracker;

pub use flush::{ClearStrategy, FlushError, FlushOutcome, ViewFlusher};
pub use pending::{PendingView, PendingViewError};
pub use tracker::ViewTracker;
