//! Cache backend used by the view tracking pipeline.
//!
//! The cache holds string sets with optional expiry, addressed by key, plus a
//! pipelined batch primitive whose operations are applied atomically.

mod keys;
mod memory_cache;
mod pipeline;

pub use keys::{user_views_key, PENDING_VIEWS_KEY, VIEW_EXPIRY};
pub use memory_cache::MemoryViewCache;
pub use pipeline::{CacheOp, Pipeline};

use async_trait::async_trait;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache connection is closed")]
    Closed,

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Cache state lock poisoned")]
    Poisoned,
}

/// A shared key/value cache holding string sets.
///
/// Every method is a single round trip and is atomic on its own; `execute`
/// applies a whole [`Pipeline`] atomically.
#[async_trait]
pub trait ViewCache: Send + Sync {
    /// Applies every operation of the pipeline as one atomic batch.
    async fn execute(&self, pipeline: Pipeline) -> Result<(), CacheError>;

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError>;

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, CacheError>;

    async fn scard(&self, key: &str) -> Result<usize, CacheError>;

    /// Removes the given members, returning how many were present.
    async fn srem(&self, key: &str, members: &[String]) -> Result<usize, CacheError>;

    /// Deletes a key, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Remaining time to live of a key, `None` if the key is missing or has no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError>;

    /// Releases the backend. Any later call fails with [`CacheError::Closed`].
    async fn close(&self) -> Result<(), CacheError>;

    async fn sadd(&self, key: &str, member: &str) -> Result<(), CacheError> {
        let mut pipeline = Pipeline::new();
        pipeline.sadd(key, member);
        self.execute(pipeline).await
    }
}
