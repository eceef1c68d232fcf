use super::pending::{now_timestamp, PendingView};
use crate::server::metrics;
use crate::view_cache::{user_views_key, CacheError, Pipeline, ViewCache, PENDING_VIEWS_KEY, VIEW_EXPIRY};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Cache-resident read/write path for view events.
///
/// Every mark lands in two places: the user's viewed set, which answers
/// membership queries and slides its expiry forward on each write, and the
/// global pending log, which the flusher drains into durable storage.
pub struct ViewTracker {
    cache: Arc<dyn ViewCache>,
    view_ttl: Duration,
}

impl ViewTracker {
    pub fn new(cache: Arc<dyn ViewCache>) -> Self {
        Self::with_view_ttl(cache, VIEW_EXPIRY)
    }

    pub fn with_view_ttl(cache: Arc<dyn ViewCache>, view_ttl: Duration) -> Self {
        Self { cache, view_ttl }
    }

    pub fn view_ttl(&self) -> Duration {
        self.view_ttl
    }

    /// Records that `user_id` viewed every post in `post_ids`, stamped with the current time.
    pub async fn mark_viewed(&self, user_id: i64, post_ids: &[i64]) -> Result<(), CacheError> {
        self.mark_viewed_at(user_id, post_ids, now_timestamp()).await
    }

    /// Same as [`mark_viewed`](Self::mark_viewed) with an explicit event time
    /// in fractional seconds since the Unix epoch.
    ///
    /// All writes go out as one pipeline, so either the whole batch is
    /// visible or none of it is. An empty `post_ids` issues no cache writes.
    pub async fn mark_viewed_at(
        &self,
        user_id: i64,
        post_ids: &[i64],
        timestamp: f64,
    ) -> Result<(), CacheError> {
        if post_ids.is_empty() {
            return Ok(());
        }

        let user_key = user_views_key(user_id);
        let mut pipeline = Pipeline::new();
        for &post_id in post_ids {
            pipeline
                .sadd(&user_key, post_id.to_string())
                .sadd(
                    PENDING_VIEWS_KEY,
                    PendingView::new(user_id, post_id, timestamp).encode(),
                );
        }
        pipeline.expire(&user_key, self.view_ttl);

        self.cache.execute(pipeline).await?;
        metrics::record_views_marked(post_ids.len());
        debug!("Marked {} posts as viewed for user {}", post_ids.len(), user_id);
        Ok(())
    }

    pub async fn has_viewed(&self, user_id: i64, post_id: i64) -> Result<bool, CacheError> {
        self.cache
            .sismember(&user_views_key(user_id), &post_id.to_string())
            .await
    }

    /// All post ids in the user's viewed set. Members that are not integers are skipped.
    pub async fn get_viewed_posts(&self, user_id: i64) -> Result<HashSet<i64>, CacheError> {
        let members = self.cache.smembers(&user_views_key(user_id)).await?;
        Ok(members
            .iter()
            .filter_map(|member| member.parse::<i64>().ok())
            .collect())
    }

    /// Returns the ids from `post_ids` the user has not viewed, in input order.
    pub async fn filter_unviewed(
        &self,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<Vec<i64>, CacheError> {
        if post_ids.is_empty() {
            return Ok(Vec::new());
        }

        let viewed = self.get_viewed_posts(user_id).await?;
        Ok(post_ids
            .iter()
            .copied()
            .filter(|post_id| !viewed.contains(post_id))
            .collect())
    }
}
