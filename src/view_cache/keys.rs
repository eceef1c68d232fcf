use std::time::Duration;

/// Global set of view events waiting to be written to the durable store.
pub const PENDING_VIEWS_KEY: &str = "pending_views";

/// Sliding expiry of a user's viewed set (7 days).
pub const VIEW_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Key of the set holding the post ids a user has viewed.
pub fn user_views_key(user_id: i64) -> String {
    format!("user:{}:viewed_posts", user_id)
}
