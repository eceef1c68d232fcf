mod models;
mod schema;
mod sqlite_view_store;

pub use models::ViewRecord;
pub use schema::VIEW_VERSIONED_SCHEMAS;
pub use sqlite_view_store::SqliteViewStore;

use anyhow::Result;

/// Durable storage for view records.
///
/// `(user_id, post_id)` is the uniqueness key: writing a pair that already
/// exists is a no-op, never an error.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait ViewStore: Send + Sync {
    /// Inserts all records in a single transaction, skipping pairs that already exist.
    /// Returns the number of rows actually inserted.
    fn bulk_insert_ignore_duplicates(&self, records: &[ViewRecord]) -> Result<usize>;

    fn has_view(&self, user_id: i64, post_id: i64) -> Result<bool>;
    fn get_view(&self, user_id: i64, post_id: i64) -> Result<Option<ViewRecord>>;
    /// Post ids viewed by a user, ordered by id.
    fn get_viewed_post_ids(&self, user_id: i64) -> Result<Vec<i64>>;
    fn count_views(&self) -> Result<usize>;
}
