//! Pipeline fixtures: a real SQLite store in a temp dir, an in-memory cache,
//! and test doubles for failure injection.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use view_tracker::view_cache::{
    CacheError, MemoryViewCache, Pipeline, ViewCache, PENDING_VIEWS_KEY,
};
use view_tracker::view_store::{SqliteViewStore, ViewRecord, ViewStore};
use view_tracker::views::{ClearStrategy, ViewFlusher, ViewTracker};

/// SQLite store whose bulk writes can be switched to fail.
pub struct SwitchableStore {
    inner: SqliteViewStore,
    failing: AtomicBool,
    write_calls: AtomicUsize,
}

impl SwitchableStore {
    pub fn open(db_path: &PathBuf) -> Self {
        Self {
            inner: SqliteViewStore::new(db_path).expect("Failed to open view store"),
            failing: AtomicBool::new(false),
            write_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }
}

impl ViewStore for SwitchableStore {
    fn bulk_insert_ignore_duplicates(&self, records: &[ViewRecord]) -> anyhow::Result<usize> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("simulated write failure");
        }
        self.inner.bulk_insert_ignore_duplicates(records)
    }

    fn has_view(&self, user_id: i64, post_id: i64) -> anyhow::Result<bool> {
        self.inner.has_view(user_id, post_id)
    }

    fn get_view(&self, user_id: i64, post_id: i64) -> anyhow::Result<Option<ViewRecord>> {
        self.inner.get_view(user_id, post_id)
    }

    fn get_viewed_post_ids(&self, user_id: i64) -> anyhow::Result<Vec<i64>> {
        self.inner.get_viewed_post_ids(user_id)
    }

    fn count_views(&self) -> anyhow::Result<usize> {
        self.inner.count_views()
    }
}

/// Cache wrapper that slips one extra pending entry in right after the
/// pending log is read, reproducing a view that lands mid-flush.
pub struct RacingCache {
    inner: Arc<MemoryViewCache>,
    late_entry: Mutex<Option<String>>,
}

impl RacingCache {
    pub fn new(inner: Arc<MemoryViewCache>, late_entry: &str) -> Self {
        Self {
            inner,
            late_entry: Mutex::new(Some(late_entry.to_string())),
        }
    }
}

#[async_trait]
impl ViewCache for RacingCache {
    async fn execute(&self, pipeline: Pipeline) -> Result<(), CacheError> {
        self.inner.execute(pipeline).await
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        self.inner.sismember(key, member).await
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        let members = self.inner.smembers(key).await?;
        let late_entry = if key == PENDING_VIEWS_KEY {
            self.late_entry.lock().unwrap().take()
        } else {
            None
        };
        if let Some(entry) = late_entry {
            self.inner.sadd(PENDING_VIEWS_KEY, &entry).await?;
        }
        Ok(members)
    }

    async fn scard(&self, key: &str) -> Result<usize, CacheError> {
        self.inner.scard(key).await
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<usize, CacheError> {
        self.inner.srem(key, members).await
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        self.inner.ttl(key).await
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.inner.close().await
    }
}

/// Cache, store and tracker wired together the way the host process does it.
pub struct PipelineFixture {
    pub cache: Arc<MemoryViewCache>,
    pub store: Arc<SwitchableStore>,
    pub tracker: ViewTracker,
    pub db_path: PathBuf,
    _temp_dir: TempDir,
}

impl PipelineFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("views.db");
        let store = Arc::new(SwitchableStore::open(&db_path));
        let cache = Arc::new(MemoryViewCache::new());
        let tracker = ViewTracker::new(cache.clone());

        Self {
            cache,
            store,
            tracker,
            db_path,
            _temp_dir: temp_dir,
        }
    }

    pub fn flusher(&self) -> ViewFlusher {
        self.flusher_with(ClearStrategy::Snapshot)
    }

    pub fn flusher_with(&self, clear_strategy: ClearStrategy) -> ViewFlusher {
        ViewFlusher::new(self.cache.clone(), self.store.clone(), clear_strategy)
    }

    pub async fn pending(&self) -> HashSet<String> {
        self.cache
            .smembers(PENDING_VIEWS_KEY)
            .await
            .expect("Failed to read pending log")
    }
}
