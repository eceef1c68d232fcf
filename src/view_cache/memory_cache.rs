use super::{CacheError, CacheOp, Pipeline, ViewCache};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

struct SetEntry {
    members: HashSet<String>,
    expires_at: Option<Instant>,
}

impl SetEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process cache backend.
///
/// Expired keys are treated as absent on every access and dropped lazily;
/// `purge_expired` removes them eagerly. A key whose set becomes empty is
/// removed together with its expiry.
#[derive(Default)]
pub struct MemoryViewCache {
    sets: Mutex<HashMap<String, SetEntry>>,
    closed: AtomicBool,
}

impl MemoryViewCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every expired key, returning how many were removed.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut sets = self.lock()?;
        let now = Instant::now();
        let before = sets.len();
        sets.retain(|_, entry| !entry.is_expired(now));
        let purged = before - sets.len();
        if purged > 0 {
            debug!("Purged {} expired cache keys", purged);
        }
        Ok(purged)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, SetEntry>>, CacheError> {
        if self.is_closed() {
            return Err(CacheError::Closed);
        }
        self.sets.lock().map_err(|_| CacheError::Poisoned)
    }

    /// Returns the live entry for `key`, removing it first if it has expired.
    fn live_entry<'a>(
        sets: &'a mut HashMap<String, SetEntry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut SetEntry> {
        if sets.get(key).is_some_and(|entry| entry.is_expired(now)) {
            sets.remove(key);
        }
        sets.get_mut(key)
    }

    fn apply(sets: &mut HashMap<String, SetEntry>, op: CacheOp, now: Instant) {
        match op {
            CacheOp::SetAdd { key, member } => {
                if Self::live_entry(sets, &key, now).is_none() {
                    sets.insert(
                        key.clone(),
                        SetEntry {
                            members: HashSet::new(),
                            expires_at: None,
                        },
                    );
                }
                if let Some(entry) = sets.get_mut(&key) {
                    entry.members.insert(member);
                }
            }
            CacheOp::Expire { key, ttl } => {
                // A ttl past the clock's range means the key never expires
                if let Some(entry) = Self::live_entry(sets, &key, now) {
                    entry.expires_at = now.checked_add(ttl);
                }
            }
        }
    }
}

#[async_trait]
impl ViewCache for MemoryViewCache {
    async fn execute(&self, pipeline: Pipeline) -> Result<(), CacheError> {
        let mut sets = self.lock()?;
        let now = Instant::now();
        for op in pipeline.into_ops() {
            Self::apply(&mut sets, op, now);
        }
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, CacheError> {
        let mut sets = self.lock()?;
        let is_member = Self::live_entry(&mut sets, key, Instant::now())
            .is_some_and(|entry| entry.members.contains(member));
        Ok(is_member)
    }

    async fn smembers(&self, key: &str) -> Result<HashSet<String>, CacheError> {
        let mut sets = self.lock()?;
        let members = Self::live_entry(&mut sets, key, Instant::now())
            .map(|entry| entry.members.clone())
            .unwrap_or_default();
        Ok(members)
    }

    async fn scard(&self, key: &str) -> Result<usize, CacheError> {
        let mut sets = self.lock()?;
        let count = Self::live_entry(&mut sets, key, Instant::now())
            .map(|entry| entry.members.len())
            .unwrap_or(0);
        Ok(count)
    }

    async fn srem(&self, key: &str, members: &[String]) -> Result<usize, CacheError> {
        let mut sets = self.lock()?;
        let Some(entry) = Self::live_entry(&mut sets, key, Instant::now()) else {
            return Ok(0);
        };
        let removed = members
            .iter()
            .filter(|member| entry.members.remove(member.as_str()))
            .count();
        if entry.members.is_empty() {
            sets.remove(key);
        }
        Ok(removed)
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut sets = self.lock()?;
        let now = Instant::now();
        let existed = sets
            .remove(key)
            .is_some_and(|entry| !entry.is_expired(now));
        Ok(existed)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut sets = self.lock()?;
        let now = Instant::now();
        let remaining = Self::live_entry(&mut sets, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now));
        Ok(remaining)
    }

    async fn close(&self) -> Result<(), CacheError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(CacheError::Closed);
        }
        debug!("In-memory view cache closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pipeline_adds_members() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline.sadd("s", "a").sadd("s", "b").sadd("s", "a");
        cache.execute(pipeline).await.unwrap();

        assert_eq!(cache.scard("s").await.unwrap(), 2);
        assert!(cache.sismember("s", "a").await.unwrap());
        assert!(!cache.sismember("s", "c").await.unwrap());
        assert!(!cache.sismember("missing", "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_on_missing_key_is_noop() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline.expire("nothing", Duration::from_secs(10));
        cache.execute(pipeline).await.unwrap();

        assert_eq!(cache.ttl("nothing").await.unwrap(), None);
        assert_eq!(cache.scard("nothing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expired_key_behaves_as_absent() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline
            .sadd("s", "a")
            .expire("s", Duration::from_millis(20));
        cache.execute(pipeline).await.unwrap();
        assert!(cache.sismember("s", "a").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(!cache.sismember("s", "a").await.unwrap());
        assert!(cache.smembers("s").await.unwrap().is_empty());
        assert_eq!(cache.ttl("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_add_after_expiry_starts_fresh_set() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline
            .sadd("s", "old")
            .expire("s", Duration::from_millis(20));
        cache.execute(pipeline).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.sadd("s", "new").await.unwrap();

        let members = cache.smembers("s").await.unwrap();
        assert_eq!(members.len(), 1);
        assert!(members.contains("new"));
        assert_eq!(cache.ttl("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_keeps_key_without_expiry() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline
            .sadd("s", "a")
            .expire("s", Duration::from_secs(u64::MAX));
        cache.execute(pipeline).await.unwrap();

        assert!(cache.sismember("s", "a").await.unwrap());
        assert_eq!(cache.ttl("s").await.unwrap(), None);

        // The cache stays usable afterwards
        cache.sadd("s", "b").await.unwrap();
        assert_eq!(cache.scard("s").await.unwrap(), 2);
        assert_eq!(cache.purge_expired().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline
            .sadd("short", "a")
            .expire("short", Duration::from_millis(10))
            .sadd("long", "b")
            .expire("long", Duration::from_secs(60))
            .sadd("forever", "c");
        cache.execute(pipeline).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.scard("long").await.unwrap(), 1);
        assert_eq!(cache.scard("forever").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_srem_and_delete() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline.sadd("s", "a").sadd("s", "b").sadd("s", "c");
        cache.execute(pipeline).await.unwrap();

        let removed = cache
            .srem("s", &["a".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.scard("s").await.unwrap(), 2);

        assert!(cache.delete("s").await.unwrap());
        assert!(!cache.delete("s").await.unwrap());
        assert_eq!(cache.srem("s", &["b".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_srem_last_member_drops_key_and_expiry() {
        let cache = MemoryViewCache::new();
        let mut pipeline = Pipeline::new();
        pipeline.sadd("s", "a").expire("s", Duration::from_secs(60));
        cache.execute(pipeline).await.unwrap();

        cache.srem("s", &["a".to_string()]).await.unwrap();
        assert_eq!(cache.ttl("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_cache_rejects_operations() {
        let cache = MemoryViewCache::new();
        cache.sadd("s", "a").await.unwrap();
        cache.close().await.unwrap();

        assert!(cache.is_closed());
        assert!(matches!(
            cache.sismember("s", "a").await,
            Err(CacheError::Closed)
        ));
        assert!(matches!(
            cache.execute(Pipeline::new()).await,
            Err(CacheError::Closed)
        ));
        assert!(matches!(cache.close().await, Err(CacheError::Closed)));
        assert!(matches!(cache.purge_expired(), Err(CacheError::Closed)));
    }
}
