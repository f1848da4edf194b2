//! In-process TTL cache backed by DashMap for lock-free concurrent access.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::policy::CachePriority;
use crate::store::{CacheStore, CachedValue};

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
    priority: CachePriority,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

/// Bounded local cache. When full, expired entries are purged first; if
/// that frees nothing, the oldest entry of the lowest priority not above
/// the incoming one is evicted, and otherwise the insert is skipped.
pub struct LocalCache<V> {
    store: Arc<DashMap<String, CacheEntry<V>>>,
    default_ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> LocalCache<V> {
    pub fn new(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            store: Arc::new(DashMap::with_capacity(max_entries.min(1 << 16))),
            default_ttl,
            max_entries,
        }
    }

    /// Returns None if expired or missing.
    pub fn get(&self, key: &str) -> Option<CachedValue<V>> {
        let entry = self.store.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.store.remove(key);
            return None;
        }
        Some(CachedValue {
            value: entry.value.clone(),
            age: entry.inserted_at.elapsed(),
        })
    }

    pub fn put(&self, key: impl Into<String>, value: V) -> bool {
        self.put_with(key, value, self.default_ttl, CachePriority::Normal)
    }

    /// Insert or update an entry. Returns false when the cache was full and
    /// nothing could be evicted for it.
    pub fn put_with(&self, key: impl Into<String>, value: V, ttl: Duration, priority: CachePriority) -> bool {
        let key = key.into();
        if self.store.len() >= self.max_entries && !self.store.contains_key(&key) && !self.make_room(priority) {
            metrics::counter!("cache.local.rejected").increment(1);
            return false;
        }
        self.store.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
                priority,
            },
        );
        true
    }

    fn make_room(&self, incoming: CachePriority) -> bool {
        if self.evict_expired() > 0 {
            return true;
        }
        let victim = self
            .store
            .iter()
            .filter(|e| e.priority <= incoming)
            .min_by_key(|e| (e.priority, e.inserted_at))
            .map(|e| e.key().clone());
        match victim {
            Some(key) => {
                self.store.remove(&key);
                metrics::counter!("cache.local.evicted").increment(1);
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    /// Remove expired entries. Call this periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.store.len();
        self.store.retain(|_, entry| !entry.is_expired());
        let evicted = before.saturating_sub(self.store.len());
        if evicted > 0 {
            debug!(evicted, "local cache eviction complete");
        }
        evicted
    }

    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl<V> CacheStore<V> for LocalCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<CachedValue<V>> {
        LocalCache::get(self, key)
    }

    async fn set(&self, key: &str, value: V, ttl: Duration, priority: CachePriority) {
        self.put_with(key, value, ttl, priority);
    }

    async fn remove(&self, key: &str) {
        LocalCache::remove(self, key);
    }
}
