//! Cache/store interface consumed by the matching manager.

use async_trait::async_trait;
use std::time::Duration;

use crate::policy::CachePriority;

/// A value read back from a store, with its age at read time.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<V> {
    pub value: V,
    pub age: Duration,
}

/// Keyed store with per-entry TTL. Keys are caller-computed fingerprints.
///
/// Implementations may be in-process or remote; `get` returns `None` for
/// missing or expired entries and never errors.
#[async_trait]
pub trait CacheStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<CachedValue<V>>;

    async fn set(&self, key: &str, value: V, ttl: Duration, priority: CachePriority);

    async fn remove(&self, key: &str);
}
