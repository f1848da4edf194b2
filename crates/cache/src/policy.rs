//! Freshness policy applied to cached match results.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use targeting_core::config::CacheConfig;

/// Relative importance of a cached entry when the store is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// How an entry of a given age should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Past its TTL but inside the stale-allowed window.
    Stale,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub stale_window: Duration,
    pub priority: CachePriority,
}

impl CachePolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            stale_window: Duration::ZERO,
            priority: CachePriority::Normal,
        }
    }

    pub fn with_stale_window(mut self, stale_window: Duration) -> Self {
        self.stale_window = stale_window;
        self
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }

    /// How long a store must retain an entry for this policy to use it.
    pub fn retention(&self) -> Duration {
        self.ttl.saturating_add(self.stale_window)
    }

    pub fn classify(&self, age: Duration) -> Freshness {
        if age <= self.ttl {
            Freshness::Fresh
        } else if age <= self.retention() {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

impl From<&CacheConfig> for CachePolicy {
    fn from(config: &CacheConfig) -> Self {
        CachePolicy::new(Duration::from_secs(config.ttl_secs))
            .with_stale_window(Duration::from_secs(config.stale_secs))
    }
}
