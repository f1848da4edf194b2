//! Result caching for targeting decisions: store interface, freshness
//! policy, in-process TTL store and request fingerprints.

#![warn(clippy::unwrap_used)]

pub mod fingerprint;
pub mod local;
pub mod policy;
pub mod store;

pub use fingerprint::fingerprint;
pub use local::LocalCache;
pub use policy::{CachePolicy, CachePriority, Freshness};
pub use store::{CacheStore, CachedValue};
