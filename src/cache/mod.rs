//! Cache module for fetched resources
//!
//! This module provides the cache store shared by every observer of a key:
//! values are persisted as `{value, fetchedAt}` JSON through a pluggable
//! key-value backend, and each entry is evicted by its own timer once it is
//! older than the configured eviction age.

mod backend;
mod manager;

pub use backend::{FileStore, KeyValueStore, MemoryStore};
pub use manager::{CacheError, CacheStore, CachedValue};
