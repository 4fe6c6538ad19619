//! Cache store for fetched resources
//!
//! Provides a `CacheStore` that persists serializable values as JSON through a
//! [`KeyValueStore`], stamps them with the time they were fetched, and owns one
//! eviction timer per key.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::backend::{KeyValueStore, MemoryStore};
use crate::clock::Clock;

/// Wrapper struct for cached data as it is persisted
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry<T> {
    /// The cached value
    value: T,
    /// When the value was fetched
    #[serde(with = "chrono::serde::ts_milliseconds")]
    fetched_at: DateTime<Utc>,
}

/// Just the timestamp of a persisted entry, whatever its value type
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryStamp {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    fetched_at: DateTime<Utc>,
}

/// Result of reading from cache, including metadata about freshness
#[derive(Debug, Clone)]
pub struct CachedValue<T> {
    /// The cached value
    pub value: T,
    /// When the value was fetched
    pub fetched_at: DateTime<Utc>,
    /// Time elapsed since `fetched_at`
    pub age: Duration,
}

/// Errors that can occur when writing to the cache
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend failed to store the entry
    #[error("cache I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The value could not be serialized
    #[error("failed to serialize cache entry: {0}")]
    Serialize(#[from] serde_json::Error),
}

struct EvictionTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct CacheInner {
    backend: Arc<dyn KeyValueStore>,
    clock: Clock,
    timers: Mutex<HashMap<String, EvictionTimer>>,
    next_generation: AtomicU64,
}

impl CacheInner {
    /// Fired by an eviction timer; only the timer that is still current may evict
    fn expire(&self, key: &str, generation: u64) {
        let mut timers = self.timers.lock();
        match timers.get(key) {
            Some(timer) if timer.generation == generation => {
                timers.remove(key);
                self.backend.remove(key);
                debug!(key, "evicted cache entry");
            }
            _ => {}
        }
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.handle.abort();
        }
    }
}

/// Shared cache of fetched values keyed by resource key
///
/// Cloning is cheap and every clone sees the same entries and timers. Timers
/// are Tokio tasks, so writes and first reads must happen inside a runtime.
/// Dropping the last clone aborts all pending timers.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("timers", &self.inner.timers.lock().len())
            .finish()
    }
}

impl CacheStore {
    /// Creates a cache over the given persistence backend
    pub fn new(backend: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend,
                clock,
                timers: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Creates a cache that lives only as long as the process
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Clock::new())
    }

    pub fn clock(&self) -> Clock {
        self.inner.clock
    }

    /// Reads the entry for `key`
    ///
    /// Returns `None` when the entry is missing, cannot be parsed, or is at
    /// least `evict_after` old. Unparseable and expired entries are removed.
    /// A surviving entry that has no eviction timer yet gets one.
    ///
    /// # Panics
    /// Arming a timer spawns a Tokio task, so this panics when called
    /// outside a Tokio runtime for an entry that has no timer yet.
    pub fn read<T: DeserializeOwned>(&self, key: &str, evict_after: Duration) -> Option<CachedValue<T>> {
        let raw = self.inner.backend.get(key)?;
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(key, error = %err, "discarding unreadable cache entry");
                self.remove(key);
                return None;
            }
        };

        let age = self.inner.clock.age_of(entry.fetched_at);
        if age >= evict_after {
            debug!(key, ?age, "cache entry past eviction age");
            self.remove(key);
            return None;
        }

        let mut timers = self.inner.timers.lock();
        if !timers.contains_key(key) {
            self.arm(&mut timers, key, evict_after - age);
        }

        Some(CachedValue {
            value: entry.value,
            fetched_at: entry.fetched_at,
            age,
        })
    }

    /// Writes `value` for `key` and restarts its eviction timer
    ///
    /// The stored timestamp never moves backwards for a key.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime, since the eviction timer
    /// is a spawned task.
    ///
    /// # Returns
    /// * `Ok(fetched_at)` - the timestamp recorded for the entry
    /// * `Err(CacheError)` - if serialization or the backend fails
    pub fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        evict_after: Duration,
    ) -> Result<DateTime<Utc>, CacheError> {
        let mut timers = self.inner.timers.lock();

        let mut fetched_at = self.inner.clock.now();
        if let Some(previous) = self.stamp(key) {
            fetched_at = fetched_at.max(previous);
        }

        let json = serde_json::to_string(&CacheEntry { value, fetched_at })?;
        self.inner.backend.set(key, &json)?;
        self.arm(&mut timers, key, evict_after);

        Ok(fetched_at)
    }

    /// Reads the entry for `key` without touching the cache
    ///
    /// Unlike [`read`](Self::read) nothing is removed and no timer is armed;
    /// entries past `evict_after` are still returned with their age.
    pub fn peek<T: DeserializeOwned>(&self, key: &str) -> Option<CachedValue<T>> {
        let raw = self.inner.backend.get(key)?;
        let entry: CacheEntry<T> = serde_json::from_str(&raw).ok()?;
        Some(CachedValue {
            age: self.inner.clock.age_of(entry.fetched_at),
            value: entry.value,
            fetched_at: entry.fetched_at,
        })
    }

    /// Removes the entry for `key` and cancels its eviction timer
    ///
    /// Returns whether an entry was stored.
    pub fn remove(&self, key: &str) -> bool {
        let mut timers = self.inner.timers.lock();
        if let Some(timer) = timers.remove(key) {
            timer.handle.abort();
        }
        let existed = self.inner.backend.get(key).is_some();
        self.inner.backend.remove(key);
        existed
    }

    /// Lists the keys currently persisted
    pub fn keys(&self) -> Vec<String> {
        self.inner.backend.keys()
    }

    /// Removes every persisted entry that is unreadable or at least `evict_after` old
    ///
    /// Returns the number of entries removed.
    pub fn purge(&self, evict_after: Duration) -> usize {
        let mut removed = 0;
        for key in self.keys() {
            let expired = match self.stamp(&key) {
                Some(fetched_at) => self.inner.clock.age_of(fetched_at) >= evict_after,
                None => self.inner.backend.get(&key).is_some(),
            };
            if expired {
                self.remove(&key);
                removed += 1;
            }
        }
        removed
    }

    fn stamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.inner.backend.get(key)?;
        serde_json::from_str::<EntryStamp>(&raw).ok().map(|stamp| stamp.fetched_at)
    }

    /// Schedules eviction of `key` after `delay`, replacing any previous timer
    fn arm(&self, timers: &mut HashMap<String, EvictionTimer>, key: &str, delay: Duration) {
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let inner: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let owned_key = key.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = inner.upgrade() {
                inner.expire(&owned_key, generation);
            }
        });

        if let Some(previous) = timers.insert(key.to_string(), EvictionTimer { generation, handle }) {
            previous.handle.abort();
        }
    }
}
