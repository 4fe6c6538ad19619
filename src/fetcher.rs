//! Cached resource fetcher
//!
//! `Fetcher` serves the best known value for a resource key while keeping it
//! reasonably fresh:
//!
//! - a fresh cache entry is served without touching the network
//! - a stale entry is served immediately and revalidated in the background
//! - a missing entry is fetched, retrying failures with exponential backoff
//!
//! Every observed key has one slot holding its state channel, its observer
//! count and at most one in-flight session. A session runs as a Tokio task;
//! starting a newer session for the key aborts the older one, and so does
//! the last observer going away. Completions are applied only if the session
//! is still the current one for its key, so a superseded or cancelled
//! session never touches the cache or the published state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::CacheStore;
use crate::config::FetchConfig;
use crate::transport::{FetchError, Transport};

/// Values the fetcher can cache and hand out to observers
pub trait Resource: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Resource for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// What an observer sees for a key
#[derive(Debug, Clone, PartialEq)]
pub struct FetchState<T> {
    /// Latest known value; kept when a refresh fails
    pub value: Option<T>,
    /// A fetch for this key is in flight
    pub is_loading: bool,
    /// The last fetch exhausted its retries
    pub is_error: bool,
    /// Description of the last failure, if any
    pub last_error: Option<String>,
}

impl<T> Default for FetchState<T> {
    fn default() -> Self {
        Self {
            value: None,
            is_loading: false,
            is_error: false,
            last_error: None,
        }
    }
}

impl<T> FetchState<T> {
    fn loading(value: Option<T>) -> Self {
        Self {
            value,
            is_loading: true,
            ..Self::default()
        }
    }

    fn ready(value: T) -> Self {
        Self {
            value: Some(value),
            ..Self::default()
        }
    }
}

struct Session {
    id: u64,
    handle: JoinHandle<()>,
}

struct Slot<T> {
    state: watch::Sender<FetchState<T>>,
    observers: usize,
    session: Option<Session>,
}

struct Shared<T> {
    config: FetchConfig,
    transport: Arc<dyn Transport>,
    cache: CacheStore,
    slots: Mutex<HashMap<String, Slot<T>>>,
    next_session: AtomicU64,
}

impl<T: Resource> Shared<T> {
    /// Registers an observer of `key`, deciding whether network work is needed
    fn attach(self: &Arc<Self>, key: &str) -> watch::Receiver<FetchState<T>> {
        let mut slots = self.slots.lock();
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            state: watch::channel(FetchState::default()).0,
            observers: 0,
            session: None,
        });
        slot.observers += 1;

        if slot.session.is_some() {
            debug!(key, "joining in-flight fetch");
            return slot.state.subscribe();
        }

        match self.cache.read::<T>(key, self.config.evict_after) {
            Some(cached) if !self.config.is_stale(cached.age) => {
                debug!(key, age = ?cached.age, "cache hit");
                slot.state.send_replace(FetchState::ready(cached.value));
            }
            Some(cached) => {
                debug!(key, age = ?cached.age, "cache stale, revalidating");
                slot.state.send_replace(FetchState::loading(Some(cached.value)));
                self.start_session(key, slot);
            }
            None => {
                debug!(key, "cache miss");
                slot.state.send_replace(FetchState::loading(None));
                self.start_session(key, slot);
            }
        }

        slot.state.subscribe()
    }

    /// Unregisters an observer; the last one out cancels any in-flight session
    fn detach(&self, key: &str) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(key) else {
            return;
        };
        slot.observers = slot.observers.saturating_sub(1);
        if slot.observers > 0 {
            return;
        }

        if let Some(Slot {
            session: Some(session),
            ..
        }) = slots.remove(key)
        {
            debug!(key, session = session.id, "no observers left, cancelling fetch");
            session.handle.abort();
        }
    }

    /// Starts a session for `key`, superseding the one in flight
    fn start_session(self: &Arc<Self>, key: &str, slot: &mut Slot<T>) {
        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(self);
        let owned_key = key.to_string();
        let handle = tokio::spawn(async move { shared.run_session(owned_key, id).await });

        if let Some(previous) = slot.session.replace(Session { id, handle }) {
            debug!(key, session = previous.id, "superseding in-flight fetch");
            previous.handle.abort();
        }
    }

    async fn run_session(self: Arc<Self>, key: String, id: u64) {
        let mut attempt = 0;
        loop {
            let outcome = match self.transport.get(&key).await {
                Ok(json) => serde_json::from_value::<T>(json).map_err(FetchError::from),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(value) => return self.finish(&key, id, Ok(value)),
                Err(err) if attempt < self.config.max_retries => {
                    let delay = self.config.retry_delay(attempt);
                    attempt += 1;
                    warn!(
                        key = key.as_str(),
                        attempt,
                        max_retries = self.config.max_retries,
                        ?delay,
                        error = %err,
                        "fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return self.finish(&key, id, Err(err)),
            }
        }
    }

    /// Applies a session's outcome if it is still the current session for `key`
    fn finish(&self, key: &str, id: u64, outcome: Result<T, FetchError>) {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(key) else {
            debug!(key, session = id, "dropping result, key no longer observed");
            return;
        };
        if slot.session.as_ref().map(|session| session.id) != Some(id) {
            debug!(key, session = id, "dropping result of superseded fetch");
            return;
        }
        slot.session = None;

        match outcome {
            Ok(value) => {
                if let Err(err) = self.cache.write(key, &value, self.config.evict_after) {
                    warn!(key, error = %err, "failed to persist fetched value");
                }
                debug!(key, session = id, "fetch succeeded");
                slot.state.send_replace(FetchState::ready(value));
            }
            Err(err) => {
                error!(key, error = %err, "fetch failed, retries exhausted");
                slot.state.send_modify(|state| {
                    state.is_loading = false;
                    state.is_error = true;
                    state.last_error = Some(err.to_string());
                });
            }
        }
    }
}

/// Cached resource fetcher shared by every observer
///
/// Cloning is cheap; clones share slots, sessions and the cache store.
/// Observing a key spawns Tokio tasks, so it must happen inside a runtime.
pub struct Fetcher<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Fetcher<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Resource> Fetcher<T> {
    /// Creates a fetcher over the given transport and cache store
    pub fn new(config: FetchConfig, transport: Arc<dyn Transport>, cache: CacheStore) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport,
                cache,
                slots: Mutex::new(HashMap::new()),
                next_session: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.shared.config
    }

    pub fn cache(&self) -> &CacheStore {
        &self.shared.cache
    }

    /// Starts observing `key`
    ///
    /// The returned handle carries the current state and a stream of changes.
    /// Dropping it stops observing; if no one else observes the key, the
    /// in-flight fetch (request or retry delay) is cancelled.
    pub fn observe(&self, key: impl Into<String>) -> Observation<T> {
        let key = key.into();
        let receiver = self.shared.attach(&key);
        Observation {
            key,
            receiver,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Calls `callback` with the state of `key` now and on every change
    ///
    /// The callback runs on a Tokio task until the returned `Subscription`
    /// is dropped or unsubscribed.
    pub fn subscribe<F>(&self, key: impl Into<String>, mut callback: F) -> Subscription
    where
        F: FnMut(&FetchState<T>) + Send + 'static,
    {
        let mut observation = self.observe(key);
        let handle = tokio::spawn(async move {
            callback(&observation.state());
            while let Some(state) = observation.changed().await {
                callback(&state);
            }
        });
        Subscription { handle }
    }

    /// Starts a new fetch for an observed key, superseding any in flight
    ///
    /// Returns `false` if nobody observes `key`.
    pub fn refetch(&self, key: &str) -> bool {
        let mut slots = self.shared.slots.lock();
        let Some(slot) = slots.get_mut(key) else {
            return false;
        };
        slot.state.send_modify(|state| {
            state.is_loading = true;
            state.is_error = false;
            state.last_error = None;
        });
        self.shared.start_session(key, slot);
        true
    }

    /// Drops the cache entry for `key`
    ///
    /// Observers keep the value they hold; the next observation starts cold.
    pub fn invalidate(&self, key: &str) {
        debug!(key, "invalidating cache entry");
        self.shared.cache.remove(key);
    }

    /// Number of live observers of `key`
    pub fn observers(&self, key: &str) -> usize {
        self.shared.slots.lock().get(key).map_or(0, |slot| slot.observers)
    }
}

/// A live observation of one key
pub struct Observation<T: Resource> {
    key: String,
    receiver: watch::Receiver<FetchState<T>>,
    shared: Arc<Shared<T>>,
}

impl<T: Resource> Observation<T> {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state for the observed key
    pub fn state(&self) -> FetchState<T> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next state change
    ///
    /// Returns `None` once the key can no longer change.
    pub async fn changed(&mut self) -> Option<FetchState<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Waits until no fetch is in flight and returns that state
    pub async fn settled(&mut self) -> FetchState<T> {
        loop {
            {
                let state = self.receiver.borrow_and_update();
                if !state.is_loading {
                    return state.clone();
                }
            }
            if self.receiver.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Moves this observation to another key
    ///
    /// Work for the previous key is cancelled if no one else observes it.
    pub fn switch(&mut self, key: impl Into<String>) {
        let key = key.into();
        if key == self.key {
            return;
        }
        self.shared.detach(&self.key);
        self.receiver = self.shared.attach(&key);
        self.key = key;
    }
}

impl<T: Resource> Drop for Observation<T> {
    fn drop(&mut self) {
        self.shared.detach(&self.key);
    }
}

/// Callback registration returned by [`Fetcher::subscribe`]
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    /// Stops delivering states to the callback
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_state_default_is_cold() {
        let state: FetchState<u32> = FetchState::default();
        assert!(state.value.is_none());
        assert!(!state.is_loading);
        assert!(!state.is_error);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_loading_state_keeps_value() {
        let state = FetchState::loading(Some(7));
        assert_eq!(state.value, Some(7));
        assert!(state.is_loading);
        assert!(!state.is_error);
    }

    #[test]
    fn test_ready_state() {
        let state = FetchState::ready("x");
        assert_eq!(state.value, Some("x"));
        assert!(!state.is_loading);
    }
}
