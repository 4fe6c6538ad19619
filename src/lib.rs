//! cachefetch library
//!
//! A cached resource fetcher: serves cached values while fresh, revalidates
//! stale ones in the background, retries failed fetches with exponential
//! backoff, cancels work nobody observes any more and evicts old entries.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod fetcher;
pub mod logging;
pub mod transport;

pub use cache::{CacheStore, FileStore, KeyValueStore, MemoryStore};
pub use config::FetchConfig;
pub use fetcher::{FetchState, Fetcher, Observation, Resource, Subscription};
pub use transport::{FetchError, HttpTransport, Transport};
