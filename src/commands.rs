//! Subcommand implementations
//!
//! Every command builds a cache store from the run configuration; `get`
//! additionally drives a fetcher over the given transport. Output goes to
//! the supplied writer, one JSON document per line for `get` and `inspect`.

use std::io::Write;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::cache::{CacheStore, FileStore, KeyValueStore, MemoryStore};
use crate::cli::{CliError, Command, RunConfig, StoreChoice};
use crate::clock::Clock;
use crate::fetcher::Fetcher;
use crate::transport::Transport;

/// Builds the cache store selected by the configuration
pub fn build_cache(config: &RunConfig) -> CacheStore {
    let backend: Arc<dyn KeyValueStore> = match &config.store {
        StoreChoice::Memory => Arc::new(MemoryStore::new()),
        StoreChoice::Dir(dir) => Arc::new(FileStore::with_dir(dir.clone())),
    };
    CacheStore::new(backend, Clock::new())
}

/// Runs `command`, writing its output to `out`
///
/// # Returns
/// * `Ok(true)` if every key was served
/// * `Ok(false)` if at least one `get` ended in error
/// * `Err(CliError)` if output could not be written
pub async fn run(
    config: &RunConfig,
    command: &Command,
    transport: Arc<dyn Transport>,
    out: &mut impl Write,
) -> Result<bool, CliError> {
    let cache = build_cache(config);

    match command {
        Command::Get { keys } => {
            let fetcher: Fetcher<Value> = Fetcher::new(config.fetch.clone(), transport, cache);
            get(&fetcher, keys, out).await
        }
        Command::Inspect { keys } => {
            inspect(&cache, config, keys, out)?;
            Ok(true)
        }
        Command::Clear { keys } => {
            let keys = if keys.is_empty() { cache.keys() } else { keys.clone() };
            let cleared = keys.iter().filter(|key| cache.remove(key)).count();
            writeln!(out, "cleared {cleared} entries")?;
            Ok(true)
        }
        Command::Purge => {
            let removed = cache.purge(config.fetch.evict_after);
            writeln!(out, "purged {removed} entries")?;
            Ok(true)
        }
    }
}

async fn get(fetcher: &Fetcher<Value>, keys: &[String], out: &mut impl Write) -> Result<bool, CliError> {
    let observations = keys.iter().map(|key| {
        let mut observation = fetcher.observe(key.as_str());
        async move {
            let state = observation.settled().await;
            (observation.key().to_string(), state)
        }
    });
    let results = futures::future::join_all(observations).await;

    let mut all_ok = true;
    for (key, state) in results {
        all_ok &= !state.is_error;
        let line = json!({
            "key": key,
            "value": state.value,
            "error": state.last_error,
        });
        writeln!(out, "{line}")?;
    }
    Ok(all_ok)
}

/// Reports cache status without removing entries or arming timers
fn inspect(cache: &CacheStore, config: &RunConfig, keys: &[String], out: &mut impl Write) -> Result<(), CliError> {
    for key in keys {
        let line = match cache.peek::<Value>(key) {
            Some(cached) => {
                let status = if cached.age >= config.fetch.evict_after {
                    "expired"
                } else if config.fetch.is_stale(cached.age) {
                    "stale"
                } else {
                    "fresh"
                };
                json!({
                    "key": key,
                    "status": status,
                    "ageMs": cached.age.as_millis() as u64,
                    "fetchedAt": cached.fetched_at.to_rfc3339(),
                })
            }
            None => json!({ "key": key, "status": "missing" }),
        };
        writeln!(out, "{line}")?;
    }
    Ok(())
}
