//! Command-line interface parsing for cachefetch
//!
//! This module handles parsing of CLI arguments using clap and turns them into
//! the fetch configuration and cache location the commands run with.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use thiserror::Error;

use crate::cache::FileStore;
use crate::config::{ConfigError, FetchConfig};

/// Error types for CLI handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The timing options are inconsistent
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No cache directory could be determined
    #[error("could not determine a cache directory; pass --cache-dir or --memory")]
    NoCacheDir,

    /// Writing command output failed
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),
}

/// cachefetch - fetch JSON resources through a local cache
#[derive(Parser, Debug)]
#[command(name = "cachefetch")]
#[command(about = "Fetch JSON resources through a local stale-while-revalidate cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Base URL that relative keys are resolved against
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Directory holding cache entries (defaults to the XDG cache directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Keep the cache in memory only
    #[arg(long, global = true, conflicts_with = "cache_dir")]
    pub memory: bool,

    /// Age in seconds after which a cached value is revalidated
    #[arg(long, global = true, value_name = "SECS", default_value_t = 300)]
    pub stale_after: u64,

    /// Age in seconds after which a cached value is discarded
    #[arg(long, global = true, value_name = "SECS", default_value_t = 600)]
    pub evict_after: u64,

    /// Retries after the first failed request
    #[arg(long, global = true, value_name = "N", default_value_t = 3)]
    pub max_retries: u32,

    /// Base retry delay in milliseconds, doubled on every retry
    #[arg(long, global = true, value_name = "MS", default_value_t = 1000)]
    pub retry_delay: u64,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch keys through the cache and print one JSON line per key
    Get {
        #[arg(required = true, value_name = "KEY")]
        keys: Vec<String>,
    },
    /// Show the cache status of keys without modifying the cache
    Inspect {
        #[arg(required = true, value_name = "KEY")]
        keys: Vec<String>,
    },
    /// Remove the given keys from the cache, or every key when none are given
    Clear {
        #[arg(value_name = "KEY")]
        keys: Vec<String>,
    },
    /// Remove every expired or unreadable cache entry
    Purge,
}

/// Where cache entries are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChoice {
    Memory,
    Dir(PathBuf),
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub fetch: FetchConfig,
    pub store: StoreChoice,
    pub base_url: Option<String>,
}

impl RunConfig {
    /// Creates a RunConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(RunConfig)` with the validated settings
    /// * `Err(CliError)` if the timing options are inconsistent or no cache
    ///   directory is available
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let fetch = FetchConfig {
            stale_after: Duration::from_secs(cli.stale_after),
            evict_after: Duration::from_secs(cli.evict_after),
            max_retries: cli.max_retries,
            initial_retry_delay: Duration::from_millis(cli.retry_delay),
        };
        fetch.validate()?;

        let store = if cli.memory {
            StoreChoice::Memory
        } else {
            let dir = cli
                .cache_dir
                .clone()
                .or_else(|| FileStore::new().map(|store| store.dir().to_path_buf()))
                .ok_or(CliError::NoCacheDir)?;
            StoreChoice::Dir(dir)
        };

        Ok(Self {
            fetch,
            store,
            base_url: cli.base_url.clone(),
        })
    }
}
