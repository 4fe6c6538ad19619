//! Log output for the command-line front end
//!
//! The library only emits `tracing` events; the binary installs a fmt
//! subscriber writing to stderr so stdout stays machine-readable.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Environment variable that overrides the verbosity flags
pub const LOG_ENV: &str = "CACHEFETCH_LOG";

#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber was already installed
    #[error("failed to initialize logging: {0}")]
    Init(String),
}

/// Maps the number of `-v` flags to a level name
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber
///
/// `CACHEFETCH_LOG` takes precedence over `verbosity` when it is set.
pub fn init_logging(verbosity: u8) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,cachefetch={}", level_for(verbosity))));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|err| LoggingError::Init(err.to_string()))
}
