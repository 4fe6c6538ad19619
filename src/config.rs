//! Tuning knobs for the cached fetcher
//!
//! Freshness, eviction and retry behaviour are all driven by `FetchConfig`.
//! The defaults match a typical "stale after five minutes, gone after ten"
//! policy with three retries.

use std::time::Duration;

use thiserror::Error;

/// Errors raised when a configuration is inconsistent
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Entries would be evicted before they ever became stale
    #[error("evict_after ({evict_after:?}) must not be shorter than stale_after ({stale_after:?})")]
    EvictBeforeStale {
        stale_after: Duration,
        evict_after: Duration,
    },
}

/// Configuration for freshness, eviction and retries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Age past which a cached value is revalidated in the background
    pub stale_after: Duration,
    /// Age past which a cached value is discarded
    pub evict_after: Duration,
    /// Number of retries after the first failed attempt
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub initial_retry_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(5 * 60),   // 5 minutes
            evict_after: Duration::from_secs(10 * 60),  // 10 minutes
            max_retries: 3,
            initial_retry_delay: Duration::from_millis(1000),
        }
    }
}

impl FetchConfig {
    /// Checks that the windows are ordered sensibly
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evict_after < self.stale_after {
            return Err(ConfigError::EvictBeforeStale {
                stale_after: self.stale_after,
                evict_after: self.evict_after,
            });
        }
        Ok(())
    }

    /// Delay before the retry that follows failed attempt number `attempt`
    ///
    /// `initial_retry_delay * 2^attempt`, saturating instead of overflowing.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_retry_delay.saturating_mul(factor)
    }

    /// Whether a value of the given age must be revalidated
    pub fn is_stale(&self, age: Duration) -> bool {
        age >= self.stale_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(300));
        assert_eq!(config.evict_after, Duration::from_secs(600));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.initial_retry_delay, Duration::from_millis(1000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_delay_doubles_per_attempt() {
        let config = FetchConfig::default();
        assert_eq!(config.retry_delay(0), Duration::from_millis(1000));
        assert_eq!(config.retry_delay(1), Duration::from_millis(2000));
        assert_eq!(config.retry_delay(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_retry_delay_saturates() {
        let config = FetchConfig::default();
        assert_eq!(config.retry_delay(64), config.initial_retry_delay.saturating_mul(u32::MAX));
    }

    #[test]
    fn test_validate_rejects_evict_before_stale() {
        let config = FetchConfig {
            stale_after: Duration::from_secs(60),
            evict_after: Duration::from_secs(30),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("evict_after"));
    }

    #[test]
    fn test_is_stale_boundary() {
        let config = FetchConfig {
            stale_after: Duration::from_millis(5000),
            ..Default::default()
        };
        assert!(!config.is_stale(Duration::from_millis(4999)));
        assert!(config.is_stale(Duration::from_millis(5000)));
    }
}
