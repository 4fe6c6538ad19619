//! Wall-clock timestamps that follow the Tokio clock
//!
//! Cache entries are persisted with a UTC timestamp, while eviction and retry
//! timers run on Tokio's clock. `Clock` anchors one to the other so ages and
//! timers always agree, including when the Tokio clock is paused in tests.

use chrono::{DateTime, SubsecRound, Utc};
use tokio::time::Instant;

/// Source of "now" for cache ages
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    wall: DateTime<Utc>,
    anchor: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    /// Anchors a new clock at the current wall time
    ///
    /// The anchor is truncated to milliseconds, the precision entries are
    /// persisted with.
    pub fn new() -> Self {
        Self {
            wall: Utc::now().trunc_subsecs(3),
            anchor: Instant::now(),
        }
    }

    /// Current UTC time as seen through the Tokio clock
    pub fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.anchor.elapsed()).unwrap_or_else(|_| chrono::Duration::zero());
        self.wall + elapsed
    }

    /// Age of a timestamp; timestamps in the future count as age zero
    pub fn age_of(&self, at: DateTime<Utc>) -> std::time::Duration {
        (self.now() - at).to_std().unwrap_or_default()
    }
}
