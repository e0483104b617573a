//! Wall-clock access, injectable so refresh timing can be tested.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of timestamps for repository classification and refresh metadata
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;

    /// Time between two readings of [`Clock::now`], zero if `end` precedes `start`
    fn elapsed(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Duration {
        (end - start).to_std().unwrap_or_default()
    }
}

/// The system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
