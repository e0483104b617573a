use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::usage::Usage;

/// Shared usage store
pub type SharedStore = Arc<UsageStore>;

/// Latest published usage together with refresh metadata
#[derive(Debug, Clone, Default)]
pub struct UsageSnapshot {
    /// Usage of the last successful scan (empty before the first one)
    pub usage: Arc<Usage>,
    /// When the last successful refresh finished
    pub refreshed_at: Option<DateTime<Utc>>,
    /// How long the last successful refresh took
    pub refresh_duration: Option<Duration>,
}

impl UsageSnapshot {
    /// Whether a refresh has ever been published
    pub fn is_populated(&self) -> bool {
        self.refreshed_at.is_some()
    }
}

/// Holds the latest [`UsageSnapshot`].
///
/// Writers replace the whole snapshot at once, so readers never observe
/// usage from one scan with metadata from another.
#[derive(Debug, Default)]
pub struct UsageStore {
    snapshot: RwLock<UsageSnapshot>,
}

impl UsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new shared store
    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }

    /// Replace the current snapshot with the result of a successful refresh
    pub fn publish(&self, usage: Usage, refreshed_at: DateTime<Utc>, refresh_duration: Duration) {
        let snapshot = UsageSnapshot {
            usage: Arc::new(usage),
            refreshed_at: Some(refreshed_at),
            refresh_duration: Some(refresh_duration),
        };
        *self.snapshot.write() = snapshot;
    }

    /// Cheap copy of the current snapshot (the usage itself is shared)
    pub fn snapshot(&self) -> UsageSnapshot {
        self.snapshot.read().clone()
    }

    /// Run `f` against the current snapshot under the read lock
    pub fn with_snapshot<R>(&self, f: impl FnOnce(&UsageSnapshot) -> R) -> R {
        f(&self.snapshot.read())
    }
}
