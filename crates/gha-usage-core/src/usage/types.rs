//! Usage snapshot types produced by one organization scan.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::github::{ApiError, WorkflowTiming};

/// Billable time of one workflow, per runner platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowUsage {
    /// Organization that owns the repository
    pub owner: String,
    pub repo: String,
    pub workflow_name: String,
    pub workflow_id: u64,
    /// Billable time keyed by platform label ("UBUNTU", "WINDOWS", "MACOS")
    pub billable_time: BTreeMap<String, Duration>,
}

/// Result of one complete scan.
///
/// Either fully populated or never produced: a failed scan yields an error,
/// not a partial `Usage`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    /// Repositories pushed to within the staleness threshold during this scan
    pub active_repos: usize,
    /// One entry per (repo, workflow); order is not meaningful
    pub workflows: Vec<WorkflowUsage>,
}

/// Why a scan did not produce a [`Usage`]
#[derive(Debug, Error)]
pub enum FetchError {
    /// A GitHub call failed; the scan was aborted
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The scan was cancelled from outside (shutdown)
    #[error("usage scan cancelled")]
    Cancelled,
}

/// Convert GitHub's per-platform millisecond totals to durations
pub fn billable_time(timing: &WorkflowTiming) -> BTreeMap<String, Duration> {
    timing
        .billable
        .iter()
        .map(|(platform, bill)| (platform.clone(), Duration::from_millis(bill.total_ms)))
        .collect()
}
