//! Wire types for the GitHub REST endpoints used by the usage scan.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Error type for GitHub API calls
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, TLS, connection reset...)
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The API answered with a non-success status
    #[error("GitHub API returned {status} for {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    /// The response body did not match the expected shape
    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The rate limit is exhausted and the reset is too far away to wait for
    #[error("rate limit exhausted for {url}, resets at {reset_at}")]
    RateLimited { url: String, reset_at: DateTime<Utc> },

    /// The configured token cannot be sent as a header
    #[error("GitHub token contains characters that are not valid in a header")]
    InvalidToken,
}

/// A repository entry from `GET /orgs/{org}/repos`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    /// Repository name, without the owner prefix
    pub name: String,
    /// Last push; `null` for repositories that were never pushed to
    #[serde(default)]
    pub pushed_at: Option<DateTime<Utc>>,
}

/// A workflow definition from `GET /repos/{owner}/{repo}/actions/workflows`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Workflow {
    pub id: u64,
    pub name: String,
}

/// Envelope of the workflow listing endpoint
#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowList {
    #[serde(default)]
    pub workflows: Vec<Workflow>,
}

/// Billable time of one runner platform
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkflowBill {
    /// Total billable milliseconds for the current billing cycle
    #[serde(default)]
    pub total_ms: u64,
}

/// Response of `GET /repos/{owner}/{repo}/actions/workflows/{id}/timing`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WorkflowTiming {
    /// Billable time keyed by runner platform ("UBUNTU", "MACOS", "WINDOWS")
    #[serde(default)]
    pub billable: HashMap<String, WorkflowBill>,
}

/// One page of a paginated listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based number of the following page, `None` on the last page
    pub next_page: Option<u32>,
}

impl<T> Page<T> {
    /// A page with no successor
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_repository_deserialize() {
        let json = r#"[
            {"id": 1, "name": "api", "pushed_at": "2024-03-01T10:00:00Z", "private": true},
            {"id": 2, "name": "empty", "pushed_at": null}
        ]"#;
        let repos: Vec<Repository> = serde_json::from_str(json).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "api");
        assert_eq!(
            repos[0].pushed_at,
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
        );
        assert!(repos[1].pushed_at.is_none());
    }

    #[test]
    fn test_workflow_timing_deserialize() {
        let json = r#"{
            "billable": {
                "UBUNTU": {"total_ms": 180000, "jobs": 1, "job_runs": []},
                "MACOS": {"total_ms": 0}
            }
        }"#;
        let timing: WorkflowTiming = serde_json::from_str(json).unwrap();
        assert_eq!(timing.billable["UBUNTU"].total_ms, 180_000);
        assert_eq!(timing.billable["MACOS"].total_ms, 0);
    }

    #[test]
    fn test_workflow_timing_without_billable() {
        let timing: WorkflowTiming = serde_json::from_str("{}").unwrap();
        assert!(timing.billable.is_empty());
    }

    #[test]
    fn test_workflow_list_deserialize() {
        let json = r#"{"total_count": 2, "workflows": [
            {"id": 161335, "name": "CI", "state": "active"},
            {"id": 269289, "name": "Release", "state": "active"}
        ]}"#;
        let list: WorkflowList = serde_json::from_str(json).unwrap();
        assert_eq!(
            list.workflows,
            vec![
                Workflow {
                    id: 161335,
                    name: "CI".to_string()
                },
                Workflow {
                    id: 269289,
                    name: "Release".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 404,
            url: "https://api.github.com/orgs/acme/repos".to_string(),
            message: "Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "GitHub API returned 404 for https://api.github.com/orgs/acme/repos: Not Found"
        );
    }
}
