//! GitHub REST API access for the usage scan.
//!
//! The scan only talks to GitHub through [`ActionsApi`], so the traversal
//! can run against the real [`GithubClient`] or an in-memory fake.

mod client;
#[cfg(test)]
pub(crate) mod fake;
mod types;

use async_trait::async_trait;

pub use client::{parse_next_page, GithubClient, DEFAULT_API_URL};
pub use types::{ApiError, Page, Repository, Workflow, WorkflowBill, WorkflowTiming};

/// The three GitHub endpoints the usage scan depends on.
#[async_trait]
pub trait ActionsApi: Send + Sync {
    /// List an organization's repositories, most recently pushed first.
    ///
    /// `page` is 1-based; `None` requests the first page.
    async fn list_org_repositories(
        &self,
        org: &str,
        page: Option<u32>,
        per_page: u32,
    ) -> Result<Page<Repository>, ApiError>;

    /// List the workflow definitions of one repository.
    async fn list_repository_workflows(
        &self,
        org: &str,
        repo: &str,
        page: Option<u32>,
        per_page: u32,
    ) -> Result<Page<Workflow>, ApiError>;

    /// Billable time of one workflow in the current billing cycle.
    async fn get_workflow_usage(
        &self,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<WorkflowTiming, ApiError>;
}
