//! Usage aggregation: scan an organization's repositories and workflows
//! and fold their billable time into one [`Usage`] snapshot.

mod fetcher;
mod group;
mod paginate;
mod scanner;
mod types;

pub use fetcher::{OrgUsageFetcher, UsageFetcher};
pub use group::TaskGroup;
pub use paginate::{paginate, PageOutcome};
pub use scanner::{scan_repo_workflows, ActivityFilter, RepoScanner};
pub use types::{billable_time, FetchError, Usage, WorkflowUsage};
