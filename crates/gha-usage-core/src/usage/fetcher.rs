//! Organization-wide usage scan.
//!
//! One scan fans out as a task tree under a single [`TaskGroup`]:
//!
//! ```text
//! repository pages (inline, sequential)
//!   └─ per active repository: list workflows
//!        └─ per workflow: fetch billable time  ──► result channel
//! ```
//!
//! The first failing call cancels the whole tree and becomes the scan's
//! error; the scan returns only once every task has finished.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::group::TaskGroup;
use super::scanner::{scan_repo_workflows, ActivityFilter, RepoScanner};
use super::types::{billable_time, FetchError, Usage, WorkflowUsage};
use crate::clock::{Clock, SystemClock};
use crate::config::Settings;
use crate::github::{ActionsApi, Repository, Workflow};

/// Produces a fresh [`Usage`] snapshot on demand
#[async_trait]
pub trait UsageFetcher: Send + Sync {
    /// Run one complete scan; cancelling `cancel` aborts it with [`FetchError::Cancelled`]
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Usage, FetchError>;
}

/// Scans every recently pushed repository of one organization
pub struct OrgUsageFetcher {
    api: Arc<dyn ActionsApi>,
    clock: Arc<dyn Clock>,
    org: String,
    filter: ActivityFilter,
    repo_page_size: u32,
    workflow_page_size: u32,
    leaf_permits: Option<Arc<Semaphore>>,
}

/// State shared by all tasks of one scan
struct ScanContext {
    api: Arc<dyn ActionsApi>,
    org: String,
    workflow_page_size: u32,
    leaf_permits: Option<Arc<Semaphore>>,
}

impl OrgUsageFetcher {
    /// Fetcher with default page sizes and no concurrency limit
    pub fn new(api: Arc<dyn ActionsApi>, org: impl Into<String>, max_last_pushed: Duration) -> Self {
        Self {
            api,
            clock: Arc::new(SystemClock),
            org: org.into(),
            filter: ActivityFilter::new(max_last_pushed),
            repo_page_size: 100,
            workflow_page_size: 10,
            leaf_permits: None,
        }
    }

    /// Fetcher configured from settings
    pub fn from_settings(api: Arc<dyn ActionsApi>, settings: &Settings) -> Self {
        Self::new(api, settings.organization.clone(), settings.max_last_pushed())
            .with_page_sizes(settings.scan.repo_page_size, settings.scan.workflow_page_size)
            .with_concurrency_limit(settings.scan.concurrency_limit)
    }

    /// Use another clock for the activity classification
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_page_sizes(mut self, repo_page_size: u32, workflow_page_size: u32) -> Self {
        self.repo_page_size = repo_page_size;
        self.workflow_page_size = workflow_page_size;
        self
    }

    /// Cap the number of in-flight usage calls (`None` = unbounded)
    pub fn with_concurrency_limit(mut self, limit: Option<usize>) -> Self {
        self.leaf_permits =
            limit.map(|n| Arc::new(Semaphore::new(n.clamp(1, Semaphore::MAX_PERMITS))));
        self
    }

    /// Spawn the workflow listing of `repo`, which in turn spawns one task per workflow
    fn spawn_repo(
        group: &TaskGroup,
        ctx: &Arc<ScanContext>,
        repo: Repository,
        results: &mpsc::UnboundedSender<WorkflowUsage>,
    ) {
        let inner = group.clone();
        let ctx = Arc::clone(ctx);
        let results = results.clone();

        group.spawn(async move {
            let workflows =
                scan_repo_workflows(ctx.api.as_ref(), &ctx.org, &repo.name, ctx.workflow_page_size)
                    .await?;

            debug!(
                owner = %ctx.org,
                repo = %repo.name,
                workflow_count = workflows.len(),
                "Collecting data for repo"
            );

            let repo: Arc<str> = Arc::from(repo.name);
            for workflow in workflows {
                inner.spawn(fetch_workflow_usage(
                    Arc::clone(&ctx),
                    Arc::clone(&repo),
                    workflow,
                    results.clone(),
                ));
            }
            Ok(())
        });
    }
}

#[async_trait]
impl UsageFetcher for OrgUsageFetcher {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Usage, FetchError> {
        let group = TaskGroup::new(cancel);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(ScanContext {
            api: Arc::clone(&self.api),
            org: self.org.clone(),
            workflow_page_size: self.workflow_page_size,
            leaf_permits: self.leaf_permits.clone(),
        });
        let now = self.clock.now();

        let scanner = RepoScanner::new(self.filter, self.repo_page_size);
        let scan = scanner.scan(self.api.as_ref(), &self.org, now, |repo| {
            Self::spawn_repo(&group, &ctx, repo, &results_tx);
        });

        let active_repos = tokio::select! {
            biased;
            _ = group.token().cancelled() => 0,
            result = scan => match result {
                Ok(count) => count,
                Err(err) => {
                    group.fail(err.into());
                    0
                }
            },
        };
        drop(results_tx);

        group.wait().await?;

        let mut workflows = Vec::new();
        while let Ok(usage) = results_rx.try_recv() {
            workflows.push(usage);
        }

        info!(
            owner = %self.org,
            active_repos,
            workflows = workflows.len(),
            "Usage scan complete"
        );

        Ok(Usage {
            active_repos,
            workflows,
        })
    }
}

/// Fetch the billable time of one workflow and send it to the collector
async fn fetch_workflow_usage(
    ctx: Arc<ScanContext>,
    repo: Arc<str>,
    workflow: Workflow,
    results: mpsc::UnboundedSender<WorkflowUsage>,
) -> Result<(), FetchError> {
    let _permit = match &ctx.leaf_permits {
        Some(permits) => Some(
            Arc::clone(permits)
                .acquire_owned()
                .await
                .map_err(|_| FetchError::Cancelled)?,
        ),
        None => None,
    };

    let timing = ctx
        .api
        .get_workflow_usage(&ctx.org, &repo, workflow.id)
        .await?;

    debug!(
        owner = %ctx.org,
        repo = %repo,
        workflow = %workflow.name,
        "Collected usage info"
    );

    // The receiver lives until every task of the scan has finished
    let _ = results.send(WorkflowUsage {
        owner: ctx.org.clone(),
        repo: repo.to_string(),
        workflow_name: workflow.name,
        workflow_id: workflow.id,
        billable_time: billable_time(&timing),
    });
    Ok(())
}
