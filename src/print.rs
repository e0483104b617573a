//! One-shot scan that logs the usage of every workflow

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use gha_usage_core::usage::{Usage, UsageFetcher, WorkflowUsage};

/// Entries ordered by repository, then workflow name
pub fn sorted_workflows(usage: &Usage) -> Vec<&WorkflowUsage> {
    let mut workflows: Vec<_> = usage.workflows.iter().collect();
    workflows.sort_by(|a, b| {
        a.repo
            .cmp(&b.repo)
            .then_with(|| a.workflow_name.cmp(&b.workflow_name))
            .then_with(|| a.workflow_id.cmp(&b.workflow_id))
    });
    workflows
}

/// Run a single scan and log its result
pub async fn print_usage(fetcher: &dyn UsageFetcher, cancel: &CancellationToken) -> Result<Usage> {
    let usage = fetcher
        .fetch(cancel)
        .await
        .context("Could not retrieve usage data")?;

    for workflow in sorted_workflows(&usage) {
        info!(
            owner = %workflow.owner,
            repo = %workflow.repo,
            workflow = %workflow.workflow_name,
            workflow_id = workflow.workflow_id,
            billable_time = ?workflow.billable_time,
            "Workflow usage"
        );
    }
    info!(active_repos = usage.active_repos, "Active repositories");

    Ok(usage)
}
