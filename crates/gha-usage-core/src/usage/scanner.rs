//! Repository and workflow listings on top of [`paginate`].

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::paginate::{paginate, PageOutcome};
use crate::github::{ActionsApi, ApiError, Repository, Workflow};

/// Classifies repositories by time since their last push
#[derive(Debug, Clone, Copy)]
pub struct ActivityFilter {
    max_last_pushed: chrono::Duration,
}

impl ActivityFilter {
    pub fn new(max_last_pushed: std::time::Duration) -> Self {
        Self {
            max_last_pushed: chrono::Duration::from_std(max_last_pushed)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Whether `repo` was pushed to less than the threshold before `now`.
    ///
    /// Repositories that were never pushed are inactive.
    pub fn is_active(&self, repo: &Repository, now: DateTime<Utc>) -> bool {
        repo.pushed_at
            .is_some_and(|pushed_at| now - pushed_at < self.max_last_pushed)
    }
}

/// Walks an organization's repositories, most recently pushed first
#[derive(Debug, Clone, Copy)]
pub struct RepoScanner {
    filter: ActivityFilter,
    per_page: u32,
}

impl RepoScanner {
    pub fn new(filter: ActivityFilter, per_page: u32) -> Self {
        Self { filter, per_page }
    }

    /// Hand every active repository to `on_active` and return how many there were.
    ///
    /// Stops after the first page made only of inactive repositories: the
    /// listing is sorted by push time, so no later page can hold an active one.
    /// A push during the scan shifts the offset-based pages, so a repository
    /// already seen on an earlier page is skipped.
    pub async fn scan<F>(
        &self,
        api: &dyn ActionsApi,
        org: &str,
        now: DateTime<Utc>,
        mut on_active: F,
    ) -> Result<usize, ApiError>
    where
        F: FnMut(Repository),
    {
        let mut active_repos = 0;
        let mut seen = HashSet::new();

        paginate(
            |page| api.list_org_repositories(org, page, self.per_page),
            |repos| {
                info!(length = repos.len(), "New batch of repositories");

                let mut fresh = 0;
                let mut inactive = 0;

                for repo in repos {
                    if !seen.insert(repo.name.clone()) {
                        debug!(repo = %repo.name, "Repository listed twice, skipping");
                        continue;
                    }
                    fresh += 1;
                    if !self.filter.is_active(&repo, now) {
                        inactive += 1;
                        continue;
                    }
                    active_repos += 1;
                    on_active(repo);
                }

                if fresh > 0 && inactive == fresh {
                    info!("Got a full batch of inactive repositories, stopping");
                    return Ok(PageOutcome::Stop);
                }
                Ok(PageOutcome::Continue)
            },
        )
        .await?;

        Ok(active_repos)
    }
}

/// Every workflow definition of one repository, across all pages
pub async fn scan_repo_workflows(
    api: &dyn ActionsApi,
    org: &str,
    repo: &str,
    per_page: u32,
) -> Result<Vec<Workflow>, ApiError> {
    let mut workflows = Vec::new();
    let mut seen = HashSet::new();

    paginate(
        |page| api.list_repository_workflows(org, repo, page, per_page),
        |batch| {
            workflows.extend(batch.into_iter().filter(|w: &Workflow| seen.insert(w.id)));
            Ok(PageOutcome::Continue)
        },
    )
    .await?;

    Ok(workflows)
}
