//! In-memory [`ActionsApi`] used by unit tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::{ActionsApi, ApiError, Page, Repository, Workflow, WorkflowBill, WorkflowTiming};

/// Fake organization with canned pages and call recording
#[derive(Default)]
pub(crate) struct FakeActionsApi {
    repo_pages: Vec<Vec<Repository>>,
    workflow_pages: Vec<Vec<Workflow>>,
    billable_ms: HashMap<String, u64>,
    failing_usage: Option<(String, u64)>,
    failing_repo_page: Option<u32>,
    jitter: bool,
    usage_delay: Option<Duration>,
    /// Repository pages requested, in order (1-based)
    pub repo_pages_requested: Mutex<Vec<u32>>,
    /// Repositories whose workflows were listed
    pub workflow_listings: Mutex<Vec<String>>,
    /// Number of usage calls that were started
    pub usage_calls: AtomicUsize,
    /// Number of usage calls that returned
    pub usage_calls_completed: AtomicUsize,
    /// Usage calls currently running
    usage_in_flight: AtomicUsize,
    /// Highest number of usage calls seen running at once
    pub max_usage_in_flight: AtomicUsize,
}

impl FakeActionsApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo_pages(mut self, pages: Vec<Vec<Repository>>) -> Self {
        self.repo_pages = pages;
        self
    }

    /// Workflow pages served for every repository
    pub fn with_workflow_pages(mut self, pages: Vec<Vec<Workflow>>) -> Self {
        self.workflow_pages = pages;
        self
    }

    pub fn with_billable_ms(mut self, platform: &str, ms: u64) -> Self {
        self.billable_ms.insert(platform.to_string(), ms);
        self
    }

    /// Make the usage call of one workflow fail
    pub fn with_failing_usage(mut self, repo: &str, workflow_id: u64) -> Self {
        self.failing_usage = Some((repo.to_string(), workflow_id));
        self
    }

    /// Make one repository listing page fail
    pub fn with_failing_repo_page(mut self, page: u32) -> Self {
        self.failing_repo_page = Some(page);
        self
    }

    /// Delay every call by a pseudo-random amount derived from its arguments
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Hold every usage call for `delay`
    pub fn with_usage_delay(mut self, delay: Duration) -> Self {
        self.usage_delay = Some(delay);
        self
    }

    async fn jitter(&self, key: impl Hash) {
        if !self.jitter {
            return;
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let h = hasher.finish();
        for _ in 0..(h % 5) {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(h % 7)).await;
    }

    fn page<T: Clone>(pages: &[Vec<T>], page: u32) -> Page<T> {
        let idx = page.saturating_sub(1) as usize;
        let items = pages.get(idx).cloned().unwrap_or_default();
        let next_page = if idx + 1 < pages.len() {
            Some(page + 1)
        } else {
            None
        };
        Page { items, next_page }
    }
}

fn fake_error(url: String) -> ApiError {
    ApiError::Status {
        status: 502,
        url,
        message: "Bad Gateway".to_string(),
    }
}

#[async_trait]
impl ActionsApi for FakeActionsApi {
    async fn list_org_repositories(
        &self,
        org: &str,
        page: Option<u32>,
        _per_page: u32,
    ) -> Result<Page<Repository>, ApiError> {
        let page = page.unwrap_or(1);
        self.repo_pages_requested.lock().push(page);
        self.jitter(("repos", page)).await;

        if self.failing_repo_page == Some(page) {
            return Err(fake_error(format!("/orgs/{}/repos?page={}", org, page)));
        }
        Ok(Self::page(&self.repo_pages, page))
    }

    async fn list_repository_workflows(
        &self,
        _org: &str,
        repo: &str,
        page: Option<u32>,
        _per_page: u32,
    ) -> Result<Page<Workflow>, ApiError> {
        let page = page.unwrap_or(1);
        if page == 1 {
            self.workflow_listings.lock().push(repo.to_string());
        }
        self.jitter((repo, page)).await;
        Ok(Self::page(&self.workflow_pages, page))
    }

    async fn get_workflow_usage(
        &self,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<WorkflowTiming, ApiError> {
        self.usage_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.usage_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_usage_in_flight.fetch_max(running, Ordering::SeqCst);

        self.jitter((repo, workflow_id)).await;
        if let Some(delay) = self.usage_delay {
            tokio::time::sleep(delay).await;
        }

        self.usage_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.usage_calls_completed.fetch_add(1, Ordering::SeqCst);

        if self
            .failing_usage
            .as_ref()
            .is_some_and(|(r, id)| r == repo && *id == workflow_id)
        {
            return Err(fake_error(format!(
                "/repos/{}/{}/actions/workflows/{}/timing",
                org, repo, workflow_id
            )));
        }

        Ok(WorkflowTiming {
            billable: self
                .billable_ms
                .iter()
                .map(|(platform, ms)| (platform.clone(), WorkflowBill { total_ms: *ms }))
                .collect(),
        })
    }
}

/// Repository pushed at `pushed_at`
pub(crate) fn repo(name: &str, pushed_at: DateTime<Utc>) -> Repository {
    Repository {
        name: name.to_string(),
        pushed_at: Some(pushed_at),
    }
}

pub(crate) fn workflow(id: u64, name: &str) -> Workflow {
    Workflow {
        id,
        name: name.to_string(),
    }
}
