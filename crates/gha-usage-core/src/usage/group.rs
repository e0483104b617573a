//! Structured fan-out for one scan: shared cancellation, first error wins,
//! and a single barrier over every task spawned at any depth.

use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::types::FetchError;

/// Group of tasks that succeed together or fail with the first error.
///
/// Cloning yields another handle to the same group, so a task can spawn
/// children that the same [`TaskGroup::wait`] call waits for.
#[derive(Clone)]
pub struct TaskGroup {
    tracker: TaskTracker,
    token: CancellationToken,
    first_error: Arc<Mutex<Option<FetchError>>>,
}

impl TaskGroup {
    /// Create a group that is also cancelled when `parent` is
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: parent.child_token(),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Token cancelled on the first failure (or by the parent)
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run `task` on the runtime; it is dropped as soon as the group is cancelled
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        let group = self.clone();
        self.tracker.spawn(async move {
            let result = tokio::select! {
                biased;
                _ = group.token.cancelled() => return,
                result = task => result,
            };
            if let Err(err) = result {
                group.fail(err);
            }
        });
    }

    /// Record `err` if it is the first one and cancel the group
    pub fn fail(&self, err: FetchError) {
        let mut slot = self.first_error.lock();
        if slot.is_none() {
            *slot = Some(err);
            self.token.cancel();
        }
    }

    /// Wait for every task, including ones spawned while waiting.
    ///
    /// Returns the first error, or [`FetchError::Cancelled`] if the parent
    /// cancelled the group without any task failing.
    pub async fn wait(self) -> Result<(), FetchError> {
        self.tracker.close();
        self.tracker.wait().await;

        if let Some(err) = self.first_error.lock().take() {
            return Err(err);
        }
        if self.token.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }
}
