use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::state::SharedStore;
use crate::usage::{FetchError, UsageFetcher};

/// Keeps a [`SharedStore`] up to date on a fixed period
pub struct UsageRefresher {
    fetcher: Arc<dyn UsageFetcher>,
    store: SharedStore,
    clock: Arc<dyn Clock>,
    period: Duration,
}

impl UsageRefresher {
    /// Create a new refresher
    pub fn new(fetcher: Arc<dyn UsageFetcher>, store: SharedStore, period: Duration) -> Self {
        Self {
            fetcher,
            store,
            clock: Arc::new(SystemClock),
            period,
        }
    }

    /// Use `clock` for refresh timestamps and durations
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run one scan and publish it on success.
    ///
    /// A failed or cancelled scan leaves the previous snapshot untouched.
    /// Returns whether a new snapshot was published.
    pub async fn refresh(&self, cancel: &CancellationToken) -> bool {
        info!("Refreshing usage data");
        let start = self.clock.now();

        match self.fetcher.fetch(cancel).await {
            Ok(usage) => {
                let end = self.clock.now();
                let took = self.clock.elapsed(start, end);
                let workflows = usage.workflows.len();
                let active_repos = usage.active_repos;

                self.store.publish(usage, end, took);
                info!(
                    active_repos,
                    workflows,
                    duration_secs = took.as_secs_f64(),
                    "Done refreshing usage data"
                );
                true
            }
            Err(FetchError::Cancelled) => {
                debug!("Usage refresh cancelled");
                false
            }
            Err(err) => {
                error!(error = %err, "Could not retrieve updated usage data");
                false
            }
        }
    }

    /// Start refreshing in a background task, beginning immediately
    pub fn start(self) -> RefresherHandle {
        let token = CancellationToken::new();
        let (ready_tx, ready_rx) = watch::channel(false);

        let task = {
            let token = token.clone();
            tokio::spawn(async move {
                self.run(token, ready_tx).await;
            })
        };

        RefresherHandle {
            token,
            ready: ready_rx,
            task: Some(task),
        }
    }

    /// Run the refresh loop until `cancel` fires
    async fn run(self, cancel: CancellationToken, ready_tx: watch::Sender<bool>) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.refresh(&cancel).await {
                ready_tx.send_if_modified(|ready| !std::mem::replace(ready, true));
            }
        }

        debug!("Usage refresher stopped");
    }
}

/// Handle to a running [`UsageRefresher`].
///
/// Dropping the handle stops the refresher; [`RefresherHandle::shutdown`]
/// additionally waits for it to finish.
pub struct RefresherHandle {
    token: CancellationToken,
    ready: watch::Receiver<bool>,
    task: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    /// Whether a refresh has succeeded yet
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the first successful refresh.
    ///
    /// Returns `false` if the refresher stopped before ever succeeding.
    pub async fn ready(&self) -> bool {
        let mut ready = self.ready.clone();
        let became_ready = ready.wait_for(|ready| *ready).await.is_ok();
        became_ready
    }

    /// Readiness flag for observers that outlive a borrow of the handle
    pub fn ready_receiver(&self) -> watch::Receiver<bool> {
        self.ready.clone()
    }

    /// Cancel the refresher (including an in-flight scan) and wait for it to stop
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Usage refresher task failed");
            }
        }
    }
}

impl Drop for RefresherHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
