//! Prometheus exposition of the usage snapshot

use gha_usage_core::state::SharedStore;
use parking_lot::Mutex;
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Gauge, GaugeVec, IntGaugeVec, Opts, Registry};

const NAMESPACE: &str = "github_actions";

/// Collector that renders the current snapshot on every scrape.
///
/// Series are rebuilt from scratch each time, so workflows that disappear
/// from the snapshot also disappear from the exposition.
pub struct UsageCollector {
    store: SharedStore,
    owner: String,
    /// Serializes scrapes, since each one resets and refills the vectors
    scrape: Mutex<()>,
    billable_time: GaugeVec,
    active_repos: IntGaugeVec,
    last_refresh_time: Gauge,
    last_refresh_duration: Gauge,
}

impl UsageCollector {
    /// Create a collector for the usage of `owner` held in `store`
    pub fn new(store: SharedStore, owner: impl Into<String>) -> prometheus::Result<Self> {
        let billable_time = GaugeVec::new(
            Opts::new(
                "workflow_billable_time_seconds",
                "Billable time of a workflow in the current billing cycle, per runner platform",
            )
            .namespace(NAMESPACE),
            &["owner", "repo", "workflow", "workflow_id", "platform"],
        )?;
        let active_repos = IntGaugeVec::new(
            Opts::new(
                "active_repositories",
                "Repositories pushed to within the staleness threshold",
            )
            .namespace(NAMESPACE),
            &["owner"],
        )?;
        let last_refresh_time = Gauge::with_opts(
            Opts::new(
                "usage_last_refresh_timestamp_seconds",
                "Unix time at which the last successful refresh finished",
            )
            .namespace(NAMESPACE),
        )?;
        let last_refresh_duration = Gauge::with_opts(
            Opts::new(
                "usage_last_refresh_duration_seconds",
                "Duration of the last successful refresh",
            )
            .namespace(NAMESPACE),
        )?;

        Ok(Self {
            store,
            owner: owner.into(),
            scrape: Mutex::new(()),
            billable_time,
            active_repos,
            last_refresh_time,
            last_refresh_duration,
        })
    }

    /// Create a registry holding this collector and, on Linux, the
    /// CPU/memory/file-descriptor metrics of the exporter process
    pub fn registry(self) -> prometheus::Result<Registry> {
        let registry = Registry::new();
        registry.register(Box::new(self))?;
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;
        Ok(registry)
    }
}

impl Collector for UsageCollector {
    fn desc(&self) -> Vec<&Desc> {
        self.billable_time
            .desc()
            .into_iter()
            .chain(self.active_repos.desc())
            .chain(self.last_refresh_time.desc())
            .chain(self.last_refresh_duration.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let _scrape = self.scrape.lock();
        self.billable_time.reset();
        self.active_repos.reset();

        let refreshed = self.store.with_snapshot(|snapshot| {
            for workflow in &snapshot.usage.workflows {
                let workflow_id = workflow.workflow_id.to_string();
                for (platform, billable) in &workflow.billable_time {
                    self.billable_time
                        .with_label_values(&[
                            workflow.owner.as_str(),
                            workflow.repo.as_str(),
                            workflow.workflow_name.as_str(),
                            workflow_id.as_str(),
                            platform.as_str(),
                        ])
                        .set(billable.as_secs_f64());
                }
            }
            self.active_repos
                .with_label_values(&[self.owner.as_str()])
                .set(snapshot.usage.active_repos as i64);

            snapshot.refreshed_at.zip(snapshot.refresh_duration)
        });

        let mut families = self.billable_time.collect();
        families.extend(self.active_repos.collect());

        // Refresh metadata only exists once a refresh succeeded
        if let Some((refreshed_at, took)) = refreshed {
            self.last_refresh_time
                .set(refreshed_at.timestamp_millis() as f64 / 1000.0);
            self.last_refresh_duration.set(took.as_secs_f64());
            families.extend(self.last_refresh_time.collect());
            families.extend(self.last_refresh_duration.collect());
        }

        families
    }
}
