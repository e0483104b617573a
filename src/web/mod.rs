//! Metrics server
//!
//! Exposes the latest usage snapshot in the Prometheus text format, plus a
//! readiness check.

mod metrics;
mod server;

pub use metrics::UsageCollector;
pub use server::{router, MetricsState, WebServer};
