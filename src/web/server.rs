//! Metrics server implementation using axum

use std::future::IntoFuture;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gha_usage_core::config::Settings;

/// State shared by the HTTP handlers
#[derive(Clone)]
pub struct MetricsState {
    pub registry: Registry,
    /// Flips to `true` after the first successful refresh
    pub ready: watch::Receiver<bool>,
}

/// Build the router serving `/metrics` and `/healthz`
pub fn router(state: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// GET /metrics - Prometheus text exposition
async fn metrics(State(state): State<MetricsState>) -> Response {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&state.registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, encoder.format_type())], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /healthz - 200 once usage data is available
async fn healthz(State(state): State<MetricsState>) -> StatusCode {
    if *state.ready.borrow() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// HTTP server exposing the usage metrics
pub struct WebServer {
    listen_address: String,
    shutdown_delay: Duration,
    state: MetricsState,
}

impl WebServer {
    /// Create a new web server
    pub fn new(settings: &Settings, state: MetricsState) -> Self {
        Self {
            listen_address: settings.web.listen_address.clone(),
            shutdown_delay: settings.shutdown_delay(),
            state,
        }
    }

    /// Bind the configured address and serve until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_address)
            .await
            .with_context(|| format!("Failed to bind metrics server to {}", self.listen_address))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener.
    ///
    /// Once `shutdown` is cancelled, in-flight requests get the configured
    /// delay to finish before the server is dropped.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let addr = listener.local_addr()?;
        info!("Metrics server listening on http://{}", addr);

        let server = axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown.clone().cancelled_owned())
            .into_future();
        tokio::pin!(server);

        let deadline = async {
            shutdown.cancelled().await;
            tokio::time::sleep(self.shutdown_delay).await;
        };

        tokio::select! {
            result = &mut server => result.context("Metrics server failed")?,
            _ = deadline => {
                warn!(
                    delay_secs = self.shutdown_delay.as_secs(),
                    "Metrics server did not drain in time, closing remaining connections"
                );
            }
        }

        info!("Metrics server stopped");
        Ok(())
    }
}
