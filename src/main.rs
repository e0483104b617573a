use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gha_usage::web::{MetricsState, UsageCollector, WebServer};
use gha_usage_core::config::{Config, Settings};
use gha_usage_core::monitor::UsageRefresher;
use gha_usage_core::state::UsageStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate()?;

    if settings.github.token.is_none() {
        warn!("No GitHub token configured, requests are unauthenticated and heavily rate limited");
    }

    if cli.is_print_mode() {
        return print(&settings).await;
    }
    serve(&settings).await
}

/// One scan, logged to stdout
async fn print(settings: &Settings) -> Result<()> {
    let fetcher = gha_usage::usage_fetcher(settings)?;
    let cancel = CancellationToken::new();

    let scan = gha_usage::print::print_usage(&fetcher, &cancel);
    tokio::select! {
        result = scan => result.map(|_| ()),
        _ = shutdown_signal() => {
            cancel.cancel();
            anyhow::bail!("Interrupted before the scan completed")
        }
    }
}

/// Periodic refresh plus metrics server until SIGINT/SIGTERM
async fn serve(settings: &Settings) -> Result<()> {
    let fetcher = Arc::new(gha_usage::usage_fetcher(settings)?);
    let store = UsageStore::shared();

    let registry = UsageCollector::new(store.clone(), settings.organization.clone())
        .and_then(UsageCollector::registry)
        .context("Failed to register usage metrics")?;

    info!(
        organization = %settings.organization,
        refresh_period_secs = settings.refresh_period_secs,
        "Starting usage refresher"
    );
    let refresher = UsageRefresher::new(fetcher, store, settings.refresh_period()).start();

    let shutdown = CancellationToken::new();
    let server = WebServer::new(
        settings,
        MetricsState {
            registry,
            ready: refresher.ready_receiver(),
        },
    );
    let mut server = tokio::spawn(server.run(shutdown.clone()));

    let served = tokio::select! {
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
            shutdown.cancel();
            (&mut server).await
        }
        result = &mut server => result,
    };

    refresher.shutdown().await;
    served.context("Metrics server task panicked")?
}

/// Resolves on SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn setup_logging(debug: bool) {
    let filter = if debug {
        EnvFilter::new("gha_usage=debug,gha_usage_core=debug")
    } else {
        EnvFilter::new("gha_usage=info,gha_usage_core=info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
