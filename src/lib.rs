//! gha-usage: GitHub Actions billable time as Prometheus metrics.

pub mod print;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use gha_usage_core::config::Settings;
use gha_usage_core::github::GithubClient;
use gha_usage_core::usage::OrgUsageFetcher;

/// Build the organization scan described by `settings`
pub fn usage_fetcher(settings: &Settings) -> Result<OrgUsageFetcher> {
    let client = GithubClient::new(settings.github.token.as_deref())
        .context("Failed to create GitHub client")?
        .with_base_url(settings.github.api_url.clone())
        .with_max_rate_limit_wait(Duration::from_secs(settings.github.max_rate_limit_wait_secs));

    Ok(OrgUsageFetcher::from_settings(Arc::new(client), settings))
}
