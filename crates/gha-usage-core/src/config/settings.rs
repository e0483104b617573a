use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::github::DEFAULT_API_URL;

/// Environment variable consulted when no token is configured
pub const TOKEN_ENV_VAR: &str = "GITHUB_TOKEN";

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Export GitHub Actions billable time of an organization as Prometheus metrics"
)]
pub struct Config {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Organization to monitor
    #[arg(short, long, global = true)]
    pub organization: Option<String>,

    /// GitHub auth token (falls back to $GITHUB_TOKEN)
    #[arg(long, global = true)]
    pub github_auth_token: Option<String>,

    /// Days since the last push after which a repository is considered inactive
    #[arg(long, global = true)]
    pub max_last_pushed_days: Option<u64>,

    /// Seconds since the last push after which a repository is considered
    /// inactive (overrides the day count)
    #[arg(long, global = true)]
    pub max_last_pushed_secs: Option<u64>,

    /// Seconds between two usage refreshes
    #[arg(long, global = true)]
    pub refresh_period_secs: Option<u64>,

    /// Maximum number of usage requests in flight
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,

    /// Address the metrics server listens on
    #[arg(short, long, global = true)]
    pub listen_address: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve usage metrics over HTTP (default)
    Serve,
    /// Scan the organization once and log the usage of every workflow
    Print,
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if running the one-shot print command
    pub fn is_print_mode(&self) -> bool {
        matches!(self.command, Some(Command::Print))
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Organization whose repositories are scanned
    #[serde(default)]
    pub organization: String,

    /// Days since the last push after which a repository is inactive
    #[serde(default = "default_max_last_pushed_days")]
    pub max_last_pushed_days: u64,

    /// Same threshold in seconds; wins over `max_last_pushed_days` when set
    #[serde(default)]
    pub max_last_pushed_secs: Option<u64>,

    /// Seconds between two refreshes
    #[serde(default = "default_refresh_period")]
    pub refresh_period_secs: u64,

    /// GitHub API settings
    #[serde(default)]
    pub github: GithubSettings,

    /// Scan tuning
    #[serde(default)]
    pub scan: ScanSettings,

    /// Metrics server settings
    #[serde(default)]
    pub web: WebSettings,
}

fn default_max_last_pushed_days() -> u64 {
    35
}

fn default_refresh_period() -> u64 {
    1800
}

/// GitHub API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubSettings {
    /// Auth token; `$GITHUB_TOKEN` is used when unset
    #[serde(default)]
    pub token: Option<String>,

    /// API root, for GitHub Enterprise Server
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Longest rate-limit reset worth waiting for, in seconds
    #[serde(default = "default_max_rate_limit_wait")]
    pub max_rate_limit_wait_secs: u64,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_max_rate_limit_wait() -> u64 {
    900
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            token: None,
            api_url: default_api_url(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait(),
        }
    }
}

/// Scan tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanSettings {
    /// Repositories per listing page (GitHub caps at 100)
    #[serde(default = "default_repo_page_size")]
    pub repo_page_size: u32,

    /// Workflows per listing page
    #[serde(default = "default_workflow_page_size")]
    pub workflow_page_size: u32,

    /// Maximum usage requests in flight (unset = unbounded)
    #[serde(default)]
    pub concurrency_limit: Option<usize>,
}

fn default_repo_page_size() -> u32 {
    100
}

fn default_workflow_page_size() -> u32 {
    10
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            repo_page_size: default_repo_page_size(),
            workflow_page_size: default_workflow_page_size(),
            concurrency_limit: None,
        }
    }
}

/// Metrics server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSettings {
    /// Listen address
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Seconds in-flight requests get to finish on shutdown
    #[serde(default = "default_shutdown_delay")]
    pub shutdown_delay_secs: u64,
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_delay() -> u64 {
    15
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            shutdown_delay_secs: default_shutdown_delay(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            organization: String::new(),
            max_last_pushed_days: default_max_last_pushed_days(),
            max_last_pushed_secs: None,
            refresh_period_secs: default_refresh_period(),
            github: GithubSettings::default(),
            scan: ScanSettings::default(),
            web: WebSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                let content = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config file: {:?}", p))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", p));
            }
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("gha-usage/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/gha-usage/config.toml")),
            dirs::home_dir().map(|p| p.join(".gha-usage.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                return toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {:?}", path));
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI config into settings (CLI takes precedence).
    ///
    /// A token missing from both the CLI and the file is read from `$GITHUB_TOKEN`.
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(organization) = &cli.organization {
            self.organization = organization.clone();
        }
        if let Some(token) = &cli.github_auth_token {
            self.github.token = Some(token.clone());
        }
        if let Some(days) = cli.max_last_pushed_days {
            self.max_last_pushed_days = days;
            self.max_last_pushed_secs = None;
        }
        if let Some(secs) = cli.max_last_pushed_secs {
            self.max_last_pushed_secs = Some(secs);
        }
        if let Some(period) = cli.refresh_period_secs {
            self.refresh_period_secs = period;
        }
        if let Some(limit) = cli.concurrency {
            self.scan.concurrency_limit = Some(limit);
        }
        if let Some(address) = &cli.listen_address {
            self.web.listen_address = address.clone();
        }

        if self.github.token.as_deref().is_none_or(str::is_empty) {
            self.github.token = std::env::var(TOKEN_ENV_VAR).ok().filter(|t| !t.is_empty());
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) -> Result<()> {
        const MAX_PAGE_SIZE: u32 = 100;

        if self.organization.trim().is_empty() {
            bail!("No organization configured; pass --organization or set `organization` in the config file");
        }
        self.organization = self.organization.trim().to_string();

        self.scan.repo_page_size = self.scan.repo_page_size.clamp(1, MAX_PAGE_SIZE);
        self.scan.workflow_page_size = self.scan.workflow_page_size.clamp(1, MAX_PAGE_SIZE);
        self.refresh_period_secs = self.refresh_period_secs.max(1);
        if self.scan.concurrency_limit == Some(0) {
            self.scan.concurrency_limit = None;
        }
        Ok(())
    }

    /// Staleness threshold as a duration
    pub fn max_last_pushed(&self) -> Duration {
        let secs = self
            .max_last_pushed_secs
            .unwrap_or_else(|| self.max_last_pushed_days.saturating_mul(24 * 3600));
        Duration::from_secs(secs)
    }

    /// Refresh period as a duration
    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_period_secs)
    }

    /// Shutdown grace period as a duration
    pub fn shutdown_delay(&self) -> Duration {
        Duration::from_secs(self.web.shutdown_delay_secs)
    }
}
