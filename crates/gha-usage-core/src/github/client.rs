//! `reqwest`-backed implementation of [`ActionsApi`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};

use super::types::{ApiError, Page, Repository, Workflow, WorkflowList, WorkflowTiming};
use super::ActionsApi;

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Attempts per request when GitHub keeps answering with a rate limit
const MAX_RATE_LIMIT_ATTEMPTS: u32 = 3;

/// Fallback hold when a rate limit response carries no reset hint
const DEFAULT_RATE_LIMIT_HOLD_SECS: i64 = 60;

const USER_AGENT: &str = concat!("gha-usage/", env!("CARGO_PKG_VERSION"));

/// GitHub REST client with shared rate-limit hold.
///
/// Once a rate-limited response is seen, every call made through this
/// client waits for the advertised reset before going out again.
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    max_rate_limit_wait: Duration,
    held_until: Mutex<Option<DateTime<Utc>>>,
}

impl GithubClient {
    /// Create a client for the public API, authenticated when `token` is set
    pub fn new(token: Option<&str>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static("2022-11-28"),
        );

        if let Some(token) = token.filter(|t| !t.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|source| ApiError::Transport {
                url: DEFAULT_API_URL.to_string(),
                source,
            })?;

        Ok(Self {
            http,
            base_url: DEFAULT_API_URL.to_string(),
            max_rate_limit_wait: Duration::from_secs(900),
            held_until: Mutex::new(None),
        })
    }

    /// Point the client at another API root (GitHub Enterprise, local fakes)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Longest rate-limit hold worth waiting for before failing the call
    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    /// GET `path` and decode the body, returning the next page from `Link`
    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(T, Option<u32>), ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempts = 0;

        loop {
            self.wait_for_hold(&url).await?;

            let response = self
                .http
                .get(&url)
                .query(query)
                .send()
                .await
                .map_err(|source| ApiError::Transport {
                    url: url.clone(),
                    source,
                })?;

            let status = response.status();
            if status.is_success() {
                let next_page = response
                    .headers()
                    .get(LINK)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_next_page);
                let body = response
                    .json::<T>()
                    .await
                    .map_err(|source| ApiError::Decode {
                        url: url.clone(),
                        source,
                    })?;
                return Ok((body, next_page));
            }

            if let Some(reset_at) = rate_limit_reset(status, response.headers(), Utc::now()) {
                attempts += 1;
                if attempts >= MAX_RATE_LIMIT_ATTEMPTS {
                    return Err(ApiError::RateLimited { url, reset_at });
                }
                self.hold_until(reset_at);
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
                message: error_message(&body),
            });
        }
    }

    /// Extend the shared hold to `reset_at`
    fn hold_until(&self, reset_at: DateTime<Utc>) {
        let mut held = self.held_until.lock();
        if held.is_none_or(|current| current < reset_at) {
            *held = Some(reset_at);
            error!(
                reset_at = %reset_at,
                "Detected rate limit, all calls are currently held"
            );
        }
    }

    /// Sleep until the current hold (if any) expires
    async fn wait_for_hold(&self, url: &str) -> Result<(), ApiError> {
        let Some(reset_at) = *self.held_until.lock() else {
            return Ok(());
        };
        let Ok(wait) = (reset_at - Utc::now()).to_std() else {
            return Ok(());
        };
        if wait > self.max_rate_limit_wait {
            return Err(ApiError::RateLimited {
                url: url.to_string(),
                reset_at,
            });
        }

        debug!(wait_secs = wait.as_secs(), "Waiting for rate limit reset");
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

#[async_trait]
impl ActionsApi for GithubClient {
    async fn list_org_repositories(
        &self,
        org: &str,
        page: Option<u32>,
        per_page: u32,
    ) -> Result<Page<Repository>, ApiError> {
        let mut query = vec![
            ("type", "all".to_string()),
            ("sort", "pushed".to_string()),
            ("direction", "desc".to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(page) = page {
            query.push(("page", page.to_string()));
        }

        let (items, next_page) = self
            .get::<Vec<Repository>>(&format!("/orgs/{}/repos", org), &query)
            .await?;
        Ok(Page { items, next_page })
    }

    async fn list_repository_workflows(
        &self,
        org: &str,
        repo: &str,
        page: Option<u32>,
        per_page: u32,
    ) -> Result<Page<Workflow>, ApiError> {
        let mut query = vec![("per_page", per_page.to_string())];
        if let Some(page) = page {
            query.push(("page", page.to_string()));
        }

        let (list, next_page) = self
            .get::<WorkflowList>(&format!("/repos/{}/{}/actions/workflows", org, repo), &query)
            .await?;
        Ok(Page {
            items: list.workflows,
            next_page,
        })
    }

    async fn get_workflow_usage(
        &self,
        org: &str,
        repo: &str,
        workflow_id: u64,
    ) -> Result<WorkflowTiming, ApiError> {
        let (timing, _) = self
            .get::<WorkflowTiming>(
                &format!(
                    "/repos/{}/{}/actions/workflows/{}/timing",
                    org, repo, workflow_id
                ),
                &[],
            )
            .await?;
        Ok(timing)
    }
}

/// Extract the `page` parameter of the `rel="next"` entry of a `Link` header.
///
/// ```text
/// <https://api.github.com/orgs/acme/repos?per_page=100&page=2>; rel="next",
/// <https://api.github.com/orgs/acme/repos?per_page=100&page=7>; rel="last"
/// ```
pub fn parse_next_page(link: &str) -> Option<u32> {
    link.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == r#"rel="next""#) {
            return None;
        }
        let target = target.trim().trim_start_matches('<').trim_end_matches('>');
        let (_, query) = target.split_once('?')?;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix("page=")?.parse().ok())
    })
}

/// When a response is a rate limit, the instant at which calls may resume
fn rate_limit_reset(
    status: StatusCode,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(secs) = header("retry-after").and_then(|v| v.trim().parse::<i64>().ok()) {
        return Some(now + chrono::Duration::seconds(secs));
    }

    if header("x-ratelimit-remaining") == Some("0") {
        let reset = header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0));
        return Some(
            reset.unwrap_or(now + chrono::Duration::seconds(DEFAULT_RATE_LIMIT_HOLD_SECS)),
        );
    }

    None
}

/// GitHub error bodies look like `{"message": "...", "documentation_url": "..."}`
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_next_page() {
        let link = r#"<https://api.github.com/orgs/acme/repos?sort=pushed&per_page=100&page=2>; rel="next", <https://api.github.com/orgs/acme/repos?sort=pushed&per_page=100&page=7>; rel="last""#;
        assert_eq!(parse_next_page(link), Some(2));
    }

    #[test]
    fn test_parse_next_page_not_first_entry() {
        let link = r#"<https://api.github.com/x?page=1>; rel="prev", <https://api.github.com/x?page=3>; rel="next""#;
        assert_eq!(parse_next_page(link), Some(3));
    }

    #[test]
    fn test_parse_next_page_last_page() {
        let link = r#"<https://api.github.com/x?page=1>; rel="first", <https://api.github.com/x?page=6>; rel="prev""#;
        assert_eq!(parse_next_page(link), None);
        assert_eq!(parse_next_page(""), None);
    }

    #[test]
    fn test_parse_next_page_ignores_per_page() {
        let link = r#"<https://api.github.com/x?per_page=10>; rel="next""#;
        assert_eq!(parse_next_page(link), None);
    }

    #[test]
    fn test_rate_limit_reset_from_headers() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from_str(&(now.timestamp() + 120).to_string()).unwrap(),
        );

        let reset = rate_limit_reset(StatusCode::FORBIDDEN, &headers, now);
        assert_eq!(reset, Some(now + chrono::Duration::seconds(120)));
    }

    #[test]
    fn test_rate_limit_reset_retry_after() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("30"));

        let reset = rate_limit_reset(StatusCode::TOO_MANY_REQUESTS, &headers, now);
        assert_eq!(reset, Some(now + chrono::Duration::seconds(30)));
    }

    #[test]
    fn test_forbidden_without_rate_limit_is_plain_error() {
        let now = Utc::now();
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("4999"));
        assert_eq!(rate_limit_reset(StatusCode::FORBIDDEN, &headers, now), None);
        assert_eq!(
            rate_limit_reset(StatusCode::INTERNAL_SERVER_ERROR, &HeaderMap::new(), now),
            None
        );
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"message":"Not Found","documentation_url":"https://docs"}"#),
            "Not Found"
        );
        assert_eq!(error_message("bad gateway"), "bad gateway");
    }

    #[test]
    fn test_invalid_token_rejected() {
        let result = GithubClient::new(Some("bad\ntoken"));
        assert!(matches!(result, Err(ApiError::InvalidToken)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client = GithubClient::new(None)
            .unwrap()
            .with_base_url("http://127.0.0.1:8080/");
        assert_eq!(client.base_url, "http://127.0.0.1:8080");
    }
}
