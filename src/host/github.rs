//! GitHub REST API client

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::HostError;
use crate::host::{HostMetrics, RepoMetrics};

/// Default base URL for GitHub API
pub const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Response from `GET /repos/{owner}/{repo}`
#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    #[serde(default)]
    stargazers_count: i64,
    #[serde(default)]
    watchers_count: i64,
    #[serde(default)]
    forks_count: i64,
    #[serde(default)]
    open_issues_count: i64,
    #[serde(default)]
    organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
struct Organization {
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Response from `GET /repos/{owner}/{repo}/readme`
#[derive(Debug, Deserialize)]
struct ReadmeResponse {
    download_url: Option<String>,
}

/// Body of `POST /markdown`
#[derive(Debug, Serialize)]
struct MarkdownRequest<'a> {
    text: &'a str,
    mode: &'static str,
    context: String,
}

/// Client for the GitHub repository and markdown APIs
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GitHubClient {
    /// Creates a new GitHubClient with a custom base URL
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("marketplace-sync")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Map GitHub error statuses onto [`HostError`]
    ///
    /// GitHub signals an exhausted quota either with 429 or with 403 and
    /// `x-ratelimit-remaining: 0`.
    fn check_status(
        response: reqwest::Response,
        subject: &str,
    ) -> Result<reqwest::Response, HostError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(HostError::NotFound(subject.to_string()));
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || (status == reqwest::StatusCode::FORBIDDEN
                && header_value(response.headers(), "x-ratelimit-remaining") == Some("0"))
        {
            let retry_after =
                header_value(response.headers(), "retry-after").and_then(|v| v.parse().ok());
            return Err(HostError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        warn!("GitHub API returned status {} for {}", status, subject);
        Err(HostError::InvalidResponse(format!(
            "Unexpected status: {}",
            status
        )))
    }
}

impl Default for GitHubClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, None)
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[async_trait::async_trait]
impl HostMetrics for GitHubClient {
    async fn fetch_repo_metrics(&self, org: &str, repo: &str) -> Result<RepoMetrics, HostError> {
        let subject = format!("{}/{}", org, repo);
        let url = format!("{}/repos/{}", self.base_url, subject);

        let response = self
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let response = Self::check_status(response, &subject)?;

        let meta: RepositoryResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse GitHub repository response: {}", e);
            HostError::InvalidResponse(e.to_string())
        })?;

        Ok(RepoMetrics {
            stars: meta.stargazers_count,
            watchers: meta.watchers_count,
            forks: meta.forks_count,
            open_issues: meta.open_issues_count,
            org_avatar_url: meta
                .organization
                .and_then(|o| o.avatar_url)
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
        })
    }

    async fn fetch_rendered_readme(&self, org: &str, repo: &str) -> Result<String, HostError> {
        let subject = format!("{}/{}", org, repo);
        let url = format!("{}/repos/{}/readme", self.base_url, subject);

        let response = self
            .get(&url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let response = Self::check_status(response, &subject)?;

        let metadata: ReadmeResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse GitHub readme response: {}", e);
            HostError::InvalidResponse(e.to_string())
        })?;
        let download_url = metadata
            .download_url
            .ok_or_else(|| HostError::NotFound(format!("{} readme download", subject)))?;

        debug!("Downloading readme of {} from {}", subject, download_url);
        let response = self.client.get(&download_url).send().await?;
        let markdown = Self::check_status(response, &subject)?.text().await?;

        let response = self
            .authorize(self.client.post(format!("{}/markdown", self.base_url)))
            .header("Accept", "text/html")
            .json(&MarkdownRequest {
                text: &markdown,
                mode: "gfm",
                context: subject.clone(),
            })
            .send()
            .await?;
        let rendered = Self::check_status(response, &subject)?.text().await?;

        Ok(rendered)
    }
}
