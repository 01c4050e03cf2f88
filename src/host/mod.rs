//! Source-hosting metrics layer
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Reconciler  │────▶│  CachedHost  │────▶│ GitHubClient │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                             │
//!                             ▼
//!                      ┌──────────────┐
//!                      │ResponseCache │
//!                      └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`github`]: GitHub REST API client
//! - [`cache`]: SQLite response cache and the caching [`HostMetrics`] decorator
//! - [`readme`]: post-processing of rendered README HTML

pub mod cache;
pub mod github;
pub mod readme;

#[cfg(test)]
use mockall::automock;

use serde::{Deserialize, Serialize};

use crate::error::HostError;

pub use cache::{CachedHost, ResponseCache, SqliteResponseCache};
pub use github::GitHubClient;
pub use readme::ReadmeProcessor;

/// Repository popularity metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMetrics {
    pub stars: i64,
    pub watchers: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub org_avatar_url: Option<String>,
}

/// Trait for fetching metrics and README content of a hosted repository
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait HostMetrics: Send + Sync {
    async fn fetch_repo_metrics(&self, org: &str, repo: &str) -> Result<RepoMetrics, HostError>;

    /// README rendered to HTML, before any post-processing
    async fn fetch_rendered_readme(&self, org: &str, repo: &str) -> Result<String, HostError>;
}

/// Organization and repository name of a GitHub repository URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub org: String,
    pub repo: String,
}

/// Parse a repository URL pointing at github.com.
///
/// Accepts `https://github.com/org/repo`, `https://github.com/org/repo.git`,
/// `git@github.com:org/repo.git` and trailing path segments.
pub fn parse_github_repository(url: &str) -> Option<GitHubRepo> {
    let url = url.trim();
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let (authority, path) = rest.split_once(['/', ':'])?;
    let host = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    if !host.eq_ignore_ascii_case("github.com") && !host.eq_ignore_ascii_case("www.github.com") {
        return None;
    }

    let mut segments = path
        .split(['?', '#'])
        .next()?
        .split('/')
        .filter(|s| !s.is_empty());
    let org = segments.next()?;
    let repo = segments.next()?;
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    if repo.is_empty() {
        return None;
    }

    Some(GitHubRepo {
        org: org.to_string(),
        repo: repo.to_string(),
    })
}
