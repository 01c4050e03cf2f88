//! Host metrics fake

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use marketplace_sync::error::HostError;
use marketplace_sync::host::{HostMetrics, RepoMetrics};

/// Serves canned metrics and READMEs keyed by `org/repo`; unknown
/// repositories answer `NotFound`.
#[derive(Default)]
pub struct FakeHost {
    metrics: Mutex<HashMap<String, RepoMetrics>>,
    readmes: HashMap<String, String>,
    rate_limited: bool,
    calls: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repo(self, slug: &str, stars: i64) -> Self {
        self.set_stars(slug, stars);
        self
    }

    pub fn with_readme(mut self, slug: &str, html: &str) -> Self {
        self.readmes.insert(slug.to_string(), html.to_string());
        self
    }

    pub fn rate_limited(mut self) -> Self {
        self.rate_limited = true;
        self
    }

    pub fn set_stars(&self, slug: &str, stars: i64) {
        self.metrics.lock().unwrap().insert(
            slug.to_string(),
            RepoMetrics {
                stars,
                watchers: stars / 2,
                forks: 1,
                open_issues: 0,
                org_avatar_url: Some(format!("https://avatars.example.com/{}.png", slug)),
            },
        );
    }

    pub fn remove_repo(&self, slug: &str) {
        self.metrics.lock().unwrap().remove(slug);
    }

    /// Number of metric requests served
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostMetrics for FakeHost {
    async fn fetch_repo_metrics(&self, org: &str, repo: &str) -> Result<RepoMetrics, HostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.rate_limited {
            return Err(HostError::RateLimited {
                retry_after_secs: Some(60),
            });
        }
        let slug = format!("{}/{}", org, repo);
        self.metrics
            .lock()
            .unwrap()
            .get(&slug)
            .cloned()
            .ok_or(HostError::NotFound(slug))
    }

    async fn fetch_rendered_readme(&self, org: &str, repo: &str) -> Result<String, HostError> {
        let slug = format!("{}/{}", org, repo);
        self.readmes
            .get(&slug)
            .cloned()
            .ok_or(HostError::NotFound(slug))
    }
}
