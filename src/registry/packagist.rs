//! Packagist API implementation

use serde::Deserialize;
use tracing::warn;

use crate::config::DEFAULT_PACKAGE_TYPE;
use crate::error::FeedError;
use crate::registry::PackageFeed;
use crate::registry::descriptor::PackageDescriptor;

/// Default base URL for Packagist
pub const DEFAULT_BASE_URL: &str = "https://packagist.org";

/// Response from `/packages/list.json`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageListResponse {
    package_names: Vec<String>,
}

/// Response from `/packages/{vendor}/{name}.json`
#[derive(Debug, Deserialize)]
struct PackageResponse {
    package: PackageDescriptor,
}

/// Feed implementation for the Packagist API
pub struct PackagistClient {
    client: reqwest::Client,
    base_url: String,
    package_type: String,
}

impl PackagistClient {
    /// Creates a new PackagistClient listing packages of `package_type`
    pub fn new(base_url: &str, package_type: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("marketplace-sync")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            package_type: package_type.to_string(),
        }
    }
}

impl Default for PackagistClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_PACKAGE_TYPE)
    }
}

#[async_trait::async_trait]
impl PackageFeed for PackagistClient {
    async fn list_packages(&self) -> Result<Vec<String>, FeedError> {
        let url = format!(
            "{}/packages/list.json?type={}",
            self.base_url, self.package_type
        );

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Packagist returned status {}: {}", status, url);
            return Err(FeedError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let list: PackageListResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Packagist package list: {}", e);
            FeedError::InvalidResponse(e.to_string())
        })?;

        Ok(list.package_names)
    }

    async fn fetch_package(&self, package_name: &str) -> Result<PackageDescriptor, FeedError> {
        let url = format!("{}/packages/{}.json", self.base_url, package_name);

        let response = self.client.get(&url).send().await?;

        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FeedError::NotFound(package_name.to_string()));
        }

        if !status.is_success() {
            warn!("Packagist returned status {}: {}", status, url);
            return Err(FeedError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let body: PackageResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Packagist package {}: {}", package_name, e);
            FeedError::InvalidResponse(e.to_string())
        })?;

        Ok(body.package)
    }
}
