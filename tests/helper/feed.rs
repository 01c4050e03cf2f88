//! Package feed fake

use async_trait::async_trait;

use marketplace_sync::error::FeedError;
use marketplace_sync::registry::{PackageDescriptor, PackageFeed};

/// Lists and serves a fixed set of packages in insertion order
#[derive(Default)]
pub struct FakeFeed {
    packages: Vec<PackageDescriptor>,
}

impl FakeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_package(mut self, package: PackageDescriptor) -> Self {
        self.packages.push(package);
        self
    }
}

#[async_trait]
impl PackageFeed for FakeFeed {
    async fn list_packages(&self) -> Result<Vec<String>, FeedError> {
        Ok(self.packages.iter().map(|p| p.name.clone()).collect())
    }

    async fn fetch_package(&self, package_name: &str) -> Result<PackageDescriptor, FeedError> {
        self.packages
            .iter()
            .find(|p| p.name == package_name)
            .cloned()
            .ok_or_else(|| FeedError::NotFound(package_name.to_string()))
    }
}
