//! Package registry feed
//!
//! # Modules
//!
//! - [`descriptor`]: upstream package snapshot types
//! - [`packagist`]: Packagist API implementation of [`PackageFeed`]

pub mod descriptor;
pub mod packagist;

#[cfg(test)]
use mockall::automock;

use crate::error::FeedError;

pub use descriptor::{
    Abandoned, DistDescriptor, Downloads, MaintainerDescriptor, PackageDescriptor,
    SourceDescriptor, VersionDescriptor,
};
pub use packagist::PackagistClient;

/// Trait for reading the package feed of a registry
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait PackageFeed: Send + Sync {
    /// Names (`vendor/package`) of every package that belongs in the tree
    async fn list_packages(&self) -> Result<Vec<String>, FeedError>;

    /// Full snapshot of a single package
    async fn fetch_package(&self, package_name: &str) -> Result<PackageDescriptor, FeedError>;
}
