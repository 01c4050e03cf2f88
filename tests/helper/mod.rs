//! Shared fakes and builders for integration tests

#![allow(dead_code)]

pub mod feed;
pub mod host;
pub mod notify;
pub mod store;

use std::sync::Arc;

use marketplace_sync::registry::{
    Abandoned, Downloads, MaintainerDescriptor, PackageDescriptor, VersionDescriptor,
};
use marketplace_sync::store::SqliteRecordStore;
use marketplace_sync::sync::{Importer, PackageReconciler};

pub use feed::FakeFeed;
pub use host::FakeHost;
pub use notify::RecordingNotifier;
pub use store::{CountingStore, FailingStore};

/// Builder for package snapshots
pub struct PackageBuilder {
    package: PackageDescriptor,
}

impl PackageBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            package: PackageDescriptor {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn repository(mut self, url: &str) -> Self {
        self.package.repository = Some(url.to_string());
        self
    }

    pub fn favers(mut self, favers: i64) -> Self {
        self.package.favers = favers;
        self
    }

    pub fn downloads(mut self, total: i64, monthly: i64, daily: i64) -> Self {
        self.package.downloads = Some(Downloads {
            total,
            monthly,
            daily,
        });
        self
    }

    pub fn abandoned(mut self, abandoned: Abandoned) -> Self {
        self.package.abandoned = abandoned;
        self
    }

    pub fn maintainer(mut self, name: &str) -> Self {
        self.package.maintainers.push(MaintainerDescriptor {
            name: name.to_string(),
            email: Some(format!("{}@example.com", name)),
            homepage: None,
        });
        self
    }

    /// Adds a version; `normalized` follows the registry's four-part form
    pub fn version(mut self, version: &str, normalized: &str, time: &str) -> Self {
        self.package.versions.push(VersionDescriptor {
            version: version.to_string(),
            version_normalized: Some(normalized.to_string()),
            time: Some(time.to_string()),
            license: vec!["MIT".to_string()],
            ..Default::default()
        });
        self
    }

    pub fn build(self) -> PackageDescriptor {
        self.package
    }
}

/// In-memory store wrapped in a write counter
pub fn counting_store() -> Arc<CountingStore<SqliteRecordStore>> {
    Arc::new(CountingStore::new(
        SqliteRecordStore::open_in_memory().expect("Failed to open in-memory store"),
    ))
}

pub fn failing_store() -> Arc<FailingStore<SqliteRecordStore>> {
    Arc::new(FailingStore::new(
        SqliteRecordStore::open_in_memory().expect("Failed to open in-memory store"),
    ))
}

pub fn create_test_reconciler<S>(
    store: Arc<S>,
    host: Arc<FakeHost>,
    notifier: Arc<RecordingNotifier>,
) -> PackageReconciler<S>
where
    S: marketplace_sync::store::RecordStore,
{
    PackageReconciler::new(store, host, notifier.clone(), notifier)
}

pub fn create_test_importer<S>(
    store: Arc<S>,
    host: Arc<FakeHost>,
    notifier: Arc<RecordingNotifier>,
) -> Importer<S>
where
    S: marketplace_sync::store::RecordStore,
{
    Importer::new(store, host, notifier.clone(), notifier)
}
