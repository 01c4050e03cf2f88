//! Import batch coordination
//!
//! An [`Importer`] reconciles every package of one feed run and remembers
//! which packages it has seen. Pruning afterwards removes packages that were
//! not seen and vendors that are left without packages, so it must only run
//! once the whole feed has been processed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::{DEFAULT_FETCH_CONCURRENCY, FETCH_STAGGER_DELAY_MS};
use crate::error::{FeedError, StoreError, SyncError};
use crate::host::HostMetrics;
use crate::registry::{PackageDescriptor, PackageFeed};
use crate::store::{KindFilter, Property, Record, RecordStore};
use crate::sync::notify::{CacheInvalidator, Event, Notifier};
use crate::sync::reconciler::PackageReconciler;

/// Outcome of [`Importer::run`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub processed: usize,
    pub failed: usize,
    pub packages_removed: usize,
    pub vendors_removed: usize,
}

pub struct Importer<S: RecordStore> {
    reconciler: PackageReconciler<S>,
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    processed: HashSet<String>,
    fetch_concurrency: usize,
}

impl<S: RecordStore> Importer<S> {
    pub fn new(
        store: Arc<S>,
        host: Arc<dyn HostMetrics>,
        notifier: Arc<dyn Notifier>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            reconciler: PackageReconciler::new(store.clone(), host, notifier.clone(), invalidator),
            store,
            notifier,
            processed: HashSet::new(),
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    /// Number of descriptors fetched concurrently by [`Importer::run`]
    pub fn with_fetch_concurrency(mut self, fetch_concurrency: usize) -> Self {
        self.fetch_concurrency = fetch_concurrency.max(1);
        self
    }

    pub fn force_updates(&mut self, force: bool) {
        self.reconciler.set_force_update(force);
    }

    /// Reconcile one package and mark it as seen.
    ///
    /// The package is marked even if reconciliation fails, so a failing
    /// package is never pruned by the same run.
    pub async fn process(&mut self, package: &PackageDescriptor) -> Result<Record, SyncError> {
        self.processed.insert(package.name.clone());
        self.reconciler.convert(package).await
    }

    pub fn processed_packages(&self) -> &HashSet<String> {
        &self.processed
    }

    pub fn processed_packages_count(&self) -> usize {
        self.processed.len()
    }

    /// Remove every package that was not processed in this run.
    ///
    /// `on_removed` is called for each removed package record before the
    /// deletion event is emitted. Returns the number of removed packages.
    pub fn cleanup_packages<F>(&self, mut on_removed: F) -> Result<usize, StoreError>
    where
        F: FnMut(&Record),
    {
        let root = self.store.root()?;
        let mut removed = 0;

        for vendor in self.store.list_children(root.id, KindFilter::Vendor)? {
            let mut vendor_changed = false;
            for package in self.store.list_children(vendor.id, KindFilter::Package)? {
                let name = self
                    .store
                    .get_property(package.id, Property::Title)?
                    .and_then(|v| v.as_text().map(str::to_string));
                if name.as_ref().is_some_and(|n| self.processed.contains(n)) {
                    continue;
                }

                let name = name.unwrap_or_else(|| package.name.clone());
                self.store.remove(package.id)?;
                on_removed(&package);
                self.notifier.notify(Event::package_deleted(&package, &name));
                info!("Removed package {}", name);
                removed += 1;
                vendor_changed = true;
            }

            if vendor_changed {
                self.reconciler.update_vendor_last_activity(&vendor)?;
            }
        }

        Ok(removed)
    }

    /// Remove every vendor that has no package left. Returns the number of
    /// removed vendors.
    pub fn cleanup_vendors<F>(&self, mut on_removed: F) -> Result<usize, StoreError>
    where
        F: FnMut(&Record),
    {
        let root = self.store.root()?;
        let mut removed = 0;

        for vendor in self.store.list_children(root.id, KindFilter::Vendor)? {
            if !self
                .store
                .list_children(vendor.id, KindFilter::Package)?
                .is_empty()
            {
                continue;
            }

            self.store.remove(vendor.id)?;
            on_removed(&vendor);
            self.notifier.notify(Event::vendor_deleted(&vendor));
            info!("Removed vendor {}", vendor.name);
            removed += 1;
        }

        Ok(removed)
    }

    /// Import every package listed by `feed`, then prune when `prune` is set.
    ///
    /// Descriptors are fetched concurrently in batches with staggered start
    /// times; reconciliation itself runs one package at a time. Failing
    /// packages are counted and skipped. A feed that cannot be listed fails
    /// the run before anything is pruned.
    pub async fn run(
        &mut self,
        feed: &dyn PackageFeed,
        prune: bool,
    ) -> Result<ImportSummary, SyncError> {
        let names = feed.list_packages().await?;
        info!("Importing {} packages", names.len());

        let mut summary = ImportSummary::default();
        for batch in names.chunks(self.fetch_concurrency.max(1)) {
            let fetches = batch.iter().enumerate().map(|(i, name)| {
                let delay = Duration::from_millis(FETCH_STAGGER_DELAY_MS * i as u64);
                async move {
                    sleep(delay).await;
                    (name, feed.fetch_package(name).await)
                }
            });

            for (name, fetched) in join_all(fetches).await {
                let package = match fetched {
                    Ok(package) => package,
                    Err(FeedError::NotFound(_)) => {
                        warn!("Package {} disappeared from the registry", name);
                        summary.failed += 1;
                        continue;
                    }
                    Err(e) => {
                        // keep the stored package; it is still listed
                        error!("Failed to fetch package {}: {}", name, e);
                        self.processed.insert(name.clone());
                        summary.failed += 1;
                        continue;
                    }
                };

                match self.process(&package).await {
                    Ok(_) => summary.processed += 1,
                    Err(e) => {
                        error!("Failed to import package {}: {}", name, e);
                        summary.failed += 1;
                    }
                }
            }
        }

        if prune {
            summary.packages_removed = self.cleanup_packages(|_| {})?;
            summary.vendors_removed = self.cleanup_vendors(|_| {})?;
        } else {
            debug!("Skipping cleanup");
        }

        info!(
            "Import finished: {} processed, {} failed, {} packages and {} vendors removed",
            summary.processed, summary.failed, summary.packages_removed, summary.vendors_removed
        );
        Ok(summary)
    }
}
