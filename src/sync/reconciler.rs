//! Conversion of a registry package snapshot into stored records
//!
//! Every write goes through [`PackageReconciler::update_property`], which
//! skips values that are already stored. Re-running a conversion after a
//! failure therefore only performs the writes that did not happen yet.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{HostError, StoreError, SyncError};
use crate::host::{GitHubRepo, HostMetrics, ReadmeProcessor, RepoMetrics, parse_github_repository};
use crate::registry::descriptor::{
    DistDescriptor, LinkMap, MaintainerDescriptor, PackageDescriptor, SourceDescriptor,
    VersionDescriptor,
};
use crate::slug::slugify;
use crate::store::{KindFilter, Property, Record, RecordKind, RecordStore, Value};
use crate::sync::notify::{CacheInvalidator, Event, Notifier, package_cache_tag};
use crate::version::{Stability, VersionClass, VersionSummary, classify, extract_last_version};

const MAINTAINERS: &str = "maintainers";
const VERSIONS: &str = "versions";
const README: &str = "readme";
const SOURCE: &str = "source";
const DIST: &str = "dist";

type Fields = Vec<(Property, Value)>;

pub struct PackageReconciler<S: RecordStore> {
    store: Arc<S>,
    host: Arc<dyn HostMetrics>,
    notifier: Arc<dyn Notifier>,
    invalidator: Arc<dyn CacheInvalidator>,
    readme: ReadmeProcessor,
    force_update: bool,
}

impl<S: RecordStore> PackageReconciler<S> {
    pub fn new(
        store: Arc<S>,
        host: Arc<dyn HostMetrics>,
        notifier: Arc<dyn Notifier>,
        invalidator: Arc<dyn CacheInvalidator>,
    ) -> Self {
        Self {
            store,
            host,
            notifier,
            invalidator,
            readme: ReadmeProcessor::new(),
            force_update: false,
        }
    }

    /// Reconcile packages even when the update-needed test says they are current
    pub fn set_force_update(&mut self, force_update: bool) {
        self.force_update = force_update;
    }

    /// Bring the records of `package` in line with the snapshot
    ///
    /// Returns the package record. A package whose stored state is already
    /// current is returned untouched.
    pub async fn convert(&self, package: &PackageDescriptor) -> Result<Record, SyncError> {
        if package.name.trim().is_empty() {
            return Err(SyncError::InvalidPackageName(package.name.clone()));
        }

        let slug = slugify(&package.name);
        let vendor = self.find_or_create_vendor(package.vendor())?;

        let record = match self.store.find_child(vendor.id, &slug)? {
            Some(existing) => {
                if !self.force_update && !self.package_requires_update(package, &existing)? {
                    debug!("Package {} is up to date", package.name);
                    return Ok(existing);
                }
                self.update(package, &existing)?;
                existing
            }
            None => self.create(package, &vendor, &slug)?,
        };

        self.sync_maintainers(package, &record)?;
        self.sync_versions(package, &record)?;

        self.update_package_last_activity(&record)?;
        self.update_vendor_last_activity(&vendor)?;

        self.update_downloads(package, &record)?;
        self.update_github_metrics(package, &record).await?;

        self.update_abandoned(package, &record)?;

        self.invalidator.flush_by_tag(&package_cache_tag(&record));

        info!(
            "Reconciled package {} ({} versions, {} maintainers)",
            package.name,
            package.versions.len(),
            package.maintainers.len()
        );
        Ok(record)
    }

    /// Whether the stored package differs from the snapshot in a way that
    /// requires a full reconciliation
    pub fn package_requires_update(
        &self,
        package: &PackageDescriptor,
        record: &Record,
    ) -> Result<bool, StoreError> {
        let last_activity = package
            .versions
            .iter()
            .filter_map(VersionDescriptor::published_at)
            .max()
            .unwrap_or_else(Utc::now);

        let Some(recorded_activity) = self
            .store
            .get_property(record.id, Property::LastActivity)?
            .and_then(|v| v.as_time())
        else {
            return Ok(true);
        };

        if last_activity.timestamp() > recorded_activity.timestamp() {
            return Ok(true);
        }

        let favers = self
            .store
            .get_property(record.id, Property::Favers)?
            .and_then(|v| v.as_int());
        if favers != Some(package.favers) {
            return Ok(true);
        }

        // snapshots without download statistics never overwrite stored ones
        let Some(downloads) = package.downloads else {
            return Ok(false);
        };
        let download_total = self
            .store
            .get_property(record.id, Property::DownloadTotal)?
            .and_then(|v| v.as_int());
        Ok(download_total != Some(downloads.total))
    }

    fn find_or_create_vendor(&self, name: &str) -> Result<Record, StoreError> {
        let root = self.store.root()?;
        let slug = slugify(name);

        if let Some(vendor) = self.store.find_child(root.id, &slug)? {
            return Ok(vendor);
        }

        let vendor = self.store.create_child(root.id, &slug, RecordKind::Vendor)?;
        self.set_properties(
            &vendor,
            vec![
                (Property::UriPathSegment, Value::from(slug.as_str())),
                (Property::Title, Value::from(name)),
            ],
        )?;
        info!("Created vendor {}", name);
        Ok(vendor)
    }

    fn create(
        &self,
        package: &PackageDescriptor,
        vendor: &Record,
        slug: &str,
    ) -> Result<Record, StoreError> {
        let record = self
            .store
            .create_child(vendor.id, slug, RecordKind::Package)?;

        let mut fields = vec![(Property::UriPathSegment, Value::from(slug))];
        fields.extend(package_fields(package));
        self.set_properties(&record, fields)?;

        self.store
            .create_child(record.id, MAINTAINERS, RecordKind::Maintainers)?;
        self.store
            .create_child(record.id, VERSIONS, RecordKind::Versions)?;
        self.store.create_child(record.id, README, RecordKind::Readme)?;

        info!("Created package {}", package.name);
        Ok(record)
    }

    fn update(&self, package: &PackageDescriptor, record: &Record) -> Result<(), StoreError> {
        let written = self.update_properties(record, package_fields(package))?;
        debug!("Updated {} fields of package {}", written, package.name);
        Ok(())
    }

    fn sync_maintainers(
        &self,
        package: &PackageDescriptor,
        record: &Record,
    ) -> Result<(), StoreError> {
        let storage = self.find_or_create_child(record, MAINTAINERS, RecordKind::Maintainers)?;

        let upstream: HashSet<String> = package
            .maintainers
            .iter()
            .map(|m| slugify(&m.name))
            .collect();
        for maintainer in self
            .store
            .list_children(storage.id, KindFilter::Maintainer)?
        {
            if upstream.contains(&maintainer.name) {
                continue;
            }
            debug!(
                "Removing maintainer {} from package {}",
                maintainer.name, package.name
            );
            self.store.remove(maintainer.id)?;
        }

        for maintainer in &package.maintainers {
            let name = slugify(&maintainer.name);
            let fields = maintainer_fields(maintainer);
            match self.store.find_child(storage.id, &name)? {
                Some(existing) => {
                    self.update_properties(&existing, fields)?;
                }
                None => {
                    let created =
                        self.store
                            .create_child(storage.id, &name, RecordKind::Maintainer)?;
                    self.set_properties(&created, fields)?;
                }
            }
        }

        Ok(())
    }

    fn sync_versions(&self, package: &PackageDescriptor, record: &Record) -> Result<(), StoreError> {
        let storage = self.find_or_create_child(record, VERSIONS, RecordKind::Versions)?;

        let upstream: HashSet<String> = package
            .versions
            .iter()
            .map(|v| slugify(&v.version))
            .collect();
        for version in self.store.list_children(storage.id, KindFilter::Version)? {
            if upstream.contains(&version.name) {
                continue;
            }
            debug!(
                "Removing version {} from package {}",
                version.name, package.name
            );
            self.store.remove(version.id)?;
        }

        for version in &package.versions {
            let class = classify(version.normalized());
            let kind = version_kind(class.stability);
            let name = slugify(&version.version);
            let fields = version_fields(version, &class);

            let node = match self.store.find_child(storage.id, &name)? {
                Some(existing) => {
                    if existing.kind != kind {
                        debug!(
                            "Version {} of {} moved from {} to {}",
                            version.version,
                            package.name,
                            existing.kind.as_str(),
                            kind.as_str()
                        );
                        self.store.change_kind(existing.id, kind)?;
                    }
                    self.update_properties(&existing, fields)?;
                    existing
                }
                None => {
                    let created = self.store.create_child(storage.id, &name, kind)?;
                    self.set_properties(&created, fields)?;
                    created
                }
            };

            if let Some(source) = &version.source {
                let source_record = self.find_or_create_child(&node, SOURCE, RecordKind::Source)?;
                self.update_properties(&source_record, source_fields(source))?;
            }

            if let Some(dist) = &version.dist {
                let dist_record = self.find_or_create_child(&node, DIST, RecordKind::Dist)?;
                self.update_properties(&dist_record, dist_fields(dist))?;
            }
        }

        Ok(())
    }

    /// Stores the newest version time as the package's last activity and
    /// refreshes its last version. Without any dated version the stored last
    /// activity is left as is.
    fn update_package_last_activity(&self, record: &Record) -> Result<(), StoreError> {
        let storage = self.find_or_create_child(record, VERSIONS, RecordKind::Versions)?;

        let mut last_activity: Option<DateTime<Utc>> = None;
        let mut summaries = Vec::new();
        for version in self.store.list_children(storage.id, KindFilter::Version)? {
            let time = self
                .store
                .get_property(version.id, Property::Time)?
                .and_then(|v| v.as_time());
            if let Some(time) = time
                && last_activity.is_none_or(|latest| time > latest)
            {
                last_activity = Some(time);
            }

            let label = self
                .store
                .get_property(version.id, Property::Version)?
                .and_then(|v| v.as_text().map(str::to_string));
            let rank = self
                .store
                .get_property(version.id, Property::VersionNormalized)?
                .and_then(|v| v.as_int());
            if let (Some(label), Some(rank)) = (label, rank) {
                summaries.push(VersionSummary {
                    version: label,
                    stability: version_stability(version.kind),
                    rank,
                });
            }
        }

        match last_activity {
            Some(time) => {
                self.update_property(record, Property::LastActivity, Value::Time(time))?;
            }
            None => debug!("Package {} has no dated versions", record.name),
        }

        let last_version = extract_last_version(&summaries).map(|s| s.version.clone());
        self.update_property(record, Property::LastVersion, last_version.into())?;

        Ok(())
    }

    /// Recompute a vendor's last activity from the packages it still owns
    pub fn update_vendor_last_activity(&self, vendor: &Record) -> Result<(), StoreError> {
        let mut last_activity: Option<DateTime<Utc>> = None;
        for package in self.store.list_children(vendor.id, KindFilter::Package)? {
            let time = self
                .store
                .get_property(package.id, Property::LastActivity)?
                .and_then(|v| v.as_time());
            if let Some(time) = time
                && last_activity.is_none_or(|latest| time > latest)
            {
                last_activity = Some(time);
            }
        }

        match last_activity {
            Some(time) => {
                self.update_property(vendor, Property::LastActivity, Value::Time(time))?;
            }
            None => debug!("Vendor {} has no active packages", vendor.name),
        }
        Ok(())
    }

    fn update_downloads(&self, package: &PackageDescriptor, record: &Record) -> Result<(), StoreError> {
        let Some(downloads) = package.downloads else {
            return Ok(());
        };
        self.update_properties(
            record,
            vec![
                (Property::DownloadTotal, Value::Int(downloads.total)),
                (Property::DownloadMonthly, Value::Int(downloads.monthly)),
                (Property::DownloadDaily, Value::Int(downloads.daily)),
            ],
        )?;
        Ok(())
    }

    /// Host failures never fail the package: rate limiting and other errors
    /// skip the step, a missing repository resets the metrics.
    async fn update_github_metrics(
        &self,
        package: &PackageDescriptor,
        record: &Record,
    ) -> Result<(), StoreError> {
        if package.abandoned.is_abandoned() {
            return self.reset_github_metrics(record);
        }

        let Some(GitHubRepo { org, repo }) = package
            .repository
            .as_deref()
            .and_then(parse_github_repository)
        else {
            return Ok(());
        };

        match self.host.fetch_repo_metrics(&org, &repo).await {
            Ok(metrics) => {
                self.update_properties(record, metric_fields(&metrics))?;
                self.update_readme(&org, &repo, record).await
            }
            Err(HostError::RateLimited { .. }) => {
                warn!(
                    "GitHub rate limit hit, skipping metrics of {}",
                    package.name
                );
                Ok(())
            }
            Err(HostError::NotFound(_)) => {
                warn!("Repository {}/{} not found", org, repo);
                self.reset_github_metrics(record)
            }
            Err(e) => {
                warn!("Failed to fetch metrics of {}/{}: {}", org, repo, e);
                Ok(())
            }
        }
    }

    async fn update_readme(&self, org: &str, repo: &str, record: &Record) -> Result<(), StoreError> {
        let Some(readme) = self.store.find_child(record.id, README)? else {
            return Ok(());
        };

        match self.host.fetch_rendered_readme(org, repo).await {
            Ok(html) => {
                let content = self.readme.process(org, repo, &html);
                self.update_property(&readme, Property::ReadmeSource, Value::Text(content))?;
            }
            Err(HostError::RateLimited { .. }) => {
                warn!("GitHub rate limit hit, skipping readme of {}/{}", org, repo);
            }
            Err(HostError::NotFound(_)) => debug!("No readme for {}/{}", org, repo),
            Err(e) => warn!("Failed to fetch readme of {}/{}: {}", org, repo, e),
        }
        Ok(())
    }

    fn reset_github_metrics(&self, record: &Record) -> Result<(), StoreError> {
        self.update_properties(record, metric_fields(&RepoMetrics::default()))?;
        Ok(())
    }

    fn update_abandoned(&self, package: &PackageDescriptor, record: &Record) -> Result<(), StoreError> {
        let previously_blank = self
            .store
            .get_property(record.id, Property::Abandoned)?
            .and_then(|v| v.as_text().map(|s| s.trim().is_empty()))
            .unwrap_or(true);

        self.update_property(record, Property::Abandoned, package.abandoned.marker().into())?;

        if package.abandoned.is_abandoned() && previously_blank {
            self.notifier
                .notify(Event::package_abandoned(record, &package.name));
        }
        Ok(())
    }

    fn find_or_create_child(
        &self,
        parent: &Record,
        name: &str,
        kind: RecordKind,
    ) -> Result<Record, StoreError> {
        match self.store.find_child(parent.id, name)? {
            Some(child) => Ok(child),
            None => self.store.create_child(parent.id, name, kind),
        }
    }

    /// Unconditional writes for freshly created records
    fn set_properties(&self, record: &Record, fields: Fields) -> Result<(), StoreError> {
        for (key, value) in fields {
            if value != Value::Null {
                self.store.set_property(record.id, key, value)?;
            }
        }
        Ok(())
    }

    /// Writes only the fields whose stored value differs; returns the write count
    fn update_properties(&self, record: &Record, fields: Fields) -> Result<usize, StoreError> {
        let mut written = 0;
        for (key, value) in fields {
            if self.update_property(record, key, value)? {
                written += 1;
            }
        }
        Ok(written)
    }

    fn update_property(
        &self,
        record: &Record,
        key: Property,
        value: Value,
    ) -> Result<bool, StoreError> {
        let unchanged = match self.store.get_property(record.id, key)? {
            Some(stored) => stored.same_as(&value),
            None => value == Value::Null,
        };
        if unchanged {
            return Ok(false);
        }

        self.store.set_property(record.id, key, value)?;
        Ok(true)
    }
}

fn version_kind(stability: Stability) -> RecordKind {
    match stability {
        Stability::Stable => RecordKind::ReleasedVersion,
        Stability::Prerelease => RecordKind::PrereleaseVersion,
        Stability::Dev => RecordKind::DevelopmentVersion,
    }
}

fn version_stability(kind: RecordKind) -> Stability {
    match kind {
        RecordKind::ReleasedVersion => Stability::Stable,
        RecordKind::DevelopmentVersion => Stability::Dev,
        _ => Stability::Prerelease,
    }
}

/// Fields shared by package creation and update. The title is rewritten on
/// update so that a slug collision leaves the last imported name in place.
fn package_fields(package: &PackageDescriptor) -> Fields {
    vec![
        (Property::Title, Value::from(package.name.as_str())),
        (Property::Description, package.description.clone().into()),
        (Property::Time, package.registered_at().into()),
        (Property::Type, package.package_type.clone().into()),
        (Property::Repository, package.repository.clone().into()),
        (Property::Favers, Value::Int(package.favers)),
    ]
}

fn maintainer_fields(maintainer: &MaintainerDescriptor) -> Fields {
    vec![
        (Property::Title, Value::from(maintainer.name.as_str())),
        (Property::Email, maintainer.email.clone().into()),
        (Property::Homepage, maintainer.homepage.clone().into()),
    ]
}

fn version_fields(version: &VersionDescriptor, class: &VersionClass) -> Fields {
    vec![
        (Property::Version, Value::from(version.version.as_str())),
        (Property::Description, version.description.clone().into()),
        (Property::Keywords, join_list(&version.keywords)),
        (Property::Homepage, version.homepage.clone().into()),
        (Property::VersionNormalized, Value::Int(class.rank)),
        (Property::Stability, Value::from(class.stability.as_str())),
        (Property::StabilityLevel, Value::from(class.level.as_str())),
        (Property::License, join_list(&version.license)),
        (Property::Type, version.package_type.clone().into()),
        (Property::Time, version.published_at().into()),
        (Property::Provide, links_to_text(&version.provide)),
        (Property::Bin, list_to_text(&version.bin)),
        (Property::Require, links_to_text(&version.require)),
        (Property::RequireDev, links_to_text(&version.require_dev)),
        (Property::Suggest, links_to_text(&version.suggest)),
        (Property::Conflict, links_to_text(&version.conflict)),
        (Property::Replace, links_to_text(&version.replace)),
    ]
}

fn source_fields(source: &SourceDescriptor) -> Fields {
    vec![
        (Property::Type, source.source_type.clone().into()),
        (Property::Reference, source.reference.clone().into()),
        (Property::Url, source.url.clone().into()),
    ]
}

fn dist_fields(dist: &DistDescriptor) -> Fields {
    vec![
        (Property::Type, dist.dist_type.clone().into()),
        (Property::Reference, dist.reference.clone().into()),
        (Property::Url, dist.url.clone().into()),
        (Property::Checksum, dist.shasum.clone().filter(|s| !s.is_empty()).into()),
    ]
}

fn metric_fields(metrics: &RepoMetrics) -> Fields {
    vec![
        (Property::GithubStargazers, Value::Int(metrics.stars)),
        (Property::GithubWatchers, Value::Int(metrics.watchers)),
        (Property::GithubForks, Value::Int(metrics.forks)),
        (Property::GithubIssues, Value::Int(metrics.open_issues)),
        (Property::GithubAvatar, metrics.org_avatar_url.clone().into()),
    ]
}

fn join_list(values: &[String]) -> Value {
    if values.is_empty() {
        Value::Null
    } else {
        Value::Text(values.join(", "))
    }
}

fn links_to_text(links: &LinkMap) -> Value {
    if links.is_empty() {
        return Value::Null;
    }
    serde_json::to_string_pretty(links).ok().into()
}

fn list_to_text(values: &[String]) -> Value {
    if values.is_empty() {
        return Value::Null;
    }
    serde_json::to_string_pretty(values).ok().into()
}
