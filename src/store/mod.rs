//! Record store layer
//!
//! The reconciler talks to the package tree exclusively through the
//! [`RecordStore`] trait. Records form a tree rooted at a storage record:
//!
//! ```text
//! root
//!  └── vendor (Vendor)
//!       └── package (Package)
//!            ├── maintainers (Maintainers) ── maintainer (Maintainer)
//!            ├── versions (Versions) ── version (*Version) ── source / dist
//!            └── readme (Readme)
//! ```
//!
//! Property keys and values are closed enums so that every field the
//! reconciler writes is named once, here.
//!
//! # Modules
//!
//! - [`sqlite`]: SQLite-backed store used by the binary

pub mod sqlite;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub use sqlite::SqliteRecordStore;

/// Opaque identity of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of a record in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Storage,
    Vendor,
    Package,
    Maintainers,
    Maintainer,
    Versions,
    ReleasedVersion,
    PrereleaseVersion,
    DevelopmentVersion,
    Source,
    Dist,
    Readme,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Storage => "storage",
            RecordKind::Vendor => "vendor",
            RecordKind::Package => "package",
            RecordKind::Maintainers => "maintainers",
            RecordKind::Maintainer => "maintainer",
            RecordKind::Versions => "versions",
            RecordKind::ReleasedVersion => "released_version",
            RecordKind::PrereleaseVersion => "prerelease_version",
            RecordKind::DevelopmentVersion => "development_version",
            RecordKind::Source => "source",
            RecordKind::Dist => "dist",
            RecordKind::Readme => "readme",
        }
    }

    pub fn is_version(&self) -> bool {
        matches!(
            self,
            RecordKind::ReleasedVersion
                | RecordKind::PrereleaseVersion
                | RecordKind::DevelopmentVersion
        )
    }
}

impl std::str::FromStr for RecordKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storage" => Ok(RecordKind::Storage),
            "vendor" => Ok(RecordKind::Vendor),
            "package" => Ok(RecordKind::Package),
            "maintainers" => Ok(RecordKind::Maintainers),
            "maintainer" => Ok(RecordKind::Maintainer),
            "versions" => Ok(RecordKind::Versions),
            "released_version" => Ok(RecordKind::ReleasedVersion),
            "prerelease_version" => Ok(RecordKind::PrereleaseVersion),
            "development_version" => Ok(RecordKind::DevelopmentVersion),
            "source" => Ok(RecordKind::Source),
            "dist" => Ok(RecordKind::Dist),
            "readme" => Ok(RecordKind::Readme),
            _ => Err(()),
        }
    }
}

/// Selects a family of record kinds when listing children or descendants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFilter {
    Vendor,
    Package,
    Maintainer,
    /// Any of the three version kinds
    Version,
}

impl KindFilter {
    pub fn kinds(&self) -> &'static [RecordKind] {
        match self {
            KindFilter::Vendor => &[RecordKind::Vendor],
            KindFilter::Package => &[RecordKind::Package],
            KindFilter::Maintainer => &[RecordKind::Maintainer],
            KindFilter::Version => &[
                RecordKind::ReleasedVersion,
                RecordKind::PrereleaseVersion,
                RecordKind::DevelopmentVersion,
            ],
        }
    }

    pub fn matches(&self, kind: RecordKind) -> bool {
        self.kinds().contains(&kind)
    }
}

/// A record handle: identity plus the name it is keyed by under its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub name: String,
    pub kind: RecordKind,
}

/// Every property the importer reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Property {
    UriPathSegment,
    Title,
    Description,
    Repository,
    Time,
    Type,
    Favers,
    DownloadTotal,
    DownloadMonthly,
    DownloadDaily,
    GithubStargazers,
    GithubWatchers,
    GithubForks,
    GithubIssues,
    GithubAvatar,
    Abandoned,
    LastActivity,
    LastVersion,
    Email,
    Homepage,
    Version,
    Keywords,
    VersionNormalized,
    Stability,
    StabilityLevel,
    License,
    Provide,
    Bin,
    Require,
    RequireDev,
    Suggest,
    Conflict,
    Replace,
    Reference,
    Url,
    Checksum,
    ReadmeSource,
}

impl Property {
    pub fn as_str(&self) -> &'static str {
        match self {
            Property::UriPathSegment => "uriPathSegment",
            Property::Title => "title",
            Property::Description => "description",
            Property::Repository => "repository",
            Property::Time => "time",
            Property::Type => "type",
            Property::Favers => "favers",
            Property::DownloadTotal => "downloadTotal",
            Property::DownloadMonthly => "downloadMonthly",
            Property::DownloadDaily => "downloadDaily",
            Property::GithubStargazers => "githubStargazers",
            Property::GithubWatchers => "githubWatchers",
            Property::GithubForks => "githubForks",
            Property::GithubIssues => "githubIssues",
            Property::GithubAvatar => "githubAvatar",
            Property::Abandoned => "abandoned",
            Property::LastActivity => "lastActivity",
            Property::LastVersion => "lastVersion",
            Property::Email => "email",
            Property::Homepage => "homepage",
            Property::Version => "version",
            Property::Keywords => "keywords",
            Property::VersionNormalized => "versionNormalized",
            Property::Stability => "stability",
            Property::StabilityLevel => "stabilityLevel",
            Property::License => "license",
            Property::Provide => "provide",
            Property::Bin => "bin",
            Property::Require => "require",
            Property::RequireDev => "requireDev",
            Property::Suggest => "suggest",
            Property::Conflict => "conflict",
            Property::Replace => "replace",
            Property::Reference => "reference",
            Property::Url => "url",
            Property::Checksum => "checksum",
            Property::ReadmeSource => "readmeSource",
        }
    }
}

/// A typed property value
///
/// `Null` is never stored: writing it clears the property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Bool(bool),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// Equality used by idempotent writes: timestamps compare at second
    /// granularity, everything else structurally.
    pub fn same_as(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Time(a), Value::Time(b)) => a.timestamp() == b.timestamp(),
            _ => self == other,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Time(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Narrow interface to the hierarchical record store
///
/// `find_child` must observe earlier `create_child` calls, and removed records
/// must disappear from `list_children` / `find_descendants`. Each call is an
/// independent write; callers never rely on cross-call transactions.
pub trait RecordStore: Send + Sync {
    /// The storage root that vendors hang off
    fn root(&self) -> Result<Record, StoreError>;

    fn find_child(&self, parent: RecordId, name: &str) -> Result<Option<Record>, StoreError>;

    fn create_child(
        &self,
        parent: RecordId,
        name: &str,
        kind: RecordKind,
    ) -> Result<Record, StoreError>;

    fn get_property(&self, record: RecordId, key: Property) -> Result<Option<Value>, StoreError>;

    /// Writes a property; `Value::Null` removes it. Repeating a write is safe.
    fn set_property(&self, record: RecordId, key: Property, value: Value)
    -> Result<(), StoreError>;

    /// Direct children matching `filter`, in creation order
    fn list_children(&self, parent: RecordId, filter: KindFilter)
    -> Result<Vec<Record>, StoreError>;

    /// All descendants (any depth) matching `filter`, in creation order
    fn find_descendants(
        &self,
        ancestor: RecordId,
        filter: KindFilter,
    ) -> Result<Vec<Record>, StoreError>;

    /// Removes a record together with its whole subtree
    fn remove(&self, record: RecordId) -> Result<(), StoreError>;

    fn change_kind(&self, record: RecordId, kind: RecordKind) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    #[rstest]
    #[case(RecordKind::ReleasedVersion, true)]
    #[case(RecordKind::PrereleaseVersion, true)]
    #[case(RecordKind::DevelopmentVersion, true)]
    #[case(RecordKind::Package, false)]
    #[case(RecordKind::Versions, false)]
    fn is_version_returns_expected(#[case] kind: RecordKind, #[case] expected: bool) {
        assert_eq!(kind.is_version(), expected);
        assert_eq!(KindFilter::Version.matches(kind), expected);
    }

    #[test]
    fn record_kind_round_trips_through_str() {
        for kind in [
            RecordKind::Storage,
            RecordKind::Vendor,
            RecordKind::Package,
            RecordKind::Maintainers,
            RecordKind::Maintainer,
            RecordKind::Versions,
            RecordKind::ReleasedVersion,
            RecordKind::PrereleaseVersion,
            RecordKind::DevelopmentVersion,
            RecordKind::Source,
            RecordKind::Dist,
            RecordKind::Readme,
        ] {
            assert_eq!(kind.as_str().parse::<RecordKind>(), Ok(kind));
        }
    }

    #[test]
    fn same_as_compares_timestamps_at_second_granularity() {
        let a = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let b = Utc.timestamp_opt(1_700_000_000, 999_000_000).unwrap();
        let c = Utc.timestamp_opt(1_700_000_001, 0).unwrap();

        assert!(Value::Time(a).same_as(&Value::Time(b)));
        assert!(!Value::Time(a).same_as(&Value::Time(c)));
        assert!(!Value::Int(1).same_as(&Value::Text("1".to_string())));
    }

    #[test]
    fn option_none_converts_to_null() {
        let value: Value = Option::<String>::None.into();
        assert_eq!(value, Value::Null);
        let value: Value = Some(3_i64).into();
        assert_eq!(value, Value::Int(3));
    }
}
