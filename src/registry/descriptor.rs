//! Upstream package snapshot as published by the registry
//!
//! The shapes follow the Packagist package JSON. PHP-encoded registries
//! serialize empty maps as `[]` and occasionally single licenses as a plain
//! string, so the deserializers accept both forms.

use chrono::{DateTime, NaiveDateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use tracing::warn;

/// Dependency map: package name -> version constraint
pub type LinkMap = IndexMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PackageDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub favers: i64,
    #[serde(default)]
    pub abandoned: Abandoned,
    #[serde(default)]
    pub downloads: Option<Downloads>,
    #[serde(default, deserialize_with = "versions_from_map_or_list")]
    pub versions: Vec<VersionDescriptor>,
    #[serde(default)]
    pub maintainers: Vec<MaintainerDescriptor>,
}

impl PackageDescriptor {
    /// Part of the name before the first `/`
    pub fn vendor(&self) -> &str {
        self.name.split('/').next().unwrap_or(&self.name)
    }

    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.time.as_deref().and_then(parse_time)
    }
}

/// Abandonment marker: either a flag or the name of a replacement package
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Abandoned {
    Flag(bool),
    Replacement(String),
}

impl Default for Abandoned {
    fn default() -> Self {
        Abandoned::Flag(false)
    }
}

impl Abandoned {
    pub fn is_abandoned(&self) -> bool {
        match self {
            Abandoned::Flag(flag) => *flag,
            Abandoned::Replacement(_) => true,
        }
    }

    /// Value persisted on the package record, None when not abandoned
    pub fn marker(&self) -> Option<String> {
        match self {
            Abandoned::Flag(true) => Some("true".to_string()),
            Abandoned::Flag(false) => None,
            Abandoned::Replacement(name) if name.trim().is_empty() => Some("true".to_string()),
            Abandoned::Replacement(name) => Some(name.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Downloads {
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub monthly: i64,
    #[serde(default)]
    pub daily: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VersionDescriptor {
    pub version: String,
    #[serde(default)]
    pub version_normalized: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub homepage: Option<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub license: Vec<String>,
    #[serde(default, rename = "type")]
    pub package_type: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub require: LinkMap,
    #[serde(default, rename = "require-dev", deserialize_with = "map_or_empty_list")]
    pub require_dev: LinkMap,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub suggest: LinkMap,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub conflict: LinkMap,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub replace: LinkMap,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub provide: LinkMap,
    #[serde(default, deserialize_with = "string_or_list")]
    pub bin: Vec<String>,
    #[serde(default)]
    pub source: Option<SourceDescriptor>,
    #[serde(default)]
    pub dist: Option<DistDescriptor>,
}

impl VersionDescriptor {
    /// Normalized version, falling back to the display version
    pub fn normalized(&self) -> &str {
        self.version_normalized.as_deref().unwrap_or(&self.version)
    }

    /// Publish time; unparseable timestamps are logged and treated as absent
    pub fn published_at(&self) -> Option<DateTime<Utc>> {
        self.time.as_deref().and_then(parse_time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SourceDescriptor {
    #[serde(default, rename = "type")]
    pub source_type: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DistDescriptor {
    #[serde(default, rename = "type")]
    pub dist_type: Option<String>,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub shasum: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MaintainerDescriptor {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub homepage: Option<String>,
}

/// Parse a registry timestamp (`2024-01-15T10:30:00+00:00` or
/// `2024-01-15T10:30:00+0000`). Naive timestamps are taken as UTC.
pub fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let parsed = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .map(|t| t.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|t| t.and_utc()));

    match parsed {
        Ok(time) => Some(time),
        Err(e) => {
            warn!("Ignoring unparseable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

fn map_or_empty_list<'de, D>(deserializer: D) -> Result<LinkMap, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList {
        Map(LinkMap),
        List(Vec<serde_json::Value>),
        Null(()),
    }

    match MapOrList::deserialize(deserializer)? {
        MapOrList::Map(map) => Ok(map),
        MapOrList::List(list) if list.is_empty() => Ok(LinkMap::new()),
        MapOrList::List(_) => Err(serde::de::Error::custom(
            "expected a map of package constraints",
        )),
        MapOrList::Null(()) => Ok(LinkMap::new()),
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
        Null(()),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) => vec![s],
        StringOrList::Many(list) => list,
        StringOrList::Null(()) => Vec::new(),
    })
}

fn versions_from_map_or_list<'de, D>(deserializer: D) -> Result<Vec<VersionDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList {
        Map(IndexMap<String, VersionDescriptor>),
        List(Vec<VersionDescriptor>),
    }

    Ok(match MapOrList::deserialize(deserializer)? {
        MapOrList::Map(map) => map.into_values().collect(),
        MapOrList::List(list) => list,
    })
}
