//! Stability classification for Composer-style normalized versions

use std::fmt;

/// Coarse stability tier, selects the record kind a version is stored as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stability {
    Stable,
    Prerelease,
    Dev,
}

impl Stability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Prerelease => "prerelease",
            Stability::Dev => "dev",
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stability {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stable" => Ok(Stability::Stable),
            "prerelease" => Ok(Stability::Prerelease),
            "dev" => Ok(Stability::Dev),
            _ => Err(()),
        }
    }
}

/// Fine-grained stability, ordered from least to most stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StabilityLevel {
    Dev,
    /// Suffix or number that could not be read
    Unknown,
    Alpha,
    Beta,
    ReleaseCandidate,
    Stable,
}

impl StabilityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StabilityLevel::Dev => "dev",
            StabilityLevel::Unknown => "unknown",
            StabilityLevel::Alpha => "alpha",
            StabilityLevel::Beta => "beta",
            StabilityLevel::ReleaseCandidate => "RC",
            StabilityLevel::Stable => "stable",
        }
    }

    pub fn stability(&self) -> Stability {
        match self {
            StabilityLevel::Stable => Stability::Stable,
            StabilityLevel::Dev => Stability::Dev,
            _ => Stability::Prerelease,
        }
    }

    /// Base of the suffix weight packed into the low three digits of a rank
    fn weight(&self) -> i64 {
        match self {
            StabilityLevel::Dev => 100,
            StabilityLevel::Unknown => 150,
            StabilityLevel::Alpha => 200,
            StabilityLevel::Beta => 400,
            StabilityLevel::ReleaseCandidate => 600,
            StabilityLevel::Stable => 900,
        }
    }
}

/// Result of classifying a version string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionClass {
    pub stability: Stability,
    pub level: StabilityLevel,
    /// Total order across version strings; larger is newer
    pub rank: i64,
}

const MAJOR_LIMIT: u64 = 999_999;
const COMPONENT_LIMIT: u64 = 999;

/// Classify a normalized version string.
///
/// Examples:
/// - "1.0.0.0" -> stable
/// - "2.0.0.0-beta2" -> prerelease (beta), ranked below "2.0.0.0"
/// - "dev-master", "1.0.9999999.9999999-dev" -> dev
/// - "not a version" -> prerelease (unknown), rank 0
pub fn classify(normalized: &str) -> VersionClass {
    let trimmed = normalized.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower.starts_with("dev-") {
        return VersionClass {
            stability: Stability::Dev,
            level: StabilityLevel::Dev,
            rank: 0,
        };
    }

    let body = lower.strip_prefix('v').unwrap_or(&lower);
    let (numeric, suffix) = match body.split_once('-') {
        Some((numeric, suffix)) => (numeric, Some(suffix)),
        None => (body, None),
    };

    let Some(components) = parse_components(numeric) else {
        return VersionClass {
            stability: Stability::Prerelease,
            level: StabilityLevel::Unknown,
            rank: pack(&leading_components(numeric), 0),
        };
    };

    let (level, number) = match suffix {
        None => (StabilityLevel::Stable, 0),
        Some(suffix) if suffix == "dev" || suffix.ends_with("-dev") => (StabilityLevel::Dev, 0),
        Some(suffix) => parse_suffix(suffix),
    };

    let weight = match (level, suffix) {
        // patch releases sort just above the plain release
        (StabilityLevel::Stable, Some(_)) => level.weight() + 1 + number.min(98),
        (StabilityLevel::Dev | StabilityLevel::Unknown, _) => level.weight(),
        _ => level.weight() + number.min(99),
    };

    VersionClass {
        stability: level.stability(),
        level,
        rank: pack(&components, weight),
    }
}

/// Up to four dot-separated numeric components, or None if any is not numeric
fn parse_components(numeric: &str) -> Option<Vec<u64>> {
    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.len() > 4 {
        return None;
    }
    parts.into_iter().map(parse_number).collect()
}

/// Numeric components read from the front until the first unreadable one
fn leading_components(numeric: &str) -> Vec<u64> {
    numeric
        .split('.')
        .take(4)
        .map_while(parse_number)
        .collect()
}

fn parse_number(part: &str) -> Option<u64> {
    if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // All digits, so the only possible failure is overflow
    Some(part.parse().unwrap_or(u64::MAX))
}

fn parse_suffix(suffix: &str) -> (StabilityLevel, i64) {
    let label_end = suffix
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(suffix.len());
    let (label, rest) = suffix.split_at(label_end);
    let rest = rest.trim_start_matches(['.', '-']);

    let number = if rest.is_empty() {
        Some(0)
    } else {
        parse_number(rest).map(|n| n.min(i64::MAX as u64) as i64)
    };

    let level = match label {
        "stable" | "patch" | "pl" | "p" => StabilityLevel::Stable,
        "rc" => StabilityLevel::ReleaseCandidate,
        "beta" | "b" => StabilityLevel::Beta,
        "alpha" | "a" => StabilityLevel::Alpha,
        _ => StabilityLevel::Unknown,
    };

    match number {
        Some(number) => (level, number),
        None => (StabilityLevel::Unknown, 0),
    }
}

fn pack(components: &[u64], weight: i64) -> i64 {
    let component = |i: usize, limit: u64| components.get(i).copied().unwrap_or(0).min(limit) as i64;

    component(0, MAJOR_LIMIT) * 1_000_000_000_000
        + component(1, COMPONENT_LIMIT) * 1_000_000_000
        + component(2, COMPONENT_LIMIT) * 1_000_000
        + component(3, COMPONENT_LIMIT) * 1_000
        + weight
}
