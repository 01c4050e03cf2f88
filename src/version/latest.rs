//! Selection of the version shown as a package's "last version"

use crate::version::stability::Stability;

/// What the last-version selection needs to know about a stored version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSummary {
    pub version: String,
    pub stability: Stability,
    pub rank: i64,
}

/// Pick the highest ranked stable version, falling back to the highest
/// ranked prerelease. Development branches are never selected.
///
/// Ties keep the first summary in `versions`.
pub fn extract_last_version(versions: &[VersionSummary]) -> Option<&VersionSummary> {
    [Stability::Stable, Stability::Prerelease]
        .into_iter()
        .find_map(|tier| {
            versions
                .iter()
                .filter(|v| v.stability == tier)
                .fold(None, |best: Option<&VersionSummary>, v| match best {
                    Some(b) if b.rank >= v.rank => Some(b),
                    _ => Some(v),
                })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::stability::classify;

    fn summaries(versions: &[&str]) -> Vec<VersionSummary> {
        versions
            .iter()
            .map(|v| {
                let class = classify(v);
                VersionSummary {
                    version: v.to_string(),
                    stability: class.stability,
                    rank: class.rank,
                }
            })
            .collect()
    }

    #[test]
    fn extract_last_version_prefers_highest_stable() {
        let versions = summaries(&["1.0.0", "3.0.0-beta1", "2.1.0", "dev-master"]);

        let last = extract_last_version(&versions).unwrap();

        assert_eq!(last.version, "2.1.0");
    }

    #[test]
    fn extract_last_version_falls_back_to_prerelease() {
        let versions = summaries(&["1.0.0-alpha1", "1.0.0-RC2", "dev-master"]);

        let last = extract_last_version(&versions).unwrap();

        assert_eq!(last.version, "1.0.0-RC2");
    }

    #[test]
    fn extract_last_version_ignores_dev_only_packages() {
        let versions = summaries(&["dev-master", "dev-main"]);

        assert_eq!(extract_last_version(&versions), None);
    }

    #[test]
    fn extract_last_version_keeps_first_on_tie() {
        let versions = summaries(&["1.0.0", "v1.0.0"]);

        let last = extract_last_version(&versions).unwrap();

        assert_eq!(last.version, "1.0.0");
    }
}
