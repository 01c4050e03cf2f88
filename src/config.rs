use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default lifetime of cached GitHub responses in milliseconds (1 hour)
pub const DEFAULT_CACHE_TTL_MS: i64 = 60 * 60 * 1000;

/// Delay between starting each fetch request to avoid rate limiting (10ms)
pub const FETCH_STAGGER_DELAY_MS: u64 = 10;

// =============================================================================
// Registry constants
// =============================================================================

/// Package type listed from the registry
pub const DEFAULT_PACKAGE_TYPE: &str = "neos-package";

/// Number of package descriptors fetched concurrently
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Importer configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub github: GitHubConfig,
    pub packagist: PackagistConfig,
    pub cache: CacheConfig,
    pub import: ImportConfig,
}

/// GitHub API configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GitHubConfig {
    /// Personal access token; falls back to `GITHUB_TOKEN`
    pub token: Option<String>,
    pub base_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: crate::host::github::DEFAULT_BASE_URL.to_string(),
        }
    }
}

/// Package registry configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PackagistConfig {
    pub base_url: String,
    pub package_type: String,
}

impl Default for PackagistConfig {
    fn default() -> Self {
        Self {
            base_url: crate::registry::packagist::DEFAULT_BASE_URL.to_string(),
            package_type: DEFAULT_PACKAGE_TYPE.to_string(),
        }
    }
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Lifetime of cached GitHub responses in milliseconds
    pub ttl: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL_MS,
        }
    }
}

/// Import run configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    pub fetch_concurrency: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }
}

impl SyncConfig {
    /// Load the configuration from an optional JSON file.
    ///
    /// Missing fields use their defaults. A GitHub token that is not
    /// configured is taken from `GITHUB_TOKEN`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                serde_json::from_str::<SyncConfig>(&raw)?
            }
            None => SyncConfig::default(),
        };
        config.apply_env(std::env::var("GITHUB_TOKEN").ok());
        Ok(config)
    }

    fn apply_env(&mut self, github_token: Option<String>) {
        if self.github.token.is_none() {
            self.github.token = github_token.filter(|t| !t.trim().is_empty());
        }
        if self.import.fetch_concurrency == 0 {
            self.import.fetch_concurrency = 1;
        }
    }
}

/// Returns the path to the data directory for marketplace-sync.
/// Uses $XDG_DATA_HOME/marketplace-sync if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/marketplace-sync,
/// or ./marketplace-sync if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the record database file.
pub fn db_path() -> PathBuf {
    data_dir().join("marketplace.db")
}

/// Returns the path to the GitHub response cache.
pub fn cache_db_path() -> PathBuf {
    data_dir().join("responses.db")
}

/// Returns the directory daily log files are written to.
pub fn log_path() -> PathBuf {
    data_dir().join("logs")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("marketplace-sync")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn sync_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<SyncConfig>(json!({
            "cache": {
                "ttl": 1000
            }
        }))
        .unwrap();

        assert_eq!(result.cache.ttl, 1000);
        assert_eq!(result.github, GitHubConfig::default());
        assert_eq!(result.packagist.package_type, "neos-package");
        assert_eq!(result.import.fetch_concurrency, DEFAULT_FETCH_CONCURRENCY);
    }

    #[test]
    fn sync_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<SyncConfig>(json!({
            "github": { "token": "secret", "baseUrl": "http://localhost:1" },
            "packagist": { "baseUrl": "http://localhost:2", "packageType": "library" },
            "cache": { "ttl": 5000 },
            "import": { "fetchConcurrency": 2 }
        }))
        .unwrap();

        assert_eq!(
            result,
            SyncConfig {
                github: GitHubConfig {
                    token: Some("secret".to_string()),
                    base_url: "http://localhost:1".to_string(),
                },
                packagist: PackagistConfig {
                    base_url: "http://localhost:2".to_string(),
                    package_type: "library".to_string(),
                },
                cache: CacheConfig { ttl: 5000 },
                import: ImportConfig {
                    fetch_concurrency: 2
                },
            }
        );
    }

    #[test]
    fn apply_env_prefers_configured_token() {
        let mut config = SyncConfig::default();
        config.github.token = Some("configured".to_string());

        config.apply_env(Some("from-env".to_string()));

        assert_eq!(config.github.token.as_deref(), Some("configured"));
    }

    #[test]
    fn apply_env_ignores_blank_token_and_zero_concurrency() {
        let mut config = SyncConfig::default();
        config.import.fetch_concurrency = 0;

        config.apply_env(Some("  ".to_string()));

        assert_eq!(config.github.token, None);
        assert_eq!(config.import.fetch_concurrency, 1);
    }

    #[test]
    #[serial]
    fn load_reads_file_and_falls_back_to_env_token() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{ "import": {{ "fetchConcurrency": 3 }} }}"#).unwrap();
        unsafe { std::env::set_var("GITHUB_TOKEN", "env-token") };

        let config = SyncConfig::load(Some(file.path())).unwrap();

        unsafe { std::env::remove_var("GITHUB_TOKEN") };
        assert_eq!(config.import.fetch_concurrency, 3);
        assert_eq!(config.github.token.as_deref(), Some("env-token"));
    }

    #[test]
    #[serial]
    fn load_without_file_returns_defaults() {
        unsafe { std::env::remove_var("GITHUB_TOKEN") };

        let config = SyncConfig::load(None).unwrap();

        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn load_fails_on_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            SyncConfig::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_fails_on_missing_file() {
        let temp_dir = TempDir::new().unwrap();

        assert!(matches!(
            SyncConfig::load(Some(&temp_dir.path().join("missing.json"))),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/marketplace-sync"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(
            path,
            PathBuf::from("/home/user/.local/share/marketplace-sync")
        );
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./marketplace-sync"));
    }
}
