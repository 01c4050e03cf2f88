//! Response cache for host API calls
//!
//! Only successful responses are cached; errors (including rate limiting)
//! always reach the caller so the next run retries them.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{CacheError, HostError};
use crate::host::{HostMetrics, RepoMetrics};

/// Key/value store for serialized API responses
pub trait ResponseCache: Send + Sync {
    /// Returns the cached body if present and not older than the cache TTL
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn put(&self, key: &str, body: &str) -> Result<(), CacheError>;
}

pub struct SqliteResponseCache {
    conn: Mutex<Connection>,
    ttl_ms: i64,
}

impl SqliteResponseCache {
    pub fn new(db_path: &Path, ttl_ms: i64) -> Result<Self, CacheError> {
        info!("Initializing response cache at {:?}", db_path);

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        Self::from_connection(conn, ttl_ms)
    }

    pub fn open_in_memory(ttl_ms: i64) -> Result<Self, CacheError> {
        Self::from_connection(Connection::open_in_memory()?, ttl_ms)
    }

    fn from_connection(conn: Connection, ttl_ms: i64) -> Result<Self, CacheError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                fetched_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            ttl_ms,
        })
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn.lock().map_err(|_| CacheError::LockPoisoned)
    }

    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Delete entries older than the TTL, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let threshold = Self::current_timestamp_ms() - self.ttl_ms;
        let conn = self.lock_conn()?;
        let removed = conn.execute("DELETE FROM responses WHERE fetched_at < ?1", [threshold])?;
        debug!("Purged {} expired responses", removed);
        Ok(removed)
    }
}

impl ResponseCache for SqliteResponseCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let threshold = Self::current_timestamp_ms() - self.ttl_ms;
        let conn = self.lock_conn()?;
        let body = conn
            .query_row(
                "SELECT body FROM responses WHERE key = ?1 AND fetched_at >= ?2",
                (key, threshold),
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn put(&self, key: &str, body: &str) -> Result<(), CacheError> {
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            INSERT INTO responses (key, body, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET body = excluded.body, fetched_at = excluded.fetched_at
            "#,
            (key, body, now),
        )?;
        Ok(())
    }
}

/// [`HostMetrics`] decorator that serves repeated requests from a [`ResponseCache`]
pub struct CachedHost {
    inner: Arc<dyn HostMetrics>,
    cache: Arc<dyn ResponseCache>,
}

impl CachedHost {
    pub fn new(inner: Arc<dyn HostMetrics>, cache: Arc<dyn ResponseCache>) -> Self {
        Self { inner, cache }
    }

    /// Cache failures degrade to a miss; they never fail the request
    fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let body = self
            .cache
            .get(key)
            .inspect_err(|e| warn!("Failed to read cached response {}: {}", key, e))
            .ok()??;

        serde_json::from_str(&body)
            .inspect_err(|e| warn!("Discarding undecodable cached response {}: {}", key, e))
            .ok()
    }

    fn store<T: Serialize>(&self, key: &str, value: &T) {
        let body = match serde_json::to_string(value) {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode response {} for caching: {}", key, e);
                return;
            }
        };
        let _ = self
            .cache
            .put(key, &body)
            .inspect_err(|e| warn!("Failed to cache response {}: {}", key, e));
    }
}

#[async_trait::async_trait]
impl HostMetrics for CachedHost {
    async fn fetch_repo_metrics(&self, org: &str, repo: &str) -> Result<RepoMetrics, HostError> {
        let key = format!("repos/{}/{}", org, repo);
        if let Some(metrics) = self.lookup(&key) {
            debug!("Serving {} from response cache", key);
            return Ok(metrics);
        }

        let metrics = self.inner.fetch_repo_metrics(org, repo).await?;
        self.store(&key, &metrics);
        Ok(metrics)
    }

    async fn fetch_rendered_readme(&self, org: &str, repo: &str) -> Result<String, HostError> {
        let key = format!("readme/{}/{}", org, repo);
        if let Some(html) = self.lookup(&key) {
            debug!("Serving {} from response cache", key);
            return Ok(html);
        }

        let html = self.inner.fetch_rendered_readme(org, repo).await?;
        self.store(&key, &html);
        Ok(html)
    }
}
