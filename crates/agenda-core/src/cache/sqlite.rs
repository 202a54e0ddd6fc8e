//! SQLite-based persistent cache implementation.

use super::traits::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats};
use crate::error::{AgendaError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

fn cache_err(context: &str, err: impl std::fmt::Display) -> AgendaError {
    AgendaError::CacheUnavailable {
        message: format!("{}: {}", context, err),
    }
}

fn parse_ts(value: &str, fallback: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(fallback)
}

/// SQLite-based cache backend.
///
/// Survives restarts, so a warm cache keeps serving after a redeploy.
/// Thread-safe via internal mutex on the connection.
pub struct SqliteCache {
    conn: Arc<Mutex<Connection>>,
    config: CacheConfig,
}

impl SqliteCache {
    /// Create a new cache at the specified database path.
    ///
    /// Creates the database and tables if they don't exist.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(db_path, CacheConfig::default())
    }

    /// Create a new cache with custom configuration.
    pub fn with_config(db_path: impl AsRef<Path>, config: CacheConfig) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgendaError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| cache_err("Failed to open cache database", e))?;

        // WAL keeps readers from blocking the writer
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| cache_err("Failed to set pragmas", e))?;

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };
        cache.init_schema()?;

        Ok(cache)
    }

    /// Create a throwaway in-memory database, mainly for tests.
    pub fn in_memory(config: CacheConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| cache_err("Failed to open in-memory cache", e))?;
        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        };
        cache.init_schema()?;
        Ok(cache)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| cache_err("Failed to lock cache database", e))
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                cached_at TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                last_accessed TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            CREATE INDEX IF NOT EXISTS idx_cache_expires
                ON cache_entries(namespace, expires_at);

            CREATE INDEX IF NOT EXISTS idx_cache_accessed
                ON cache_entries(last_accessed);
            "#,
        )
        .map_err(|e| cache_err("Failed to initialize cache schema", e))?;
        Ok(())
    }

    /// Drop least recently accessed entries until under `max_capacity`.
    fn evict_to_capacity(&self, conn: &Connection) -> Result<usize> {
        if self.config.max_capacity == 0 {
            return Ok(0);
        }

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
            .map_err(|e| cache_err("Failed to count cache entries", e))?;
        let excess = count - self.config.max_capacity as i64;
        if excess <= 0 {
            return Ok(0);
        }

        let evicted = conn
            .execute(
                r#"
                DELETE FROM cache_entries WHERE rowid IN (
                    SELECT rowid FROM cache_entries ORDER BY last_accessed ASC LIMIT ?1
                )
                "#,
                params![excess],
            )
            .map_err(|e| cache_err("Failed to evict cache entries", e))?;

        debug!("Evicted {} cache entries to stay under capacity", evicted);
        Ok(evicted)
    }
}

impl CacheBackend for SqliteCache {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let row: Option<(Vec<u8>, String, String)> = conn
            .query_row(
                r#"
                SELECT value, cached_at, expires_at
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2 AND expires_at > ?3
                "#,
                params![namespace, key, now_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(|e| cache_err("Failed to query cache entry", e))?;

        let Some((value, cached_at_str, expires_at_str)) = row else {
            return Ok(None);
        };

        // Best effort, only feeds eviction order
        let _ = conn.execute(
            "UPDATE cache_entries SET last_accessed = ?1 WHERE namespace = ?2 AND key = ?3",
            params![now_str, namespace, key],
        );

        Ok(Some(CacheEntry {
            value,
            cached_at: parse_ts(&cached_at_str, now),
            expires_at: parse_ts(&expires_at_str, now),
        }))
    }

    fn set_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (namespace, key, value, cached_at, expires_at, last_accessed)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![namespace, key, value, now, expires_at.to_rfc3339(), now],
        )
        .map_err(|e| cache_err("Failed to set cache entry", e))?;

        self.evict_to_capacity(&conn)?;
        Ok(())
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| cache_err("Failed to invalidate cache entry", e))?;
        Ok(deleted > 0)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| cache_err("Failed to invalidate namespace", e))?;

        debug!(
            "Invalidated {} entries from namespace '{}'",
            deleted, namespace
        );
        Ok(deleted)
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT namespace, COUNT(*), COALESCE(SUM(LENGTH(value)), 0)
                FROM cache_entries
                WHERE expires_at > ?1
                GROUP BY namespace
                ORDER BY namespace
                "#,
            )
            .map_err(|e| cache_err("Failed to prepare stats query", e))?;

        let namespaces: Vec<CacheMeta> = stmt
            .query_map(params![now], |row| {
                let count: i64 = row.get(1)?;
                let size: i64 = row.get(2)?;
                Ok(CacheMeta {
                    namespace: row.get(0)?,
                    entry_count: count as usize,
                    total_size_bytes: size as u64,
                })
            })
            .map_err(|e| cache_err("Failed to query cache stats", e))?
            .filter_map(|r| r.ok())
            .collect();

        Ok(CacheStats {
            backend: self.name().to_string(),
            total_entries: namespaces.iter().map(|n| n.entry_count).sum(),
            total_size_bytes: namespaces.iter().map(|n| n.total_size_bytes).sum(),
            max_capacity: self.config.max_capacity,
            namespaces,
        })
    }

    fn cleanup_expired(&self) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![Utc::now().to_rfc3339()],
            )
            .map_err(|e| cache_err("Failed to cleanup expired entries", e))?;

        if deleted > 0 {
            debug!("Cleaned up {} expired cache entries", deleted);
        }
        Ok(deleted)
    }

    fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM cache_entries", [])
            .map_err(|e| cache_err("Failed to clear cache entries", e))?;
        debug!("Cleared all cache data");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn create_test_cache() -> (TempDir, SqliteCache) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test_cache.sqlite");
        let cache = SqliteCache::new(&db_path).unwrap();
        (temp_dir, cache)
    }

    #[test]
    fn test_set_and_get() {
        let (_temp, cache) = create_test_cache();

        cache
            .set("contacts", "1", b"{\"id\":1}", Duration::from_secs(3600))
            .unwrap();

        let value = cache.get("contacts", "1").unwrap();
        assert_eq!(value.unwrap(), b"{\"id\":1}");
    }

    #[test]
    fn test_expiration() {
        let (_temp, cache) = create_test_cache();

        let expired_at = Utc::now() - chrono::Duration::seconds(1);
        cache
            .set_with_expiry("contacts", "old", b"old data", expired_at)
            .unwrap();

        assert!(cache.get("contacts", "old").unwrap().is_none());
        assert!(!cache.is_valid("contacts", "old").unwrap());
    }

    #[test]
    fn test_invalidate() {
        let (_temp, cache) = create_test_cache();

        cache
            .set("contacts", "1", b"one", Duration::from_secs(3600))
            .unwrap();
        cache
            .set("contacts", "2", b"two", Duration::from_secs(3600))
            .unwrap();

        assert!(cache.invalidate("contacts", "1").unwrap());
        assert!(!cache.invalidate("contacts", "1").unwrap());

        assert!(!cache.is_valid("contacts", "1").unwrap());
        assert!(cache.is_valid("contacts", "2").unwrap());
    }

    #[test]
    fn test_namespace_isolation() {
        let (_temp, cache) = create_test_cache();

        cache
            .set("contacts", "1-1000", b"contact", Duration::from_secs(3600))
            .unwrap();
        cache
            .set("contact_pages", "1-1000", b"page", Duration::from_secs(3600))
            .unwrap();

        assert_eq!(cache.get("contacts", "1-1000").unwrap().unwrap(), b"contact");
        assert_eq!(cache.get("contact_pages", "1-1000").unwrap().unwrap(), b"page");

        assert_eq!(cache.invalidate_namespace("contact_pages").unwrap(), 1);
        assert!(cache.is_valid("contacts", "1-1000").unwrap());
    }

    #[test]
    fn test_stats_and_cleanup() {
        let (_temp, cache) = create_test_cache();

        let past = Utc::now() - chrono::Duration::seconds(100);
        cache.set_with_expiry("contacts", "old", b"xx", past).unwrap();
        cache
            .set("contacts", "1", b"12345", Duration::from_secs(3600))
            .unwrap();
        cache
            .set("contact_pages", "1-10", b"abc", Duration::from_secs(3600))
            .unwrap();

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.backend, "sqlite");
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.total_size_bytes, 8);
        assert_eq!(stats.namespaces.len(), 2);

        assert_eq!(cache.cleanup_expired().unwrap(), 1);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = SqliteCache::in_memory(CacheConfig {
            max_capacity: 2,
            ..Default::default()
        })
        .unwrap();

        cache.set("contacts", "1", b"a", Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.set("contacts", "2", b"b", Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        cache.set("contacts", "3", b"c", Duration::from_secs(60)).unwrap();

        assert!(!cache.is_valid("contacts", "1").unwrap());
        assert!(cache.is_valid("contacts", "2").unwrap());
        assert!(cache.is_valid("contacts", "3").unwrap());
    }

    #[test]
    fn test_clear_all() {
        let (_temp, cache) = create_test_cache();
        cache.set("contacts", "1", b"a", Duration::from_secs(60)).unwrap();
        cache.clear_all().unwrap();
        assert_eq!(cache.get_stats().unwrap().total_entries, 0);
    }
}
