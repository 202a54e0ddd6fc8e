//! Cache backend trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for cache behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL for cache entries.
    pub default_ttl: Duration,
    /// Maximum number of entries kept (0 = unlimited).
    pub max_capacity: u64,
}

impl CacheConfig {
    /// Default time-to-live for cache entries (5 minutes).
    pub const DEFAULT_TTL_SECS: u64 = 300;
    /// Default maximum number of entries.
    pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(CacheConfig::DEFAULT_TTL_SECS),
            max_capacity: CacheConfig::DEFAULT_MAX_CAPACITY,
        }
    }
}

/// A cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached data as bytes.
    pub value: Vec<u8>,
    /// When the entry was cached.
    pub cached_at: DateTime<Utc>,
    /// When the entry expires.
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value,
            cached_at: Utc::now(),
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    pub fn size_bytes(&self) -> u64 {
        self.value.len() as u64
    }
}

/// Per-namespace statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Cache statistics across all namespaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    pub backend: String,
    pub total_entries: usize,
    pub total_size_bytes: u64,
    pub max_capacity: u64,
    pub namespaces: Vec<CacheMeta>,
}

/// Generic cache backend trait.
///
/// Provides namespace-isolated key-value storage with TTL support.
/// Failures are reported as `AgendaError::CacheUnavailable` so callers can
/// degrade to the source of truth.
pub trait CacheBackend: Send + Sync {
    /// Short backend name used in stats and logs.
    fn name(&self) -> &'static str;

    /// Get cached data by key.
    ///
    /// Returns `None` if the key doesn't exist or has expired.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.get_entry(namespace, key)
            .map(|opt| opt.map(|e| e.value))
    }

    /// Get cached data with full entry metadata.
    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Set cached data with TTL.
    ///
    /// Overwrites any existing entry with the same key.
    fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_default();
        self.set_with_expiry(namespace, key, value, expires_at)
    }

    /// Set cached data with explicit expiration time.
    fn set_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Invalidate (delete) a specific key.
    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Invalidate all keys in a namespace.
    fn invalidate_namespace(&self, namespace: &str) -> Result<usize>;

    /// Check if a cache entry exists and is valid (not expired).
    fn is_valid(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.get_entry(namespace, key)?.is_some())
    }

    /// Get overall cache statistics.
    fn get_stats(&self) -> Result<CacheStats>;

    /// Remove expired entries from all namespaces.
    ///
    /// Returns the number of entries removed.
    fn cleanup_expired(&self) -> Result<usize>;

    /// Clear all cached data across all namespaces.
    fn clear_all(&self) -> Result<()>;
}
