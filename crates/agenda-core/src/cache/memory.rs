//! In-process cache backed by `mini-moka`.

use super::traits::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats};
use crate::error::Result;
use chrono::{DateTime, Utc};
use mini_moka::sync::Cache;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

type Key = (String, String);

/// Upper bound for moka's own TTL; per-entry expiry is checked on read.
const MAX_ENTRY_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

/// In-memory cache backend.
///
/// Entries carry their own expiry so callers can use different TTLs per
/// namespace on one cache instance.
pub struct MemoryCache {
    cache: Cache<Key, CacheEntry>,
    config: CacheConfig,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let mut builder = Cache::builder().time_to_live(MAX_ENTRY_LIFETIME);
        if config.max_capacity > 0 {
            builder = builder.max_capacity(config.max_capacity);
        }
        Self {
            cache: builder.build(),
            config,
        }
    }

    fn key(namespace: &str, key: &str) -> Key {
        (namespace.to_string(), key.to_string())
    }

    fn keys_where(&self, predicate: impl Fn(&Key, &CacheEntry) -> bool) -> Vec<Key> {
        self.cache
            .iter()
            .filter(|entry| predicate(entry.key(), entry.value()))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheBackend for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get_entry(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let key = Self::key(namespace, key);
        match self.cache.get(&key) {
            Some(entry) if entry.is_expired() => {
                self.cache.invalidate(&key);
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn set_with_expiry(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        self.cache.insert(
            Self::key(namespace, key),
            CacheEntry::new(value.to_vec(), expires_at),
        );
        Ok(())
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let key = Self::key(namespace, key);
        let existed = self
            .cache
            .get(&key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false);
        self.cache.invalidate(&key);
        Ok(existed)
    }

    fn invalidate_namespace(&self, namespace: &str) -> Result<usize> {
        let keys = self.keys_where(|(ns, _), _| ns == namespace);
        for key in &keys {
            self.cache.invalidate(key);
        }
        debug!(
            "Invalidated {} entries from namespace '{}'",
            keys.len(),
            namespace
        );
        Ok(keys.len())
    }

    fn get_stats(&self) -> Result<CacheStats> {
        let mut per_namespace: BTreeMap<String, (usize, u64)> = BTreeMap::new();
        for entry in self.cache.iter() {
            if entry.value().is_expired() {
                continue;
            }
            let slot = per_namespace.entry(entry.key().0.clone()).or_default();
            slot.0 += 1;
            slot.1 += entry.value().size_bytes();
        }

        let namespaces: Vec<CacheMeta> = per_namespace
            .into_iter()
            .map(|(namespace, (entry_count, total_size_bytes))| CacheMeta {
                namespace,
                entry_count,
                total_size_bytes,
            })
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
        let keys = self.keys_where(|_, entry| entry.is_expired());
        for key in &keys {
            self.cache.invalidate(key);
        }
        Ok(keys.len())
    }

    fn clear_all(&self) -> Result<()> {
        self.cache.invalidate_all();
        Ok(())
    }
}
