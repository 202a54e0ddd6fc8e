//! Cache-aside access to single contacts.
//!
//! Reads check the cache first and fall back to the repository through the
//! resilience wrapper, populating the cache on the way out. Writes go to the
//! repository first and then refresh or drop the cached entry.
//!
//! The cache is an optimization only: a failing cache read degrades to a
//! direct store read and a failing cache write is logged and ignored.

use crate::cache::CacheBackend;
use crate::config::CacheNamespaces;
use crate::error::{AgendaError, Result};
use crate::models::Contact;
use crate::resilience::Resilience;
use crate::store::ContactRepository;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Hit/miss counters for the accessor.
#[derive(Debug, Clone, Serialize)]
pub struct AccessorStats {
    pub hits: u64,
    pub misses: u64,
    pub cache_errors: u64,
    pub hit_rate: f64,
}

/// Cache-aside accessor for contacts keyed by id.
pub struct ContactAccessor {
    cache: Arc<dyn CacheBackend>,
    repository: Arc<dyn ContactRepository>,
    resilience: Arc<Resilience>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    cache_errors: AtomicU64,
}

impl ContactAccessor {
    pub fn new(
        cache: Arc<dyn CacheBackend>,
        repository: Arc<dyn ContactRepository>,
        resilience: Arc<Resilience>,
        ttl: Duration,
    ) -> Self {
        Self {
            cache,
            repository,
            resilience,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            cache_errors: AtomicU64::new(0),
        }
    }

    /// Get a contact, serving from cache when possible.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the store has no contact with this id
    /// - `StoreUnavailable` if the store kept failing through all retries
    /// - `CircuitOpen` if the store breaker is rejecting calls
    pub async fn get(&self, id: i64) -> Result<Contact> {
        if let Some(contact) = self.read_cached(id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!("Cache hit for contact {}", id);
            return Ok(contact);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Cache miss for contact {}", id);

        let contact = self
            .resilience
            .call(|| self.repository.find_by_id(id))
            .await?
            .ok_or(AgendaError::NotFound { id })?;

        self.put(id, &contact);
        Ok(contact)
    }

    /// Drop the cached entry for `id`. Returns whether one existed.
    pub fn invalidate(&self, id: i64) -> bool {
        match self.cache.invalidate(CacheNamespaces::CONTACTS, &id.to_string()) {
            Ok(existed) => existed,
            Err(e) => {
                self.cache_failed("invalidate", id, &e);
                false
            }
        }
    }

    /// Overwrite the cached entry for `id` with the configured TTL.
    pub fn put(&self, id: i64, contact: &Contact) {
        let bytes = match serde_json::to_vec(contact) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize contact {} for cache: {}", id, e);
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set(CacheNamespaces::CONTACTS, &id.to_string(), &bytes, self.ttl)
        {
            self.cache_failed("write", id, &e);
        }
    }

    /// Create a contact in the store and cache it.
    pub async fn create(&self, contact: Contact) -> Result<Contact> {
        contact.validate()?;
        let created = self
            .resilience
            .call(|| self.repository.create(contact.clone()))
            .await?;
        self.put(created.id, &created);
        Ok(created)
    }

    /// Replace a contact in the store and refresh its cache entry.
    pub async fn update(&self, mut contact: Contact) -> Result<Contact> {
        contact.validate()?;
        contact.touch();
        let updated = self
            .resilience
            .call(|| self.repository.update(contact.clone()))
            .await?;
        self.put(updated.id, &updated);
        Ok(updated)
    }

    /// Delete a contact from the store and drop its cache entry.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.resilience
            .call(|| self.repository.delete(id))
            .await?;
        self.invalidate(id);
        Ok(())
    }

    /// All stored contacts, bypassing the cache.
    pub async fn list(&self) -> Result<Vec<Contact>> {
        self.resilience.call(|| self.repository.list()).await
    }

    pub fn stats(&self) -> AccessorStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        AccessorStats {
            hits,
            misses,
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            hit_rate: if total == 0 {
                0.0
            } else {
                hits as f64 / total as f64
            },
        }
    }

    fn read_cached(&self, id: i64) -> Option<Contact> {
        let bytes = match self.cache.get(CacheNamespaces::CONTACTS, &id.to_string()) {
            Ok(bytes) => bytes?,
            Err(e) => {
                self.cache_failed("read", id, &e);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(contact) => Some(contact),
            Err(e) => {
                warn!("Discarding unreadable cache entry for contact {}: {}", id, e);
                self.invalidate(id);
                None
            }
        }
    }

    fn cache_failed(&self, op: &str, id: i64, err: &AgendaError) {
        self.cache_errors.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Cache {} failed for contact {} ({}): {}",
            op,
            id,
            self.cache.name(),
            err
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, CacheStats, MemoryCache};
    use crate::resilience::{CircuitBreakerConfig, CircuitState, RetryConfig};
    use crate::store::MemoryContactStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::AtomicU32;

    /// Repository wrapper counting `find_by_id` calls.
    struct CountingRepo {
        inner: MemoryContactStore,
        reads: AtomicU32,
    }

    impl CountingRepo {
        fn new() -> Self {
            Self {
                inner: MemoryContactStore::new(),
                reads: AtomicU32::new(0),
            }
        }

        fn reads(&self) -> u32 {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContactRepository for CountingRepo {
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn create(&self, contact: Contact) -> Result<Contact> {
            self.inner.create(contact).await
        }
        async fn find_by_id(&self, id: i64) -> Result<Option<Contact>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.find_by_id(id).await
        }
        async fn update(&self, contact: Contact) -> Result<Contact> {
            self.inner.update(contact).await
        }
        async fn delete(&self, id: i64) -> Result<()> {
            self.inner.delete(id).await
        }
        async fn list(&self) -> Result<Vec<Contact>> {
            self.inner.list().await
        }
        async fn save_all(&self, contacts: Vec<Contact>) -> Result<Vec<Contact>> {
            self.inner.save_all(contacts).await
        }
        async fn count(&self) -> Result<u64> {
            self.inner.count().await
        }
    }

    /// Cache whose every operation fails.
    struct BrokenCache;

    impl CacheBackend for BrokenCache {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn get_entry(&self, _: &str, _: &str) -> Result<Option<CacheEntry>> {
            Err(AgendaError::CacheUnavailable {
                message: "down".into(),
            })
        }
        fn set_with_expiry(&self, _: &str, _: &str, _: &[u8], _: DateTime<Utc>) -> Result<()> {
            Err(AgendaError::CacheUnavailable {
                message: "down".into(),
            })
        }
        fn invalidate(&self, _: &str, _: &str) -> Result<bool> {
            Err(AgendaError::CacheUnavailable {
                message: "down".into(),
            })
        }
        fn invalidate_namespace(&self, _: &str) -> Result<usize> {
            Ok(0)
        }
        fn get_stats(&self) -> Result<CacheStats> {
            Err(AgendaError::CacheUnavailable {
                message: "down".into(),
            })
        }
        fn cleanup_expired(&self) -> Result<usize> {
            Ok(0)
        }
        fn clear_all(&self) -> Result<()> {
            Ok(())
        }
    }

    fn resilience() -> Arc<Resilience> {
        Arc::new(Resilience::new(
            "contact-store",
            CircuitBreakerConfig {
                sliding_window_size: 2,
                minimum_calls: 2,
                failure_rate_threshold: 50,
                open_timeout: Duration::from_secs(60),
                half_open_max_calls: 1,
            },
            RetryConfig::new()
                .with_max_attempts(2)
                .with_base_delay(Duration::from_millis(1))
                .with_jitter(false),
        ))
    }

    fn accessor_with(
        cache: Arc<dyn CacheBackend>,
        repo: Arc<CountingRepo>,
    ) -> ContactAccessor {
        ContactAccessor::new(cache, repo, resilience(), Duration::from_secs(60))
    }

    fn contact(id: i64) -> Contact {
        Contact::new(id, "Ada Lovelace").with_email("ada@example.com")
    }

    #[tokio::test]
    async fn test_miss_then_hit() {
        let repo = Arc::new(CountingRepo::new());
        repo.inner.create(contact(1)).await.unwrap();
        let accessor = accessor_with(Arc::new(MemoryCache::default()), repo.clone());

        let first = accessor.get(1).await.unwrap();
        let second = accessor.get(1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(repo.reads(), 1);
        let stats = accessor.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[tokio::test]
    async fn test_invalidate_forces_reread() {
        let repo = Arc::new(CountingRepo::new());
        repo.inner.create(contact(1)).await.unwrap();
        let accessor = accessor_with(Arc::new(MemoryCache::default()), repo.clone());

        accessor.get(1).await.unwrap();
        assert!(accessor.invalidate(1));
        assert!(!accessor.invalidate(1));
        accessor.get(1).await.unwrap();

        assert_eq!(repo.reads(), 2);
    }

    #[tokio::test]
    async fn test_missing_contact_is_not_found() {
        let repo = Arc::new(CountingRepo::new());
        let accessor = accessor_with(Arc::new(MemoryCache::default()), repo);

        let err = accessor.get(404).await.unwrap_err();
        assert!(matches!(err, AgendaError::NotFound { id: 404 }));
    }

    #[tokio::test]
    async fn test_expired_entry_is_reloaded() {
        let repo = Arc::new(CountingRepo::new());
        repo.inner.create(contact(1)).await.unwrap();
        let accessor = ContactAccessor::new(
            Arc::new(MemoryCache::default()),
            repo.clone(),
            resilience(),
            Duration::from_millis(20),
        );

        accessor.get(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        accessor.get(1).await.unwrap();

        assert_eq!(repo.reads(), 2);
    }

    #[tokio::test]
    async fn test_broken_cache_degrades_to_store() {
        let repo = Arc::new(CountingRepo::new());
        repo.inner.create(contact(1)).await.unwrap();
        let accessor = accessor_with(Arc::new(BrokenCache), repo.clone());

        assert_eq!(accessor.get(1).await.unwrap().id, 1);
        assert_eq!(accessor.get(1).await.unwrap().id, 1);
        assert_eq!(repo.reads(), 2);
        assert!(accessor.stats().cache_errors >= 2);
    }

    #[tokio::test]
    async fn test_store_outage_opens_circuit() {
        let repo = Arc::new(CountingRepo::new());
        repo.inner.set_available(false);
        let accessor = accessor_with(Arc::new(MemoryCache::default()), repo.clone());

        for _ in 0..2 {
            let err = accessor.get(1).await.unwrap_err();
            assert!(matches!(err, AgendaError::StoreUnavailable { .. }));
        }
        assert_eq!(accessor.resilience.state(), CircuitState::Open);

        let reads_before = repo.reads();
        let err = accessor.get(1).await.unwrap_err();
        assert!(matches!(err, AgendaError::CircuitOpen { .. }));
        assert_eq!(repo.reads(), reads_before);
    }

    #[tokio::test]
    async fn test_write_through() {
        let repo = Arc::new(CountingRepo::new());
        let accessor = accessor_with(Arc::new(MemoryCache::default()), repo.clone());

        accessor.create(contact(3)).await.unwrap();
        assert_eq!(accessor.get(3).await.unwrap().name, "Ada Lovelace");
        assert_eq!(repo.reads(), 0);

        let mut renamed = contact(3);
        renamed.name = "Countess".into();
        accessor.update(renamed).await.unwrap();
        assert_eq!(accessor.get(3).await.unwrap().name, "Countess");
        assert_eq!(repo.reads(), 0);

        accessor.delete(3).await.unwrap();
        assert!(matches!(
            accessor.get(3).await,
            Err(AgendaError::NotFound { id: 3 })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_contact() {
        let repo = Arc::new(CountingRepo::new());
        let accessor = accessor_with(Arc::new(MemoryCache::default()), repo);

        let err = accessor.create(Contact::new(1, "No Methods")).await.unwrap_err();
        assert!(matches!(err, AgendaError::Validation { .. }));
    }
}
