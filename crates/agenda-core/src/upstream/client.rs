//! Resilient access to the upstream contacts API.
//!
//! Lookup order for a page:
//! 1. Page cache (`contact_pages` namespace, key `{page}-{page_size}`)
//! 2. Upstream through retry and circuit breaker
//! 3. Last synchronized contacts from the repository, marked as fallback
//!
//! Fallback pages are never cached, so the next request after recovery
//! reaches the upstream again.

use super::source::ContactSource;
use crate::cache::CacheBackend;
use crate::config::CacheNamespaces;
use crate::error::{AgendaError, Result};
use crate::models::ContactPage;
use crate::resilience::{CircuitBreakerStats, Resilience};
use crate::store::ContactRepository;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub(crate) const NO_FALLBACK_DATA: &str =
    "External API is unavailable and no cached data exists";

/// Counters for the resilient client.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    pub page_cache_hits: u64,
    pub upstream_fetches: u64,
    pub fallbacks_served: u64,
}

pub struct ResilientContactClient {
    source: Arc<dyn ContactSource>,
    repository: Arc<dyn ContactRepository>,
    cache: Arc<dyn CacheBackend>,
    resilience: Arc<Resilience>,
    page_ttl: Duration,
    default_page_size: u64,
    page_cache_hits: AtomicU64,
    upstream_fetches: AtomicU64,
    fallbacks_served: AtomicU64,
}

impl ResilientContactClient {
    pub fn new(
        source: Arc<dyn ContactSource>,
        repository: Arc<dyn ContactRepository>,
        cache: Arc<dyn CacheBackend>,
        resilience: Arc<Resilience>,
        page_ttl: Duration,
        default_page_size: u64,
    ) -> Self {
        Self {
            source,
            repository,
            cache,
            resilience,
            page_ttl,
            default_page_size,
            page_cache_hits: AtomicU64::new(0),
            upstream_fetches: AtomicU64::new(0),
            fallbacks_served: AtomicU64::new(0),
        }
    }

    /// Get a page of contacts.
    ///
    /// Missing parameters default to page 1 and the configured page size.
    ///
    /// # Errors
    ///
    /// `ServiceUnavailable` when the upstream cannot be reached and the
    /// repository holds no contacts to fall back on.
    pub async fn get_contacts(&self, page: Option<u64>, page_size: Option<u64>) -> Result<ContactPage> {
        let page = page.unwrap_or(1);
        let page_size = page_size.unwrap_or(self.default_page_size);
        let key = page_key(page, page_size);

        if let Some(cached) = self.read_cached(&key) {
            self.page_cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Page cache hit for {}", key);
            return Ok(cached);
        }

        self.upstream_fetches.fetch_add(1, Ordering::Relaxed);
        let fetched = self
            .resilience
            .call(|| self.source.fetch_page(Some(page), Some(page_size)))
            .await;

        match fetched {
            Ok(result) => {
                if !result.is_fallback() {
                    self.write_cached(&key, &result);
                }
                Ok(result)
            }
            Err(e) => {
                warn!("Upstream fetch for page {} failed: {}. Using fallback", key, e);
                self.fallback().await
            }
        }
    }

    /// Serve the last synchronized contacts from the repository.
    async fn fallback(&self) -> Result<ContactPage> {
        let contacts = match self.repository.list().await {
            Ok(contacts) => contacts,
            Err(e) => {
                error!("Fallback read from {} failed: {}", self.repository.name(), e);
                Vec::new()
            }
        };

        if contacts.is_empty() {
            return Err(AgendaError::ServiceUnavailable(NO_FALLBACK_DATA.to_string()));
        }

        self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
        warn!("Serving {} contacts from fallback store", contacts.len());
        Ok(ContactPage::fallback(contacts))
    }

    fn read_cached(&self, key: &str) -> Option<ContactPage> {
        match self.cache.get(CacheNamespaces::CONTACT_PAGES, key) {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(page) => Some(page),
                Err(e) => {
                    warn!("Discarding unreadable cached page {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Page cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    fn write_cached(&self, key: &str, page: &ContactPage) {
        let result = serde_json::to_vec(page)
            .map_err(AgendaError::from)
            .and_then(|bytes| {
                self.cache
                    .set(CacheNamespaces::CONTACT_PAGES, key, &bytes, self.page_ttl)
            });
        if let Err(e) = result {
            warn!("Page cache write failed for {}: {}", key, e);
        }
    }

    /// Drop every cached page.
    pub fn evict_pages(&self) -> usize {
        self.cache
            .invalidate_namespace(CacheNamespaces::CONTACT_PAGES)
            .unwrap_or_else(|e| {
                warn!("Failed to evict cached pages: {}", e);
                0
            })
    }

    pub fn circuit_stats(&self) -> CircuitBreakerStats {
        self.resilience.stats()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            page_cache_hits: self.page_cache_hits.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            fallbacks_served: self.fallbacks_served.load(Ordering::Relaxed),
        }
    }
}

fn page_key(page: u64, page_size: u64) -> String {
    format!("{}-{}", page, page_size)
}
