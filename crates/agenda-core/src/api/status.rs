//! Status and maintenance methods on AgendaApi.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AgendaConfig;
use crate::error::Result;
use crate::models::AgendaStatus;
use crate::resilience::CircuitBreakerStats;
use crate::AgendaApi;

impl AgendaApi {
    /// Snapshot of breakers, cache and counters.
    pub fn status(&self) -> AgendaStatus {
        let inner = &self.inner;
        let cache = match inner.cache.get_stats() {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Cache stats unavailable: {}", e);
                None
            }
        };

        AgendaStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            store_backend: inner.repository.name().to_string(),
            cache_backend: inner.cache.name().to_string(),
            store_circuit: inner.store_resilience.stats(),
            upstream_circuit: inner.client.circuit_stats(),
            accessor: inner.accessor.stats(),
            client: inner.client.stats(),
            cache,
        }
    }

    pub fn store_circuit(&self) -> CircuitBreakerStats {
        self.inner.store_resilience.stats()
    }

    pub fn upstream_circuit(&self) -> CircuitBreakerStats {
        self.inner.upstream_resilience.stats()
    }

    /// Force both circuit breakers back to closed.
    pub fn reset_circuits(&self) {
        self.inner.store_resilience.reset();
        self.inner.upstream_resilience.reset();
        info!("Circuit breakers reset");
    }

    /// Drop cached pages so the next sync reaches the upstream.
    pub fn evict_pages(&self) -> usize {
        self.inner.client.evict_pages()
    }

    /// Remove expired cache entries.
    pub fn cleanup_cache(&self) -> Result<usize> {
        self.inner.cache.cleanup_expired()
    }

    pub fn config(&self) -> &AgendaConfig {
        &self.inner.config
    }

    /// Periodically purge expired cache entries in the background.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_cache_cleanup(&self, every: Duration) -> JoinHandle<()> {
        let api = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match api.cleanup_cache() {
                    Ok(0) => {}
                    Ok(removed) => debug!("Purged {} expired cache entries", removed),
                    Err(e) => warn!("Cache cleanup failed: {}", e),
                }
            }
        })
    }
}
