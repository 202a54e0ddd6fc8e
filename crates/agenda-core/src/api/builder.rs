//! Builder for wiring an `AgendaApi` from configuration.

use std::sync::Arc;

use tracing::info;

use crate::accessor::ContactAccessor;
use crate::api::state::ApiState;
use crate::cache::{CacheBackend, MemoryCache, SqliteCache};
use crate::config::{AgendaConfig, AppConfig, CacheBackendKind, StoreBackendKind};
use crate::error::Result;
use crate::resilience::Resilience;
use crate::service::ContactService;
use crate::store::{ContactRepository, MemoryContactStore, SqliteContactStore};
use crate::upstream::{ContactSource, HttpContactSource, ResilientContactClient};
use crate::AgendaApi;

/// Name of the breaker guarding the contact store.
pub const STORE_CIRCUIT: &str = "contact-store";
/// Name of the breaker guarding the upstream API.
pub const UPSTREAM_CIRCUIT: &str = "contacts-upstream";

/// Builder for configuring AgendaApi initialization.
///
/// Backends come from the configuration unless injected explicitly.
///
/// # Example
///
/// ```rust,ignore
/// use agenda_core::{AgendaApi, AgendaConfig};
///
/// let api = AgendaApi::builder(AgendaConfig::load(None)?)
///     .ephemeral(true)
///     .build()?;
/// ```
pub struct AgendaApiBuilder {
    config: AgendaConfig,
    ephemeral: bool,
    cache: Option<Arc<dyn CacheBackend>>,
    repository: Option<Arc<dyn ContactRepository>>,
    source: Option<Arc<dyn ContactSource>>,
}

impl AgendaApiBuilder {
    pub fn new(config: AgendaConfig) -> Self {
        Self {
            config,
            ephemeral: false,
            cache: None,
            repository: None,
            source: None,
        }
    }

    /// Keep everything in memory, ignoring configured backends and paths.
    ///
    /// Default: `false`
    pub fn ephemeral(mut self, enable: bool) -> Self {
        self.ephemeral = enable;
        self
    }

    /// Use this cache instead of building one from configuration.
    pub fn with_cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Use this repository instead of building one from configuration.
    pub fn with_repository(mut self, repository: Arc<dyn ContactRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Use this contact source instead of the HTTP upstream.
    pub fn with_source(mut self, source: Arc<dyn ContactSource>) -> Self {
        self.source = Some(source);
        self
    }

    fn build_cache(&self) -> Result<Arc<dyn CacheBackend>> {
        let settings = &self.config.cache;
        let kind = if self.ephemeral {
            CacheBackendKind::Memory
        } else {
            settings.backend
        };

        Ok(match kind {
            CacheBackendKind::Memory => Arc::new(MemoryCache::with_config(settings.cache_config())),
            CacheBackendKind::Sqlite => {
                let path = AgendaConfig::resolve_data_path(settings.path.as_ref(), AppConfig::CACHE_FILENAME);
                info!("Using sqlite cache at {}", path.display());
                Arc::new(SqliteCache::with_config(path, settings.cache_config())?)
            }
        })
    }

    fn build_repository(&self) -> Result<Arc<dyn ContactRepository>> {
        let settings = &self.config.store;
        let kind = if self.ephemeral {
            StoreBackendKind::Memory
        } else {
            settings.backend
        };

        Ok(match kind {
            StoreBackendKind::Memory => Arc::new(MemoryContactStore::new()),
            StoreBackendKind::Sqlite => {
                let path = AgendaConfig::resolve_data_path(settings.path.as_ref(), AppConfig::STORE_FILENAME);
                Arc::new(SqliteContactStore::open(path)?)
            }
        })
    }

    /// Build the AgendaApi instance.
    pub fn build(mut self) -> Result<AgendaApi> {
        self.config.validate()?;

        let cache = match self.cache.take() {
            Some(cache) => cache,
            None => self.build_cache()?,
        };
        let repository = match self.repository.take() {
            Some(repository) => repository,
            None => self.build_repository()?,
        };
        let source: Arc<dyn ContactSource> = match self.source.take() {
            Some(source) => source,
            None => Arc::new(HttpContactSource::new(&self.config.upstream)?),
        };

        let resilience = &self.config.resilience;
        let store_resilience = Arc::new(Resilience::new(
            STORE_CIRCUIT,
            resilience.breaker_config(),
            resilience.retry_config(),
        ));
        let upstream_resilience = Arc::new(Resilience::new(
            UPSTREAM_CIRCUIT,
            resilience.breaker_config(),
            resilience.retry_config(),
        ));

        let accessor = ContactAccessor::new(
            cache.clone(),
            repository.clone(),
            store_resilience.clone(),
            self.config.cache.contact_ttl(),
        );
        let client = Arc::new(ResilientContactClient::new(
            source,
            repository.clone(),
            cache.clone(),
            upstream_resilience.clone(),
            self.config.cache.page_ttl(),
            self.config.upstream.default_page_size,
        ));
        let service = ContactService::new(
            client.clone(),
            repository.clone(),
            self.config.upstream.default_page_size,
        );

        info!(
            "Agenda ready (store: {}, cache: {})",
            repository.name(),
            cache.name()
        );

        Ok(AgendaApi {
            inner: Arc::new(ApiState {
                config: self.config,
                cache,
                repository,
                store_resilience,
                upstream_resilience,
                accessor,
                client,
                service,
            }),
        })
    }
}
