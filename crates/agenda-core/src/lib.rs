//! Agenda Core - resilient read-through cache layer for a contacts agenda.
//!
//! Single contacts are served cache-aside from a durable repository; the full
//! contact list is synchronized from an upstream API. Every outbound call runs
//! under retry and a circuit breaker, and a failing cache or upstream degrades
//! to the repository instead of failing the caller.
//!
//! This crate has no HTTP server of its own; see the `agenda-rpc` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use agenda_core::{AgendaApi, AgendaConfig, Contact};
//!
//! #[tokio::main]
//! async fn main() -> agenda_core::Result<()> {
//!     let api = AgendaApi::new(AgendaConfig::load(None)?)?;
//!
//!     api.create_contact(Contact::new(1, "Ada").with_email("ada@example.com")).await?;
//!     let contact = api.get_contact(1).await?;
//!     println!("{} <{:?}>", contact.name, contact.email);
//!
//!     let everyone = api.get_all_contacts().await?;
//!     println!("Synchronized {} contacts", everyone.len());
//!
//!     Ok(())
//! }
//! ```

pub mod accessor;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod resilience;
pub mod service;
pub mod store;
pub mod upstream;

mod api;

// Re-export commonly used types
pub use accessor::{AccessorStats, ContactAccessor};
pub use cache::{CacheBackend, CacheConfig, CacheEntry, CacheStats, MemoryCache, SqliteCache};
pub use config::{AgendaConfig, CacheBackendKind, StoreBackendKind};
pub use error::{AgendaError, Result};
pub use models::{AgendaStatus, Contact, ContactPage, StoredContact};
pub use resilience::{
    CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState, Resilience,
    RetryConfig,
};
pub use service::{ContactService, PageProvider};
pub use store::{ContactRepository, MemoryContactStore, SqliteContactStore};
pub use upstream::{ContactSource, HttpContactSource, ResilientContactClient};

// Re-export builder from api module
pub use api::{AgendaApiBuilder, STORE_CIRCUIT, UPSTREAM_CIRCUIT};

use std::sync::Arc;

use api::ApiState;

/// Main API struct for agenda operations.
///
/// Cheap to clone; all clones share the same cache, breakers and store.
#[derive(Clone)]
pub struct AgendaApi {
    inner: Arc<ApiState>,
}

impl AgendaApi {
    /// Create a builder for AgendaApi.
    ///
    /// Use the builder to inject backends or run fully in memory:
    ///
    /// ```rust,ignore
    /// let api = AgendaApi::builder(config)
    ///     .ephemeral(true)
    ///     .build()?;
    /// ```
    pub fn builder(config: AgendaConfig) -> AgendaApiBuilder {
        AgendaApiBuilder::new(config)
    }

    /// Create an AgendaApi with backends chosen by `config`.
    pub fn new(config: AgendaConfig) -> Result<Self> {
        Self::builder(config).build()
    }
}
