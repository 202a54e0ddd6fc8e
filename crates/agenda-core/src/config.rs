//! Centralized configuration for the contacts agenda.
//!
//! Constants structs hold the built-in defaults; [`AgendaConfig`] is the
//! injected runtime configuration, loaded from an optional JSON file and
//! then overridden by `AGENDA_*` environment variables.

use crate::cache::CacheConfig;
use crate::error::{AgendaError, Result};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "Contacts Agenda";
    pub const ENV_PREFIX: &'static str = "AGENDA_";
    pub const DATA_DIR_NAME: &'static str = "contacts-agenda";
    pub const STORE_FILENAME: &'static str = "contacts.sqlite";
    pub const CACHE_FILENAME: &'static str = "cache.sqlite";
}

/// Upstream network configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
    pub const USER_AGENT: &'static str = "Contacts-Agenda/0.1";
    pub const CONTACTS_PATH: &'static str = "/api/v1/contacts";
    pub const DEFAULT_BASE_URL: &'static str = "http://localhost:9090";
    pub const DEFAULT_PAGE_SIZE: u64 = 1000;
    pub const CONTACT_SOURCE_TAG: &'static str = "KENECT_LABS";
}

/// Resilience policy defaults.
pub struct ResilienceDefaults;

impl ResilienceDefaults {
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_DELAY: Duration = Duration::from_secs(1);
    pub const MAX_DELAY: Duration = Duration::from_secs(10);
    pub const CALL_TIMEOUT: Duration = Duration::from_secs(10);
    pub const SLIDING_WINDOW_SIZE: u32 = 10;
    pub const MINIMUM_CALLS: u32 = 10;
    pub const FAILURE_RATE_THRESHOLD: u8 = 50;
    pub const OPEN_TIMEOUT: Duration = Duration::from_secs(30);
    pub const HALF_OPEN_MAX_CALLS: u32 = 3;
}

/// Cache namespaces shared by the accessor and the upstream client.
pub struct CacheNamespaces;

impl CacheNamespaces {
    pub const CONTACTS: &'static str = "contacts";
    pub const CONTACT_PAGES: &'static str = "contact_pages";
}

/// Which cache backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackendKind {
    Memory,
    Sqlite,
}

/// Which contact store to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    Memory,
    Sqlite,
}

impl std::str::FromStr for CacheBackendKind {
    type Err = AgendaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(CacheBackendKind::Memory),
            "sqlite" => Ok(CacheBackendKind::Sqlite),
            other => Err(AgendaError::Config {
                message: format!("Unknown cache backend: {}", other),
            }),
        }
    }
}

impl std::str::FromStr for StoreBackendKind {
    type Err = AgendaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(StoreBackendKind::Memory),
            "sqlite" => Ok(StoreBackendKind::Sqlite),
            other => Err(AgendaError::Config {
                message: format!("Unknown store backend: {}", other),
            }),
        }
    }
}

/// Upstream contacts API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub base_url: String,
    /// Bearer token sent to the upstream, usually injected from the environment.
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub default_page_size: u64,
    pub request_timeout_ms: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: NetworkConfig::DEFAULT_BASE_URL.to_string(),
            api_token: None,
            default_page_size: NetworkConfig::DEFAULT_PAGE_SIZE,
            request_timeout_ms: NetworkConfig::REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl UpstreamSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    /// TTL for single contacts served by the accessor.
    pub contact_ttl_secs: u64,
    /// TTL for upstream pages.
    pub page_ttl_secs: u64,
    /// Entry capacity of the in-memory backend.
    pub max_capacity: u64,
    /// Database file for the sqlite backend.
    pub path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            contact_ttl_secs: CacheConfig::DEFAULT_TTL_SECS,
            page_ttl_secs: CacheConfig::DEFAULT_TTL_SECS,
            max_capacity: CacheConfig::DEFAULT_MAX_CAPACITY,
            path: None,
        }
    }
}

impl CacheSettings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            default_ttl: Duration::from_secs(self.contact_ttl_secs),
            max_capacity: self.max_capacity,
        }
    }

    pub fn contact_ttl(&self) -> Duration {
        Duration::from_secs(self.contact_ttl_secs)
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_secs)
    }
}

/// Retry and circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub call_timeout_ms: u64,
    pub sliding_window_size: u32,
    pub minimum_calls: u32,
    pub failure_rate_threshold: u8,
    pub open_timeout_ms: u64,
    pub half_open_max_calls: u32,
}

impl Default for ResilienceSettings {
    fn default() -> Self {
        Self {
            max_attempts: ResilienceDefaults::MAX_ATTEMPTS,
            base_delay_ms: ResilienceDefaults::BASE_DELAY.as_millis() as u64,
            max_delay_ms: ResilienceDefaults::MAX_DELAY.as_millis() as u64,
            jitter: true,
            call_timeout_ms: ResilienceDefaults::CALL_TIMEOUT.as_millis() as u64,
            sliding_window_size: ResilienceDefaults::SLIDING_WINDOW_SIZE,
            minimum_calls: ResilienceDefaults::MINIMUM_CALLS,
            failure_rate_threshold: ResilienceDefaults::FAILURE_RATE_THRESHOLD,
            open_timeout_ms: ResilienceDefaults::OPEN_TIMEOUT.as_millis() as u64,
            half_open_max_calls: ResilienceDefaults::HALF_OPEN_MAX_CALLS,
        }
    }
}

impl ResilienceSettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
            .with_attempt_timeout(Some(self.call_timeout()))
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            sliding_window_size: self.sliding_window_size,
            minimum_calls: self.minimum_calls,
            failure_rate_threshold: self.failure_rate_threshold,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            half_open_max_calls: self.half_open_max_calls,
        }
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Contact store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackendKind,
    pub path: Option<PathBuf>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Sqlite,
            path: None,
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgendaConfig {
    pub upstream: UpstreamSettings,
    pub cache: CacheSettings,
    pub resilience: ResilienceSettings,
    pub store: StoreSettings,
    pub server: ServerSettings,
}

impl AgendaConfig {
    /// Load configuration from an optional JSON file, then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON configuration file. Missing sections fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| AgendaError::io_with_path(e, path))?;
        serde_json::from_str(&contents).map_err(|e| AgendaError::Config {
            message: format!("Invalid config file {}: {}", path.display(), e),
        })
    }

    /// Apply `AGENDA_*` overrides from a list of key/value pairs.
    ///
    /// Unknown keys are ignored.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(AppConfig::ENV_PREFIX) else {
                continue;
            };
            match name {
                "UPSTREAM_BASE_URL" => self.upstream.base_url = value,
                "UPSTREAM_API_TOKEN" => self.upstream.api_token = Some(value),
                "DEFAULT_PAGE_SIZE" => {
                    self.upstream.default_page_size = parse_number(&key, &value)?
                }
                "CACHE_BACKEND" => self.cache.backend = value.parse()?,
                "CACHE_PATH" => self.cache.path = Some(PathBuf::from(value)),
                "CACHE_TTL_SECS" => {
                    let ttl = parse_number(&key, &value)?;
                    self.cache.contact_ttl_secs = ttl;
                    self.cache.page_ttl_secs = ttl;
                }
                "STORE_BACKEND" => self.store.backend = value.parse()?,
                "STORE_PATH" => self.store.path = Some(PathBuf::from(value)),
                "RETRY_MAX_ATTEMPTS" => {
                    self.resilience.max_attempts = parse_number(&key, &value)?
                }
                "CIRCUIT_OPEN_TIMEOUT_MS" => {
                    self.resilience.open_timeout_ms = parse_number(&key, &value)?
                }
                "SERVER_HOST" => self.server.host = value,
                "SERVER_PORT" => self.server.port = parse_number(&key, &value)?,
                _ => continue,
            }
            debug!("Applied config override {}", key);
        }
        Ok(())
    }

    /// Reject settings the components cannot work with.
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.upstream.base_url).map_err(|e| AgendaError::Config {
            message: format!("Invalid upstream base URL {}: {}", self.upstream.base_url, e),
        })?;

        if self.upstream.default_page_size == 0 {
            return Err(config_error("upstream.default_page_size must be > 0"));
        }
        if self.upstream.request_timeout_ms == 0 {
            return Err(config_error("upstream.request_timeout_ms must be > 0"));
        }
        let r = &self.resilience;
        if r.max_attempts == 0 {
            return Err(config_error("resilience.max_attempts must be > 0"));
        }
        if r.call_timeout_ms == 0 {
            return Err(config_error("resilience.call_timeout_ms must be > 0"));
        }
        if r.sliding_window_size == 0 {
            return Err(config_error("resilience.sliding_window_size must be > 0"));
        }
        if r.minimum_calls == 0 {
            return Err(config_error("resilience.minimum_calls must be > 0"));
        }
        if !(1..=100).contains(&r.failure_rate_threshold) {
            return Err(config_error(
                "resilience.failure_rate_threshold must be within 1..=100",
            ));
        }
        if r.half_open_max_calls == 0 {
            return Err(config_error("resilience.half_open_max_calls must be > 0"));
        }
        Ok(())
    }

    /// Resolve a data file, defaulting to the user's data directory.
    pub fn resolve_data_path(explicit: Option<&PathBuf>, filename: &str) -> PathBuf {
        match explicit {
            Some(path) => path.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(AppConfig::DATA_DIR_NAME)
                .join(filename),
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| AgendaError::Config {
        message: format!("{} must be a number, got {:?}", key, value),
    })
}

fn config_error(message: &str) -> AgendaError {
    AgendaError::Config {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AgendaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.upstream.default_page_size, 1000);
        assert_eq!(config.resilience.failure_rate_threshold, 50);
        assert_eq!(config.resilience.half_open_max_calls, 3);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AgendaConfig = serde_json::from_str(
            r#"{ "upstream": { "base_url": "http://contacts.internal" },
                 "cache": { "backend": "sqlite" } }"#,
        )
        .unwrap();

        assert_eq!(config.upstream.base_url, "http://contacts.internal");
        assert_eq!(config.upstream.default_page_size, 1000);
        assert_eq!(config.cache.backend, CacheBackendKind::Sqlite);
        assert_eq!(config.store.backend, StoreBackendKind::Sqlite);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AgendaConfig::default();
        config
            .apply_overrides(vars(&[
                ("AGENDA_UPSTREAM_BASE_URL", "http://upstream:8000"),
                ("AGENDA_UPSTREAM_API_TOKEN", "secret"),
                ("AGENDA_DEFAULT_PAGE_SIZE", "250"),
                ("AGENDA_CACHE_BACKEND", "sqlite"),
                ("AGENDA_STORE_BACKEND", "memory"),
                ("AGENDA_SERVER_PORT", "9000"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();

        assert_eq!(config.upstream.base_url, "http://upstream:8000");
        assert_eq!(config.upstream.api_token.as_deref(), Some("secret"));
        assert_eq!(config.upstream.default_page_size, 250);
        assert_eq!(config.cache.backend, CacheBackendKind::Sqlite);
        assert_eq!(config.store.backend, StoreBackendKind::Memory);
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let mut config = AgendaConfig::default();
        let result = config.apply_overrides(vars(&[("AGENDA_DEFAULT_PAGE_SIZE", "lots")]));
        assert!(matches!(result, Err(AgendaError::Config { .. })));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AgendaConfig::default();
        config.resilience.failure_rate_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = AgendaConfig::default();
        config.upstream.default_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = AgendaConfig::default();
        config.resilience.call_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(AgendaError::Config { .. })));

        let mut config = AgendaConfig::default();
        config.upstream.request_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AgendaConfig::default();
        config.upstream.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_token_is_not_serialized() {
        let mut config = AgendaConfig::default();
        config.upstream.api_token = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
