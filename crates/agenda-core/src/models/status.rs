//! Runtime status report.

use crate::accessor::AccessorStats;
use crate::cache::CacheStats;
use crate::resilience::CircuitBreakerStats;
use crate::upstream::ClientStats;
use serde::Serialize;

/// Snapshot of every moving part, served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AgendaStatus {
    pub version: String,
    pub store_backend: String,
    pub cache_backend: String,
    pub store_circuit: CircuitBreakerStats,
    pub upstream_circuit: CircuitBreakerStats,
    pub accessor: AccessorStats,
    pub client: ClientStats,
    /// `None` when the cache could not report.
    pub cache: Option<CacheStats>,
}
