//! Cache abstraction for the agenda.
//!
//! Two backends share one trait:
//! - `MemoryCache`: in-process TTL cache
//! - `SqliteCache`: persistent cache file
//!
//! Callers isolate their entries by namespace.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use traits::{CacheBackend, CacheConfig, CacheEntry, CacheMeta, CacheStats};
