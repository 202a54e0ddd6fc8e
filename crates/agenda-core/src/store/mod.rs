//! Contact repository: the durable source of truth behind the cache.

mod memory;
mod sqlite;
mod traits;

pub use memory::MemoryContactStore;
pub use sqlite::SqliteContactStore;
pub use traits::ContactRepository;
