//! Cache Module
//!
//! The key-value seam, its in-process engine with TTL expiration, and the
//! entity manager maintaining records and indexes on top of it.

mod connection;
mod entry;
mod manager;
mod stats;
mod store;


// Re-export public types
pub use connection::{KvConnection, SetMode};
pub use entry::CacheEntry;
pub use manager::{CacheManager, LoadReport, DEFAULT_LOAD_PAGE_SIZE};
pub use stats::CacheStats;
pub use store::MemoryStore;
