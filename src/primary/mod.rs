//! Primary Store Module
//!
//! The relational system-of-record: the connection seam and the per-entity
//! manager built on it.

mod executor;
mod manager;

pub use executor::SqlExecutor;
pub use manager::DbManager;
