//! kv_orm - entity cache synchronized with a relational store
//!
//! Records live in SQLite and are mirrored into a key-value engine that
//! answers unique-key, equality-index and range queries with the same
//! results, plus bulk Load/Clear to rebuild the cache.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod models;
pub mod orm;
pub mod primary;
pub mod sync;
pub mod tasks;

pub use api::AppState;
pub use cache::{CacheManager, KvConnection, LoadReport, MemoryStore};
pub use config::Config;
pub use error::{OrmError, Result, StoreKind};
pub use primary::{DbManager, SqlExecutor};
pub use sync::Synchronizer;
pub use tasks::spawn_cleanup_task;
