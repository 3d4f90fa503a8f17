//! Sync Module
//!
//! Load and Clear between the primary store and the cache.

mod synchronizer;

pub use synchronizer::{SyncState, SyncStatus, Synchronizer};
