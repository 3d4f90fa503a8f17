//! Cache Connection Seam
//!
//! The key-value engine is reached only through [`KvConnection`]: plain
//! string keys with optional expiry, and sorted sets of string members.
//! Each method is one atomic operation against the engine.

use std::ops::Bound;
use std::time::Duration;

use crate::error::Result;

/// Write condition for [`KvConnection::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    /// Write unconditionally
    Always,
    /// Write only if no live value exists
    IfAbsent,
    /// Write only if a live value exists
    IfPresent,
}

pub trait KvConnection {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes a value, replacing any previous TTL. Returns false when the
    /// mode's condition was not met and nothing was written.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>, mode: SetMode) -> Result<bool>;

    /// Removes a string key or a whole sorted set.
    fn del(&self, key: &str) -> Result<bool>;

    fn exists(&self, key: &str) -> Result<bool>;

    /// Adds or rescores a member. Returns true if the member is new.
    fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool>;

    /// Adds a member after every existing one; existing members keep their score.
    fn zadd_incr(&self, key: &str, member: &str) -> Result<bool>;

    fn zrem(&self, key: &str, member: &str) -> Result<bool>;

    fn zcard(&self, key: &str) -> Result<u64>;

    fn zcount(&self, key: &str, min: Bound<f64>, max: Bound<f64>) -> Result<u64>;

    /// Members by rank, ascending. `count == -1` reads to the end.
    fn zrange(&self, key: &str, offset: i64, count: i64) -> Result<Vec<String>>;

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: i64,
        count: i64,
    ) -> Result<Vec<String>>;

    fn zrevrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: i64,
        count: i64,
    ) -> Result<Vec<String>>;

    /// Removes every string key and sorted set whose name starts with `prefix`.
    fn delete_prefix(&self, prefix: &str) -> Result<u64>;
}
