//! Memory Store Module
//!
//! In-process key-value engine: a HashMap of string values with TTL expiry,
//! and sorted sets held in a [`VSet`]. Implements [`KvConnection`].

use std::collections::HashMap;
use std::ops::Bound;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStats, KvConnection, SetMode};
use crate::error::{OrmError, Result, StoreKind};
use crate::orm::VSet;

#[derive(Debug, Default)]
struct Strings {
    entries: HashMap<String, CacheEntry>,
    stats: CacheStats,
}

impl Strings {
    /// Live value for `key`, dropping it first if it has expired.
    fn live(&mut self, key: &str) -> Option<&mut CacheEntry> {
        if self.entries.get(key).is_some_and(CacheEntry::is_expired) {
            self.entries.remove(key);
            self.stats.record_expired(1);
        }
        self.entries.get_mut(key)
    }
}

// == Memory Store ==
/// Thread-safe in-memory cache engine.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// String keys and read statistics
    strings: Mutex<Strings>,
    /// Sorted sets, one namespace per key
    sets: VSet<String, String>,
}

impl MemoryStore {
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Strings>> {
        self.strings
            .lock()
            .map_err(|e| OrmError::unavailable(StoreKind::Cache, operation, e))
    }

    // == Stats ==
    /// Returns current engine statistics.
    pub fn stats(&self) -> Result<CacheStats> {
        let strings = self.lock("stats")?;
        let mut stats = strings.stats.clone();
        stats.total_entries = strings.entries.len();
        stats.total_sets = self.sets.namespace_count();
        Ok(stats)
    }

    // == Purge Expired ==
    /// Removes all expired string keys, returning how many were dropped.
    ///
    /// Sorted sets never expire; members pointing at purged records stay
    /// until their owner is rewritten or the entity is reloaded.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut strings = self.lock("purge_expired")?;
        let before = strings.entries.len();
        strings.entries.retain(|_, entry| !entry.is_expired());
        let removed = before - strings.entries.len();
        strings.stats.record_expired(removed);
        Ok(removed)
    }

    /// Number of string keys currently held, expired ones included.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock("len")?.entries.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0 && self.sets.namespace_count() == 0)
    }
}

impl KvConnection for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut strings = self.lock("get")?;
        let value = strings.live(key).map(|entry| entry.value.clone());
        match value {
            Some(_) => strings.stats.record_hit(),
            None => strings.stats.record_miss(),
        }
        Ok(value)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>, mode: SetMode) -> Result<bool> {
        let mut strings = self.lock("set")?;
        let live = strings.live(key).is_some();
        let allowed = match mode {
            SetMode::Always => true,
            SetMode::IfAbsent => !live,
            SetMode::IfPresent => live,
        };
        if allowed {
            strings
                .entries
                .insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        }
        Ok(allowed)
    }

    fn del(&self, key: &str) -> Result<bool> {
        let removed_string = {
            let mut strings = self.lock("del")?;
            let live = strings.live(key).is_some();
            strings.entries.remove(key);
            live
        };
        let removed_set = self.sets.clear_namespace(&key.to_string());
        Ok(removed_string || removed_set)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let live = self.lock("exists")?.live(key).is_some();
        Ok(live || self.sets.contains_namespace(&key.to_string()))
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool> {
        let added = self
            .sets
            .sort_add(&key.to_string(), [(score, member.to_string())])?;
        Ok(added > 0)
    }

    fn zadd_incr(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.sets.add(&key.to_string(), [member.to_string()]) > 0)
    }

    fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        Ok(self.sets.remove(&key.to_string(), [&member.to_string()]) > 0)
    }

    fn zcard(&self, key: &str) -> Result<u64> {
        Ok(self.sets.card(&key.to_string()) as u64)
    }

    fn zcount(&self, key: &str, min: Bound<f64>, max: Bound<f64>) -> Result<u64> {
        Ok(self.sets.count_by_score(&key.to_string(), min, max)? as u64)
    }

    fn zrange(&self, key: &str, offset: i64, count: i64) -> Result<Vec<String>> {
        self.sets.values(&key.to_string(), offset, count)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: i64,
        count: i64,
    ) -> Result<Vec<String>> {
        self.sets
            .range_by_score(&key.to_string(), min, max, offset, count)
    }

    fn zrevrange_by_score(
        &self,
        key: &str,
        min: Bound<f64>,
        max: Bound<f64>,
        offset: i64,
        count: i64,
    ) -> Result<Vec<String>> {
        self.sets
            .rev_range_by_score(&key.to_string(), min, max, offset, count)
    }

    fn delete_prefix(&self, prefix: &str) -> Result<u64> {
        let removed_strings = {
            let mut strings = self.lock("delete_prefix")?;
            let before = strings.entries.len();
            strings.entries.retain(|key, _| !key.starts_with(prefix));
            before - strings.entries.len()
        };
        let removed_sets = self.sets.remove_namespaces(|key| key.starts_with(prefix));
        Ok((removed_strings + removed_sets) as u64)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_store_new() {
        let store = MemoryStore::new();
        assert_eq!(store.len().unwrap(), 0);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_store_set_and_get() {
        let store = MemoryStore::new();

        assert!(store.set("key1", "value1", None, SetMode::Always).unwrap());
        assert_eq!(store.get("key1").unwrap(), Some("value1".to_string()));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let store = MemoryStore::new();
        assert_eq!(store.get("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_set_modes() {
        let store = MemoryStore::new();

        assert!(!store.set("k", "v0", None, SetMode::IfPresent).unwrap());
        assert!(store.set("k", "v1", None, SetMode::IfAbsent).unwrap());
        assert!(!store.set("k", "v2", None, SetMode::IfAbsent).unwrap());
        assert!(store.set("k", "v3", None, SetMode::IfPresent).unwrap());
        assert_eq!(store.get("k").unwrap(), Some("v3".to_string()));
    }

    #[test]
    fn test_if_absent_claims_expired_key() {
        let store = MemoryStore::new();
        store
            .set("k", "old", Some(Duration::from_millis(1)), SetMode::Always)
            .unwrap();
        sleep(Duration::from_millis(5));

        assert!(store.set("k", "new", None, SetMode::IfAbsent).unwrap());
        assert_eq!(store.get("k").unwrap(), Some("new".to_string()));
    }

    #[test]
    fn test_store_delete() {
        let store = MemoryStore::new();

        store.set("key1", "value1", None, SetMode::Always).unwrap();
        assert!(store.del("key1").unwrap());
        assert!(!store.del("key1").unwrap());
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let store = MemoryStore::new();

        store
            .set("key1", "value1", Some(Duration::from_secs(1)), SetMode::Always)
            .unwrap();
        assert!(store.exists("key1").unwrap());

        // Wait for expiration
        sleep(Duration::from_millis(1100));

        assert_eq!(store.get("key1").unwrap(), None);
        assert!(!store.exists("key1").unwrap());
    }

    #[test]
    fn test_store_stats() {
        let store = MemoryStore::new();

        store.set("key1", "value1", None, SetMode::Always).unwrap();
        store.get("key1").unwrap(); // hit
        store.get("nonexistent").unwrap(); // miss
        store.zadd("z", 1.0, "a").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.total_sets, 1);
    }

    #[test]
    fn test_store_purge_expired() {
        let store = MemoryStore::new();

        store
            .set("key1", "value1", Some(Duration::from_secs(1)), SetMode::Always)
            .unwrap();
        store
            .set("key2", "value2", Some(Duration::from_secs(10)), SetMode::Always)
            .unwrap();

        // Wait for key1 to expire
        sleep(Duration::from_millis(1100));

        assert_eq!(store.purge_expired().unwrap(), 1);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.get("key2").unwrap().is_some());
        assert_eq!(store.stats().unwrap().expired, 1);
    }

    #[test]
    fn test_sorted_set_operations() {
        let store = MemoryStore::new();

        store.zadd("ages", 30.0, "3").unwrap();
        store.zadd("ages", 10.0, "1").unwrap();
        store.zadd("ages", 20.0, "2").unwrap();
        assert!(!store.zadd("ages", 5.0, "3").unwrap());

        assert_eq!(store.zcard("ages").unwrap(), 3);
        assert_eq!(store.zrange("ages", 0, -1).unwrap(), vec!["3", "1", "2"]);
        assert_eq!(
            store
                .zrange_by_score("ages", Bound::Included(10.0), Bound::Unbounded, 0, -1)
                .unwrap(),
            vec!["1", "2"]
        );
        assert_eq!(
            store
                .zrevrange_by_score("ages", Bound::Unbounded, Bound::Excluded(20.0), 0, -1)
                .unwrap(),
            vec!["1", "3"]
        );
        assert_eq!(
            store
                .zcount("ages", Bound::Excluded(5.0), Bound::Included(20.0))
                .unwrap(),
            2
        );

        assert!(store.zrem("ages", "1").unwrap());
        assert!(!store.zrem("ages", "1").unwrap());
        assert_eq!(store.zcard("ages").unwrap(), 2);
    }

    #[test]
    fn test_zadd_incr_keeps_first_position() {
        let store = MemoryStore::new();

        assert!(store.zadd_incr("idx", "7").unwrap());
        assert!(store.zadd_incr("idx", "3").unwrap());
        assert!(!store.zadd_incr("idx", "7").unwrap());
        assert_eq!(store.zrange("idx", 0, -1).unwrap(), vec!["7", "3"]);
    }

    #[test]
    fn test_delete_prefix() {
        let store = MemoryStore::new();
        store.set("user:object:1", "{}", None, SetMode::Always).unwrap();
        store.set("user:unique:uk:x", "1", None, SetMode::Always).unwrap();
        store.zadd("user:range:age", 1.0, "1").unwrap();
        store.set("order:object:1", "{}", None, SetMode::Always).unwrap();

        assert_eq!(store.delete_prefix("user:").unwrap(), 3);
        assert!(store.exists("order:object:1").unwrap());
        assert!(!store.exists("user:range:age").unwrap());
    }
}
