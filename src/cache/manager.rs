//! Cache-Store Manager
//!
//! Entity records and their unique keys, equality indexes and range indexes
//! held in a [`KvConnection`]. Every write applies the record first, then
//! retracts memberships the record no longer holds, then inserts the new
//! ones. An interrupted write can leave an index pointing at a missing
//! record, which readers skip, but never a live record missing from an
//! index.
//!
//! Next to each record sits a shadow copy without TTL. When a record expires
//! its memberships stay behind, and the shadow tells the next write to the
//! same key what to retract.

use std::marker::PhantomData;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::cache::{KvConnection, SetMode};
use crate::error::{OrmError, Result};
use crate::orm::keys::{
    entity_prefix, index_key, object_key, range_key, shadow_key, unique_key,
};
use crate::orm::{
    check_bounds, check_window, Entity, IndexKey, Membership, PrimaryKey, RangeScope, UniqueKey,
};
use crate::primary::{DbManager, SqlExecutor};

/// Default number of rows read per page by [`CacheManager::load`].
pub const DEFAULT_LOAD_PAGE_SIZE: u64 = 500;

/// Outcome of a full reload from the primary store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Records written to the cache
    pub records: u64,
    /// Pages read from the primary store
    pub pages: u64,
}

/// How a record write treats the record key and unique-key claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Create,
    Update,
    Save,
    /// Save that trusts the primary store and takes over unique keys.
    Load,
}

// == Cache Manager ==
/// Entity operations scoped to one cache connection.
pub struct CacheManager<'a, E, C: ?Sized> {
    conn: &'a C,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E, C> CacheManager<'a, E, C>
where
    E: Entity,
    C: KvConnection + ?Sized,
{
    // == Constructor ==
    pub fn new(conn: &'a C) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    fn record_key(pk: &E::Key) -> String {
        object_key(E::NAME, &pk.encode())
    }

    fn shadow_key(pk: &E::Key) -> String {
        shadow_key(E::NAME, &pk.encode())
    }

    fn not_found(pk: &E::Key) -> OrmError {
        OrmError::NotFound(format!("{} {}", E::NAME, pk.encode()))
    }

    fn decode_keys(members: Vec<String>) -> Result<Vec<E::Key>> {
        members.iter().map(|raw| E::Key::decode(raw)).collect()
    }

    fn stored(&self, pk: &E::Key) -> Result<Option<E>> {
        match self.conn.get(&Self::record_key(pk))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The live record, or the last version written if it has since expired.
    fn last_written(&self, pk: &E::Key) -> Result<Option<E>> {
        if let Some(record) = self.stored(pk)? {
            return Ok(Some(record));
        }
        match self.conn.get(&Self::shadow_key(pk))? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    // == Reads ==
    /// The live record stored under `pk`.
    pub fn fetch(&self, pk: &E::Key) -> Result<E> {
        self.stored(pk)?.ok_or_else(|| Self::not_found(pk))
    }

    pub fn exist(&self, pk: &E::Key) -> Result<bool> {
        self.conn.exists(&Self::record_key(pk))
    }

    /// Live records for `pks` in input order; missing or expired ones are skipped.
    pub fn fetch_by_primary_keys(&self, pks: &[E::Key]) -> Result<Vec<E>> {
        let mut records = Vec::with_capacity(pks.len());
        for pk in pks {
            match self.fetch(pk) {
                Ok(record) => records.push(record),
                Err(e) if e.is_not_found() => {
                    debug!(entity = E::NAME, pk = %pk.encode(), "skipping stale index entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    // == Writes ==
    /// Stores a new record. A live record under the same key is `AlreadyExists`.
    pub fn create(&self, record: &E) -> Result<u64> {
        self.write(record, None, WriteKind::Create)
    }

    pub fn create_with_expire(&self, record: &E, ttl: Duration) -> Result<u64> {
        self.write(record, Some(ttl), WriteKind::Create)
    }

    /// Replaces a live record. The previous TTL is dropped.
    pub fn update(&self, record: &E) -> Result<u64> {
        self.write(record, None, WriteKind::Update)
    }

    pub fn update_with_expire(&self, record: &E, ttl: Duration) -> Result<u64> {
        self.write(record, Some(ttl), WriteKind::Update)
    }

    /// Creates or replaces the record.
    pub fn save(&self, record: &E) -> Result<u64> {
        self.write(record, None, WriteKind::Save)
    }

    pub fn save_with_expire(&self, record: &E, ttl: Duration) -> Result<u64> {
        self.write(record, Some(ttl), WriteKind::Save)
    }

    /// Removes the live record under `record`'s key and retracts the
    /// memberships of the stored version.
    pub fn delete(&self, record: &E) -> Result<u64> {
        let pk = record.key_of();
        let previous = self.stored(&pk)?.ok_or_else(|| Self::not_found(&pk))?;
        self.conn.del(&Self::record_key(&pk))?;
        self.conn.del(&Self::shadow_key(&pk))?;

        let member = pk.encode();
        for uk in previous.unique_memberships() {
            self.retract_unique(&uk, &member)?;
        }
        for idx in previous.index_memberships() {
            self.conn.zrem(&index_key(E::NAME, idx.name, &idx.value), &member)?;
        }
        for rng in previous.range_memberships() {
            self.conn.zrem(&range_key(E::NAME, rng.name), &member)?;
        }
        debug!(entity = E::NAME, pk = %member, "cache delete");
        Ok(1)
    }

    fn write(&self, record: &E, ttl: Option<Duration>, kind: WriteKind) -> Result<u64> {
        let pk = record.key_of();
        let member = pk.encode();
        let key = Self::record_key(&pk);
        let uniques = record.unique_memberships();

        let previous = match kind {
            WriteKind::Update => Some(self.stored(&pk)?.ok_or_else(|| Self::not_found(&pk))?),
            WriteKind::Create | WriteKind::Save | WriteKind::Load => self.last_written(&pk)?,
        };
        if kind != WriteKind::Load {
            for uk in &uniques {
                self.check_unique_claim(uk, &member)?;
            }
        }

        let raw = serde_json::to_string(record)?;
        let mode = match kind {
            WriteKind::Create => SetMode::IfAbsent,
            WriteKind::Update => SetMode::IfPresent,
            WriteKind::Save | WriteKind::Load => SetMode::Always,
        };
        if !self.conn.set(&key, &raw, ttl, mode)? {
            return Err(match kind {
                WriteKind::Create => {
                    OrmError::AlreadyExists(format!("{} {}", E::NAME, member))
                }
                _ => Self::not_found(&pk),
            });
        }
        self.conn
            .set(&Self::shadow_key(&pk), &raw, None, SetMode::Always)?;

        let indexes = record.index_memberships();
        let ranges = record.range_memberships();

        // Retractions
        if let Some(previous) = &previous {
            for uk in previous.unique_memberships() {
                if !uniques.contains(&uk) {
                    self.retract_unique(&uk, &member)?;
                }
            }
            for idx in previous.index_memberships() {
                if !indexes.contains(&idx) {
                    self.conn.zrem(&index_key(E::NAME, idx.name, &idx.value), &member)?;
                }
            }
            for rng in previous.range_memberships() {
                if !ranges.iter().any(|r| r.name == rng.name) {
                    self.conn.zrem(&range_key(E::NAME, rng.name), &member)?;
                }
            }
        }

        // Insertions
        for uk in &uniques {
            self.conn.set(
                &unique_key(E::NAME, uk.name, &uk.value),
                &member,
                None,
                SetMode::Always,
            )?;
        }
        for idx in &indexes {
            self.conn.zadd_incr(&index_key(E::NAME, idx.name, &idx.value), &member)?;
        }
        for rng in &ranges {
            self.conn.zadd(&range_key(E::NAME, rng.name), rng.score, &member)?;
        }

        debug!(entity = E::NAME, pk = %member, ?kind, ttl = ?ttl, "cache write");
        Ok(1)
    }

    /// A unique-key value may only move to `member` if no live record
    /// other than `member` still holds it.
    fn check_unique_claim(&self, uk: &Membership, member: &str) -> Result<()> {
        let Some(holder) = self.conn.get(&unique_key(E::NAME, uk.name, &uk.value))? else {
            return Ok(());
        };
        if holder == member {
            return Ok(());
        }
        let held = self
            .stored(&E::Key::decode(&holder)?)?
            .is_some_and(|record| record.unique_memberships().contains(uk));
        if held {
            return Err(OrmError::ConstraintViolation(format!(
                "{} {} {} is held by {}",
                E::NAME,
                uk.name,
                uk.value,
                holder
            )));
        }
        Ok(())
    }

    fn retract_unique(&self, uk: &Membership, member: &str) -> Result<()> {
        let key = unique_key(E::NAME, uk.name, &uk.value);
        if self.conn.get(&key)?.as_deref() == Some(member) {
            self.conn.del(&key)?;
        }
        Ok(())
    }

    // == Finders ==
    /// Keys sharing an equality-index value in insertion order, with the
    /// index's total size.
    pub fn find<I>(&self, idx: &I) -> Result<(u64, Vec<E::Key>)>
    where
        I: IndexKey<Entity = E>,
    {
        check_window(idx.offset(), idx.limit())?;
        let key = index_key(E::NAME, I::NAME, &idx.encode());
        let total = self.conn.zcard(&key)?;
        let members = self.conn.zrange(&key, idx.offset(), idx.limit())?;
        Ok((total, Self::decode_keys(members)?))
    }

    /// The key holding a unique-key value. The record itself may have expired.
    pub fn find_one<U>(&self, uk: &U) -> Result<E::Key>
    where
        U: UniqueKey<Entity = E>,
    {
        match self.conn.get(&unique_key(E::NAME, U::NAME, &uk.encode()))? {
            Some(raw) => E::Key::decode(&raw),
            None => Err(OrmError::NotFound(format!(
                "{} {} {}",
                E::NAME,
                U::NAME,
                uk.encode()
            ))),
        }
    }

    /// Keys within the scope, ascending by score.
    pub fn range<R>(&self, scope: &R) -> Result<(u64, Vec<E::Key>)>
    where
        R: RangeScope<Entity = E>,
    {
        check_bounds(scope.begin(), scope.end())?;
        check_window(scope.offset(), scope.limit())?;
        let key = range_key(E::NAME, R::NAME);
        let total = self.conn.zcount(&key, scope.begin(), scope.end())?;
        let members = self.conn.zrange_by_score(
            &key,
            scope.begin(),
            scope.end(),
            scope.offset(),
            scope.limit(),
        )?;
        Ok((total, Self::decode_keys(members)?))
    }

    /// Keys within the scope, descending by score.
    pub fn range_revert<R>(&self, scope: &R) -> Result<(u64, Vec<E::Key>)>
    where
        R: RangeScope<Entity = E>,
    {
        check_bounds(scope.begin(), scope.end())?;
        check_window(scope.offset(), scope.limit())?;
        let key = range_key(E::NAME, R::NAME);
        let total = self.conn.zcount(&key, scope.begin(), scope.end())?;
        let members = self.conn.zrevrange_by_score(
            &key,
            scope.begin(),
            scope.end(),
            scope.offset(),
            scope.limit(),
        )?;
        Ok((total, Self::decode_keys(members)?))
    }

    pub fn range_fetch<R>(&self, scope: &R) -> Result<(u64, Vec<E>)>
    where
        R: RangeScope<Entity = E>,
    {
        let (total, keys) = self.range(scope)?;
        Ok((total, self.fetch_by_primary_keys(&keys)?))
    }

    pub fn range_revert_fetch<R>(&self, scope: &R) -> Result<(u64, Vec<E>)>
    where
        R: RangeScope<Entity = E>,
    {
        let (total, keys) = self.range_revert(scope)?;
        Ok((total, self.fetch_by_primary_keys(&keys)?))
    }

    // == Bulk ==
    /// Drops every record and index of the entity type.
    pub fn clear(&self) -> Result<u64> {
        let removed = self.conn.delete_prefix(&entity_prefix(E::NAME))?;
        info!(entity = E::NAME, removed, "cache cleared");
        Ok(removed)
    }

    /// Rewrites every record of the primary store into the cache.
    pub fn load<S>(&self, db: &DbManager<'_, E, S>) -> Result<LoadReport>
    where
        S: SqlExecutor + ?Sized,
    {
        self.load_paged(db, DEFAULT_LOAD_PAGE_SIZE)
    }

    /// [`CacheManager::load`] reading `page_size` rows at a time, in key order.
    pub fn load_paged<S>(&self, db: &DbManager<'_, E, S>, page_size: u64) -> Result<LoadReport>
    where
        S: SqlExecutor + ?Sized,
    {
        if page_size == 0 {
            return Err(OrmError::InvalidArgument(
                "load page size must be positive".to_string(),
            ));
        }

        let mut report = LoadReport::default();
        loop {
            let page = db.fetch_page(report.records, page_size)?;
            let fetched = page.len() as u64;
            if fetched > 0 {
                report.pages += 1;
            }
            for record in &page {
                self.write(record, None, WriteKind::Load)?;
                report.records += 1;
            }
            debug!(entity = E::NAME, page = report.pages, fetched, "load page");
            if fetched < page_size {
                break;
            }
        }

        info!(
            entity = E::NAME,
            records = report.records,
            pages = report.pages,
            "cache loaded"
        );
        Ok(report)
    }
}
