//! Cache Synchronizer
//!
//! Bulk reconciliation between the primary store and the cache. Tracks a
//! small state machine so a reload cannot overlap another one and a failed
//! reload is visible until retried.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cache::{CacheManager, KvConnection, LoadReport};
use crate::error::{OrmError, Result};
use crate::orm::Entity;
use crate::primary::{DbManager, SqlExecutor};

/// Where the synchronizer is in its `Idle -> Loading -> Idle | Failed` cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Loading,
    Failed,
    /// A clear is running; the prior state returns when it finishes.
    Clearing,
}

/// Snapshot of the last reload.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_report: Option<LoadReport>,
    pub last_loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_report: None,
            last_loaded_at: None,
            last_error: None,
        }
    }
}

// == Synchronizer ==
#[derive(Debug, Default)]
pub struct Synchronizer {
    status: Mutex<SyncStatus>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> SyncStatus {
        self.lock().clone()
    }

    /// Rejects a new load or clear while another one runs.
    fn check_free(state: SyncState) -> Result<()> {
        match state {
            SyncState::Loading => Err(OrmError::InvalidArgument(
                "load already in progress".to_string(),
            )),
            SyncState::Clearing => Err(OrmError::InvalidArgument(
                "clear in progress".to_string(),
            )),
            SyncState::Idle | SyncState::Failed => Ok(()),
        }
    }

    /// Reloads every record of `E` from `db` into `cache`, `page_size` rows
    /// at a time. A failed reload leaves the state `Failed`; calling `load`
    /// again retries it.
    pub fn load<E, S, C>(
        &self,
        db: &DbManager<'_, E, S>,
        cache: &CacheManager<'_, E, C>,
        page_size: u64,
    ) -> Result<LoadReport>
    where
        E: Entity,
        S: SqlExecutor + ?Sized,
        C: KvConnection + ?Sized,
    {
        {
            let mut status = self.lock();
            Self::check_free(status.state)?;
            if status.state == SyncState::Failed {
                warn!(entity = E::NAME, "retrying failed load");
            }
            status.state = SyncState::Loading;
        }

        info!(entity = E::NAME, page_size, "load started");
        let result = cache.load_paged(db, page_size);

        let mut status = self.lock();
        match &result {
            Ok(report) => {
                status.state = SyncState::Idle;
                status.last_report = Some(*report);
                status.last_loaded_at = Some(Utc::now());
                status.last_error = None;
            }
            Err(e) => {
                error!(entity = E::NAME, error = %e, "load failed");
                status.state = SyncState::Failed;
                status.last_error = Some(e.to_string());
            }
        }
        result
    }

    /// Drops every cached record and index of `E`.
    pub fn clear<E, C>(&self, cache: &CacheManager<'_, E, C>) -> Result<u64>
    where
        E: Entity,
        C: KvConnection + ?Sized,
    {
        let prior = {
            let mut status = self.lock();
            Self::check_free(status.state)?;
            std::mem::replace(&mut status.state, SyncState::Clearing)
        };

        let result = cache.clear();
        self.lock().state = prior;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::model::{SexOfUserIdx, User};
    use rusqlite::Connection;

    fn seeded_db(n: i64) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(User::CREATE_TABLE).unwrap();
        let users: Vec<User> = (0..n)
            .map(|i| {
                let mut user = User::new();
                user.id = i;
                user.mailbox = format!("u{}@example.com", i);
                user.sex = i % 2 == 0;
                user
            })
            .collect();
        DbManager::<User, _>::new(&conn).batch_create(&users).unwrap();
        conn
    }

    #[test]
    fn test_load_moves_back_to_idle() {
        let conn = seeded_db(12);
        let store = MemoryStore::new();
        let sync = Synchronizer::new();

        let report = sync
            .load(&DbManager::new(&conn), &CacheManager::<User, _>::new(&store), 5)
            .unwrap();
        assert_eq!(report, LoadReport { records: 12, pages: 3 });

        let status = sync.status();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.last_report, Some(report));
        assert!(status.last_loaded_at.is_some());
    }

    #[test]
    fn test_failed_load_can_be_retried() {
        let conn = Connection::open_in_memory().unwrap();
        let store = MemoryStore::new();
        let cache = CacheManager::<User, _>::new(&store);
        let sync = Synchronizer::new();

        // no users table yet
        let err = sync.load(&DbManager::new(&conn), &cache, 10).unwrap_err();
        assert!(matches!(err, OrmError::StoreUnavailable { .. }));
        assert_eq!(sync.status().state, SyncState::Failed);
        assert!(sync.status().last_error.is_some());

        conn.execute_batch(User::CREATE_TABLE).unwrap();
        sync.load(&DbManager::new(&conn), &cache, 10).unwrap();
        assert_eq!(sync.status().state, SyncState::Idle);
        assert!(sync.status().last_error.is_none());
    }

    #[test]
    fn test_overlapping_load_is_rejected() {
        let conn = seeded_db(2);
        let store = MemoryStore::new();
        let cache = CacheManager::<User, _>::new(&store);
        let sync = Synchronizer::new();
        sync.lock().state = SyncState::Loading;

        let err = sync.load(&DbManager::new(&conn), &cache, 10).unwrap_err();
        assert!(err.to_string().contains("load already in progress"));
        assert!(sync.clear(&cache).is_err());
    }

    #[test]
    fn test_load_during_clear_is_rejected() {
        let conn = seeded_db(2);
        let store = MemoryStore::new();
        let cache = CacheManager::<User, _>::new(&store);
        let sync = Synchronizer::new();
        sync.lock().state = SyncState::Clearing;

        let err = sync.load(&DbManager::new(&conn), &cache, 10).unwrap_err();
        assert!(err.to_string().contains("clear in progress"));
        assert!(sync.clear(&cache).is_err());
        assert!(!cache.exist(&0).unwrap());
    }

    #[test]
    fn test_clear_restores_prior_state() {
        let conn = Connection::open_in_memory().unwrap();
        let store = MemoryStore::new();
        let cache = CacheManager::<User, _>::new(&store);
        let sync = Synchronizer::new();

        sync.clear(&cache).unwrap();
        assert_eq!(sync.status().state, SyncState::Idle);

        assert!(sync.load(&DbManager::new(&conn), &cache, 10).is_err());
        sync.clear(&cache).unwrap();
        assert_eq!(sync.status().state, SyncState::Failed);
    }

    #[test]
    fn test_clear_then_load_restores_indexes() {
        let conn = seeded_db(10);
        let store = MemoryStore::new();
        let cache = CacheManager::<User, _>::new(&store);
        let db = DbManager::new(&conn);
        let sync = Synchronizer::new();

        sync.load(&db, &cache, 4).unwrap();
        let before = cache.find(&SexOfUserIdx::new(false)).unwrap();

        sync.clear(&cache).unwrap();
        assert_eq!(cache.find(&SexOfUserIdx::new(false)).unwrap().0, 0);

        sync.load(&db, &cache, 4).unwrap();
        assert_eq!(cache.find(&SexOfUserIdx::new(false)).unwrap(), before);
    }
}
