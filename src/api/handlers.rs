//! API Handlers
//!
//! HTTP request handlers over the `users` entity. Writes go to the primary
//! store first and are then mirrored into the cache; reads are served from
//! the cache, falling back to the primary store for single records.

use std::ops::Bound;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::debug;

use crate::cache::{CacheManager, LoadReport, MemoryStore, DEFAULT_LOAD_PAGE_SIZE};
use crate::config::Config;
use crate::error::{OrmError, Result, StoreKind};
use crate::model::{AgeOfUserRng, MailboxPasswordOfUserUk, SexOfUserIdx, User};
use crate::models::{
    AgeQuery, ClearResponse, DeleteResponse, HealthResponse, PageQuery, Source, StatsResponse,
    UniqueQuery, UserListResponse, UserRequest, UserResponse,
};
use crate::primary::DbManager;
use crate::sync::{SyncStatus, Synchronizer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Primary store connection
    pub db: Arc<Mutex<Connection>>,
    /// In-process cache engine
    pub cache: Arc<MemoryStore>,
    pub sync: Arc<Synchronizer>,
    /// TTL applied to records written through the API
    pub record_ttl: Option<Duration>,
    pub load_page_size: u64,
}

impl AppState {
    /// Creates a new AppState over an open primary-store connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            cache: Arc::new(MemoryStore::new()),
            sync: Arc::new(Synchronizer::new()),
            record_ttl: None,
            load_page_size: DEFAULT_LOAD_PAGE_SIZE,
        }
    }

    /// Creates a new AppState with TTL and paging taken from the Config.
    pub fn from_config(conn: Connection, config: &Config) -> Self {
        Self {
            record_ttl: config.record_ttl(),
            load_page_size: config.load_page_size as u64,
            ..Self::new(conn)
        }
    }

    /// Runs `f` against the primary store on the blocking thread pool.
    async fn with_db<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&*db.blocking_lock()))
            .await
            .map_err(|e| OrmError::unavailable(StoreKind::Primary, "spawn_blocking", e))?
    }

    fn users(&self) -> CacheManager<'_, User, MemoryStore> {
        CacheManager::new(&self.cache)
    }

    /// Reloads the cache from the primary store.
    pub async fn load(&self) -> Result<LoadReport> {
        let state = self.clone();
        self.with_db(move |conn| {
            state
                .sync
                .load(&DbManager::new(conn), &state.users(), state.load_page_size)
        })
        .await
    }
}

/// Handler for GET /users/:id
///
/// Serves the cached record, or reads it from the primary store and caches it.
pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<UserResponse>> {
    let cache = state.users();
    match cache.fetch(&id) {
        Ok(user) => return Ok(Json(UserResponse::new(Source::Cache, user))),
        Err(e) if e.is_not_found() => debug!(id, "cache miss, reading primary store"),
        Err(e) => return Err(e),
    }

    let user = state
        .with_db(move |conn| DbManager::<User, _>::new(conn).fetch(&id))
        .await?;
    match state.record_ttl {
        Some(ttl) => cache.save_with_expire(&user, ttl)?,
        None => cache.save(&user)?,
    };
    Ok(Json(UserResponse::new(Source::Primary, user)))
}

/// Handler for PUT /users
///
/// Upserts the user in the primary store, then in the cache.
pub async fn put_user_handler(
    State(state): State<AppState>,
    Json(req): Json<UserRequest>,
) -> Result<Json<User>> {
    if let Some(error_msg) = req.validate() {
        return Err(OrmError::InvalidArgument(error_msg));
    }
    let ttl = req.ttl.map(Duration::from_secs).or(state.record_ttl);

    let user = state
        .with_db(move |conn| {
            let db = DbManager::<User, _>::new(conn);
            let existing = match db.fetch(&req.id) {
                Ok(user) => Some(user),
                Err(e) if e.is_not_found() => None,
                Err(e) => return Err(e),
            };
            let user = req.into_user(existing.as_ref());
            db.save(&user)?;
            Ok(user)
        })
        .await?;

    let cache = state.users();
    match ttl {
        Some(ttl) => cache.save_with_expire(&user, ttl)?,
        None => cache.save(&user)?,
    };
    Ok(Json(user))
}

/// Handler for DELETE /users/:id
pub async fn delete_user_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>> {
    let user = state
        .with_db(move |conn| {
            let db = DbManager::<User, _>::new(conn);
            let user = db.fetch(&id)?;
            db.delete(&user)?;
            Ok(user)
        })
        .await?;

    match state.users().delete(&user) {
        Ok(_) => {}
        Err(e) if e.is_not_found() => debug!(id, "user was not cached"),
        Err(e) => return Err(e),
    }
    Ok(Json(DeleteResponse::new(id)))
}

/// Handler for GET /users/by-sex/:sex
pub async fn users_by_sex_handler(
    State(state): State<AppState>,
    Path(sex): Path<bool>,
    Query(page): Query<PageQuery>,
) -> Result<Json<UserListResponse>> {
    let cache = state.users();
    let (total, ids) = cache.find(&SexOfUserIdx::new(sex).with_page(page.offset, page.limit))?;
    let users = cache.fetch_by_primary_keys(&ids)?;
    Ok(Json(UserListResponse { total, users }))
}

/// Handler for GET /users/by-age
pub async fn users_by_age_handler(
    State(state): State<AppState>,
    Query(q): Query<AgeQuery>,
) -> Result<Json<UserListResponse>> {
    let begin = q.begin.map_or(Bound::Unbounded, Bound::Included);
    let end = q.end.map_or(Bound::Unbounded, Bound::Excluded);
    let scope = AgeOfUserRng::new(begin, end).with_page(q.offset, q.limit);

    let cache = state.users();
    let (total, users) = if q.reverse {
        cache.range_revert_fetch(&scope)?
    } else {
        cache.range_fetch(&scope)?
    };
    Ok(Json(UserListResponse { total, users }))
}

/// Handler for GET /users/unique
pub async fn user_by_unique_handler(
    State(state): State<AppState>,
    Query(q): Query<UniqueQuery>,
) -> Result<Json<UserResponse>> {
    let cache = state.users();
    let id = cache.find_one(&MailboxPasswordOfUserUk::new(q.mailbox, q.password))?;
    let user = cache.fetch(&id)?;
    Ok(Json(UserResponse::new(Source::Cache, user)))
}

/// Handler for POST /sync/load
pub async fn sync_load_handler(State(state): State<AppState>) -> Result<Json<LoadReport>> {
    Ok(Json(state.load().await?))
}

/// Handler for POST /sync/clear
pub async fn sync_clear_handler(State(state): State<AppState>) -> Result<Json<ClearResponse>> {
    let removed = state.sync.clear(&state.users())?;
    Ok(Json(ClearResponse { removed }))
}

/// Handler for GET /sync/status
pub async fn sync_status_handler(State(state): State<AppState>) -> Json<SyncStatus> {
    Json(state.sync.status())
}

/// Handler for GET /stats
///
/// Returns current cache engine statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Result<Json<StatsResponse>> {
    Ok(Json(state.cache.stats()?.into()))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
