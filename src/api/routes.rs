//! API Routes
//!
//! Configures the Axum router with all endpoints.

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_user_handler, get_user_handler, health_handler, put_user_handler, stats_handler,
    sync_clear_handler, sync_load_handler, sync_status_handler, user_by_unique_handler,
    users_by_age_handler, users_by_sex_handler, AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /users` - Upsert a user in both stores
/// - `GET /users/:id` - Read a user, through the cache
/// - `DELETE /users/:id` - Delete a user from both stores
/// - `GET /users/by-sex/:sex` - Page through the sex index
/// - `GET /users/by-age` - Scan the age range index
/// - `GET /users/unique` - Look up by mailbox and password
/// - `POST /sync/load` - Reload the cache from the primary store
/// - `POST /sync/clear` - Drop every cached user and index
/// - `GET /sync/status` - Synchronizer state
/// - `GET /stats` - Cache engine statistics
/// - `GET /health` - Health check endpoint
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/users", put(put_user_handler))
        .route("/users/by-sex/:sex", get(users_by_sex_handler))
        .route("/users/by-age", get(users_by_age_handler))
        .route("/users/unique", get(user_by_unique_handler))
        .route(
            "/users/:id",
            get(get_user_handler).delete(delete_user_handler),
        )
        .route("/sync/load", post(sync_load_handler))
        .route("/sync/clear", post(sync_clear_handler))
        .route("/sync/status", get(sync_status_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
