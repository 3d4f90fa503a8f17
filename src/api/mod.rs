//! API Module
//!
//! HTTP handlers and routing for the `users` REST API.
//!
//! # Endpoints
//! - `PUT /users`, `GET /users/:id`, `DELETE /users/:id`
//! - `GET /users/by-sex/:sex`, `GET /users/by-age`, `GET /users/unique`
//! - `POST /sync/load`, `POST /sync/clear`, `GET /sync/status`
//! - `GET /stats`, `GET /health`

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
