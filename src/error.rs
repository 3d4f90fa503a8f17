//! Error types for the ORM layer
//!
//! Provides unified error handling using thiserror.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Store Kind ==
/// Identifies which backend raised an I/O failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// The relational system-of-record
    Primary,
    /// The key-value / sorted-set cache engine
    Cache,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Primary => f.write_str("primary store"),
            StoreKind::Cache => f.write_str("cache store"),
        }
    }
}

// == ORM Error Enum ==
/// Unified error type for both managers and the synchronizer.
#[derive(Error, Debug)]
pub enum OrmError {
    /// PK, UK or record absent (or expired)
    #[error("record does not exist: {0}")]
    NotFound(String),

    /// PK collision on a strict create
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Unique key collision
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Malformed pagination or range bounds
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// I/O failure against one of the backends
    #[error("{store} unavailable during {operation}: {message}")]
    StoreUnavailable {
        store: StoreKind,
        operation: &'static str,
        message: String,
    },

    /// Stored record or row could not be decoded into an entity
    #[error("decode error: {0}")]
    Decode(String),
}

impl OrmError {
    /// Wraps a backend failure with the store and operation that raised it.
    pub fn unavailable(store: StoreKind, operation: &'static str, err: impl fmt::Display) -> Self {
        OrmError::StoreUnavailable {
            store,
            operation,
            message: err.to_string(),
        }
    }

    /// Returns true for `NotFound`, the error readers treat as a stale index hit.
    pub fn is_not_found(&self) -> bool {
        matches!(self, OrmError::NotFound(_))
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        OrmError::Decode(err.to_string())
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for OrmError {
    fn into_response(self) -> Response {
        let status = match &self {
            OrmError::NotFound(_) => StatusCode::NOT_FOUND,
            OrmError::AlreadyExists(_) => StatusCode::CONFLICT,
            OrmError::ConstraintViolation(_) => StatusCode::CONFLICT,
            OrmError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            OrmError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrmError::Decode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the ORM layer.
pub type Result<T> = std::result::Result<T, OrmError>;
