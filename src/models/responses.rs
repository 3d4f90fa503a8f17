//! Response DTOs for the HTTP API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::model::User;

/// Where a record read was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Cache,
    Primary,
}

/// Response body for GET /users/:id and GET /users/unique
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub source: Source,
    pub user: User,
}

impl UserResponse {
    pub fn new(source: Source, user: User) -> Self {
        Self { source, user }
    }
}

/// Response body for index and range listings
#[derive(Debug, Clone, Serialize)]
pub struct UserListResponse {
    /// Matches in the index, before paging
    pub total: u64,
    /// Live records of the requested page
    pub users: Vec<User>,
}

/// Response body for DELETE /users/:id
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    pub id: i64,
}

impl DeleteResponse {
    pub fn new(id: i64) -> Self {
        Self {
            message: format!("user {} deleted successfully", id),
            id,
        }
    }
}

/// Response body for POST /sync/clear
#[derive(Debug, Clone, Serialize)]
pub struct ClearResponse {
    /// Keys and sorted sets removed
    pub removed: u64,
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Record reads that found a live value
    pub hits: u64,
    /// Record reads that found nothing
    pub misses: u64,
    /// Values dropped after their TTL elapsed
    pub expired: u64,
    /// Current number of string keys
    pub total_entries: usize,
    /// Current number of sorted sets
    pub total_sets: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<CacheStats> for StatsResponse {
    fn from(stats: CacheStats) -> Self {
        Self {
            hit_rate: stats.hit_rate(),
            hits: stats.hits,
            misses: stats.misses,
            expired: stats.expired,
            total_entries: stats.total_entries,
            total_sets: stats.total_sets,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
