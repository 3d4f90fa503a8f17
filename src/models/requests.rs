//! Request DTOs for the HTTP API
//!
//! Defines the structure of incoming request bodies and query strings.

use chrono::Utc;
use serde::Deserialize;

use crate::model::User;

/// Request body for PUT /users
///
/// Timestamps are stamped by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRequest {
    pub id: i64,
    pub name: String,
    pub mailbox: String,
    pub password: String,
    #[serde(default)]
    pub sex: bool,
    #[serde(default)]
    pub age: i32,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub head_url: String,
    #[serde(default)]
    pub status: i32,
    /// Optional cache TTL in seconds, overriding the server default
    #[serde(default)]
    pub ttl: Option<u64>,
}

impl UserRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        if self.mailbox.is_empty() {
            return Some("mailbox cannot be empty".to_string());
        }
        if self.password.is_empty() {
            return Some("password cannot be empty".to_string());
        }
        if !self.longitude.is_finite() || !self.latitude.is_finite() {
            return Some("coordinates must be finite".to_string());
        }
        if self.ttl == Some(0) {
            return Some("ttl must be positive".to_string());
        }
        None
    }

    /// Builds the record, keeping `created_at` from `existing` when present.
    pub fn into_user(self, existing: Option<&User>) -> User {
        let now = Utc::now();
        User {
            id: self.id,
            name: self.name,
            mailbox: self.mailbox,
            sex: self.sex,
            age: self.age,
            longitude: self.longitude,
            latitude: self.latitude,
            description: self.description,
            password: self.password,
            head_url: self.head_url,
            status: self.status,
            created_at: existing.map_or(now, |u| u.created_at),
            updated_at: now,
        }
    }
}

/// Paging parameters: `offset` from 0, `limit` of -1 for everything.
#[derive(Debug, Clone, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "unlimited")]
    pub limit: i64,
}

fn unlimited() -> i64 {
    -1
}

/// Query string for GET /users/by-age
///
/// Matches `begin <= age < end`; a missing side is unbounded.
#[derive(Debug, Clone, Deserialize)]
pub struct AgeQuery {
    pub begin: Option<i32>,
    pub end: Option<i32>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "unlimited")]
    pub limit: i64,
    /// Descending age order when true
    #[serde(default)]
    pub reverse: bool,
}

/// Query string for GET /users/unique
#[derive(Debug, Clone, Deserialize)]
pub struct UniqueQuery {
    pub mailbox: String,
    pub password: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> UserRequest {
        serde_json::from_str(
            r#"{"id": 1, "name": "ann", "mailbox": "ann@example.com", "password": "pw"}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_user_request_defaults() {
        let req = request();
        assert_eq!(req.id, 1);
        assert!(!req.sex);
        assert_eq!(req.age, 0);
        assert!(req.ttl.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_validate_empty_mailbox() {
        let mut req = request();
        req.mailbox.clear();
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut req = request();
        req.ttl = Some(0);
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_into_user_keeps_created_at() {
        let mut existing = User::new();
        existing.created_at = "2020-01-01T00:00:00Z".parse().unwrap();

        let user = request().into_user(Some(&existing));
        assert_eq!(user.created_at, existing.created_at);
        assert!(user.updated_at > existing.created_at);
        assert_eq!(user.mailbox, "ann@example.com");
    }

    #[test]
    fn test_page_query_defaults() {
        let q: PageQuery = serde_json::from_str("{}").unwrap();
        assert_eq!((q.offset, q.limit), (0, -1));
    }
}
