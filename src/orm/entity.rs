//! Entity Capabilities
//!
//! Each entity kind is a fixed-shape struct implementing [`Entity`]. Its
//! unique keys, equality indexes and range scopes are small value types
//! implementing [`UniqueKey`], [`IndexKey`] and [`RangeScope`]. The entity
//! reports its own memberships, and the query types must encode values the
//! same way, so a lookup lands on the key a write produced.

use std::fmt::Debug;
use std::ops::Bound;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{OrmError, Result};
use crate::orm::value::{SqlRow, SqlValue};

// == Primary Key ==
/// Record identity, encodable both as a cache member and as SQL parameters.
pub trait PrimaryKey: Clone + Debug + PartialEq + Sized {
    /// Cache member form, also used inside record keys.
    fn encode(&self) -> String;

    /// Inverse of [`PrimaryKey::encode`].
    fn decode(raw: &str) -> Result<Self>;

    /// Parameters in primary-key column order.
    fn to_params(&self) -> Vec<SqlValue>;

    /// Reads the key from the leading columns of a row.
    fn from_row(row: &SqlRow) -> Result<Self>;
}

impl PrimaryKey for i64 {
    fn encode(&self) -> String {
        self.to_string()
    }

    fn decode(raw: &str) -> Result<Self> {
        raw.parse()
            .map_err(|_| OrmError::Decode(format!("invalid integer key: {}", raw)))
    }

    fn to_params(&self) -> Vec<SqlValue> {
        vec![SqlValue::Integer(*self)]
    }

    fn from_row(row: &SqlRow) -> Result<Self> {
        row.get_i64(0)
    }
}

// == Memberships ==
/// A record's entry under one unique key or equality index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Membership {
    pub name: &'static str,
    pub value: String,
}

impl Membership {
    pub fn new(name: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            value: value.into(),
        }
    }
}

/// A record's score under one range index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeMembership {
    pub name: &'static str,
    pub score: f64,
}

impl RangeMembership {
    pub fn new(name: &'static str, score: f64) -> Self {
        Self { name, score }
    }
}

// == Entity ==
/// A record type mirrored between the primary store and the cache.
pub trait Entity: Clone + Debug + Serialize + DeserializeOwned {
    type Key: PrimaryKey;

    /// Cache key namespace, e.g. `user`.
    const NAME: &'static str;
    /// Relational table name.
    const TABLE: &'static str;
    /// All columns, in the order of [`Entity::to_params`] and [`Entity::from_row`].
    const COLUMNS: &'static [&'static str];
    /// Primary-key columns, in the order of [`PrimaryKey::to_params`].
    const PRIMARY_KEY: &'static [&'static str];

    fn key_of(&self) -> Self::Key;

    fn to_params(&self) -> Vec<SqlValue>;

    fn from_row(row: &SqlRow) -> Result<Self>;

    fn unique_memberships(&self) -> Vec<Membership>;

    fn index_memberships(&self) -> Vec<Membership>;

    fn range_memberships(&self) -> Vec<RangeMembership>;
}

// == Query Types ==
/// Lookup by a unique key, resolving to at most one PK.
pub trait UniqueKey {
    type Entity: Entity;

    const NAME: &'static str;
    const COLUMNS: &'static [&'static str];

    fn encode(&self) -> String;

    fn to_params(&self) -> Vec<SqlValue>;
}

/// Lookup by an equality index, resolving to a page of PKs.
pub trait IndexKey {
    type Entity: Entity;

    const NAME: &'static str;
    const COLUMNS: &'static [&'static str];

    fn encode(&self) -> String;

    fn to_params(&self) -> Vec<SqlValue>;

    fn offset(&self) -> i64 {
        0
    }

    /// Page size, `-1` for everything.
    fn limit(&self) -> i64 {
        -1
    }
}

/// Scan over a range index.
pub trait RangeScope {
    type Entity: Entity;

    const NAME: &'static str;
    const COLUMN: &'static str;

    fn begin(&self) -> Bound<f64>;

    fn end(&self) -> Bound<f64>;

    fn offset(&self) -> i64 {
        0
    }

    /// Page size, `-1` for everything.
    fn limit(&self) -> i64 {
        -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_key_round_trip() {
        let pk: i64 = 42;
        assert_eq!(<i64 as PrimaryKey>::decode(&pk.encode()).unwrap(), 42);
        assert_eq!(PrimaryKey::to_params(&pk), vec![SqlValue::Integer(42)]);
    }

    #[test]
    fn test_integer_key_rejects_garbage() {
        assert!(matches!(
            <i64 as PrimaryKey>::decode("forty-two"),
            Err(OrmError::Decode(_))
        ));
    }
}
