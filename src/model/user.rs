//! User Entity
//!
//! The `users` table mirrored into the cache, with one unique key
//! (mailbox + password), one equality index (sex) and two range indexes
//! (age, id).

use std::ops::Bound;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::Result;
use crate::orm::keys::encode_fields;
use crate::orm::{
    Entity, IndexKey, Membership, RangeMembership, RangeScope, SqlRow, SqlValue, UniqueKey,
};

// == User ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub mailbox: String,
    pub sex: bool,
    pub age: i32,
    pub longitude: f64,
    pub latitude: f64,
    pub description: String,
    pub password: String,
    pub head_url: String,
    pub status: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Schema for the primary store.
    pub const CREATE_TABLE: &'static str = "
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            mailbox TEXT NOT NULL,
            sex INTEGER NOT NULL,
            age INTEGER NOT NULL,
            longitude REAL NOT NULL,
            latitude REAL NOT NULL,
            description TEXT NOT NULL,
            password TEXT NOT NULL,
            head_url TEXT NOT NULL,
            status INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (mailbox, password)
        );
        CREATE INDEX IF NOT EXISTS idx_users_sex ON users (sex);
        CREATE INDEX IF NOT EXISTS idx_users_age ON users (age);
    ";

    // == Constructor ==
    /// Creates an empty user stamped with the current time.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            name: String::new(),
            mailbox: String::new(),
            sex: false,
            age: 0,
            longitude: 0.0,
            latitude: 0.0,
            description: String::new(),
            password: String::new(),
            head_url: String::new(),
            status: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for User {
    type Key = i64;

    const NAME: &'static str = "user";
    const TABLE: &'static str = "users";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "name",
        "mailbox",
        "sex",
        "age",
        "longitude",
        "latitude",
        "description",
        "password",
        "head_url",
        "status",
        "created_at",
        "updated_at",
    ];
    const PRIMARY_KEY: &'static [&'static str] = &["id"];

    fn key_of(&self) -> i64 {
        self.id
    }

    fn to_params(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.name.clone().into(),
            self.mailbox.clone().into(),
            self.sex.into(),
            self.age.into(),
            self.longitude.into(),
            self.latitude.into(),
            self.description.clone().into(),
            self.password.clone().into(),
            self.head_url.clone().into(),
            self.status.into(),
            self.created_at.into(),
            self.updated_at.into(),
        ]
    }

    fn from_row(row: &SqlRow) -> Result<Self> {
        Ok(Self {
            id: row.get_i64(0)?,
            name: row.get_string(1)?,
            mailbox: row.get_string(2)?,
            sex: row.get_bool(3)?,
            age: row.get_i32(4)?,
            longitude: row.get_f64(5)?,
            latitude: row.get_f64(6)?,
            description: row.get_string(7)?,
            password: row.get_string(8)?,
            head_url: row.get_string(9)?,
            status: row.get_i32(10)?,
            created_at: row.get_datetime(11)?,
            updated_at: row.get_datetime(12)?,
        })
    }

    fn unique_memberships(&self) -> Vec<Membership> {
        let uk = MailboxPasswordOfUserUk::from(self);
        vec![Membership::new(MailboxPasswordOfUserUk::NAME, uk.encode())]
    }

    fn index_memberships(&self) -> Vec<Membership> {
        let idx = SexOfUserIdx::new(self.sex);
        vec![Membership::new(SexOfUserIdx::NAME, idx.encode())]
    }

    fn range_memberships(&self) -> Vec<RangeMembership> {
        vec![
            RangeMembership::new(AgeOfUserRng::NAME, f64::from(self.age)),
            RangeMembership::new(IdOfUserRng::NAME, self.id as f64),
        ]
    }
}

// == Unique: mailbox + password ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxPasswordOfUserUk {
    pub mailbox: String,
    pub password: String,
}

impl MailboxPasswordOfUserUk {
    pub fn new(mailbox: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            mailbox: mailbox.into(),
            password: password.into(),
        }
    }
}

impl From<&User> for MailboxPasswordOfUserUk {
    fn from(user: &User) -> Self {
        Self::new(user.mailbox.clone(), user.password.clone())
    }
}

impl UniqueKey for MailboxPasswordOfUserUk {
    type Entity = User;

    const NAME: &'static str = "mailbox_password";
    const COLUMNS: &'static [&'static str] = &["mailbox", "password"];

    fn encode(&self) -> String {
        encode_fields(vec![json!(self.mailbox), json!(self.password)])
    }

    fn to_params(&self) -> Vec<SqlValue> {
        vec![self.mailbox.clone().into(), self.password.clone().into()]
    }
}

// == Index: sex ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SexOfUserIdx {
    pub sex: bool,
    pub offset: i64,
    pub limit: i64,
}

impl SexOfUserIdx {
    pub fn new(sex: bool) -> Self {
        Self {
            sex,
            offset: 0,
            limit: -1,
        }
    }

    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

impl IndexKey for SexOfUserIdx {
    type Entity = User;

    const NAME: &'static str = "sex";
    const COLUMNS: &'static [&'static str] = &["sex"];

    fn encode(&self) -> String {
        encode_fields(vec![json!(self.sex)])
    }

    fn to_params(&self) -> Vec<SqlValue> {
        vec![self.sex.into()]
    }

    fn offset(&self) -> i64 {
        self.offset
    }

    fn limit(&self) -> i64 {
        self.limit
    }
}

fn score_bound<T: Copy>(bound: Bound<T>, to_score: fn(T) -> f64) -> Bound<f64> {
    match bound {
        Bound::Included(v) => Bound::Included(to_score(v)),
        Bound::Excluded(v) => Bound::Excluded(to_score(v)),
        Bound::Unbounded => Bound::Unbounded,
    }
}

// == Range: age ==
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgeOfUserRng {
    pub begin: Bound<i32>,
    pub end: Bound<i32>,
    pub offset: i64,
    pub limit: i64,
}

impl AgeOfUserRng {
    pub fn new(begin: Bound<i32>, end: Bound<i32>) -> Self {
        Self {
            begin,
            end,
            offset: 0,
            limit: -1,
        }
    }

    /// Half-open scope `[begin, end)`.
    pub fn between(begin: i32, end: i32) -> Self {
        Self::new(Bound::Included(begin), Bound::Excluded(end))
    }

    /// Open scope `(begin, end)`.
    pub fn open(begin: i32, end: i32) -> Self {
        Self::new(Bound::Excluded(begin), Bound::Excluded(end))
    }

    /// Every age.
    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

impl RangeScope for AgeOfUserRng {
    type Entity = User;

    const NAME: &'static str = "age";
    const COLUMN: &'static str = "age";

    fn begin(&self) -> Bound<f64> {
        score_bound(self.begin, f64::from)
    }

    fn end(&self) -> Bound<f64> {
        score_bound(self.end, f64::from)
    }

    fn offset(&self) -> i64 {
        self.offset
    }

    fn limit(&self) -> i64 {
        self.limit
    }
}

// == Range: id ==
/// PK-ordered scan. Ids beyond 2^53 lose ordering precision as scores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdOfUserRng {
    pub begin: Bound<i64>,
    pub end: Bound<i64>,
    pub offset: i64,
    pub limit: i64,
}

impl IdOfUserRng {
    pub fn new(begin: Bound<i64>, end: Bound<i64>) -> Self {
        Self {
            begin,
            end,
            offset: 0,
            limit: -1,
        }
    }

    pub fn all() -> Self {
        Self::new(Bound::Unbounded, Bound::Unbounded)
    }

    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

impl RangeScope for IdOfUserRng {
    type Entity = User;

    const NAME: &'static str = "id";
    const COLUMN: &'static str = "id";

    fn begin(&self) -> Bound<f64> {
        score_bound(self.begin, |v| v as f64)
    }

    fn end(&self) -> Bound<f64> {
        score_bound(self.end, |v| v as f64)
    }

    fn offset(&self) -> i64 {
        self.offset
    }

    fn limit(&self) -> i64 {
        self.limit
    }
}
