//! Primary-Store Manager
//!
//! CRUD, paged lookups and pass-through search against the relational
//! system-of-record, for any [`Entity`].

use std::collections::HashMap;
use std::marker::PhantomData;
use std::ops::Bound;

use tracing::{debug, info};

use crate::error::{OrmError, Result};
use crate::orm::{
    check_bounds, check_window, Entity, IndexKey, PrimaryKey, RangeScope, SqlRow, SqlValue,
    UniqueKey,
};
use crate::primary::SqlExecutor;

/// Upper bound on keys per `IN`-style lookup statement.
const FETCH_CHUNK: usize = 500;

// == DB Manager ==
/// Entity operations scoped to one connection or transaction handle.
pub struct DbManager<'a, E, S: ?Sized> {
    conn: &'a S,
    _entity: PhantomData<fn() -> E>,
}

impl<'a, E, S> DbManager<'a, E, S>
where
    E: Entity,
    S: SqlExecutor + ?Sized,
{
    // == Constructor ==
    pub fn new(conn: &'a S) -> Self {
        Self {
            conn,
            _entity: PhantomData,
        }
    }

    // == SQL Fragments ==
    fn columns() -> String {
        E::COLUMNS.join(", ")
    }

    fn key_columns() -> String {
        E::PRIMARY_KEY.join(", ")
    }

    fn key_predicate() -> String {
        equality_predicate(E::PRIMARY_KEY)
    }

    fn key_order(direction: &str) -> String {
        E::PRIMARY_KEY
            .iter()
            .map(|col| format!("{} {}", col, direction))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn not_found(pk: &E::Key) -> OrmError {
        OrmError::NotFound(format!("{} {}", E::TABLE, pk.encode()))
    }

    fn decode_records(rows: &[SqlRow]) -> Result<Vec<E>> {
        rows.iter().map(E::from_row).collect()
    }

    fn decode_keys(rows: &[SqlRow]) -> Result<Vec<E::Key>> {
        rows.iter().map(E::Key::from_row).collect()
    }

    fn count_where(&self, predicate: &str, params: &[SqlValue]) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}{}", E::TABLE, clause("WHERE", predicate));
        let rows = self.conn.query(&sql, params)?;
        let count = match rows.first() {
            Some(row) => row.get_i64(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or(0))
    }

    // == Writes ==
    /// Inserts a new row.
    pub fn create(&self, record: &E) -> Result<u64> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            E::TABLE,
            Self::columns(),
            placeholders(E::COLUMNS.len())
        );
        let n = self.conn.execute(&sql, &record.to_params())?;
        debug!(entity = E::NAME, pk = %record.key_of().encode(), "primary create");
        Ok(n)
    }

    /// Rewrites every non-key column of an existing row.
    pub fn update(&self, record: &E) -> Result<u64> {
        let pk = record.key_of();
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (col, value) in E::COLUMNS.iter().zip(record.to_params()) {
            if !E::PRIMARY_KEY.contains(col) {
                assignments.push(format!("{} = ?", col));
                params.push(value);
            }
        }
        params.extend(pk.to_params());

        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            E::TABLE,
            assignments.join(", "),
            Self::key_predicate()
        );
        match self.conn.execute(&sql, &params)? {
            0 => Err(Self::not_found(&pk)),
            n => {
                debug!(entity = E::NAME, pk = %pk.encode(), "primary update");
                Ok(n)
            }
        }
    }

    /// Upsert: inserts the row, or rewrites it if the PK is taken.
    pub fn save(&self, record: &E) -> Result<u64> {
        let updates = E::COLUMNS
            .iter()
            .filter(|col| !E::PRIMARY_KEY.contains(*col))
            .map(|col| format!("{} = excluded.{}", col, col))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            E::TABLE,
            Self::columns(),
            placeholders(E::COLUMNS.len()),
            Self::key_columns(),
            updates
        );
        let n = self.conn.execute(&sql, &record.to_params())?;
        debug!(entity = E::NAME, pk = %record.key_of().encode(), "primary save");
        Ok(n)
    }

    /// Deletes the row holding the record's PK.
    pub fn delete(&self, record: &E) -> Result<u64> {
        let pk = record.key_of();
        let sql = format!("DELETE FROM {} WHERE {}", E::TABLE, Self::key_predicate());
        match self.conn.execute(&sql, &pk.to_params())? {
            0 => Err(Self::not_found(&pk)),
            n => {
                debug!(entity = E::NAME, pk = %pk.encode(), "primary delete");
                Ok(n)
            }
        }
    }

    /// Inserts all records in one statement; either every row lands or none.
    pub fn batch_create(&self, records: &[E]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let tuple = format!("({})", placeholders(E::COLUMNS.len()));
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            E::TABLE,
            Self::columns(),
            vec![tuple.as_str(); records.len()].join(", ")
        );
        let params: Vec<SqlValue> = records.iter().flat_map(Entity::to_params).collect();
        let n = self.conn.execute(&sql, &params)?;
        info!(entity = E::NAME, rows = n, "primary batch create");
        Ok(n)
    }

    /// Bulk delete. An empty clause deletes every row of the table.
    pub fn delete_by_sql(&self, where_clause: &str, params: &[SqlValue]) -> Result<u64> {
        let sql = format!("DELETE FROM {}{}", E::TABLE, clause("WHERE", where_clause));
        let n = self.conn.execute(&sql, params)?;
        info!(entity = E::NAME, rows = n, "primary delete by sql");
        Ok(n)
    }

    // == Point Reads ==
    pub fn fetch(&self, pk: &E::Key) -> Result<E> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            Self::columns(),
            E::TABLE,
            Self::key_predicate()
        );
        let rows = self.conn.query(&sql, &pk.to_params())?;
        match rows.first() {
            Some(row) => E::from_row(row),
            None => Err(Self::not_found(pk)),
        }
    }

    pub fn exist(&self, pk: &E::Key) -> Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE {} LIMIT 1", E::TABLE, Self::key_predicate());
        Ok(!self.conn.query(&sql, &pk.to_params())?.is_empty())
    }

    /// Records for the given keys, in input order. Missing keys are skipped.
    pub fn fetch_by_primary_keys(&self, pks: &[E::Key]) -> Result<Vec<E>> {
        let mut found: HashMap<String, E> = HashMap::with_capacity(pks.len());
        for chunk in pks.chunks(FETCH_CHUNK) {
            let predicate = vec![format!("({})", Self::key_predicate()); chunk.len()].join(" OR ");
            let sql = format!("SELECT {} FROM {} WHERE {}", Self::columns(), E::TABLE, predicate);
            let params: Vec<SqlValue> = chunk.iter().flat_map(PrimaryKey::to_params).collect();
            for record in Self::decode_records(&self.conn.query(&sql, &params)?)? {
                found.insert(record.key_of().encode(), record);
            }
        }
        Ok(pks.iter().filter_map(|pk| found.remove(&pk.encode())).collect())
    }

    /// One page of records in PK order.
    pub fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<E>> {
        let sql = format!(
            "SELECT {} FROM {} ORDER BY {} LIMIT ? OFFSET ?",
            Self::columns(),
            E::TABLE,
            Self::key_order("ASC")
        );
        let params = [
            SqlValue::Integer(i64::try_from(limit).unwrap_or(i64::MAX)),
            SqlValue::Integer(i64::try_from(offset).unwrap_or(i64::MAX)),
        ];
        Self::decode_records(&self.conn.query(&sql, &params)?)
    }

    /// Total number of rows.
    pub fn count(&self) -> Result<u64> {
        self.count_where("", &[])
    }

    // == Finders ==
    /// Keys sharing an equality-index value, with the total match count.
    pub fn find<I>(&self, idx: &I) -> Result<(u64, Vec<E::Key>)>
    where
        I: IndexKey<Entity = E>,
    {
        check_window(idx.offset(), idx.limit())?;
        let predicate = equality_predicate(I::COLUMNS);
        let total = self.count_where(&predicate, &idx.to_params())?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            Self::key_columns(),
            E::TABLE,
            predicate,
            Self::key_order("ASC")
        );
        let mut params = idx.to_params();
        params.push(SqlValue::Integer(idx.limit()));
        params.push(SqlValue::Integer(idx.offset()));
        let keys = Self::decode_keys(&self.conn.query(&sql, &params)?)?;
        Ok((total, keys))
    }

    /// The key holding a unique-key value.
    pub fn find_one<U>(&self, uk: &U) -> Result<E::Key>
    where
        U: UniqueKey<Entity = E>,
    {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            Self::key_columns(),
            E::TABLE,
            equality_predicate(U::COLUMNS)
        );
        let rows = self.conn.query(&sql, &uk.to_params())?;
        match rows.first() {
            Some(row) => E::Key::from_row(row),
            None => Err(OrmError::NotFound(format!(
                "{} {} {}",
                E::TABLE,
                U::NAME,
                uk.encode()
            ))),
        }
    }

    fn range_ordered<R>(&self, scope: &R, direction: &str) -> Result<(u64, Vec<E::Key>)>
    where
        R: RangeScope<Entity = E>,
    {
        check_bounds(scope.begin(), scope.end())?;
        check_window(scope.offset(), scope.limit())?;
        let (predicate, mut params) = range_predicate(R::COLUMN, scope.begin(), scope.end());
        let total = self.count_where(&predicate, &params)?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} ORDER BY {} {}, {} LIMIT ? OFFSET ?",
            Self::key_columns(),
            E::TABLE,
            predicate,
            R::COLUMN,
            direction,
            Self::key_order(direction)
        );
        params.push(SqlValue::Integer(scope.limit()));
        params.push(SqlValue::Integer(scope.offset()));
        let keys = Self::decode_keys(&self.conn.query(&sql, &params)?)?;
        Ok((total, keys))
    }

    /// Keys within the scope, ascending by the range column.
    pub fn range<R>(&self, scope: &R) -> Result<(u64, Vec<E::Key>)>
    where
        R: RangeScope<Entity = E>,
    {
        self.range_ordered(scope, "ASC")
    }

    /// Keys within the scope, descending by the range column.
    pub fn range_revert<R>(&self, scope: &R) -> Result<(u64, Vec<E::Key>)>
    where
        R: RangeScope<Entity = E>,
    {
        self.range_ordered(scope, "DESC")
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

    // == Search ==
    /// Pass-through query. Clauses may omit their leading keyword.
    pub fn search(
        &self,
        where_clause: &str,
        order_clause: &str,
        group_clause: &str,
        params: &[SqlValue],
    ) -> Result<Vec<E>> {
        let sql = format!(
            "SELECT {} FROM {}{}{}{}",
            Self::columns(),
            E::TABLE,
            clause("WHERE", where_clause),
            clause("GROUP BY", group_clause),
            clause("ORDER BY", order_clause)
        );
        Self::decode_records(&self.conn.query(&sql, params)?)
    }

    /// Conditions are ANDed together; `limit == -1` means no limit.
    pub fn search_conditions(
        &self,
        conditions: &[&str],
        order_clause: &str,
        offset: i64,
        limit: i64,
        params: &[SqlValue],
    ) -> Result<Vec<E>> {
        check_window(offset, limit)?;
        let sql = format!(
            "SELECT {} FROM {}{}{} LIMIT ? OFFSET ?",
            Self::columns(),
            E::TABLE,
            clause("WHERE", &conditions.join(" AND ")),
            clause("ORDER BY", order_clause)
        );
        let mut params = params.to_vec();
        params.push(SqlValue::Integer(limit));
        params.push(SqlValue::Integer(offset));
        Self::decode_records(&self.conn.query(&sql, &params)?)
    }

    pub fn search_count(&self, where_clause: &str, params: &[SqlValue]) -> Result<u64> {
        self.count_where(where_clause, params)
    }
}

// == Helpers ==
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn equality_predicate(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|col| format!("{} = ?", col))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn range_predicate(column: &str, begin: Bound<f64>, end: Bound<f64>) -> (String, Vec<SqlValue>) {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    match begin {
        Bound::Included(v) => {
            parts.push(format!("{} >= ?", column));
            params.push(SqlValue::Real(v));
        }
        Bound::Excluded(v) => {
            parts.push(format!("{} > ?", column));
            params.push(SqlValue::Real(v));
        }
        Bound::Unbounded => {}
    }
    match end {
        Bound::Included(v) => {
            parts.push(format!("{} <= ?", column));
            params.push(SqlValue::Real(v));
        }
        Bound::Excluded(v) => {
            parts.push(format!("{} < ?", column));
            params.push(SqlValue::Real(v));
        }
        Bound::Unbounded => {}
    }
    if parts.is_empty() {
        parts.push("1 = 1".to_string());
    }
    (parts.join(" AND "), params)
}

/// Prefixes a clause with its keyword unless the caller already did.
fn clause(keyword: &str, fragment: &str) -> String {
    let trimmed = fragment.trim();
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.to_ascii_uppercase().starts_with(keyword) {
        format!(" {}", trimmed)
    } else {
        format!(" {} {}", keyword, trimmed)
    }
}
