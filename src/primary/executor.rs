//! Primary-Store Connection Seam
//!
//! The relational driver is reached only through [`SqlExecutor`]. It is
//! implemented for rusqlite connections and transactions, so a manager can be
//! scoped to either.

use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode, Transaction};

use crate::error::{OrmError, Result, StoreKind};
use crate::orm::{SqlRow, SqlValue};

// == SQL Executor ==
/// Parameterized statement execution against the relational store.
pub trait SqlExecutor {
    /// Runs a statement, returning the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Runs a query, returning all rows.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>>;
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
            SqlValue::Blob(v) => ToSqlOutput::Borrowed(ValueRef::Blob(v.as_slice())),
        })
    }
}

impl From<ValueRef<'_>> for SqlValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => SqlValue::Null,
            ValueRef::Integer(v) => SqlValue::Integer(v),
            ValueRef::Real(v) => SqlValue::Real(v),
            ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
            ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
        }
    }
}

/// Maps a driver error: constraint failures are logical, the rest is I/O.
fn map_sqlite_error(operation: &'static str, err: rusqlite::Error) -> OrmError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        if failure.code == ErrorCode::ConstraintViolation {
            return OrmError::ConstraintViolation(err.to_string());
        }
    }
    OrmError::unavailable(StoreKind::Primary, operation, err)
}

impl SqlExecutor for Connection {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let affected = Connection::execute(self, sql, params_from_iter(params.iter()))
            .map_err(|e| map_sqlite_error("execute", e))?;
        Ok(affected as u64)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        let mut stmt = self
            .prepare(sql)
            .map_err(|e| map_sqlite_error("prepare", e))?;
        let columns = stmt.column_count();
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let mut values = Vec::with_capacity(columns);
                for idx in 0..columns {
                    values.push(SqlValue::from(row.get_ref(idx)?));
                }
                Ok(SqlRow::new(values))
            })
            .map_err(|e| map_sqlite_error("query", e))?;
        let collected: rusqlite::Result<Vec<SqlRow>> = rows.collect();
        collected.map_err(|e| map_sqlite_error("query", e))
    }
}

impl SqlExecutor for Transaction<'_> {
    fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        SqlExecutor::execute(&**self, sql, params)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Vec<SqlRow>> {
        SqlExecutor::query(&**self, sql, params)
    }
}
