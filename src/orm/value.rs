//! SQL Values and Rows
//!
//! Typed parameters handed to the primary store and the rows it returns.

use chrono::{DateTime, Utc};

use crate::error::{OrmError, Result};

// == SQL Value ==
/// A single parameter or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Integer(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Text(v.to_rfc3339())
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

// == SQL Row ==
/// One row of a query result, columns in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlRow {
    values: Vec<SqlValue>,
}

impl SqlRow {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, idx: usize) -> Result<&SqlValue> {
        self.values
            .get(idx)
            .ok_or_else(|| OrmError::Decode(format!("column {} out of range", idx)))
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64> {
        match self.get(idx)? {
            SqlValue::Integer(v) => Ok(*v),
            other => Err(mismatch(idx, "integer", other)),
        }
    }

    pub fn get_i32(&self, idx: usize) -> Result<i32> {
        let v = self.get_i64(idx)?;
        i32::try_from(v).map_err(|_| OrmError::Decode(format!("column {} overflows i32: {}", idx, v)))
    }

    pub fn get_bool(&self, idx: usize) -> Result<bool> {
        Ok(self.get_i64(idx)? != 0)
    }

    /// Reads a float, accepting integers stored in REAL-affinity columns.
    pub fn get_f64(&self, idx: usize) -> Result<f64> {
        match self.get(idx)? {
            SqlValue::Real(v) => Ok(*v),
            SqlValue::Integer(v) => Ok(*v as f64),
            other => Err(mismatch(idx, "real", other)),
        }
    }

    pub fn get_string(&self, idx: usize) -> Result<String> {
        match self.get(idx)? {
            SqlValue::Text(v) => Ok(v.clone()),
            other => Err(mismatch(idx, "text", other)),
        }
    }

    pub fn get_datetime(&self, idx: usize) -> Result<DateTime<Utc>> {
        let raw = self.get_string(idx)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| OrmError::Decode(format!("column {}: {}", idx, e)))
    }
}

fn mismatch(idx: usize, expected: &str, found: &SqlValue) -> OrmError {
    OrmError::Decode(format!("column {}: expected {}, found {:?}", idx, expected, found))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let now = Utc::now();
        let row = SqlRow::new(vec![
            SqlValue::from(7_i64),
            SqlValue::from(true),
            SqlValue::from(1.5),
            SqlValue::from("name7"),
            SqlValue::from(now),
        ]);

        assert_eq!(row.get_i64(0).unwrap(), 7);
        assert!(row.get_bool(1).unwrap());
        assert_eq!(row.get_f64(2).unwrap(), 1.5);
        assert_eq!(row.get_f64(0).unwrap(), 7.0);
        assert_eq!(row.get_string(3).unwrap(), "name7");
        assert_eq!(row.get_datetime(4).unwrap(), now);
    }

    #[test]
    fn test_type_mismatch_is_decode_error() {
        let row = SqlRow::new(vec![SqlValue::Null]);
        assert!(matches!(row.get_string(0), Err(OrmError::Decode(_))));
        assert!(matches!(row.get_i64(3), Err(OrmError::Decode(_))));
    }

    #[test]
    fn test_option_into_null() {
        let none: Option<i64> = None;
        assert_eq!(SqlValue::from(none), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3_i32)), SqlValue::Integer(3));
    }
}
