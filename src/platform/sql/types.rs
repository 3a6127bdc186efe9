//! Value and row types exchanged with SQL backends.

use rusqlite::types::ValueRef;

use crate::error::Error;

/// SQL value mirroring SQLite's storage classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<ValueRef<'_>> for Value {
    fn from(value_ref: ValueRef<'_>) -> Self {
        match value_ref {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(r) => Self::Real(r),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Self::Integer(i64::from(v))
    }
}

/// SQLite integers are signed; ids above `i64::MAX` cannot be stored or
/// matched and are rejected.
impl TryFrom<u64> for Value {
    type Error = Error;

    fn try_from(v: u64) -> Result<Self, Self::Error> {
        i64::try_from(v)
            .map(Self::Integer)
            .map_err(|_| Error::invalid(format!("id {v} is out of range")))
    }
}

/// Booleans follow SQLite's JSON convention of 1 and 0.
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl Value {
    /// Converts to a rusqlite Value for parameter binding.
    pub fn to_rusqlite(&self) -> rusqlite::types::Value {
        match self {
            Self::Null => rusqlite::types::Value::Null,
            Self::Integer(i) => rusqlite::types::Value::Integer(*i),
            Self::Real(r) => rusqlite::types::Value::Real(*r),
            Self::Text(s) => rusqlite::types::Value::Text(s.clone()),
            Self::Blob(b) => rusqlite::types::Value::Blob(b.clone()),
        }
    }

    /// Integer content, if any.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Text content, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A single row returned from a SQL query.
#[derive(Debug, Clone)]
pub struct Row {
    /// Column names in order
    pub columns: Vec<String>,
    /// Values in same order as columns
    pub values: Vec<Value>,
}

impl Row {
    /// Creates a new row with the given columns and values.
    ///
    /// # Panics
    ///
    /// Panics if `columns.len()` != `values.len()`.
    pub fn new(columns: Vec<String>, values: Vec<Value>) -> Self {
        assert_eq!(
            columns.len(),
            values.len(),
            "Column count ({}) must match value count ({})",
            columns.len(),
            values.len()
        );
        Self { columns, values }
    }

    /// Gets a value by column name, returning None if not found.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| self.values.get(idx))
    }

    /// Integer column, failing when absent or of another type.
    pub fn integer(&self, column: &str) -> anyhow::Result<i64> {
        self.get(column)
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow::anyhow!("column '{column}' is not an integer"))
    }

    /// Text column, failing when absent or of another type.
    pub fn text(&self, column: &str) -> anyhow::Result<&str> {
        self.get(column)
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow::anyhow!("column '{column}' is not text"))
    }

    /// Nullable text column.
    pub fn opt_text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }
}
