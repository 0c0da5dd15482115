// src/storage/row.rs

//! Row data model shared by all storage backends.
//!
//! A [`DataRow`] is the unit that row annotations operate on: a stable
//! identity plus the values of the input columns a component happened to
//! reference. Values are restricted to a small closed set so that the
//! SQL-backed provider can map them onto real columns.

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::ToSql;

/// Identity of a processed row. Annotation idempotence is keyed on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub i64);

/// A single cell value.
///
/// `Real` is compared bitwise so that `Value` can be a `HashMap` key in
/// `get_value_counts`. NaN-aware ordering is not needed here; values come
/// from upstream connectors that never produce NaN.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Real(a), Value::Real(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Int(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Real(r) => {
                3u8.hash(state);
                r.to_bits().hash(state);
            }
            Value::Text(s) => {
                4u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "<null>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Value::Null => Ok(ToSqlOutput::from(rusqlite::types::Null)),
            Value::Bool(b) => Ok(ToSqlOutput::from(*b)),
            Value::Int(i) => Ok(ToSqlOutput::from(*i)),
            Value::Real(r) => Ok(ToSqlOutput::from(*r)),
            Value::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
        }
    }
}

impl Value {
    /// Convert a raw SQLite cell back into a [`Value`].
    pub fn from_sql_ref(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Int(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(b) | ValueRef::Blob(b) => {
                Value::Text(String::from_utf8_lossy(b).into_owned())
            }
        }
    }
}

/// A processed row: identity plus referenced input-column values.
#[derive(Debug, Clone, PartialEq)]
pub struct DataRow {
    id: RowId,
    values: BTreeMap<String, Value>,
}

impl DataRow {
    pub fn new(id: RowId) -> Self {
        Self {
            id,
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, column: impl Into<String>, value: Value) -> Self {
        self.values.insert(column.into(), value);
        self
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Referenced columns in deterministic (sorted) order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
