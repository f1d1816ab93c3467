//! Column data types, runtime values and index keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{Result, TallyError};

/// Declared type of a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Boolean = 1,
    Integer = 10,
    Double = 30,
    String = 50,
    DateTime = 70,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Integer => "INTEGER",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::DateTime => "DATETIME",
        };
        write!(f, "{}", name)
    }
}

/// A single column value as carried by a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl Value {
    /// Returns the data type of this value, or None for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Double(_) => Some(DataType::Double),
            Value::String(_) => Some(DataType::String),
            Value::DateTime(_) => Some(DataType::DateTime),
        }
    }

    /// Returns true if this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns true if this value may be stored in a column of `data_type`.
    ///
    /// `Null` never matches; nullability is checked by the schema.
    pub fn matches(&self, data_type: DataType) -> bool {
        match (data_type, self) {
            (DataType::Boolean, Value::Boolean(_))
            | (DataType::Integer, Value::Integer(_))
            | (DataType::Double, Value::Double(_))
            | (DataType::String, Value::String(_))
            | (DataType::DateTime, Value::DateTime(_)) => true,
            (
                DataType::Boolean
                | DataType::Integer
                | DataType::Double
                | DataType::String
                | DataType::DateTime,
                _,
            ) => false,
        }
    }

    /// Name of the value's type for diagnostics.
    pub fn type_name(&self) -> String {
        match self.data_type() {
            Some(data_type) => data_type.to_string(),
            None => "NULL".to_string(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Totally ordered projection of a non-null [`Value`], used as a B+ tree key.
///
/// Keys of different types order by type first (BOOLEAN < INTEGER < DOUBLE <
/// STRING < DATETIME). Doubles use IEEE 754 total ordering, so `-0.0 < 0.0`
/// and NaN sorts after every other double.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexKey {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

impl IndexKey {
    /// Returns the data type of this key.
    pub fn data_type(&self) -> DataType {
        match self {
            IndexKey::Boolean(_) => DataType::Boolean,
            IndexKey::Integer(_) => DataType::Integer,
            IndexKey::Double(_) => DataType::Double,
            IndexKey::String(_) => DataType::String,
            IndexKey::DateTime(_) => DataType::DateTime,
        }
    }

    fn type_rank(&self) -> u8 {
        self.data_type() as u8
    }
}

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (IndexKey::Boolean(a), IndexKey::Boolean(b)) => a.cmp(b),
            (IndexKey::Integer(a), IndexKey::Integer(b)) => a.cmp(b),
            (IndexKey::Double(a), IndexKey::Double(b)) => a.total_cmp(b),
            (IndexKey::String(a), IndexKey::String(b)) => a.cmp(b),
            (IndexKey::DateTime(a), IndexKey::DateTime(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl TryFrom<&Value> for IndexKey {
    type Error = TallyError;

    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Err(TallyError::MissingArgument("non-null index key")),
            Value::Boolean(v) => Ok(IndexKey::Boolean(*v)),
            Value::Integer(v) => Ok(IndexKey::Integer(*v)),
            Value::Double(v) => Ok(IndexKey::Double(*v)),
            Value::String(v) => Ok(IndexKey::String(v.clone())),
            Value::DateTime(v) => Ok(IndexKey::DateTime(*v)),
        }
    }
}

impl From<IndexKey> for Value {
    fn from(key: IndexKey) -> Self {
        match key {
            IndexKey::Boolean(v) => Value::Boolean(v),
            IndexKey::Integer(v) => Value::Integer(v),
            IndexKey::Double(v) => Value::Double(v),
            IndexKey::String(v) => Value::String(v),
            IndexKey::DateTime(v) => Value::DateTime(v),
        }
    }
}

impl From<i64> for IndexKey {
    fn from(v: i64) -> Self {
        IndexKey::Integer(v)
    }
}

impl From<&str> for IndexKey {
    fn from(v: &str) -> Self {
        IndexKey::String(v.to_string())
    }
}

impl std::fmt::Display for IndexKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKey::Boolean(v) => write!(f, "{}", v),
            IndexKey::Integer(v) => write!(f, "{}", v),
            IndexKey::Double(v) => write!(f, "{}", v),
            IndexKey::String(v) => write!(f, "{:?}", v),
            IndexKey::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
        }
    }
}
