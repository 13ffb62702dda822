//! Runtime values for query parameters and row data.

use accord_schema::LogicalType;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

/// A runtime SQL value.
///
/// Used for query parameters and row data. Maps to Postgres types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL
    Null,

    /// Boolean
    Bool(bool),

    /// 16-bit signed integer (SMALLINT)
    I16(i16),

    /// 32-bit signed integer (INTEGER)
    I32(i32),

    /// 64-bit signed integer (BIGINT)
    I64(i64),

    /// 64-bit float (DOUBLE PRECISION)
    F64(f64),

    /// Decimal (NUMERIC)
    Decimal(Decimal),

    /// Text (TEXT, VARCHAR)
    String(String),

    /// Binary data (BYTEA)
    Bytes(Vec<u8>),

    /// JSON/JSONB data, kept as its JSON text
    Json(String),

    /// UUID
    Uuid(Uuid),

    /// TIMESTAMPTZ
    Timestamp(DateTime<Utc>),

    /// DATE
    Date(NaiveDate),

    /// TEXT[]
    TextArray(Vec<String>),
}

impl Value {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// A JSON value from its text form.
    pub fn json(text: impl Into<String>) -> Self {
        Value::Json(text.into())
    }

    /// Name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::F64(_) => "f64",
            Value::Decimal(_) => "decimal",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
            Value::Timestamp(_) => "timestamp",
            Value::Date(_) => "date",
            Value::TextArray(_) => "text[]",
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert into the canonical variant for a column of type `ty`.
    ///
    /// NULL fits every type. Integers convert between widths when the value
    /// is in range, and into DECIMAL and DOUBLE PRECISION columns. Returns
    /// `None` when the value cannot be stored in such a column.
    pub fn coerce(self, ty: &LogicalType) -> Option<Value> {
        if self.is_null() {
            return Some(Value::Null);
        }
        match ty {
            LogicalType::SmallInt => self.as_i64()?.try_into().ok().map(Value::I16),
            LogicalType::Integer => self.as_i64()?.try_into().ok().map(Value::I32),
            LogicalType::BigInt => self.as_i64().map(Value::I64),
            LogicalType::Decimal { .. } => match self {
                Value::Decimal(d) => Some(Value::Decimal(d)),
                other => other.as_i64().map(|v| Value::Decimal(Decimal::from(v))),
            },
            LogicalType::Double => match self {
                Value::F64(v) => Some(Value::F64(v)),
                Value::I16(v) => Some(Value::F64(v as f64)),
                Value::I32(v) => Some(Value::F64(v as f64)),
                _ => None,
            },
            LogicalType::Text | LogicalType::Varchar(_) => match self {
                Value::String(s) => Some(Value::String(s)),
                _ => None,
            },
            LogicalType::Boolean => match self {
                Value::Bool(b) => Some(Value::Bool(b)),
                _ => None,
            },
            LogicalType::Date => match self {
                Value::Date(d) => Some(Value::Date(d)),
                _ => None,
            },
            LogicalType::Timestamp => match self {
                Value::Timestamp(t) => Some(Value::Timestamp(t)),
                _ => None,
            },
            LogicalType::Uuid => match self {
                Value::Uuid(u) => Some(Value::Uuid(u)),
                _ => None,
            },
            LogicalType::Json => match self {
                Value::Json(j) => Some(Value::Json(j)),
                _ => None,
            },
            LogicalType::Binary => match self {
                Value::Bytes(b) => Some(Value::Bytes(b)),
                _ => None,
            },
            LogicalType::TextArray => match self {
                Value::TextArray(v) => Some(Value::TextArray(v)),
                _ => None,
            },
        }
    }
}

// Convenient From impls
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Value::TextArray(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}
