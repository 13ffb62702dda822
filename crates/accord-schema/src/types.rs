//! Logical column types and their Postgres mapping.

use std::fmt;

/// A vendor-agnostic column type, as declared in a [`crate::TableDef`].
///
/// `Display` yields the Postgres type used in DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// TEXT
    Text,
    /// VARCHAR(n)
    Varchar(u32),
    /// SMALLINT (2 bytes)
    SmallInt,
    /// INTEGER (4 bytes)
    Integer,
    /// BIGINT (8 bytes)
    BigInt,
    /// NUMERIC(precision, scale)
    Decimal { precision: u32, scale: u32 },
    /// DOUBLE PRECISION (8 bytes floating point)
    Double,
    /// BOOLEAN
    Boolean,
    /// DATE
    Date,
    /// TIMESTAMPTZ
    Timestamp,
    /// UUID
    Uuid,
    /// JSONB
    Json,
    /// BYTEA (binary)
    Binary,
    /// TEXT[] (array of text)
    TextArray,
}

impl LogicalType {
    /// Short lowercase name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalType::Text => "text",
            LogicalType::Varchar(_) => "varchar",
            LogicalType::SmallInt => "smallint",
            LogicalType::Integer => "integer",
            LogicalType::BigInt => "bigint",
            LogicalType::Decimal { .. } => "decimal",
            LogicalType::Double => "double",
            LogicalType::Boolean => "boolean",
            LogicalType::Date => "date",
            LogicalType::Timestamp => "timestamp",
            LogicalType::Uuid => "uuid",
            LogicalType::Json => "json",
            LogicalType::Binary => "binary",
            LogicalType::TextArray => "text[]",
        }
    }

    /// Whether a live column of type `live` satisfies a declaration of `self`.
    ///
    /// Foreign types always satisfy; the reconciler reports them as warnings.
    pub fn is_satisfied_by(&self, live: &LiveType) -> bool {
        match live {
            LiveType::Known(t) => t == self,
            LiveType::Foreign(_) => true,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Text => write!(f, "TEXT"),
            LogicalType::Varchar(len) => write!(f, "VARCHAR({len})"),
            LogicalType::SmallInt => write!(f, "SMALLINT"),
            LogicalType::Integer => write!(f, "INTEGER"),
            LogicalType::BigInt => write!(f, "BIGINT"),
            LogicalType::Decimal { precision, scale } => {
                write!(f, "NUMERIC({precision},{scale})")
            }
            LogicalType::Double => write!(f, "DOUBLE PRECISION"),
            LogicalType::Boolean => write!(f, "BOOLEAN"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Timestamp => write!(f, "TIMESTAMPTZ"),
            LogicalType::Uuid => write!(f, "UUID"),
            LogicalType::Json => write!(f, "JSONB"),
            LogicalType::Binary => write!(f, "BYTEA"),
            LogicalType::TextArray => write!(f, "TEXT[]"),
        }
    }
}

/// The type of a column as found in the live catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiveType {
    /// Maps cleanly onto a logical type.
    Known(LogicalType),
    /// Anything we do not model. Kept opaque and never altered.
    Foreign(String),
}

impl LiveType {
    pub fn known(&self) -> Option<LogicalType> {
        match self {
            LiveType::Known(t) => Some(*t),
            LiveType::Foreign(_) => None,
        }
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self, LiveType::Foreign(_))
    }
}

impl From<LogicalType> for LiveType {
    fn from(t: LogicalType) -> Self {
        LiveType::Known(t)
    }
}

impl fmt::Display for LiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiveType::Known(t) => write!(f, "{t}"),
            LiveType::Foreign(name) => write!(f, "{name}"),
        }
    }
}

/// A column type descriptor as reported by `information_schema.columns`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlTypeDescriptor {
    /// `data_type`, e.g. `character varying`, `ARRAY`, `USER-DEFINED`.
    pub data_type: String,
    /// `udt_name`, e.g. `varchar`, `_text`, `citext`.
    pub udt_name: String,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

impl SqlTypeDescriptor {
    pub fn new(data_type: impl Into<String>, udt_name: impl Into<String>) -> Self {
        Self {
            data_type: data_type.into(),
            udt_name: udt_name.into(),
            ..Default::default()
        }
    }
}

/// Map a catalog type descriptor back to a logical type.
///
/// Anything unrecognized, or recognized but not representable (e.g. an
/// unconstrained NUMERIC), comes back as [`LiveType::Foreign`] named by its
/// udt name.
pub fn from_sql_type(desc: &SqlTypeDescriptor) -> LiveType {
    let data_type = desc.data_type.to_ascii_lowercase();
    let udt = desc.udt_name.to_ascii_lowercase();

    let known = match data_type.as_str() {
        "text" => Some(LogicalType::Text),
        "character varying" => Some(match desc.character_maximum_length {
            Some(len) if len > 0 => LogicalType::Varchar(len as u32),
            _ => LogicalType::Text,
        }),
        "smallint" => Some(LogicalType::SmallInt),
        "integer" => Some(LogicalType::Integer),
        "bigint" => Some(LogicalType::BigInt),
        "numeric" => match (desc.numeric_precision, desc.numeric_scale) {
            (Some(p), Some(s)) if p > 0 && s >= 0 => Some(LogicalType::Decimal {
                precision: p as u32,
                scale: s as u32,
            }),
            _ => None,
        },
        "double precision" => Some(LogicalType::Double),
        "boolean" => Some(LogicalType::Boolean),
        "date" => Some(LogicalType::Date),
        "timestamp with time zone" => Some(LogicalType::Timestamp),
        "uuid" => Some(LogicalType::Uuid),
        "json" | "jsonb" => Some(LogicalType::Json),
        "bytea" => Some(LogicalType::Binary),
        "array" if udt == "_text" => Some(LogicalType::TextArray),
        _ => None,
    };

    match known {
        Some(t) => LiveType::Known(t),
        None if udt.is_empty() => LiveType::Foreign(data_type),
        None => LiveType::Foreign(udt),
    }
}
