//! Live schema introspection.
//!
//! [`snapshot`] reads the catalog for one schema into a [`SchemaSnapshot`].
//! All identifiers are lowercased on the way in so they compare equal to
//! normalized declared names. Any catalog failure aborts the snapshot;
//! there are no partial snapshots.

use std::collections::BTreeSet;

use accord_schema::{LiveType, LogicalType, SqlTypeDescriptor, from_sql_type};
use indexmap::IndexMap;

use crate::connection::Connection;
use crate::error::{DbError, Error};
use crate::Value;

/// A column as it exists in the database.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveColumn {
    pub name: String,
    pub ty: LiveType,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<String>,
    /// `GENERATED ... AS IDENTITY`
    pub identity: bool,
    pub comment: Option<String>,
}

/// A table as it exists in the database.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LiveTable {
    pub name: String,
    pub comment: Option<String>,
    /// Columns in ordinal order.
    pub columns: IndexMap<String, LiveColumn>,
    pub indexes: BTreeSet<String>,
}

impl LiveTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&LiveColumn> {
        self.columns.get(name)
    }

    /// Primary key column names, in ordinal order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .values()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// The live state of one schema, taken at a point in time.
///
/// Snapshots are never patched after the fact; a new pass takes a new one.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaSnapshot {
    pub schema: String,
    pub schema_exists: bool,
    pub tables: IndexMap<String, LiveTable>,
}

impl SchemaSnapshot {
    /// A snapshot of a schema that does not exist yet.
    pub fn empty(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            schema_exists: false,
            tables: IndexMap::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&LiveTable> {
        self.tables.get(name)
    }

    /// The table owning index `name`. Index names are unique per schema.
    pub fn index_owner(&self, name: &str) -> Option<&str> {
        self.tables
            .values()
            .find(|t| t.indexes.contains(name))
            .map(|t| t.name.as_str())
    }
}

/// One row of the table catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogTable {
    pub name: String,
    pub comment: Option<String>,
}

/// One row of the column catalog query.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogColumn {
    pub table: String,
    pub name: String,
    pub ty: SqlTypeDescriptor,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
    pub identity: bool,
    pub comment: Option<String>,
}

const SCHEMA_EXISTS_SQL: &str = "SELECT EXISTS (
    SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname::text = $1
)";

const TABLES_SQL: &str = "SELECT
    t.table_name::text,
    obj_description(format('%I.%I', t.table_schema, t.table_name)::regclass, 'pg_class')
FROM information_schema.tables t
WHERE t.table_schema::text = $1 AND t.table_type = 'BASE TABLE'
ORDER BY t.table_name";

const COLUMNS_SQL: &str = "SELECT
    c.table_name::text,
    c.column_name::text,
    c.data_type::text,
    c.udt_name::text,
    c.character_maximum_length::int4,
    c.numeric_precision::int4,
    c.numeric_scale::int4,
    c.is_nullable = 'YES',
    c.column_default::text,
    EXISTS (
        SELECT 1
        FROM pg_catalog.pg_constraint con
        JOIN pg_catalog.pg_class rel ON rel.oid = con.conrelid
        JOIN pg_catalog.pg_namespace nsp ON nsp.oid = rel.relnamespace
        JOIN pg_catalog.pg_attribute att
          ON att.attrelid = con.conrelid AND att.attnum = ANY(con.conkey)
        WHERE con.contype = 'p'
          AND nsp.nspname::text = c.table_schema::text
          AND rel.relname::text = c.table_name::text
          AND att.attname::text = c.column_name::text
    ),
    c.is_identity = 'YES',
    col_description(
        format('%I.%I', c.table_schema, c.table_name)::regclass,
        c.ordinal_position::int4
    )
FROM information_schema.columns c
WHERE c.table_schema::text = $1
ORDER BY c.table_name, c.ordinal_position";

const COLUMN_TYPES: [LogicalType; 12] = [
    LogicalType::Text,
    LogicalType::Text,
    LogicalType::Text,
    LogicalType::Text,
    LogicalType::Integer,
    LogicalType::Integer,
    LogicalType::Integer,
    LogicalType::Boolean,
    LogicalType::Text,
    LogicalType::Boolean,
    LogicalType::Boolean,
    LogicalType::Text,
];

const INDEXES_SQL: &str = "SELECT tablename::text, indexname::text
FROM pg_catalog.pg_indexes
WHERE schemaname::text = $1";

/// Read the live state of `schema`.
pub async fn snapshot<C: Connection + ?Sized>(conn: &C, schema: &str) -> Result<SchemaSnapshot, Error> {
    read_catalog(conn, schema)
        .await
        .map_err(|source| Error::Introspection {
            schema: schema.to_string(),
            source,
        })
}

async fn read_catalog<C: Connection + ?Sized>(conn: &C, schema: &str) -> Result<SchemaSnapshot, DbError> {
    let params = [Value::from(schema)];

    let exists = conn
        .query(SCHEMA_EXISTS_SQL, &params, &[LogicalType::Boolean])
        .await?;
    let schema_exists = matches!(
        exists.first().and_then(|row| row.first()),
        Some(Value::Bool(true))
    );
    if !schema_exists {
        return Ok(SchemaSnapshot::empty(schema));
    }

    let tables = conn
        .query(TABLES_SQL, &params, &[LogicalType::Text, LogicalType::Text])
        .await?
        .iter()
        .map(|row| {
            Ok(CatalogTable {
                name: text_at(row, 0, "table_name")?,
                comment: opt_text_at(row, 1),
            })
        })
        .collect::<Result<Vec<_>, DbError>>()?;

    let columns = conn
        .query(COLUMNS_SQL, &params, &COLUMN_TYPES)
        .await?
        .iter()
        .map(|row| catalog_column(row))
        .collect::<Result<Vec<_>, _>>()?;

    let indexes = conn
        .query(INDEXES_SQL, &params, &[LogicalType::Text, LogicalType::Text])
        .await?
        .iter()
        .map(|row| Ok((text_at(row, 0, "tablename")?, text_at(row, 1, "indexname")?)))
        .collect::<Result<Vec<_>, DbError>>()?;

    let snapshot = assemble(schema, tables, columns, indexes);
    tracing::debug!(
        schema,
        tables = snapshot.tables.len(),
        "introspected live schema"
    );
    Ok(snapshot)
}

fn text_at(row: &[Value], idx: usize, column: &str) -> Result<String, DbError> {
    match row.get(idx) {
        Some(Value::String(s)) => Ok(s.clone()),
        other => Err(DbError::Decode {
            column: column.to_string(),
            message: format!("expected text, got {other:?}"),
        }),
    }
}

fn opt_text_at(row: &[Value], idx: usize) -> Option<String> {
    match row.get(idx) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn opt_int_at(row: &[Value], idx: usize) -> Option<i32> {
    match row.get(idx) {
        Some(Value::I32(v)) => Some(*v),
        _ => None,
    }
}

fn bool_at(row: &[Value], idx: usize) -> bool {
    matches!(row.get(idx), Some(Value::Bool(true)))
}

fn catalog_column(row: &[Value]) -> Result<CatalogColumn, DbError> {
    Ok(CatalogColumn {
        table: text_at(row, 0, "table_name")?,
        name: text_at(row, 1, "column_name")?,
        ty: SqlTypeDescriptor {
            data_type: text_at(row, 2, "data_type")?,
            udt_name: opt_text_at(row, 3).unwrap_or_default(),
            character_maximum_length: opt_int_at(row, 4),
            numeric_precision: opt_int_at(row, 5),
            numeric_scale: opt_int_at(row, 6),
        },
        nullable: bool_at(row, 7),
        default: opt_text_at(row, 8),
        primary_key: bool_at(row, 9),
        identity: bool_at(row, 10),
        comment: opt_text_at(row, 11),
    })
}

/// Build a snapshot from raw catalog rows.
///
/// Columns and indexes of relations not listed in `tables` (views, for
/// instance) are ignored.
pub fn assemble(
    schema: &str,
    tables: Vec<CatalogTable>,
    columns: Vec<CatalogColumn>,
    indexes: Vec<(String, String)>,
) -> SchemaSnapshot {
    let mut snapshot = SchemaSnapshot {
        schema: schema.to_string(),
        schema_exists: true,
        tables: IndexMap::with_capacity(tables.len()),
    };

    for table in tables {
        let name = table.name.to_ascii_lowercase();
        let mut live = LiveTable::new(name.clone());
        live.comment = table.comment;
        snapshot.tables.insert(name, live);
    }

    for col in columns {
        let Some(table) = snapshot.tables.get_mut(&col.table.to_ascii_lowercase()) else {
            continue;
        };
        let name = col.name.to_ascii_lowercase();
        table.columns.insert(
            name.clone(),
            LiveColumn {
                name,
                ty: from_sql_type(&col.ty),
                nullable: col.nullable,
                primary_key: col.primary_key,
                default: col.default,
                identity: col.identity,
                comment: col.comment,
            },
        );
    }

    for (table, index) in indexes {
        if let Some(table) = snapshot.tables.get_mut(&table.to_ascii_lowercase()) {
            table.indexes.insert(index.to_ascii_lowercase());
        }
    }

    snapshot
}
