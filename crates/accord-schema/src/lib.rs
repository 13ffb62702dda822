//! Declared schema model for accord.
//!
//! Tables are declared in code with [`TableDef::builder`]. Everything is
//! validated when the table is built: identifiers are normalized to
//! lowercase and checked against `[a-z_][a-z0-9_]*`, column names must be
//! unique, and a primary key must exist. A built [`TableDef`] is immutable.
//!
//! ```
//! use accord_schema::{ColumnDef, IndexDef, LogicalType, TableDef};
//!
//! let users = TableDef::builder("Users")
//!     .column(ColumnDef::new("id", LogicalType::BigInt).primary_key())
//!     .column(ColumnDef::new("email", LogicalType::Text).not_null())
//!     .index(IndexDef::on(["email"]).unique())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(users.name(), "users");
//! assert_eq!(users.indexes()[0].name(), "uq_users_email");
//! ```

use accord_sql::{
    ColumnSpec, CreateIndexStmt, CreateTableStmt, PG_IDENT_MAX, TableRef, index_name,
    unique_index_name,
};
use indexmap::IndexMap;

mod types;
pub use types::*;

/// Errors raised while declaring a schema.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid identifier {name:?}: {reason}")]
    InvalidIdentifier { name: String, reason: &'static str },

    #[error("table {table}: duplicate column {column}")]
    DuplicateColumn { table: String, column: String },

    #[error("table {table}: no primary key declared")]
    MissingPrimaryKey { table: String },

    #[error("column {column}: {reason}")]
    InvalidType { column: String, reason: String },

    #[error("column {column}: identity columns must be smallint, integer or bigint without a default")]
    InvalidIdentity { column: String },

    #[error("table {table}: index {index} references unknown column {column}")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },

    #[error("table {table}: index {index} has no columns")]
    EmptyIndex { table: String, index: String },

    #[error("table {table}: duplicate index {index}")]
    DuplicateIndex { table: String, index: String },
}

/// Normalize an identifier: trim, lowercase, validate.
///
/// The result is a valid unquoted Postgres identifier of at most 63 bytes.
pub fn normalize_ident(name: &str) -> Result<String, SchemaError> {
    let normalized = name.trim().to_ascii_lowercase();
    let invalid = |reason| SchemaError::InvalidIdentifier {
        name: name.to_string(),
        reason,
    };

    let mut chars = normalized.chars();
    match chars.next() {
        None => return Err(invalid("empty")),
        Some(c) if c == '_' || c.is_ascii_lowercase() => {}
        Some(_) => return Err(invalid("must start with a letter or underscore")),
    }
    if !chars.all(|c| c == '_' || c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(invalid("only letters, digits and underscores are allowed"));
    }
    if normalized.len() > PG_IDENT_MAX {
        return Err(invalid("longer than 63 bytes"));
    }

    Ok(normalized)
}

/// A declared column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnDef {
    pub name: String,
    pub ty: LogicalType,
    /// Nullable unless declared otherwise. Primary key columns are never nullable.
    pub nullable: bool,
    /// Raw SQL default expression, e.g. `now()` or `'draft'`.
    pub default: Option<String>,
    pub primary_key: bool,
    /// Values are generated by the database unless supplied.
    pub identity: bool,
    pub comment: Option<String>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: LogicalType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            primary_key: false,
            identity: false,
            comment: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// `GENERATED BY DEFAULT AS IDENTITY`. Implies NOT NULL.
    pub fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The column as it appears in CREATE TABLE / ADD COLUMN.
    pub fn to_column_spec(&self) -> ColumnSpec {
        let mut spec = ColumnSpec::new(self.name.as_str(), self.ty.to_string());
        spec.not_null = !self.nullable;
        spec.default = self.default.clone();
        spec.identity = self.identity;
        spec
    }

    fn validate_type(&self) -> Result<(), SchemaError> {
        let integral = matches!(
            self.ty,
            LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
        );
        if self.identity && (!integral || self.default.is_some()) {
            return Err(SchemaError::InvalidIdentity {
                column: self.name.clone(),
            });
        }

        let invalid = |reason: String| SchemaError::InvalidType {
            column: self.name.clone(),
            reason,
        };
        match self.ty {
            LogicalType::Varchar(0) => Err(invalid("varchar length must be positive".into())),
            LogicalType::Decimal { precision, scale } => {
                if precision == 0 || precision > 1000 {
                    Err(invalid(format!(
                        "decimal precision {precision} is outside 1..=1000"
                    )))
                } else if scale > precision {
                    Err(invalid(format!(
                        "decimal scale {scale} exceeds precision {precision}"
                    )))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }
}

/// A declared index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexDef {
    name: Option<String>,
    columns: Vec<String>,
    unique: bool,
}

impl IndexDef {
    /// An index over the given columns, named after the table and columns
    /// unless [`IndexDef::named`] is used.
    pub fn on(columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The index name. Always set once the owning table is built.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn create_index_stmt(&self, table: TableRef) -> CreateIndexStmt {
        CreateIndexStmt::new(self.name(), table, self.columns.iter()).unique(self.unique)
    }
}

/// A declared table: ordered columns, derived primary key, indexes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDef {
    name: String,
    comment: Option<String>,
    columns: IndexMap<String, ColumnDef>,
    indexes: Vec<IndexDef>,
}

impl TableDef {
    pub fn builder(name: impl Into<String>) -> TableDefBuilder {
        TableDefBuilder {
            name: name.into(),
            comment: None,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Columns in declaration order.
    pub fn columns(&self) -> impl ExactSizeIterator<Item = &ColumnDef> {
        self.columns.values()
    }

    /// Look up a column by name, case-insensitively.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        match self.columns.get(name) {
            Some(col) => Some(col),
            None => self.columns.get(&name.trim().to_ascii_lowercase()),
        }
    }

    /// Primary key columns in declaration order.
    pub fn primary_key(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.values().filter(|c| c.primary_key)
    }

    pub fn primary_key_names(&self) -> Vec<&str> {
        self.primary_key().map(|c| c.name.as_str()).collect()
    }

    pub fn indexes(&self) -> &[IndexDef] {
        &self.indexes
    }

    /// A stable hash of the table's structure.
    ///
    /// Two definitions with the same fingerprint render identical DDL and
    /// bind identical CRUD handles. Comments do not take part.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.name.as_bytes());
        for col in self.columns.values() {
            hasher.update(b"\x1fcol\x1f");
            hasher.update(col.name.as_bytes());
            hasher.update(col.ty.to_string().as_bytes());
            hasher.update(&[col.nullable as u8, col.primary_key as u8, col.identity as u8]);
            if let Some(default) = &col.default {
                hasher.update(default.as_bytes());
            }
        }
        for idx in &self.indexes {
            hasher.update(b"\x1fidx\x1f");
            hasher.update(idx.name().as_bytes());
            hasher.update(&[idx.unique as u8]);
            for col in &idx.columns {
                hasher.update(col.as_bytes());
                hasher.update(b",");
            }
        }
        hasher.finalize().to_hex()[..16].to_string()
    }

    /// A copy keeping only the columns accepted by `keep`.
    ///
    /// Primary key columns are always kept. Indexes touching a dropped
    /// column are dropped with it.
    pub fn restricted_to(&self, mut keep: impl FnMut(&ColumnDef) -> bool) -> TableDef {
        let columns: IndexMap<String, ColumnDef> = self
            .columns
            .iter()
            .filter(|(_, c)| c.primary_key || keep(c))
            .map(|(k, c)| (k.clone(), c.clone()))
            .collect();
        let indexes = self
            .indexes
            .iter()
            .filter(|idx| idx.columns.iter().all(|c| columns.contains_key(c)))
            .cloned()
            .collect();
        TableDef {
            name: self.name.clone(),
            comment: self.comment.clone(),
            columns,
            indexes,
        }
    }

    /// CREATE TABLE for this table inside `schema`.
    pub fn create_table_stmt(&self, schema: &str) -> CreateTableStmt {
        let mut stmt = CreateTableStmt::new(TableRef::qualified(schema, self.name.as_str()));
        for col in self.columns.values() {
            stmt = stmt.column(col.to_column_spec());
        }
        stmt.primary_key(self.primary_key_names())
    }
}

/// Builder for [`TableDef`]; validation happens in [`TableDefBuilder::build`].
#[derive(Debug, Clone)]
pub struct TableDefBuilder {
    name: String,
    comment: Option<String>,
    columns: Vec<ColumnDef>,
    indexes: Vec<IndexDef>,
}

impl TableDefBuilder {
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnDef>) -> Self {
        self.columns.extend(columns);
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn build(self) -> Result<TableDef, SchemaError> {
        let table = normalize_ident(&self.name)?;

        let mut columns = IndexMap::with_capacity(self.columns.len());
        for mut col in self.columns {
            col.name = normalize_ident(&col.name)?;
            col.validate_type()?;
            if col.primary_key {
                col.nullable = false;
            }
            if columns.contains_key(&col.name) {
                return Err(SchemaError::DuplicateColumn {
                    table,
                    column: col.name,
                });
            }
            columns.insert(col.name.clone(), col);
        }

        if !columns.values().any(|c| c.primary_key) {
            return Err(SchemaError::MissingPrimaryKey { table });
        }

        let mut indexes: Vec<IndexDef> = Vec::with_capacity(self.indexes.len());
        for mut idx in self.indexes {
            idx.columns = idx
                .columns
                .iter()
                .map(|c| normalize_ident(c))
                .collect::<Result<_, _>>()?;

            let name = match &idx.name {
                Some(name) => normalize_ident(name)?,
                None if idx.unique => unique_index_name(&table, &idx.columns),
                None => index_name(&table, &idx.columns),
            };

            if idx.columns.is_empty() {
                return Err(SchemaError::EmptyIndex { table, index: name });
            }
            if let Some(missing) = idx.columns.iter().find(|c| !columns.contains_key(*c)) {
                return Err(SchemaError::UnknownIndexColumn {
                    column: missing.clone(),
                    table,
                    index: name,
                });
            }
            if indexes.iter().any(|other| other.name() == name) {
                return Err(SchemaError::DuplicateIndex { table, index: name });
            }

            idx.name = Some(name);
            indexes.push(idx);
        }

        Ok(TableDef {
            name: table,
            comment: self.comment,
            columns,
            indexes,
        })
    }
}
