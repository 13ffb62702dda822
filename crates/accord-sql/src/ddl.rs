//! DDL statements.
//!
//! Only additive statements exist here. Every one of them carries an
//! `if_not_exists` flag so a plan can be re-run after a partial failure.

use crate::{ColumnName, IndexName, SchemaName, TableRef};

/// A column definition inside CREATE TABLE or ALTER TABLE ADD COLUMN.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: ColumnName,
    /// Rendered SQL type, e.g. `BIGINT` or `NUMERIC(10,2)`.
    pub sql_type: String,
    pub not_null: bool,
    /// Raw SQL default expression.
    pub default: Option<String>,
    /// `GENERATED BY DEFAULT AS IDENTITY`
    pub identity: bool,
}

impl ColumnSpec {
    pub fn new(name: impl Into<ColumnName>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            default: None,
            identity: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

/// CREATE SCHEMA
#[derive(Debug, Clone)]
pub struct CreateSchemaStmt {
    pub name: SchemaName,
    pub if_not_exists: bool,
}

impl CreateSchemaStmt {
    pub fn new(name: impl Into<SchemaName>) -> Self {
        Self {
            name: name.into(),
            if_not_exists: true,
        }
    }
}

/// CREATE TABLE
///
/// A single-column primary key renders inline on its column; a composite one
/// renders as a trailing table constraint.
#[derive(Debug, Clone)]
pub struct CreateTableStmt {
    pub table: TableRef,
    pub columns: Vec<ColumnSpec>,
    pub primary_key: Vec<ColumnName>,
    pub if_not_exists: bool,
}

impl CreateTableStmt {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            primary_key: Vec::new(),
            if_not_exists: true,
        }
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn primary_key(mut self, cols: impl IntoIterator<Item = impl Into<ColumnName>>) -> Self {
        self.primary_key.extend(cols.into_iter().map(Into::into));
        self
    }
}

/// ALTER TABLE ... ADD COLUMN
#[derive(Debug, Clone)]
pub struct AddColumnStmt {
    pub table: TableRef,
    pub column: ColumnSpec,
    pub if_not_exists: bool,
}

impl AddColumnStmt {
    pub fn new(table: TableRef, column: ColumnSpec) -> Self {
        Self {
            table,
            column,
            if_not_exists: true,
        }
    }
}

/// CREATE [UNIQUE] INDEX
#[derive(Debug, Clone)]
pub struct CreateIndexStmt {
    pub name: IndexName,
    pub table: TableRef,
    pub columns: Vec<ColumnName>,
    pub unique: bool,
    pub if_not_exists: bool,
}

impl CreateIndexStmt {
    pub fn new(
        name: impl Into<IndexName>,
        table: TableRef,
        columns: impl IntoIterator<Item = impl Into<ColumnName>>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            columns: columns.into_iter().map(Into::into).collect(),
            unique: false,
            if_not_exists: true,
        }
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }
}

/// What a COMMENT ON statement targets.
#[derive(Debug, Clone)]
pub enum CommentTarget {
    Table(TableRef),
    Column(TableRef, ColumnName),
}

/// COMMENT ON TABLE / COMMENT ON COLUMN
///
/// Postgres does not accept a parameter here, so the text is rendered as an
/// escaped string literal.
#[derive(Debug, Clone)]
pub struct CommentStmt {
    pub target: CommentTarget,
    pub comment: String,
}

impl CommentStmt {
    pub fn on_table(table: TableRef, comment: impl Into<String>) -> Self {
        Self {
            target: CommentTarget::Table(table),
            comment: comment.into(),
        }
    }

    pub fn on_column(
        table: TableRef,
        column: impl Into<ColumnName>,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            target: CommentTarget::Column(table, column.into()),
            comment: comment.into(),
        }
    }
}
