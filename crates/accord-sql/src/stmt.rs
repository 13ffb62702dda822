//! SQL statements.

use crate::ddl::{
    AddColumnStmt, CommentStmt, CreateIndexStmt, CreateSchemaStmt, CreateTableStmt,
};
use crate::expr::Expr;
use crate::{ColumnName, TableRef};

/// A SQL statement.
#[derive(Debug, Clone)]
pub enum Stmt {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateSchema(CreateSchemaStmt),
    CreateTable(CreateTableStmt),
    AddColumn(AddColumnStmt),
    CreateIndex(CreateIndexStmt),
    Comment(CommentStmt),
}

/// A SELECT statement.
#[derive(Debug, Clone, Default)]
pub struct SelectStmt {
    pub columns: Vec<SelectColumn>,
    pub from: Option<TableRef>,
    pub where_: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
}

/// A column in a SELECT clause.
#[derive(Debug, Clone)]
pub struct SelectColumn {
    pub expr: Expr,
    pub alias: Option<ColumnName>,
}

impl SelectColumn {
    pub fn expr(expr: Expr) -> Self {
        SelectColumn { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<ColumnName>) -> Self {
        SelectColumn {
            expr,
            alias: Some(alias.into()),
        }
    }
}

/// ORDER BY clause.
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

impl OrderBy {
    pub fn asc(expr: Expr) -> Self {
        Self { expr, desc: false }
    }

    pub fn desc(expr: Expr) -> Self {
        Self { expr, desc: true }
    }
}

// ============================================================================
// INSERT statement
// ============================================================================

/// An INSERT statement.
///
/// With no columns it renders as `INSERT INTO t DEFAULT VALUES`. Each entry
/// of `rows` is one VALUES tuple, in `columns` order.
#[derive(Debug, Clone)]
pub struct InsertStmt {
    pub table: TableRef,
    pub columns: Vec<ColumnName>,
    pub rows: Vec<Vec<Expr>>,
    pub on_conflict: Option<OnConflict>,
    pub returning: Vec<ColumnName>,
}

/// ON CONFLICT clause for upsert.
#[derive(Debug, Clone)]
pub struct OnConflict {
    /// Conflict target columns
    pub columns: Vec<ColumnName>,
    /// What to do on conflict
    pub action: ConflictAction,
}

/// What to do on conflict.
#[derive(Debug, Clone)]
pub enum ConflictAction {
    /// DO NOTHING
    DoNothing,
    /// DO UPDATE SET ...
    DoUpdate(Vec<UpdateAssignment>),
}

/// An assignment in UPDATE SET or ON CONFLICT DO UPDATE SET.
#[derive(Debug, Clone)]
pub struct UpdateAssignment {
    pub column: ColumnName,
    pub value: Expr,
}

impl UpdateAssignment {
    pub fn new(column: impl Into<ColumnName>, value: Expr) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

// ============================================================================
// UPDATE statement
// ============================================================================

/// An UPDATE statement.
#[derive(Debug, Clone)]
pub struct UpdateStmt {
    pub table: TableRef,
    pub assignments: Vec<UpdateAssignment>,
    pub where_: Option<Expr>,
    pub returning: Vec<ColumnName>,
}

// ============================================================================
// DELETE statement
// ============================================================================

/// A DELETE statement.
#[derive(Debug, Clone)]
pub struct DeleteStmt {
    pub table: TableRef,
    pub where_: Option<Expr>,
    pub returning: Vec<ColumnName>,
}

// ============================================================================
// Builder-style constructors
// ============================================================================

impl SelectStmt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn column(mut self, col: SelectColumn) -> Self {
        self.columns.push(col);
        self
    }

    pub fn columns(mut self, cols: impl IntoIterator<Item = SelectColumn>) -> Self {
        self.columns.extend(cols);
        self
    }

    pub fn from(mut self, table: TableRef) -> Self {
        self.from = Some(table);
        self
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn and_where(mut self, expr: Expr) -> Self {
        self.where_ = Some(match self.where_ {
            Some(existing) => existing.and(expr),
            None => expr,
        });
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn limit(mut self, expr: Expr) -> Self {
        self.limit = Some(expr);
        self
    }

    pub fn offset(mut self, expr: Expr) -> Self {
        self.offset = Some(expr);
        self
    }
}

impl InsertStmt {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            columns: Vec::new(),
            rows: Vec::new(),
            on_conflict: None,
            returning: Vec::new(),
        }
    }

    /// Add a column with its value in the first row.
    pub fn column(mut self, name: impl Into<ColumnName>, value: Expr) -> Self {
        self.columns.push(name.into());
        match self.rows.first_mut() {
            Some(row) => row.push(value),
            None => self.rows.push(vec![value]),
        }
        self
    }

    /// Multi-row form: set the column list, then add tuples with [`InsertStmt::row`].
    pub fn columns(mut self, cols: impl IntoIterator<Item = impl Into<ColumnName>>) -> Self {
        self.columns.extend(cols.into_iter().map(Into::into));
        self
    }

    pub fn row(mut self, values: Vec<Expr>) -> Self {
        self.rows.push(values);
        self
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.on_conflict = Some(conflict);
        self
    }

    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<ColumnName>>) -> Self {
        self.returning.extend(cols.into_iter().map(Into::into));
        self
    }
}

impl UpdateStmt {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            where_: None,
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<ColumnName>, value: Expr) -> Self {
        self.assignments.push(UpdateAssignment::new(column, value));
        self
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<ColumnName>>) -> Self {
        self.returning.extend(cols.into_iter().map(Into::into));
        self
    }
}

impl DeleteStmt {
    pub fn new(table: TableRef) -> Self {
        Self {
            table,
            where_: None,
            returning: Vec::new(),
        }
    }

    pub fn where_(mut self, expr: Expr) -> Self {
        self.where_ = Some(expr);
        self
    }

    pub fn returning(mut self, cols: impl IntoIterator<Item = impl Into<ColumnName>>) -> Self {
        self.returning.extend(cols.into_iter().map(Into::into));
        self
    }
}
