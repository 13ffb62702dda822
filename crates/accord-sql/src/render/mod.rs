//! Render SQL AST to string.

use std::cell::RefCell;
use std::fmt;

use indexmap::IndexMap;

use crate::ddl::*;
use crate::expr::Expr;
use crate::stmt::*;
use crate::{ColumnName, Ident, Lit, ParamName, RenderedSql};

/// Mutable parameter tracking state.
struct ParamState {
    /// Named parameters mapped to their assigned positional index.
    params: IndexMap<ParamName, usize>,
    /// Next parameter index to assign (starts at 1 for `$1`).
    next_param_idx: usize,
}

impl ParamState {
    fn new() -> Self {
        Self {
            params: IndexMap::new(),
            next_param_idx: 1,
        }
    }

    /// Get or create a parameter index.
    fn get_or_insert(&mut self, name: &ParamName) -> usize {
        *self.params.entry(name.clone()).or_insert_with(|| {
            let idx = self.next_param_idx;
            self.next_param_idx += 1;
            idx
        })
    }
}

/// Rendering context that tracks parameter assignment.
///
/// Uses interior mutability (`RefCell`) so that `Render::render` can take `&self`,
/// enabling the `Fmt` wrapper to implement `Display`.
pub struct RenderContext {
    params: RefCell<ParamState>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self {
            params: RefCell::new(ParamState::new()),
        }
    }

    /// Get or create a parameter placeholder index.
    fn param_idx(&self, name: &ParamName) -> usize {
        self.params.borrow_mut().get_or_insert(name)
    }

    /// Finish rendering and return the collected params.
    fn into_params(self) -> Vec<ParamName> {
        self.params.into_inner().params.into_keys().collect()
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrapper for rendering a `Render` type via `Display`.
///
/// Allows using `write!(f, "{}", Fmt(ctx, &expr))` in format strings.
pub struct Fmt<'a, T: Render>(&'a RenderContext, &'a T);

impl<T: Render> fmt::Display for Fmt<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.1.render(self.0, f)
    }
}

/// Trait for types that can be rendered to SQL.
pub trait Render {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

fn write_ident_list(f: &mut fmt::Formatter<'_>, cols: &[ColumnName]) -> fmt::Result {
    for (i, col) in cols.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", Ident(col.as_str()))?;
    }
    Ok(())
}

fn write_returning(f: &mut fmt::Formatter<'_>, cols: &[ColumnName]) -> fmt::Result {
    if !cols.is_empty() {
        write!(f, "\nRETURNING ")?;
        write_ident_list(f, cols)?;
    }
    Ok(())
}

// ============================================================================
// Expressions and DML
// ============================================================================

impl Render for Expr {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Param(name) => {
                let idx = ctx.param_idx(name);
                write!(f, "${idx}")
            }
            Expr::Column(col) => write!(f, "{}", Ident(col.as_str())),
            Expr::Default => write!(f, "DEFAULT"),
            Expr::Excluded(col) => write!(f, "EXCLUDED.{}", Ident(col.as_str())),
            Expr::BinOp { left, op, right } => {
                let left = Fmt(ctx, left.as_ref());
                let right = Fmt(ctx, right.as_ref());
                let op = op.as_str();
                write!(f, "{left} {op} {right}")
            }
            Expr::CountAll => write!(f, "COUNT(*)"),
        }
    }
}

impl Render for SelectColumn {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Fmt(ctx, &self.expr))?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {}", Ident(alias.as_str()))?;
        }
        Ok(())
    }
}

impl Render for SelectStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SELECT")?;

        // Columns
        if self.columns.is_empty() {
            write!(f, " *")?;
        } else {
            for (i, col) in self.columns.iter().enumerate() {
                if i > 0 {
                    write!(f, ",")?;
                }
                write!(f, " {}", Fmt(ctx, col))?;
            }
        }

        // FROM
        if let Some(from) = &self.from {
            write!(f, "\nFROM {from}")?;
        }

        // WHERE
        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, "\nWHERE {where_}")?;
        }

        // ORDER BY
        if !self.order_by.is_empty() {
            write!(f, "\nORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let expr = Fmt(ctx, &order.expr);
                let dir = if order.desc { " DESC" } else { " ASC" };
                write!(f, "{expr}{dir}")?;
            }
        }

        // LIMIT
        if let Some(limit) = &self.limit {
            let limit = Fmt(ctx, limit);
            write!(f, "\nLIMIT {limit}")?;
        }

        // OFFSET
        if let Some(offset) = &self.offset {
            let offset = Fmt(ctx, offset);
            write!(f, "\nOFFSET {offset}")?;
        }

        Ok(())
    }
}

impl Render for InsertStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "INSERT INTO {}", self.table)?;

        if self.columns.is_empty() {
            write!(f, "\nDEFAULT VALUES")?;
        } else {
            write!(f, " (")?;
            write_ident_list(f, &self.columns)?;
            write!(f, ")")?;

            for (r, row) in self.rows.iter().enumerate() {
                if r == 0 {
                    write!(f, "\nVALUES (")?;
                } else {
                    write!(f, ",\n       (")?;
                }
                for (i, val) in row.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", Fmt(ctx, val))?;
                }
                write!(f, ")")?;
            }
        }

        // ON CONFLICT
        if let Some(conflict) = &self.on_conflict {
            write!(f, "\nON CONFLICT (")?;
            write_ident_list(f, &conflict.columns)?;
            write!(f, ")")?;

            match &conflict.action {
                ConflictAction::DoNothing => {
                    write!(f, " DO NOTHING")?;
                }
                ConflictAction::DoUpdate(assignments) => {
                    write!(f, " DO UPDATE SET ")?;
                    for (i, assign) in assignments.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        let col = Ident(assign.column.as_str());
                        let val = Fmt(ctx, &assign.value);
                        write!(f, "{col} = {val}")?;
                    }
                }
            }
        }

        write_returning(f, &self.returning)
    }
}

impl Render for UpdateStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {}", self.table)?;

        // SET
        write!(f, "\nSET ")?;
        for (i, assign) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            let col = Ident(assign.column.as_str());
            let val = Fmt(ctx, &assign.value);
            write!(f, "{col} = {val}")?;
        }

        // WHERE
        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, "\nWHERE {where_}")?;
        }

        write_returning(f, &self.returning)
    }
}

impl Render for DeleteStmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DELETE FROM {}", self.table)?;

        // WHERE
        if let Some(where_) = &self.where_ {
            let where_ = Fmt(ctx, where_);
            write!(f, "\nWHERE {where_}")?;
        }

        write_returning(f, &self.returning)
    }
}

// ============================================================================
// DDL
// ============================================================================

fn if_not_exists(flag: bool) -> &'static str {
    if flag { " IF NOT EXISTS" } else { "" }
}

/// Writes `"name" TYPE [PRIMARY KEY] [NOT NULL] [GENERATED BY DEFAULT AS IDENTITY] [DEFAULT expr]`.
fn write_column_spec(
    f: &mut fmt::Formatter<'_>,
    col: &ColumnSpec,
    inline_primary_key: bool,
) -> fmt::Result {
    write!(f, "{} {}", Ident(col.name.as_str()), col.sql_type)?;

    if inline_primary_key {
        write!(f, " PRIMARY KEY")?;
    } else if col.not_null {
        write!(f, " NOT NULL")?;
    }

    if col.identity {
        write!(f, " GENERATED BY DEFAULT AS IDENTITY")?;
    }

    if let Some(default) = &col.default {
        write!(f, " DEFAULT {default}")?;
    }

    Ok(())
}

impl Render for CreateSchemaStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exists = if_not_exists(self.if_not_exists);
        write!(f, "CREATE SCHEMA{exists} {}", Ident(self.name.as_str()))
    }
}

impl Render for CreateTableStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exists = if_not_exists(self.if_not_exists);
        write!(f, "CREATE TABLE{exists} {} (", self.table)?;

        // If there's more than one PK column, we need a table constraint
        let use_table_pk_constraint = self.primary_key.len() > 1;

        for (i, col) in self.columns.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "\n    ")?;
            let inline_pk = !use_table_pk_constraint && self.primary_key.contains(&col.name);
            write_column_spec(f, col, inline_pk)?;
        }

        if use_table_pk_constraint {
            write!(f, ",\n    PRIMARY KEY (")?;
            write_ident_list(f, &self.primary_key)?;
            write!(f, ")")?;
        }

        write!(f, "\n)")
    }
}

impl Render for AddColumnStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exists = if_not_exists(self.if_not_exists);
        write!(f, "ALTER TABLE {} ADD COLUMN{exists} ", self.table)?;
        write_column_spec(f, &self.column, false)
    }
}

impl Render for CreateIndexStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unique = if self.unique { " UNIQUE" } else { "" };
        let exists = if_not_exists(self.if_not_exists);
        write!(
            f,
            "CREATE{unique} INDEX{exists} {} ON {} (",
            Ident(self.name.as_str()),
            self.table
        )?;
        write_ident_list(f, &self.columns)?;
        write!(f, ")")
    }
}

impl Render for CommentStmt {
    fn render(&self, _ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            CommentTarget::Table(table) => write!(f, "COMMENT ON TABLE {table}")?,
            CommentTarget::Column(table, column) => {
                write!(f, "COMMENT ON COLUMN {table}.{}", Ident(column.as_str()))?
            }
        }
        write!(f, " IS {}", Lit(&self.comment))
    }
}

impl Render for Stmt {
    fn render(&self, ctx: &RenderContext, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Select(s) => s.render(ctx, f),
            Stmt::Insert(s) => s.render(ctx, f),
            Stmt::Update(s) => s.render(ctx, f),
            Stmt::Delete(s) => s.render(ctx, f),
            Stmt::CreateSchema(s) => s.render(ctx, f),
            Stmt::CreateTable(s) => s.render(ctx, f),
            Stmt::AddColumn(s) => s.render(ctx, f),
            Stmt::CreateIndex(s) => s.render(ctx, f),
            Stmt::Comment(s) => s.render(ctx, f),
        }
    }
}

// ============================================================================
// Convenience methods
// ============================================================================

/// Render a statement to SQL.
pub fn render(stmt: &impl Render) -> RenderedSql {
    let ctx = RenderContext::new();
    let sql = format!("{}", Fmt(&ctx, stmt));
    RenderedSql {
        sql,
        params: ctx.into_params(),
    }
}
