//! Generic CRUD over one reconciled table.
//!
//! A [`CrudHandle`] is built from a declared [`TableDef`] restricted to the
//! columns that exist live. Every operation validates its input against that
//! definition before any SQL is sent, then builds a statement with
//! `accord-sql` and binds values as parameters. Column names come from the
//! definition and are always quoted; values never appear in SQL text.

use std::str::FromStr;
use std::sync::Arc;

use accord_schema::{ColumnDef, LogicalType, TableDef};
use accord_sql::{
    ConflictAction, DeleteStmt, Expr, InsertStmt, OnConflict, OrderBy, RenderedSql, SelectColumn,
    SelectStmt, TableRef, UpdateAssignment, UpdateStmt, render,
};
use indexmap::IndexMap;
use tokio_postgres::error::SqlState;

use crate::connection::Connection;
use crate::error::{DbError, Error};
use crate::introspect::LiveTable;
use crate::{Result, Row, Value};

/// How [`CrudHandle::upsert`] is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpsertStrategy {
    /// `INSERT ... ON CONFLICT`, falling back to [`UpsertStrategy::Emulated`]
    /// when the database rejects the conflict target.
    #[default]
    AtomicPreferred,
    /// `INSERT ... ON CONFLICT` only.
    AtomicOnly,
    /// Look the key up, then UPDATE or INSERT. Not atomic.
    Emulated,
}

impl FromStr for UpsertStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic-preferred" | "atomic_preferred" => Ok(Self::AtomicPreferred),
            "atomic-only" | "atomic_only" | "atomic" => Ok(Self::AtomicOnly),
            "emulated" => Ok(Self::Emulated),
            other => Err(format!(
                "unknown upsert strategy '{other}' (expected atomic-preferred, atomic-only or emulated)"
            )),
        }
    }
}

/// A page of rows for [`CrudHandle::find_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageRequest {
    /// Maximum number of rows; `None` means no limit.
    pub limit: Option<u32>,
    pub offset: u32,
}

impl PageRequest {
    pub fn new(limit: u32, offset: u32) -> Self {
        Self {
            limit: Some(limit),
            offset,
        }
    }

    /// Every row.
    pub fn all() -> Self {
        Self::default()
    }
}

/// One ORDER BY term for [`CrudHandle::find_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub column: String,
    pub desc: bool,
}

impl Sort {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            desc: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            desc: true,
        }
    }
}

const LIMIT_PARAM: &str = "@limit";
const OFFSET_PARAM: &str = "@offset";

/// CRUD operations for one table.
///
/// Handles are cheap to clone and hold no connection; every operation takes
/// the connection to run on. A handle is bound to the definition it was
/// built from: after the table is re-declared with a different structure,
/// [`CrudHandle::is_current_for`] returns false and a new handle should be
/// requested.
#[derive(Debug, Clone)]
pub struct CrudHandle {
    table: Arc<TableDef>,
    table_ref: TableRef,
    upsert: UpsertStrategy,
    fingerprint: String,
}

impl CrudHandle {
    /// Bind `def` against its live counterpart.
    ///
    /// Declared columns missing from `live`, or whose live type conflicts
    /// with the declaration, are left out of the handle. Primary key columns
    /// are always kept; callers check them before binding.
    pub fn bind(def: &TableDef, live: &LiveTable, schema: &str, upsert: UpsertStrategy) -> Self {
        let table = def
            .restricted_to(|c| live.column(&c.name).is_some_and(|l| c.ty.is_satisfied_by(&l.ty)));
        Self {
            table_ref: TableRef::qualified(schema, def.name()),
            table: Arc::new(table),
            upsert,
            fingerprint: def.fingerprint(),
        }
    }

    pub fn table(&self) -> &TableDef {
        &self.table
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }

    pub fn upsert_strategy(&self) -> UpsertStrategy {
        self.upsert
    }

    /// Fingerprint of the declared definition this handle was bound from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// True if `def` is structurally the definition this handle was bound
    /// from.
    pub fn is_current_for(&self, def: &TableDef) -> bool {
        def.name() == self.table.name() && def.fingerprint() == self.fingerprint
    }

    /// Insert `row`, returning its primary key.
    ///
    /// An empty row inserts `DEFAULT VALUES`.
    pub async fn insert<C: Connection + ?Sized>(&self, conn: &C, row: Row) -> Result<Row> {
        let values = self.check_row(row)?;
        let pk: Vec<&ColumnDef> = self.table.primary_key().collect();
        match self.insert_returning(conn, &values, None, &pk).await? {
            Some(key) => Ok(key),
            None => Err(self.no_row_returned("INSERT")),
        }
    }

    /// Insert every row in one statement, returning their primary keys in
    /// input order.
    ///
    /// The column list is the union of the columns the rows name; a row
    /// that leaves one out gets `DEFAULT` for it. No SQL is sent for an
    /// empty batch.
    pub async fn insert_many<C: Connection + ?Sized>(
        &self,
        conn: &C,
        rows: Vec<Row>,
    ) -> Result<Vec<Row>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let count = rows.len();
        let checked = rows
            .into_iter()
            .map(|row| self.check_row(row))
            .collect::<Result<Vec<_>>>()?;

        let mut columns: Vec<&str> = Vec::new();
        for values in &checked {
            for col in values.keys() {
                if !columns.contains(&col.as_str()) {
                    columns.push(col.as_str());
                }
            }
        }
        // every row is empty: name one column and let it default
        if columns.is_empty() {
            columns.extend(self.table.primary_key().map(|c| c.name.as_str()).take(1));
        }

        let mut stmt = InsertStmt::new(self.table_ref.clone()).columns(columns.iter().copied());
        let mut params = IndexMap::new();
        for (i, values) in checked.iter().enumerate() {
            let mut exprs = Vec::with_capacity(columns.len());
            for col in &columns {
                match values.get(*col) {
                    Some(value) => {
                        let param = format!("{col}#{i}");
                        exprs.push(Expr::param(param.as_str()));
                        params.insert(param, value.clone());
                    }
                    None => exprs.push(Expr::Default),
                }
            }
            stmt = stmt.row(exprs);
        }
        let pk: Vec<&ColumnDef> = self.table.primary_key().collect();
        let stmt = stmt.returning(pk.iter().map(|c| c.name.as_str()));

        let rendered = render(&stmt);
        let params = bind(&rendered, &params)?;
        let types: Vec<LogicalType> = pk.iter().map(|c| c.ty).collect();
        let keys: Vec<Row> = conn
            .query(&rendered.sql, &params, &types)
            .await?
            .into_iter()
            .map(|row| to_row(pk.iter().map(|c| c.name.as_str()), row))
            .collect();

        if keys.len() != count {
            return Err(DbError::UnexpectedResult(format!(
                "INSERT of {count} rows into {} returned {} keys",
                self.name(),
                keys.len()
            ))
            .into());
        }
        tracing::debug!(table = self.name(), rows = count, "inserted batch");
        Ok(keys)
    }

    /// Fetch the row with primary key `key`.
    pub async fn find_by_key<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &Row,
    ) -> Result<Option<Row>> {
        let key = self.check_key(key)?;
        self.select_by_key(conn, &key).await
    }

    /// Set the columns in `row` on the row with primary key `key`.
    ///
    /// Returns the updated row, or `None` when no row has that key.
    pub async fn update<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &Row,
        row: Row,
    ) -> Result<Option<Row>> {
        let key = self.check_key(key)?;
        if row.is_empty() {
            return Err(Error::EmptyRow {
                table: self.name().to_string(),
            });
        }
        let values = self.check_row(row)?;
        if let Some(col) = values.keys().find(|c| key.contains_key(*c)) {
            return Err(Error::ImmutableKey {
                table: self.name().to_string(),
                column: col.clone(),
            });
        }
        self.update_by_key(conn, &key, &values).await
    }

    /// Delete the row with primary key `key`, returning it.
    pub async fn delete<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &Row,
    ) -> Result<Option<Row>> {
        let key = self.check_key(key)?;
        let stmt = DeleteStmt::new(self.table_ref.clone())
            .where_(self.key_filter()?)
            .returning(self.column_names());

        let rows = self.query(conn, &render(&stmt), &key).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert `row`, or update the existing row with the same primary key.
    ///
    /// `row` must carry every primary key column. Returns the stored row.
    pub async fn upsert<C: Connection + ?Sized>(&self, conn: &C, row: Row) -> Result<Row> {
        let values = self.check_row(row)?;
        let key = self.split_key(&values)?;

        let stored = match self.upsert {
            UpsertStrategy::Emulated => self.upsert_emulated(conn, &key, &values).await?,
            UpsertStrategy::AtomicOnly => self.upsert_atomic(conn, &key, &values).await?,
            UpsertStrategy::AtomicPreferred => {
                match self.upsert_atomic(conn, &key, &values).await {
                    Err(Error::Database(e))
                        if e.code() == Some(SqlState::INVALID_COLUMN_REFERENCE.code()) =>
                    {
                        tracing::warn!(
                            table = self.name(),
                            error = %e,
                            "ON CONFLICT rejected, falling back to emulated upsert"
                        );
                        self.upsert_emulated(conn, &key, &values).await?
                    }
                    other => other?,
                }
            }
        };

        stored.ok_or_else(|| self.no_row_returned("upsert"))
    }

    /// Fetch a page of rows.
    ///
    /// Rows are ordered by `sorts`, then by the primary key.
    pub async fn find_all<C: Connection + ?Sized>(
        &self,
        conn: &C,
        page: PageRequest,
        sorts: &[Sort],
    ) -> Result<Vec<Row>> {
        let mut stmt = self.select_all();
        let mut sorted = Vec::with_capacity(sorts.len());
        for sort in sorts {
            let col = self.column(&sort.column)?;
            let expr = Expr::column(col.name.as_str());
            stmt = stmt.order_by(if sort.desc {
                OrderBy::desc(expr)
            } else {
                OrderBy::asc(expr)
            });
            sorted.push(col.name.as_str());
        }
        for col in self.table.primary_key() {
            if !sorted.contains(&col.name.as_str()) {
                stmt = stmt.order_by(OrderBy::asc(Expr::column(col.name.as_str())));
            }
        }

        let mut params = IndexMap::new();
        if let Some(limit) = page.limit {
            stmt = stmt.limit(Expr::param(LIMIT_PARAM));
            params.insert(LIMIT_PARAM.to_string(), Value::I64(limit.into()));
        }
        if page.offset > 0 {
            stmt = stmt.offset(Expr::param(OFFSET_PARAM));
            params.insert(OFFSET_PARAM.to_string(), Value::I64(page.offset.into()));
        }

        self.query(conn, &render(&stmt), &params).await
    }

    /// Number of rows in the table.
    pub async fn count<C: Connection + ?Sized>(&self, conn: &C) -> Result<i64> {
        let stmt = SelectStmt::new()
            .column(SelectColumn::aliased(Expr::CountAll, "count"))
            .from(self.table_ref.clone());
        self.count_where(conn, stmt, &IndexMap::new()).await
    }

    /// True if a row with primary key `key` exists.
    pub async fn exists<C: Connection + ?Sized>(&self, conn: &C, key: &Row) -> Result<bool> {
        let key = self.check_key(key)?;
        self.key_exists(conn, &key).await
    }

    async fn upsert_atomic<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &IndexMap<String, Value>,
        values: &IndexMap<String, Value>,
    ) -> Result<Option<Row>> {
        let assignments: Vec<UpdateAssignment> = values
            .keys()
            .filter(|c| !key.contains_key(*c))
            .map(|c| UpdateAssignment::new(c.as_str(), Expr::excluded(c.as_str())))
            .collect();
        let action = if assignments.is_empty() {
            ConflictAction::DoNothing
        } else {
            ConflictAction::DoUpdate(assignments)
        };
        let conflict = OnConflict {
            columns: key.keys().map(|c| c.as_str().into()).collect(),
            action,
        };

        let all: Vec<&ColumnDef> = self.table.columns().collect();
        match self.insert_returning(conn, values, Some(conflict), &all).await? {
            Some(row) => Ok(Some(row)),
            // DO NOTHING hit an existing row; nothing was returned
            None => self.select_by_key(conn, key).await,
        }
    }

    async fn upsert_emulated<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &IndexMap<String, Value>,
        values: &IndexMap<String, Value>,
    ) -> Result<Option<Row>> {
        if self.key_exists(conn, key).await? {
            let rest: IndexMap<String, Value> = values
                .iter()
                .filter(|(c, _)| !key.contains_key(*c))
                .map(|(c, v)| (c.clone(), v.clone()))
                .collect();
            if rest.is_empty() {
                return self.select_by_key(conn, key).await;
            }
            return self.update_by_key(conn, key, &rest).await;
        }

        let all: Vec<&ColumnDef> = self.table.columns().collect();
        self.insert_returning(conn, values, None, &all).await
    }

    async fn insert_returning<C: Connection + ?Sized>(
        &self,
        conn: &C,
        values: &IndexMap<String, Value>,
        on_conflict: Option<OnConflict>,
        returning: &[&ColumnDef],
    ) -> Result<Option<Row>> {
        let mut stmt = InsertStmt::new(self.table_ref.clone());
        for col in values.keys() {
            stmt = stmt.column(col.as_str(), Expr::param(col.as_str()));
        }
        if let Some(conflict) = on_conflict {
            stmt = stmt.on_conflict(conflict);
        }
        stmt = stmt.returning(returning.iter().map(|c| c.name.as_str()));

        let rendered = render(&stmt);
        let params = bind(&rendered, values)?;
        let types: Vec<LogicalType> = returning.iter().map(|c| c.ty).collect();
        let rows = conn.query(&rendered.sql, &params, &types).await?;

        Ok(rows
            .into_iter()
            .next()
            .map(|row| to_row(returning.iter().map(|c| c.name.as_str()), row)))
    }

    async fn select_by_key<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &IndexMap<String, Value>,
    ) -> Result<Option<Row>> {
        let stmt = self.select_all().where_(self.key_filter()?);
        let rows = self.query(conn, &render(&stmt), key).await?;
        Ok(rows.into_iter().next())
    }

    async fn update_by_key<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &IndexMap<String, Value>,
        values: &IndexMap<String, Value>,
    ) -> Result<Option<Row>> {
        let mut stmt = UpdateStmt::new(self.table_ref.clone());
        for col in values.keys() {
            stmt = stmt.set(col.as_str(), Expr::param(col.as_str()));
        }
        let stmt = stmt
            .where_(self.key_filter()?)
            .returning(self.column_names());

        let mut params = values.clone();
        params.extend(key.iter().map(|(c, v)| (c.clone(), v.clone())));

        let rows = self.query(conn, &render(&stmt), &params).await?;
        Ok(rows.into_iter().next())
    }

    async fn key_exists<C: Connection + ?Sized>(
        &self,
        conn: &C,
        key: &IndexMap<String, Value>,
    ) -> Result<bool> {
        let stmt = SelectStmt::new()
            .column(SelectColumn::aliased(Expr::CountAll, "count"))
            .from(self.table_ref.clone())
            .where_(self.key_filter()?);
        Ok(self.count_where(conn, stmt, key).await? > 0)
    }

    async fn count_where<C: Connection + ?Sized>(
        &self,
        conn: &C,
        stmt: SelectStmt,
        params: &IndexMap<String, Value>,
    ) -> Result<i64> {
        let rendered = render(&stmt);
        let params = bind(&rendered, params)?;
        let rows = conn
            .query(&rendered.sql, &params, &[LogicalType::BigInt])
            .await?;
        match rows.first().and_then(|r| r.first()) {
            Some(Value::I64(n)) => Ok(*n),
            other => Err(DbError::UnexpectedResult(format!(
                "COUNT(*) on {} returned {:?}",
                self.name(),
                other
            ))
            .into()),
        }
    }

    /// Run a statement that returns full rows of this table.
    async fn query<C: Connection + ?Sized>(
        &self,
        conn: &C,
        rendered: &RenderedSql,
        values: &IndexMap<String, Value>,
    ) -> Result<Vec<Row>> {
        let params = bind(rendered, values)?;
        let types: Vec<LogicalType> = self.table.columns().map(|c| c.ty).collect();
        let rows = conn.query(&rendered.sql, &params, &types).await?;
        Ok(rows
            .into_iter()
            .map(|row| to_row(self.column_names(), row))
            .collect())
    }

    fn select_all(&self) -> SelectStmt {
        SelectStmt::new()
            .columns(
                self.table
                    .columns()
                    .map(|c| SelectColumn::expr(Expr::column(c.name.as_str()))),
            )
            .from(self.table_ref.clone())
    }

    fn key_filter(&self) -> Result<Expr> {
        Expr::columns_eq_params(self.table.primary_key_names()).ok_or_else(|| Error::InvalidKey {
            table: self.name().to_string(),
            reason: "table has no primary key".to_string(),
        })
    }

    fn column_names(&self) -> impl Iterator<Item = &str> {
        self.table.columns().map(|c| c.name.as_str())
    }

    fn column(&self, name: &str) -> Result<&ColumnDef> {
        self.table.column(name).ok_or_else(|| Error::UnknownColumn {
            table: self.name().to_string(),
            column: name.to_string(),
        })
    }

    /// Resolve and coerce every value in `row`, keyed by canonical column
    /// name.
    fn check_row(&self, row: Row) -> Result<IndexMap<String, Value>> {
        let mut values = IndexMap::with_capacity(row.len());
        for (name, value) in row {
            let col = self.column(&name)?;
            let value = self.coerce(col, value)?;
            values.insert(col.name.clone(), value);
        }
        Ok(values)
    }

    /// Check that `key` names exactly the primary key columns, none NULL.
    /// The result is in primary key order.
    fn check_key(&self, key: &Row) -> Result<IndexMap<String, Value>> {
        let invalid = |reason: String| Error::InvalidKey {
            table: self.name().to_string(),
            reason,
        };

        for name in key.keys() {
            match self.table.column(name) {
                Some(col) if col.primary_key => {}
                _ => return Err(invalid(format!("{name} is not a primary key column"))),
            }
        }

        let mut values = IndexMap::new();
        for col in self.table.primary_key() {
            let value = key
                .iter()
                .find(|(name, _)| self.table.column(name).is_some_and(|c| c.name == col.name))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| invalid(format!("missing primary key column {}", col.name)))?;
            if value.is_null() {
                return Err(invalid(format!("primary key column {} is NULL", col.name)));
            }
            values.insert(col.name.clone(), self.coerce(col, value)?);
        }

        if values.len() != key.len() {
            return Err(invalid("primary key column given more than once".to_string()));
        }
        Ok(values)
    }

    /// The primary key part of an already checked row.
    fn split_key(&self, values: &IndexMap<String, Value>) -> Result<IndexMap<String, Value>> {
        let mut key = IndexMap::new();
        for col in self.table.primary_key() {
            match values.get(&col.name) {
                Some(v) if !v.is_null() => {
                    key.insert(col.name.clone(), v.clone());
                }
                _ => {
                    return Err(Error::InvalidKey {
                        table: self.name().to_string(),
                        reason: format!("upsert row has no value for primary key column {}", col.name),
                    });
                }
            }
        }
        Ok(key)
    }

    fn coerce(&self, col: &ColumnDef, value: Value) -> Result<Value> {
        let kind = value.kind();
        value.coerce(&col.ty).ok_or_else(|| Error::TypeMismatch {
            table: self.name().to_string(),
            column: col.name.clone(),
            expected: col.ty,
            actual: kind,
        })
    }

    fn no_row_returned(&self, what: &str) -> Error {
        DbError::UnexpectedResult(format!("{what} on {} returned no row", self.name())).into()
    }
}

/// Order `values` the way the rendered statement numbers its parameters.
fn bind(rendered: &RenderedSql, values: &IndexMap<String, Value>) -> Result<Vec<Value>> {
    rendered
        .params
        .iter()
        .map(|name| {
            values.get(name.as_str()).cloned().ok_or_else(|| {
                DbError::UnexpectedResult(format!("no value bound for parameter {name}")).into()
            })
        })
        .collect()
}

fn to_row<'a>(names: impl Iterator<Item = &'a str>, values: Vec<Value>) -> Row {
    names.map(str::to_string).zip(values).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introspect::LiveColumn;
    use accord_schema::LiveType;

    fn live_of(def: &TableDef) -> LiveTable {
        let mut live = LiveTable::new(def.name());
        for col in def.columns() {
            live.columns.insert(
                col.name.clone(),
                LiveColumn {
                    name: col.name.clone(),
                    ty: LiveType::Known(col.ty),
                    nullable: col.nullable,
                    primary_key: col.primary_key,
                    default: None,
                    identity: col.identity,
                    comment: None,
                },
            );
        }
        live
    }

    fn membership() -> CrudHandle {
        let def = TableDef::builder("membership")
            .column(ColumnDef::new("tenant_id", LogicalType::BigInt).primary_key())
            .column(ColumnDef::new("user_id", LogicalType::BigInt).primary_key())
            .column(ColumnDef::new("role", LogicalType::Text))
            .build()
            .unwrap();
        CrudHandle::bind(&def, &live_of(&def), "public", UpsertStrategy::default())
    }

    #[test]
    fn test_check_key_orders_by_primary_key() {
        let handle = membership();
        let key = handle
            .check_key(&crate::row! { "user_id" => 7, "tenant_id" => 1 })
            .unwrap();
        let pairs: Vec<_> = key.into_iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("tenant_id".to_string(), Value::I64(1)),
                ("user_id".to_string(), Value::I64(7)),
            ]
        );
    }

    #[test]
    fn test_check_key_rejects_partial_and_extra() {
        let handle = membership();

        let err = handle
            .check_key(&crate::row! { "tenant_id" => 1 })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "table membership: invalid key: missing primary key column user_id"
        );

        let err = handle
            .check_key(&crate::row! { "tenant_id" => 1, "user_id" => 2, "role" => "x" })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));

        let err = handle
            .check_key(&crate::row! { "tenant_id" => 1, "user_id" => Value::Null })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidKey { .. }));
    }

    #[test]
    fn test_check_row_normalizes_names_and_coerces() {
        let handle = membership();
        let values = handle
            .check_row(crate::row! { "Tenant_ID" => 3i32, "role" => Value::Null })
            .unwrap();
        assert_eq!(values["tenant_id"], Value::I64(3));
        assert_eq!(values["role"], Value::Null);
    }

    #[test]
    fn test_check_row_type_mismatch() {
        let handle = membership();
        let err = handle
            .check_row(crate::row! { "role" => 5 })
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "table membership: column role is TEXT, got i32 value"
        );
    }

    #[test]
    fn test_bind_restricts_to_live_columns() {
        let def = TableDef::builder("users")
            .column(ColumnDef::new("id", LogicalType::Integer).primary_key())
            .column(ColumnDef::new("name", LogicalType::Text))
            .column(ColumnDef::new("email", LogicalType::Text))
            .build()
            .unwrap();
        let mut live = live_of(&def);
        live.columns.shift_remove("email");

        let handle = CrudHandle::bind(&def, &live, "public", UpsertStrategy::Emulated);
        let names: Vec<_> = handle.column_names().collect();
        assert_eq!(names, vec!["id", "name"]);
        assert!(handle.is_current_for(&def));
        assert_eq!(handle.fingerprint(), def.fingerprint());
    }

    #[test]
    fn test_bind_leaves_out_conflicting_columns() {
        let def = TableDef::builder("people")
            .column(ColumnDef::new("id", LogicalType::Integer).primary_key())
            .column(ColumnDef::new("age", LogicalType::Integer))
            .column(ColumnDef::new("nickname", LogicalType::Text))
            .column(ColumnDef::new("bio", LogicalType::Text))
            .build()
            .unwrap();
        let mut live = live_of(&def);
        live.columns.get_mut("age").unwrap().ty = LiveType::Known(LogicalType::Text);
        live.columns.get_mut("bio").unwrap().ty = LiveType::Foreign("citext".into());

        let handle = CrudHandle::bind(&def, &live, "public", UpsertStrategy::default());
        let names: Vec<_> = handle.column_names().collect();
        assert_eq!(names, vec!["id", "nickname", "bio"]);

        let err = handle.check_row(crate::row! { "age" => 30 }).unwrap_err();
        assert!(matches!(err, Error::UnknownColumn { ref column, .. } if column == "age"));
    }

    #[test]
    fn test_upsert_strategy_from_str() {
        assert_eq!(
            "atomic-preferred".parse::<UpsertStrategy>(),
            Ok(UpsertStrategy::AtomicPreferred)
        );
        assert_eq!("EMULATED".parse::<UpsertStrategy>(), Ok(UpsertStrategy::Emulated));
        assert_eq!("atomic-only".parse::<UpsertStrategy>(), Ok(UpsertStrategy::AtomicOnly));
        assert!("sometimes".parse::<UpsertStrategy>().is_err());
    }
}
