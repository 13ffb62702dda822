//! An in-memory [`Connection`] that records every statement.
//!
//! Catalog queries are answered from a [`Catalog`]; once any statement has
//! been executed, the `after` catalog (if set) is served instead, standing
//! in for the schema the DDL produced. Every other query and execute pops
//! the next scripted result, defaulting to no rows / zero affected.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use accord::{BoxFuture, Connection, DbError, LogicalType, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub schema_exists: bool,
    /// (table, column, data_type, udt_name, nullable, primary_key)
    pub columns: Vec<(String, String, String, String, bool, bool)>,
    pub indexes: Vec<(String, String)>,
    /// (table, comment)
    pub table_comments: Vec<(String, String)>,
    /// (table, column, comment)
    pub column_comments: Vec<(String, String, String)>,
    /// (table, column) of identity columns
    pub identities: Vec<(String, String)>,
}

impl Catalog {
    /// A schema that does not exist.
    pub fn missing() -> Self {
        Self::default()
    }

    /// An existing schema without tables.
    pub fn empty() -> Self {
        Self {
            schema_exists: true,
            ..Self::default()
        }
    }

    pub fn column(
        mut self,
        table: &str,
        name: &str,
        data_type: &str,
        udt: &str,
        nullable: bool,
        primary_key: bool,
    ) -> Self {
        self.columns.push((
            table.to_string(),
            name.to_string(),
            data_type.to_string(),
            udt.to_string(),
            nullable,
            primary_key,
        ));
        self
    }

    pub fn index(mut self, table: &str, name: &str) -> Self {
        self.indexes.push((table.to_string(), name.to_string()));
        self
    }

    pub fn table_comment(mut self, table: &str, comment: &str) -> Self {
        self.table_comments.push((table.to_string(), comment.to_string()));
        self
    }

    pub fn column_comment(mut self, table: &str, column: &str, comment: &str) -> Self {
        self.column_comments
            .push((table.to_string(), column.to_string(), comment.to_string()));
        self
    }

    pub fn identity(mut self, table: &str, column: &str) -> Self {
        self.identities.push((table.to_string(), column.to_string()));
        self
    }

    /// `users (id integer primary key, name text)`.
    pub fn users() -> Self {
        Self::empty()
            .column("users", "id", "integer", "int4", false, true)
            .column("users", "name", "text", "text", true, false)
            .index("users", "users_pkey")
    }

    fn tables(&self) -> Vec<Vec<Value>> {
        let mut tables: Vec<&str> = Vec::new();
        for (table, ..) in &self.columns {
            if !tables.contains(&table.as_str()) {
                tables.push(table);
            }
        }
        tables
            .into_iter()
            .map(|t| {
                let comment = self
                    .table_comments
                    .iter()
                    .find(|(table, _)| table == t)
                    .map_or(Value::Null, |(_, c)| Value::from(c.as_str()));
                vec![Value::from(t), comment]
            })
            .collect()
    }

    fn column_rows(&self) -> Vec<Vec<Value>> {
        self.columns
            .iter()
            .map(|(table, name, data_type, udt, nullable, pk)| {
                let identity = self
                    .identities
                    .iter()
                    .any(|(t, c)| t == table && c == name);
                let comment = self
                    .column_comments
                    .iter()
                    .find(|(t, c, _)| t == table && c == name)
                    .map_or(Value::Null, |(.., text)| Value::from(text.as_str()));
                vec![
                    Value::from(table.as_str()),
                    Value::from(name.as_str()),
                    Value::from(data_type.as_str()),
                    Value::from(udt.as_str()),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                    Value::Bool(*nullable),
                    Value::Null,
                    Value::Bool(*pk),
                    Value::Bool(identity),
                    comment,
                ]
            })
            .collect()
    }

    fn index_rows(&self) -> Vec<Vec<Value>> {
        self.indexes
            .iter()
            .map(|(t, i)| vec![Value::from(t.as_str()), Value::from(i.as_str())])
            .collect()
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    executed: bool,
    queries: VecDeque<Result<Vec<Vec<Value>>, DbError>>,
    executes: VecDeque<Result<u64, DbError>>,
}

#[derive(Default)]
pub struct FakeDb {
    before: Catalog,
    after: Option<Catalog>,
    deny_catalog: bool,
    state: Mutex<State>,
}

impl FakeDb {
    pub fn new(before: Catalog) -> Self {
        Self {
            before,
            ..Self::default()
        }
    }

    pub fn after(mut self, after: Catalog) -> Self {
        self.after = Some(after);
        self
    }

    /// Fail every catalog query with a permission error.
    pub fn deny_catalog(mut self) -> Self {
        self.deny_catalog = true;
        self
    }

    /// Script the result of the next non-catalog query.
    pub fn push_rows(&self, rows: Vec<Vec<Value>>) {
        self.state.lock().unwrap().queries.push_back(Ok(rows));
    }

    pub fn push_query_error(&self, error: DbError) {
        self.state.lock().unwrap().queries.push_back(Err(error));
    }

    /// Script the result of the next execute.
    pub fn push_execute(&self, result: Result<u64, DbError>) {
        self.state.lock().unwrap().executes.push_back(result);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Statements that are not catalog reads.
    pub fn statements(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !is_catalog(&c.sql))
            .collect()
    }

    pub fn ddl(&self) -> Vec<String> {
        self.statements()
            .into_iter()
            .map(|c| c.sql)
            .filter(|sql| {
                sql.starts_with("CREATE") || sql.starts_with("ALTER") || sql.starts_with("COMMENT")
            })
            .collect()
    }

    fn catalog_rows(&self, sql: &str, executed: bool) -> Vec<Vec<Value>> {
        let catalog = match (&self.after, executed) {
            (Some(after), true) => after,
            _ => &self.before,
        };
        if sql.contains("information_schema.columns") {
            catalog.column_rows()
        } else if sql.contains("information_schema.tables") {
            catalog.tables()
        } else if sql.contains("pg_indexes") {
            catalog.index_rows()
        } else {
            vec![vec![Value::Bool(catalog.schema_exists)]]
        }
    }
}

fn is_catalog(sql: &str) -> bool {
    sql.contains("pg_catalog") || sql.contains("information_schema")
}

pub fn permission_denied() -> DbError {
    DbError::Server {
        code: "42501".to_string(),
        message: "permission denied for schema app".to_string(),
    }
}

impl FakeDb {
    fn record(&self, sql: &str, params: &[Value]) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        state
    }
}

impl Connection for FakeDb {
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>> {
        let result = {
            let mut state = self.record(sql, params);
            let result = state.executes.pop_front().unwrap_or(Ok(0));
            if result.is_ok() {
                state.executed = true;
            }
            result
        };
        Box::pin(async move { result })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        _columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>> {
        let result = {
            let mut state = self.record(sql, params);
            if !is_catalog(sql) {
                state.queries.pop_front().unwrap_or(Ok(Vec::new()))
            } else if self.deny_catalog {
                Err(permission_denied())
            } else {
                Ok(self.catalog_rows(sql, state.executed))
            }
        };
        Box::pin(async move { result })
    }
}
