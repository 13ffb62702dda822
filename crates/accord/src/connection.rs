//! The database seam.
//!
//! Everything above this module talks to Postgres through [`Connection`],
//! passing [`Value`] parameters and getting decoded rows back. That keeps
//! the reconciler and the CRUD layer testable without a server.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use accord_schema::LogicalType;
use tokio_postgres::types::ToSql;

use crate::Value;
use crate::error::DbError;
use crate::row::{decode_row, sql_params};
use crate::traced::{traced_execute, traced_query};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Trait for database connections that can execute queries.
///
/// Implemented for `tokio_postgres::Client`, `deadpool_postgres::Object`
/// and [`crate::TracedPool`].
pub trait Connection: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>>;

    /// Execute a query, decoding each result column as the matching entry of
    /// `columns`.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>>;
}

impl<C: Connection + ?Sized> Connection for &C {
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>> {
        (**self).execute(sql, params)
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>> {
        (**self).query(sql, params, columns)
    }
}

impl<C: Connection + ?Sized> Connection for Arc<C> {
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>> {
        (**self).execute(sql, params)
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>> {
        (**self).query(sql, params, columns)
    }
}

pub(crate) async fn client_execute(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[Value],
) -> Result<u64, DbError> {
    let params = sql_params(params);
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    Ok(traced_execute(client, sql, &refs).await?)
}

pub(crate) async fn client_query(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[Value],
    columns: &[LogicalType],
) -> Result<Vec<Vec<Value>>, DbError> {
    let params = sql_params(params);
    let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
    let rows = traced_query(client, sql, &refs).await?;
    rows.iter().map(|row| decode_row(row, columns)).collect()
}

impl Connection for tokio_postgres::Client {
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>> {
        Box::pin(client_execute(self, sql, params))
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>> {
        Box::pin(client_query(self, sql, params, columns))
    }
}

impl Connection for deadpool_postgres::Object {
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>> {
        // Deref to the underlying Client to avoid recursion
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client_execute(client, sql, params))
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>> {
        use std::ops::Deref;
        let client: &tokio_postgres::Client = self.deref();
        Box::pin(client_query(client, sql, params, columns))
    }
}
