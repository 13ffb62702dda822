//! Traced database access.
//!
//! Every statement runs inside a `db.execute` or `db.query` debug span that
//! records the SQL text, the parameter count and the outcome.

use accord_schema::LogicalType;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Error, Row};
use tracing::Instrument;

use crate::Value;
use crate::connection::{BoxFuture, Connection, client_execute, client_query};
use crate::error::DbError;

/// Execute a statement, returning the number of rows affected.
pub(crate) async fn traced_execute(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<u64, Error> {
    let span = tracing::debug_span!(
        "db.execute",
        sql = %sql,
        params = params.len(),
        affected = tracing::field::Empty,
    );
    let affected = client.execute(sql, params).instrument(span.clone()).await?;
    span.record("affected", affected);
    Ok(affected)
}

/// Execute a query, returning all rows.
pub(crate) async fn traced_query(
    client: &tokio_postgres::Client,
    sql: &str,
    params: &[&(dyn ToSql + Sync)],
) -> Result<Vec<Row>, Error> {
    let span = tracing::debug_span!(
        "db.query",
        sql = %sql,
        params = params.len(),
        rows = tracing::field::Empty,
    );
    let rows = client.query(sql, params).instrument(span.clone()).await?;
    span.record("rows", rows.len());
    Ok(rows)
}

/// A traced connection pool.
///
/// Wraps a `deadpool_postgres::Pool`. Each call checks out a connection for
/// the duration of one statement, so independent CRUD calls can run
/// concurrently.
///
/// # Example
///
/// ```ignore
/// use accord::{Accord, ReconcileOptions, TracedPool};
///
/// let pool = TracedPool::new(pool);
/// let accord = Accord::new(pool, ReconcileOptions::default());
/// let bound = accord.ensure_and_bind(&tables).await?;
/// ```
#[derive(Clone)]
pub struct TracedPool {
    inner: deadpool_postgres::Pool,
}

impl TracedPool {
    /// Create a new traced pool wrapper.
    pub fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { inner: pool }
    }

    /// Get a connection from the pool.
    pub async fn get(&self) -> Result<deadpool_postgres::Object, DbError> {
        Ok(self.inner.get().await?)
    }

    /// Get the inner pool (for cases where you need the raw pool).
    pub fn inner(&self) -> &deadpool_postgres::Pool {
        &self.inner
    }
}

impl Connection for TracedPool {
    fn execute<'a>(&'a self, sql: &'a str, params: &'a [Value]) -> BoxFuture<'a, Result<u64, DbError>> {
        Box::pin(async move {
            let conn = self.get().await?;
            client_execute(&conn, sql, params).await
        })
    }

    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [Value],
        columns: &'a [LogicalType],
    ) -> BoxFuture<'a, Result<Vec<Vec<Value>>, DbError>> {
        Box::pin(async move {
            let conn = self.get().await?;
            client_query(&conn, sql, params, columns).await
        })
    }
}
