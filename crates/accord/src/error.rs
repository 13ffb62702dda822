use accord_schema::{LogicalType, SchemaError};
use thiserror::Error;
use tokio_postgres::error::SqlState;

use crate::reconcile::{PlanError, SchemaConflict};

/// Failures at the database boundary.
#[derive(Debug, Error)]
pub enum DbError {
    /// The server rejected a statement.
    #[error("{message} (SQLSTATE {code})")]
    Server { code: String, message: String },

    /// Connection-level failure (closed socket, protocol error, ...).
    #[error("postgres error: {0}")]
    Postgres(#[source] tokio_postgres::Error),

    #[error("pool error: {0}")]
    Pool(String),

    /// A pool wait or a statement ran out of time.
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("cannot decode column {column}: {message}")]
    Decode { column: String, message: String },

    #[error("unexpected result: {0}")]
    UnexpectedResult(String),
}

impl DbError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DbError::Timeout(_))
    }

    /// The SQLSTATE code, when the server rejected the statement.
    pub fn code(&self) -> Option<&str> {
        match self {
            DbError::Server { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<tokio_postgres::Error> for DbError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.as_db_error() {
            Some(db) if *db.code() == SqlState::QUERY_CANCELED => {
                DbError::Timeout(db.message().to_string())
            }
            Some(db) => DbError::Server {
                code: db.code().code().to_string(),
                message: db.message().to_string(),
            },
            None => DbError::Postgres(e),
        }
    }
}

impl From<deadpool_postgres::PoolError> for DbError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        match e {
            deadpool_postgres::PoolError::Timeout(kind) => {
                DbError::Timeout(format!("pool {kind:?} timeout"))
            }
            deadpool_postgres::PoolError::Backend(e) => e.into(),
            other => DbError::Pool(other.to_string()),
        }
    }
}

/// Failure of a single DDL operation during [`crate::executor::apply`].
///
/// Operations before `index` were applied and stay applied.
#[derive(Debug, Error)]
#[error("ddl operation #{index} ({operation}) failed after {applied} applied: {source}")]
pub struct DdlError {
    /// Position of the failed operation in the plan.
    pub index: usize,
    /// How many operations were applied before it.
    pub applied: usize,
    pub operation: String,
    pub sql: String,
    #[source]
    pub source: DbError,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot introspect schema {schema}: {source}")]
    Introspection {
        schema: String,
        #[source]
        source: DbError,
    },

    #[error("{}", display_conflicts(.0))]
    Conflicts(Vec<SchemaConflict>),

    #[error(transparent)]
    Ddl(#[from] DdlError),

    #[error("invalid plan: {0}")]
    InvalidPlan(#[from] PlanError),

    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    #[error("table {table}: primary key column {column} cannot be updated")]
    ImmutableKey { table: String, column: String },

    #[error("table {table}: invalid key: {reason}")]
    InvalidKey { table: String, reason: String },

    #[error("table {table}: column {column} is {expected}, got {actual} value")]
    TypeMismatch {
        table: String,
        column: String,
        expected: LogicalType,
        actual: &'static str,
    },

    #[error("table {table}: nothing to update")]
    EmptyRow { table: String },

    #[error("table {0} declared more than once")]
    DuplicateTable(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("timed out: {0}")]
    Timeout(#[source] DbError),

    #[error("database error: {0}")]
    Database(#[source] DbError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True when the underlying cause is a timeout, whatever phase hit it.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout(_) => true,
            Error::Introspection { source, .. } => source.is_timeout(),
            Error::Ddl(e) => e.source.is_timeout(),
            _ => false,
        }
    }
}

impl From<DbError> for Error {
    fn from(e: DbError) -> Self {
        if e.is_timeout() {
            Error::Timeout(e)
        } else {
            Error::Database(e)
        }
    }
}

fn display_conflicts(conflicts: &[SchemaConflict]) -> String {
    let mut out = format!("{} schema conflict(s):", conflicts.len());
    for c in conflicts {
        out.push_str("\n  ");
        out.push_str(&c.to_string());
    }
    out
}
