//! Additive schema reconciliation and generic CRUD for Postgres.
//!
//! Tables are declared in code as [`TableDef`]s. One reconciliation pass
//! introspects the live schema, plans the DDL that brings it in line with
//! the declarations, applies it, and binds a [`CrudHandle`] per table:
//!
//! ```ignore
//! use accord::{Accord, ColumnDef, LogicalType, ReconcileOptions, TableDef, row};
//!
//! let users = TableDef::builder("users")
//!     .column(ColumnDef::new("id", LogicalType::Integer).primary_key())
//!     .column(ColumnDef::new("name", LogicalType::Text))
//!     .build()?;
//!
//! let accord = Accord::new(pool, ReconcileOptions::default());
//! let bound = accord.ensure_and_bind(&[users]).await?;
//!
//! let users = bound.handle("users").unwrap();
//! let key = users.insert(accord.connection(), row! { "id" => 1, "name" => "a" }).await?;
//! let found = users.find_by_key(accord.connection(), &key).await?;
//! ```
//!
//! # Safety policy
//!
//! Reconciliation is additive only. Schemas, tables, columns and indexes are
//! created when missing; nothing is ever dropped, retyped or re-keyed.
//! Disagreements the planner will not fix are reported as conflicts, which
//! abort the pass in [`Mode::Strict`] and are logged in [`Mode::Lenient`].
//!
//! # Concurrency
//!
//! DDL runs sequentially, one autocommitted statement per operation. All
//! DDL uses `IF NOT EXISTS`, so two processes reconciling the same schema
//! at once mostly converge, but nothing here coordinates them.

pub mod config;
mod connection;
pub mod crud;
mod error;
pub mod executor;
mod facade;
pub mod introspect;
pub mod reconcile;
mod row;
mod traced;
mod value;

pub use config::{Config, Mode, ReconcileOptions};
pub use connection::{BoxFuture, Connection};
pub use crud::{CrudHandle, PageRequest, Sort, UpsertStrategy};
pub use error::{DbError, DdlError, Error};
pub use facade::{Accord, Bound, ReconcileReport};
pub use introspect::{LiveColumn, LiveTable, SchemaSnapshot};
pub use reconcile::{
    DdlOperation, Diagnostics, Plan, PlanError, SchemaConflict, SchemaWarning, plan, simulate,
};
pub use row::{Row, decode_row};
pub use traced::TracedPool;
pub use value::Value;

pub use accord_schema::{
    ColumnDef, IndexDef, LiveType, LogicalType, SchemaError, SqlTypeDescriptor, TableDef,
    TableDefBuilder, from_sql_type, normalize_ident,
};

/// Result type for accord operations.
pub type Result<T> = std::result::Result<T, Error>;
