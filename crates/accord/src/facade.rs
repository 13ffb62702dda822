//! The entry point: reconcile, then bind CRUD handles.

use std::collections::HashSet;

use accord_schema::TableDef;
use indexmap::IndexMap;

use crate::config::{Mode, ReconcileOptions};
use crate::connection::Connection;
use crate::crud::CrudHandle;
use crate::error::Error;
use crate::executor;
use crate::introspect::{self, SchemaSnapshot};
use crate::reconcile::{self, DdlOperation, Plan, SchemaConflict, SchemaWarning};
use crate::Result;

/// What a reconciliation pass did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub schema: String,
    /// The planned operations, in order.
    pub operations: Vec<DdlOperation>,
    /// `operations` rendered to SQL.
    pub statements: Vec<String>,
    pub created_tables: Vec<String>,
    /// `(table, column)` pairs.
    pub added_columns: Vec<(String, String)>,
    pub created_indexes: Vec<String>,
    /// Comment targets, `table` or `table.column`.
    pub commented: Vec<String>,
    pub conflicts: Vec<SchemaConflict>,
    pub warnings: Vec<SchemaWarning>,
    /// How many operations were executed. Zero on a dry run.
    pub applied: usize,
    pub dry_run: bool,
}

impl ReconcileReport {
    fn new(plan: Plan, applied: usize, dry_run: bool) -> Self {
        let statements = plan.statements();
        let mut report = Self {
            schema: plan.schema,
            operations: Vec::new(),
            statements,
            created_tables: Vec::new(),
            added_columns: Vec::new(),
            created_indexes: Vec::new(),
            commented: Vec::new(),
            conflicts: plan.diagnostics.conflicts,
            warnings: plan.diagnostics.warnings,
            applied,
            dry_run,
        };

        for op in plan.operations.iter().take(applied) {
            match op {
                DdlOperation::CreateSchema { .. } => {}
                DdlOperation::CreateTable(t) => report.created_tables.push(t.name().to_string()),
                DdlOperation::AddColumn { table, column } => {
                    report.added_columns.push((table.clone(), column.name.clone()))
                }
                DdlOperation::CreateIndex { index, .. } => {
                    report.created_indexes.push(index.name().to_string())
                }
                DdlOperation::SetTableComment { table, .. } => report.commented.push(table.clone()),
                DdlOperation::SetColumnComment { table, column, .. } => {
                    report.commented.push(format!("{table}.{column}"))
                }
            }
        }
        report.operations = plan.operations;
        report
    }

    /// True when any DDL was executed.
    pub fn changed(&self) -> bool {
        self.applied > 0
    }
}

/// The result of [`Accord::ensure_and_bind`].
#[derive(Debug, Clone)]
pub struct Bound {
    pub report: ReconcileReport,
    handles: IndexMap<String, CrudHandle>,
}

impl Bound {
    /// The handle for `table`, if it could be bound.
    pub fn handle(&self, table: &str) -> Option<&CrudHandle> {
        self.handles
            .get(table)
            .or_else(|| self.handles.get(&table.trim().to_ascii_lowercase()))
    }

    /// All bound handles, in declared order.
    pub fn handles(&self) -> &IndexMap<String, CrudHandle> {
        &self.handles
    }

    pub fn into_handles(self) -> IndexMap<String, CrudHandle> {
        self.handles
    }
}

/// Reconciles declared tables against one schema and hands out CRUD
/// handles.
///
/// # Example
///
/// ```ignore
/// let accord = Accord::new(config.build_pool()?, config.options.clone());
/// let bound = accord.ensure_and_bind(&[users]).await?;
/// let users = bound.handle("users").unwrap();
/// users.insert(accord.connection(), row! { "id" => 1, "name" => "a" }).await?;
/// ```
pub struct Accord<C> {
    conn: C,
    options: ReconcileOptions,
}

impl<C: Connection> Accord<C> {
    pub fn new(conn: C, options: ReconcileOptions) -> Self {
        Self { conn, options }
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// Read the live state of the configured schema.
    pub async fn introspect(&self) -> Result<SchemaSnapshot> {
        introspect::snapshot(&self.conn, &self.options.schema).await
    }

    /// Plan against the live schema without touching it.
    pub async fn plan(&self, tables: &[TableDef]) -> Result<Plan> {
        check_unique(tables)?;
        let snapshot = self.introspect().await?;
        Ok(reconcile::plan(tables, &snapshot))
    }

    /// Run one reconciliation pass and bind a handle per table.
    ///
    /// In strict mode any conflict aborts the pass before DDL runs. In
    /// lenient mode conflicts are logged and the affected tables are still
    /// bound where possible, without their conflicting columns. A table is
    /// left unbound when it does not exist live, when its live primary key
    /// differs from the declared one, or when a key column's type conflicts.
    pub async fn ensure_and_bind(&self, tables: &[TableDef]) -> Result<Bound> {
        check_unique(tables)?;
        let schema = self.options.schema.as_str();

        let before = self.introspect().await?;
        let plan = reconcile::plan(tables, &before);

        for conflict in &plan.diagnostics.conflicts {
            tracing::warn!(schema, %conflict, "schema conflict");
        }
        for warning in &plan.diagnostics.warnings {
            tracing::warn!(schema, %warning, "schema warning");
        }

        if self.options.mode == Mode::Strict && !plan.diagnostics.conflicts.is_empty() {
            return Err(Error::Conflicts(plan.diagnostics.conflicts));
        }

        // Refuse plans whose steps would not apply cleanly in order.
        reconcile::simulate(&before, &plan.operations)?;

        let (applied, live) = if self.options.dry_run {
            for op in &plan.operations {
                tracing::info!(schema, %op, "dry run: not applied");
            }
            (0, before)
        } else if plan.is_empty() {
            (0, before)
        } else {
            let applied = executor::apply(&self.conn, schema, &plan.operations).await?;
            (applied, self.introspect().await?)
        };

        let rekeyed: HashSet<&str> = plan
            .diagnostics
            .conflicts
            .iter()
            .filter(|c| matches!(c, SchemaConflict::PrimaryKeyMismatch { .. }))
            .map(|c| c.table())
            .collect();

        let mut handles = IndexMap::with_capacity(tables.len());
        for table in tables {
            let Some(live_table) = live.table(table.name()) else {
                tracing::warn!(schema, table = table.name(), "table not live, no handle bound");
                continue;
            };
            if rekeyed.contains(table.name()) {
                tracing::warn!(
                    schema,
                    table = table.name(),
                    "live primary key differs from declared, no handle bound"
                );
                continue;
            }
            if let Some(bad) = table.primary_key().find(|c| {
                !live_table
                    .column(&c.name)
                    .is_some_and(|l| c.ty.is_satisfied_by(&l.ty))
            }) {
                tracing::warn!(
                    schema,
                    table = table.name(),
                    column = %bad.name,
                    "primary key column missing or mistyped, no handle bound"
                );
                continue;
            }
            handles.insert(
                table.name().to_string(),
                CrudHandle::bind(table, live_table, schema, self.options.upsert),
            );
        }

        let report = ReconcileReport::new(plan, applied, self.options.dry_run);
        tracing::info!(
            schema,
            applied = report.applied,
            created_tables = report.created_tables.len(),
            added_columns = report.added_columns.len(),
            created_indexes = report.created_indexes.len(),
            conflicts = report.conflicts.len(),
            warnings = report.warnings.len(),
            bound = handles.len(),
            dry_run = report.dry_run,
            "reconciliation complete"
        );

        Ok(Bound { report, handles })
    }
}

fn check_unique(tables: &[TableDef]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tables.len());
    for table in tables {
        if !seen.insert(table.name()) {
            return Err(Error::DuplicateTable(table.name().to_string()));
        }
    }
    Ok(())
}
