//! Reconciliation planning.
//!
//! [`plan`] compares declared tables against a [`SchemaSnapshot`] and
//! produces an ordered list of additive DDL operations:
//!
//! ```text
//! + schema app
//! + table users
//! + index uq_users_email on users (email)
//! + posts.published_at: TIMESTAMPTZ
//! ~ comment posts.published_at
//! ```
//!
//! Nothing is ever dropped, retyped or re-keyed. Differences the planner
//! will not fix are reported as [`SchemaConflict`]s (declared and live
//! disagree in a way that matters) or [`SchemaWarning`]s (informational).
//!
//! [`simulate`] applies a plan to a snapshot in memory, checking every
//! operation's preconditions the same way the database would.

use std::collections::{HashMap, HashSet};
use std::fmt;

use accord_schema::{ColumnDef, IndexDef, LiveType, LogicalType, TableDef};
use accord_sql::{AddColumnStmt, CommentStmt, CreateSchemaStmt, Stmt, TableRef, render};

use crate::introspect::{LiveColumn, LiveTable, SchemaSnapshot};

/// A single additive DDL operation.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlOperation {
    /// Create the target schema.
    CreateSchema { schema: String },
    /// Create a table with all its declared columns.
    CreateTable(TableDef),
    /// Add a missing column to an existing table.
    AddColumn { table: String, column: ColumnDef },
    /// Create a missing index.
    CreateIndex { table: String, index: IndexDef },
    /// Set the comment on a table.
    SetTableComment { table: String, comment: String },
    /// Set the comment on a column.
    SetColumnComment {
        table: String,
        column: String,
        comment: String,
    },
}

impl DdlOperation {
    /// The table this operation touches, if any.
    pub fn table(&self) -> Option<&str> {
        match self {
            DdlOperation::CreateSchema { .. } => None,
            DdlOperation::CreateTable(t) => Some(t.name()),
            DdlOperation::AddColumn { table, .. }
            | DdlOperation::CreateIndex { table, .. }
            | DdlOperation::SetTableComment { table, .. }
            | DdlOperation::SetColumnComment { table, .. } => Some(table),
        }
    }

    /// The statement for this operation, with tables qualified by `schema`.
    pub fn to_stmt(&self, schema: &str) -> Stmt {
        match self {
            DdlOperation::CreateSchema { schema } => {
                Stmt::CreateSchema(CreateSchemaStmt::new(schema.as_str()))
            }
            DdlOperation::CreateTable(t) => Stmt::CreateTable(t.create_table_stmt(schema)),
            DdlOperation::AddColumn { table, column } => Stmt::AddColumn(AddColumnStmt::new(
                TableRef::qualified(schema, table.as_str()),
                column.to_column_spec(),
            )),
            DdlOperation::CreateIndex { table, index } => Stmt::CreateIndex(
                index.create_index_stmt(TableRef::qualified(schema, table.as_str())),
            ),
            DdlOperation::SetTableComment { table, comment } => Stmt::Comment(
                CommentStmt::on_table(TableRef::qualified(schema, table.as_str()), comment.as_str()),
            ),
            DdlOperation::SetColumnComment {
                table,
                column,
                comment,
            } => Stmt::Comment(CommentStmt::on_column(
                TableRef::qualified(schema, table.as_str()),
                column.as_str(),
                comment.as_str(),
            )),
        }
    }

    /// Generate the SQL statement for this operation.
    pub fn to_sql(&self, schema: &str) -> String {
        render(&self.to_stmt(schema)).sql
    }
}

impl fmt::Display for DdlOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DdlOperation::CreateSchema { schema } => write!(f, "+ schema {}", schema),
            DdlOperation::CreateTable(t) => write!(f, "+ table {}", t.name()),
            DdlOperation::AddColumn { table, column } => {
                write!(f, "+ {}.{}: {}", table, column.name, column.ty)
            }
            DdlOperation::CreateIndex { table, index } => write!(
                f,
                "+ {}index {} on {} ({})",
                if index.is_unique() { "unique " } else { "" },
                index.name(),
                table,
                index.columns().join(", ")
            ),
            DdlOperation::SetTableComment { table, .. } => write!(f, "~ comment {}", table),
            DdlOperation::SetColumnComment { table, column, .. } => {
                write!(f, "~ comment {}.{}", table, column)
            }
        }
    }
}

/// A declared/live disagreement the planner refuses to resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaConflict {
    /// The live column type does not match the declared logical type.
    TypeMismatch {
        table: String,
        column: String,
        declared: LogicalType,
        live: LiveType,
    },
    /// The live primary key differs from the declared one.
    PrimaryKeyMismatch {
        table: String,
        declared: Vec<String>,
        live: Vec<String>,
    },
}

impl SchemaConflict {
    pub fn table(&self) -> &str {
        match self {
            SchemaConflict::TypeMismatch { table, .. }
            | SchemaConflict::PrimaryKeyMismatch { table, .. } => table,
        }
    }
}

impl fmt::Display for SchemaConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaConflict::TypeMismatch {
                table,
                column,
                declared,
                live,
            } => write!(
                f,
                "{}.{}: declared {} but live column is {}",
                table, column, declared, live
            ),
            SchemaConflict::PrimaryKeyMismatch {
                table,
                declared,
                live,
            } => write!(
                f,
                "{}: declared primary key ({}) but live primary key is ({})",
                table,
                declared.join(", "),
                live.join(", ")
            ),
        }
    }
}

/// Something worth telling an operator about that needs no action.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaWarning {
    /// The live column has a type we do not model; it is accepted as-is.
    ForeignType {
        table: String,
        column: String,
        declared: LogicalType,
        live: String,
    },
    /// Declared and live nullability differ; nullability is never altered.
    NullabilityDrift {
        table: String,
        column: String,
        declared_nullable: bool,
    },
    /// A live column the declaration does not mention. Left untouched.
    UndeclaredColumn { table: String, column: String },
    /// A missing index was not planned.
    IndexSkipped {
        table: String,
        index: String,
        reason: String,
    },
    /// The index name already belongs to another table in the schema.
    IndexNameTaken {
        table: String,
        index: String,
        owner: String,
    },
    /// Declared and live identity generation differ; never altered.
    IdentityDrift {
        table: String,
        column: String,
        declared_identity: bool,
    },
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaWarning::ForeignType {
                table,
                column,
                declared,
                live,
            } => write!(
                f,
                "{}.{}: declared {} but live type {} is not understood; leaving it alone",
                table, column, declared, live
            ),
            SchemaWarning::NullabilityDrift {
                table,
                column,
                declared_nullable,
            } => {
                let (declared, live) = if *declared_nullable {
                    ("nullable", "NOT NULL")
                } else {
                    ("NOT NULL", "nullable")
                };
                write!(f, "{}.{}: declared {} but live column is {}", table, column, declared, live)
            }
            SchemaWarning::UndeclaredColumn { table, column } => {
                write!(f, "{}.{}: live column is not declared", table, column)
            }
            SchemaWarning::IndexSkipped {
                table,
                index,
                reason,
            } => write!(f, "{}: index {} skipped: {}", table, index, reason),
            SchemaWarning::IndexNameTaken {
                table,
                index,
                owner,
            } => write!(
                f,
                "{}: index {} not created, the name is taken by table {}",
                table, index, owner
            ),
            SchemaWarning::IdentityDrift {
                table,
                column,
                declared_identity,
            } => {
                let (declared, live) = if *declared_identity {
                    ("an identity", "a plain column")
                } else {
                    ("a plain column", "an identity")
                };
                write!(f, "{}.{}: declared {} but live column is {}", table, column, declared, live)
            }
        }
    }
}

/// Conflicts and warnings found while planning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub conflicts: Vec<SchemaConflict>,
    pub warnings: Vec<SchemaWarning>,
}

impl Diagnostics {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.warnings.is_empty()
    }
}

/// The outcome of planning: operations in execution order plus diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub schema: String,
    pub operations: Vec<DdlOperation>,
    pub diagnostics: Diagnostics,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Render every operation to SQL, in order.
    pub fn statements(&self) -> Vec<String> {
        self.operations
            .iter()
            .map(|op| op.to_sql(&self.schema))
            .collect()
    }
}

/// Compute the operations that bring `snapshot` up to `tables`.
///
/// Ordering: schema creation first, then tables in declared order. A new
/// table gets `CreateTable`; an existing table gets one `AddColumn` per
/// missing column in declared column order. Either is followed by comment
/// changes (table first, then columns in declared order) and then by the
/// missing indexes.
///
/// Index names are unique across the schema, so an index whose name is
/// held by another table is reported instead of planned.
pub fn plan(tables: &[TableDef], snapshot: &SchemaSnapshot) -> Plan {
    let mut operations = Vec::new();
    let mut diagnostics = Diagnostics::default();
    // index name -> table, for indexes planned in this pass
    let mut claimed: HashMap<String, String> = HashMap::new();

    if !snapshot.schema_exists {
        operations.push(DdlOperation::CreateSchema {
            schema: snapshot.schema.clone(),
        });
    }

    for table in tables {
        let unusable = match snapshot.table(table.name()) {
            None => {
                operations.push(DdlOperation::CreateTable(table.clone()));
                plan_comments(table, None, &mut operations);
                HashSet::new()
            }
            Some(live) => {
                let unusable = plan_existing(table, live, &mut operations, &mut diagnostics);
                plan_comments(table, Some(live), &mut operations);
                unusable
            }
        };
        plan_indexes(
            table,
            snapshot,
            &unusable,
            &mut claimed,
            &mut operations,
            &mut diagnostics,
        );
    }

    Plan {
        schema: snapshot.schema.clone(),
        operations,
        diagnostics,
    }
}

/// Columns and key checks for a table that exists. Returns the columns no
/// index may be built on.
fn plan_existing<'t>(
    table: &'t TableDef,
    live: &LiveTable,
    operations: &mut Vec<DdlOperation>,
    diagnostics: &mut Diagnostics,
) -> HashSet<&'t str> {
    let name = table.name();

    let declared_pk = table.primary_key_names();
    let live_pk = live.primary_key();
    let same_pk = declared_pk.len() == live_pk.len()
        && declared_pk.iter().all(|c| live_pk.contains(c));
    if !same_pk {
        diagnostics.conflicts.push(SchemaConflict::PrimaryKeyMismatch {
            table: name.to_string(),
            declared: declared_pk.iter().map(|c| c.to_string()).collect(),
            live: live_pk.iter().map(|c| c.to_string()).collect(),
        });
    }

    // Columns an index must not be built on: missing key columns and
    // columns whose type conflicts.
    let mut unusable: HashSet<&'t str> = HashSet::new();

    for column in table.columns() {
        match live.column(&column.name) {
            None if column.primary_key => {
                // Already reported as a primary key conflict; adding the
                // column would not make it part of the key.
                unusable.insert(&column.name);
            }
            None => operations.push(DdlOperation::AddColumn {
                table: name.to_string(),
                column: column.clone(),
            }),
            Some(live_col) => {
                if !check_column(name, column, live_col, diagnostics) {
                    unusable.insert(&column.name);
                }
            }
        }
    }

    for live_col in live.columns.values() {
        if table.column(&live_col.name).is_none() {
            diagnostics.warnings.push(SchemaWarning::UndeclaredColumn {
                table: name.to_string(),
                column: live_col.name.clone(),
            });
        }
    }

    unusable
}

/// Declared comments that are missing or differ live. Comments are only
/// ever set, never cleared.
fn plan_comments(table: &TableDef, live: Option<&LiveTable>, operations: &mut Vec<DdlOperation>) {
    let name = table.name();

    if let Some(comment) = table.comment() {
        if live.and_then(|t| t.comment.as_deref()) != Some(comment) {
            operations.push(DdlOperation::SetTableComment {
                table: name.to_string(),
                comment: comment.to_string(),
            });
        }
    }

    for column in table.columns() {
        let Some(comment) = column.comment.as_deref() else {
            continue;
        };
        let live_comment = match live {
            None => None,
            Some(t) => match t.column(&column.name) {
                Some(c) => c.comment.as_deref(),
                // a missing key column is never added
                None if column.primary_key => continue,
                None => None,
            },
        };
        if live_comment != Some(comment) {
            operations.push(DdlOperation::SetColumnComment {
                table: name.to_string(),
                column: column.name.clone(),
                comment: comment.to_string(),
            });
        }
    }
}

fn plan_indexes(
    table: &TableDef,
    snapshot: &SchemaSnapshot,
    unusable: &HashSet<&str>,
    claimed: &mut HashMap<String, String>,
    operations: &mut Vec<DdlOperation>,
    diagnostics: &mut Diagnostics,
) {
    let name = table.name();

    for index in table.indexes() {
        let owner = snapshot
            .index_owner(index.name())
            .or_else(|| claimed.get(index.name()).map(String::as_str));
        match owner {
            Some(owner) if owner == name => continue,
            Some(owner) => {
                diagnostics.warnings.push(SchemaWarning::IndexNameTaken {
                    table: name.to_string(),
                    index: index.name().to_string(),
                    owner: owner.to_string(),
                });
                continue;
            }
            None => {}
        }
        if let Some(column) = index.columns().iter().find(|c| unusable.contains(c.as_str())) {
            diagnostics.warnings.push(SchemaWarning::IndexSkipped {
                table: name.to_string(),
                index: index.name().to_string(),
                reason: format!("column {} has a conflict", column),
            });
            continue;
        }
        claimed.insert(index.name().to_string(), name.to_string());
        operations.push(DdlOperation::CreateIndex {
            table: name.to_string(),
            index: index.clone(),
        });
    }
}

/// Compare a declared column with its live counterpart. Returns false when
/// the two conflict.
fn check_column(
    table: &str,
    declared: &ColumnDef,
    live: &LiveColumn,
    diagnostics: &mut Diagnostics,
) -> bool {
    if !declared.ty.is_satisfied_by(&live.ty) {
        diagnostics.conflicts.push(SchemaConflict::TypeMismatch {
            table: table.to_string(),
            column: declared.name.clone(),
            declared: declared.ty,
            live: live.ty.clone(),
        });
        return false;
    }
    if let LiveType::Foreign(live_ty) = &live.ty {
        diagnostics.warnings.push(SchemaWarning::ForeignType {
            table: table.to_string(),
            column: declared.name.clone(),
            declared: declared.ty,
            live: live_ty.clone(),
        });
    }

    if declared.identity != live.identity {
        diagnostics.warnings.push(SchemaWarning::IdentityDrift {
            table: table.to_string(),
            column: declared.name.clone(),
            declared_identity: declared.identity,
        });
    }

    if declared.nullable != live.nullable {
        diagnostics.warnings.push(SchemaWarning::NullabilityDrift {
            table: table.to_string(),
            column: declared.name.clone(),
            declared_nullable: declared.nullable,
        });
    }

    true
}

/// A plan step whose preconditions do not hold.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A step needs the schema, but it does not exist.
    SchemaNotFound { step: usize, schema: String },
    /// A step needs a table that doesn't exist.
    TableNotFound { step: usize, table: String },
    /// A step requires a table to NOT exist, but it does.
    TableAlreadyExists { step: usize, table: String },
    /// A step requires a column to NOT exist, but it does.
    ColumnAlreadyExists {
        step: usize,
        table: String,
        column: String,
    },
    /// An index refers to a column that doesn't exist.
    ColumnNotFound {
        step: usize,
        table: String,
        column: String,
    },
    /// A step requires an index to NOT exist, but it does.
    IndexAlreadyExists {
        step: usize,
        table: String,
        index: String,
    },
}

impl fmt::Display for PlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanError::SchemaNotFound { step, schema } => {
                write!(f, "step {}: schema '{}' does not exist", step, schema)
            }
            PlanError::TableNotFound { step, table } => {
                write!(f, "step {}: table '{}' does not exist", step, table)
            }
            PlanError::TableAlreadyExists { step, table } => {
                write!(f, "step {}: table '{}' already exists", step, table)
            }
            PlanError::ColumnAlreadyExists {
                step,
                table,
                column,
            } => write!(
                f,
                "step {}: column '{}.{}' already exists",
                step, table, column
            ),
            PlanError::ColumnNotFound {
                step,
                table,
                column,
            } => write!(
                f,
                "step {}: column '{}.{}' does not exist",
                step, table, column
            ),
            PlanError::IndexAlreadyExists { step, table, index } => write!(
                f,
                "step {}: index '{}' on '{}' already exists",
                step, index, table
            ),
        }
    }
}

impl std::error::Error for PlanError {}

fn live_column(column: &ColumnDef) -> LiveColumn {
    LiveColumn {
        name: column.name.clone(),
        ty: LiveType::Known(column.ty),
        nullable: column.nullable,
        primary_key: column.primary_key,
        default: column.default.clone(),
        identity: column.identity,
        comment: None,
    }
}

/// Apply `operations` to a copy of `snapshot`, checking preconditions.
///
/// The result is what introspection would return after a successful
/// execution of the plan.
pub fn simulate(
    snapshot: &SchemaSnapshot,
    operations: &[DdlOperation],
) -> Result<SchemaSnapshot, PlanError> {
    let mut next = snapshot.clone();

    for (step, op) in operations.iter().enumerate() {
        if !matches!(op, DdlOperation::CreateSchema { .. }) && !next.schema_exists {
            return Err(PlanError::SchemaNotFound {
                step,
                schema: next.schema.clone(),
            });
        }

        match op {
            DdlOperation::CreateSchema { .. } => next.schema_exists = true,
            DdlOperation::CreateTable(table) => {
                if next.tables.contains_key(table.name()) {
                    return Err(PlanError::TableAlreadyExists {
                        step,
                        table: table.name().to_string(),
                    });
                }
                let mut live = LiveTable::new(table.name());
                for column in table.columns() {
                    live.columns.insert(column.name.clone(), live_column(column));
                }
                next.tables.insert(table.name().to_string(), live);
            }
            DdlOperation::AddColumn { table, column } => {
                let live = next
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| PlanError::TableNotFound {
                        step,
                        table: table.clone(),
                    })?;
                if live.columns.contains_key(&column.name) {
                    return Err(PlanError::ColumnAlreadyExists {
                        step,
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                }
                live.columns.insert(column.name.clone(), live_column(column));
            }
            DdlOperation::CreateIndex { table, index } => {
                let live = next
                    .tables
                    .get(table)
                    .ok_or_else(|| PlanError::TableNotFound {
                        step,
                        table: table.clone(),
                    })?;
                if let Some(column) = index.columns().iter().find(|c| !live.columns.contains_key(*c)) {
                    return Err(PlanError::ColumnNotFound {
                        step,
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
                if let Some(owner) = next.index_owner(index.name()) {
                    return Err(PlanError::IndexAlreadyExists {
                        step,
                        table: owner.to_string(),
                        index: index.name().to_string(),
                    });
                }
                if let Some(live) = next.tables.get_mut(table) {
                    live.indexes.insert(index.name().to_string());
                }
            }
            DdlOperation::SetTableComment { table, comment } => {
                let live = next
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| PlanError::TableNotFound {
                        step,
                        table: table.clone(),
                    })?;
                live.comment = Some(comment.clone());
            }
            DdlOperation::SetColumnComment {
                table,
                column,
                comment,
            } => {
                let live = next
                    .tables
                    .get_mut(table)
                    .ok_or_else(|| PlanError::TableNotFound {
                        step,
                        table: table.clone(),
                    })?;
                let live_col = live.columns.get_mut(column).ok_or_else(|| {
                    PlanError::ColumnNotFound {
                        step,
                        table: table.clone(),
                        column: column.clone(),
                    }
                })?;
                live_col.comment = Some(comment.clone());
            }
        }
    }

    Ok(next)
}
