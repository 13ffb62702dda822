//! DDL execution.

use crate::connection::Connection;
use crate::error::DdlError;
use crate::reconcile::DdlOperation;

/// Apply `operations` in order, one statement at a time.
///
/// Each statement is sent on its own and commits on its own, so a failure
/// leaves everything before it in place. The error says which operation
/// failed and how many were applied; re-planning against a fresh snapshot
/// picks up from there.
///
/// Returns the number of operations applied.
pub async fn apply<C: Connection + ?Sized>(
    conn: &C,
    schema: &str,
    operations: &[DdlOperation],
) -> Result<usize, DdlError> {
    for (index, op) in operations.iter().enumerate() {
        let sql = op.to_sql(schema);
        tracing::debug!(index, %op, "applying ddl");

        if let Err(source) = conn.execute(&sql, &[]).await {
            tracing::warn!(index, %op, error = %source, "ddl failed");
            return Err(DdlError {
                index,
                applied: index,
                operation: op.to_string(),
                sql,
                source,
            });
        }
    }

    Ok(operations.len())
}
