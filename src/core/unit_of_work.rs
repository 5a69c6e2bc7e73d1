//! Unit-of-work retry policy.
//!
//! Every mutating ledger operation runs inside one database transaction. When
//! that transaction loses an optimistic-concurrency race (or `SQLite` reports
//! the database as busy) the whole unit is rolled back and re-run once from a
//! fresh read. A second conflict is surfaced to the caller.

use crate::errors::Result;
use std::future::Future;
use tracing::warn;

/// Runs `operation`, retrying it exactly once on `PersistenceConflict`.
///
/// # Arguments
/// * `label` - Operation name used in the retry log line
/// * `operation` - Closure producing a fresh unit of work on each call
pub async fn retry_on_conflict<T, F, Fut>(label: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match operation().await {
        Err(err) if err.is_persistence_conflict() => {
            warn!(operation = label, error = %err, "Unit of work conflicted, retrying once");
            operation().await
        }
        other => other,
    }
}
