//! Append-only leave transaction log.
//!
//! Every bucket mutation writes exactly one row here, in the same database
//! transaction as the bucket write, carrying the bucket summary before and
//! after. Rows are never edited; corrections are new compensating rows. The
//! only later change is the `is_archived` retention flag.

use crate::{
    entities::{
        LeaveBucketModel, LeaveTransaction, LeaveTransactionColumn, LeaveTransactionModel,
        Operation, TransactionKind, leave_transaction,
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, prelude::*, sea_query::Expr};
use serde::Serialize;
use tracing::debug;

/// The summary fields of a bucket at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketSnapshot {
    /// Days granted
    pub allocated: i32,
    /// Days consumed
    pub used: i32,
    /// Days inherited
    pub carried_forward: i32,
    /// Days still available
    pub remaining: i32,
    /// Entitlement
    pub total: i32,
}

impl From<&LeaveBucketModel> for BucketSnapshot {
    fn from(bucket: &LeaveBucketModel) -> Self {
        Self {
            allocated: bucket.allocated,
            used: bucket.used,
            carried_forward: bucket.carried_forward,
            remaining: bucket.remaining_days(),
            total: bucket.total_days(),
        }
    }
}

impl BucketSnapshot {
    /// Snapshot recorded before the mutation.
    #[must_use]
    pub const fn before(tx: &LeaveTransactionModel) -> Self {
        Self {
            allocated: tx.before_allocated,
            used: tx.before_used,
            carried_forward: tx.before_carried_forward,
            remaining: tx.before_remaining,
            total: tx.before_total,
        }
    }

    /// Snapshot recorded after the mutation.
    #[must_use]
    pub const fn after(tx: &LeaveTransactionModel) -> Self {
        Self {
            allocated: tx.after_allocated,
            used: tx.after_used,
            carried_forward: tx.after_carried_forward,
            remaining: tx.after_remaining,
            total: tx.after_total,
        }
    }

    /// Snapshot of a bucket that did not exist yet.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            allocated: 0,
            used: 0,
            carried_forward: 0,
            remaining: 0,
            total: 0,
        }
    }
}

/// What a ledger entry says about the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Kind of mutation
    pub kind: TransactionKind,
    /// Direction of `amount`
    pub operation: Operation,
    /// Days involved
    pub amount: i32,
    /// Human-readable explanation
    pub description: String,
    /// External leave request id
    pub reference_id: Option<String>,
    /// Who triggered the mutation; `None` is the system
    pub actor: Option<String>,
}

impl LedgerEntry {
    /// A system-initiated entry without a request reference.
    #[must_use]
    pub fn system(
        kind: TransactionKind,
        operation: Operation,
        amount: i32,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation,
            amount,
            description: description.into(),
            reference_id: None,
            actor: None,
        }
    }
}

/// Appends one transaction describing the change from `before` to `after`.
///
/// Must run on the same connection (transaction) that wrote `after`.
pub async fn record_transaction<C>(
    db: &C,
    before: BucketSnapshot,
    after: &LeaveBucketModel,
    entry: LedgerEntry,
) -> Result<LeaveTransactionModel>
where
    C: ConnectionTrait,
{
    let after_snapshot = BucketSnapshot::from(after);
    let model = leave_transaction::ActiveModel {
        employee_id: Set(after.employee_id),
        bucket_id: Set(Some(after.id)),
        category: Set(after.category),
        period: Set(after.period),
        kind: Set(entry.kind),
        operation: Set(entry.operation),
        amount: Set(entry.amount),
        before_allocated: Set(before.allocated),
        before_used: Set(before.used),
        before_carried_forward: Set(before.carried_forward),
        before_remaining: Set(before.remaining),
        before_total: Set(before.total),
        after_allocated: Set(after_snapshot.allocated),
        after_used: Set(after_snapshot.used),
        after_carried_forward: Set(after_snapshot.carried_forward),
        after_remaining: Set(after_snapshot.remaining),
        after_total: Set(after_snapshot.total),
        description: Set(entry.description),
        reference_id: Set(entry.reference_id),
        actor: Set(entry.actor),
        created_at: Set(Utc::now()),
        is_archived: Set(false),
        ..Default::default()
    };

    let tx = model.insert(db).await?;
    debug!(
        transaction_id = tx.id,
        employee_id = tx.employee_id,
        kind = %tx.kind,
        amount = tx.amount,
        "Ledger transaction recorded"
    );
    Ok(tx)
}

/// Recent, unarchived transactions for an employee, newest first.
///
/// # Arguments
/// * `db` - Database connection
/// * `employee_id` - Employee whose history to read
/// * `period` - Restrict to one period when given
/// * `limit` - Maximum number of rows
pub async fn get_employee_transaction_history<C>(
    db: &C,
    employee_id: i64,
    period: Option<i32>,
    limit: u64,
) -> Result<Vec<LeaveTransactionModel>>
where
    C: ConnectionTrait,
{
    let mut query = LeaveTransaction::find()
        .filter(LeaveTransactionColumn::EmployeeId.eq(employee_id))
        .filter(LeaveTransactionColumn::IsArchived.eq(false));
    if let Some(period) = period {
        query = query.filter(LeaveTransactionColumn::Period.eq(period));
    }
    query
        .order_by_desc(LeaveTransactionColumn::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The complete ledger for an employee in commit order, archived rows included.
pub async fn get_employee_ledger<C>(db: &C, employee_id: i64) -> Result<Vec<LeaveTransactionModel>>
where
    C: ConnectionTrait,
{
    LeaveTransaction::find()
        .filter(LeaveTransactionColumn::EmployeeId.eq(employee_id))
        .order_by_asc(LeaveTransactionColumn::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All transactions written against one bucket, in commit order.
pub async fn get_bucket_transactions<C>(db: &C, bucket_id: i64) -> Result<Vec<LeaveTransactionModel>>
where
    C: ConnectionTrait,
{
    LeaveTransaction::find()
        .filter(LeaveTransactionColumn::BucketId.eq(bucket_id))
        .order_by_asc(LeaveTransactionColumn::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Soft-archives every transaction recorded before `cutoff`.
///
/// Only the `is_archived` flag changes; amounts and snapshots are untouched.
/// Returns the number of rows archived.
pub async fn archive_transactions_before<C>(db: &C, cutoff: DateTime<Utc>) -> Result<u64>
where
    C: ConnectionTrait,
{
    let result = LeaveTransaction::update_many()
        .col_expr(LeaveTransactionColumn::IsArchived, Expr::value(true))
        .filter(LeaveTransactionColumn::CreatedAt.lt(cutoff))
        .filter(LeaveTransactionColumn::IsArchived.eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}
