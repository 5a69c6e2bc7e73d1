//! Oldest-first deduction engine.
//!
//! Consumes an approved request's days from the category's usable buckets,
//! oldest period first. Only `used` grows; `allocated` and `carried_forward`
//! are left alone. All amounts are whole days, so splits never drift.

use crate::{
    core::{
        bucket::{list_usable_buckets, save_bucket},
        roster::get_employee,
        transaction::{BucketSnapshot, LedgerEntry, record_transaction},
        unit_of_work::retry_on_conflict,
    },
    entities::{LeaveBucketModel, LeaveCategory, Operation, TransactionKind},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::{info, instrument};

/// An approved request to consume leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionRequest {
    /// Employee taking leave
    pub employee_id: i64,
    /// Category to draw from
    pub category: LeaveCategory,
    /// Whole days to consume
    pub days: i32,
    /// External leave request id
    pub reference_id: Option<String>,
    /// Description written to the ledger
    pub description: String,
    /// Who approved the request
    pub actor: Option<String>,
    /// Book any shortfall as advance leave instead of refusing
    pub allow_negative: bool,
    /// Buckets expired before this date are not drawn from
    pub as_of: NaiveDate,
}

impl DeductionRequest {
    /// A request that refuses to overdraw.
    #[must_use]
    pub fn new(employee_id: i64, category: LeaveCategory, days: i32, as_of: NaiveDate) -> Self {
        Self {
            employee_id,
            category,
            days,
            reference_id: None,
            description: format!("{days} days of {category} leave"),
            actor: None,
            allow_negative: false,
            as_of,
        }
    }

    /// Sets the external request id.
    #[must_use]
    pub fn with_reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    /// Permits an advance (negative) position.
    #[must_use]
    pub const fn allowing_negative(mut self) -> Self {
        self.allow_negative = true;
        self
    }
}

/// Planned consumption from one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedTake {
    /// Index into the bucket slice
    pub index: usize,
    /// Days taken from the bucket's pool
    pub take: i32,
    /// Days booked beyond the pool
    pub advance: i32,
}

/// Plans an oldest-first deduction over `buckets`.
///
/// `buckets` must be ordered oldest first and already filtered to usable ones.
///
/// # Errors
/// `InsufficientBalance` when `days` is not positive, or when the summed
/// remaining is short and `allow_negative` is false (or there is no bucket to
/// book an advance on).
pub fn plan_deduction(
    buckets: &[LeaveBucketModel],
    days: i32,
    allow_negative: bool,
) -> Result<Vec<PlannedTake>> {
    let available: i32 = buckets.iter().map(LeaveBucketModel::remaining_days).sum();
    let insufficient = || Error::InsufficientBalance {
        available,
        requested: days,
    };
    if days <= 0 {
        return Err(insufficient());
    }
    if available < days && (!allow_negative || buckets.is_empty()) {
        return Err(insufficient());
    }

    let mut left = days;
    let mut plan = Vec::new();
    for (index, bucket) in buckets.iter().enumerate() {
        if left == 0 {
            break;
        }
        let remaining = bucket.remaining_days();
        if remaining <= 0 {
            continue;
        }
        let take = left.min(remaining);
        left -= take;
        plan.push(PlannedTake {
            index,
            take,
            advance: 0,
        });
    }

    if left > 0 {
        let newest = buckets.len() - 1;
        match plan.last_mut() {
            Some(last) if last.index == newest => last.advance = left,
            _ => plan.push(PlannedTake {
                index: newest,
                take: 0,
                advance: left,
            }),
        }
    }
    Ok(plan)
}

/// Consumption from one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDeduction {
    /// Bucket drawn from
    pub bucket_id: i64,
    /// Its period
    pub period: i32,
    /// Days taken, advance included
    pub taken: i32,
    /// Portion of `taken` booked as advance
    pub advance: i32,
    /// Remaining after the deduction
    pub remaining_after: i32,
    /// Ledger row written for this bucket
    pub transaction_id: i64,
}

/// Result of a deduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeductionOutcome {
    /// Employee
    pub employee_id: i64,
    /// Category
    pub category: LeaveCategory,
    /// Days requested
    pub requested: i32,
    /// Per-bucket breakdown, oldest first
    pub breakdown: Vec<BucketDeduction>,
    /// Days booked as advance
    pub advance: i32,
}

/// Performs a deduction inside the caller's transaction.
pub async fn deduct_in<C>(db: &C, request: &DeductionRequest) -> Result<DeductionOutcome>
where
    C: ConnectionTrait,
{
    get_employee(db, request.employee_id).await?;
    let buckets =
        list_usable_buckets(db, request.employee_id, request.category, request.as_of).await?;
    let plan = plan_deduction(&buckets, request.days, request.allow_negative)?;

    let mut breakdown = Vec::with_capacity(plan.len());
    for step in plan {
        let bucket = &buckets[step.index];
        let before = BucketSnapshot::from(bucket);
        let taken = step.take + step.advance;

        let mut drawn = bucket.clone();
        drawn.used += taken;
        drawn.advance += step.advance;
        let saved = save_bucket(db, drawn).await?;

        let description = if step.advance > 0 {
            format!(
                "{} ({} days in advance)",
                request.description, step.advance
            )
        } else {
            request.description.clone()
        };
        let tx = record_transaction(
            db,
            before,
            &saved,
            LedgerEntry {
                kind: TransactionKind::Usage,
                operation: Operation::Subtract,
                amount: taken,
                description,
                reference_id: request.reference_id.clone(),
                actor: request.actor.clone(),
            },
        )
        .await?;

        breakdown.push(BucketDeduction {
            bucket_id: saved.id,
            period: saved.period,
            taken,
            advance: step.advance,
            remaining_after: saved.remaining,
            transaction_id: tx.id,
        });
    }

    Ok(DeductionOutcome {
        employee_id: request.employee_id,
        category: request.category,
        requested: request.days,
        advance: breakdown.iter().map(|b| b.advance).sum(),
        breakdown,
    })
}

/// Deducts an approved request's days as one unit of work.
///
/// # Errors
/// * `InsufficientBalance` - not enough usable remaining and no advance allowed
/// * `EmployeeNotFound` - no such employee
/// * `PersistenceConflict` - lost a concurrent race twice
#[instrument(skip(db, request), fields(employee_id = request.employee_id, category = %request.category, days = request.days))]
pub async fn deduct(db: &DatabaseConnection, request: &DeductionRequest) -> Result<DeductionOutcome> {
    let outcome = retry_on_conflict("deduct", || deduct_once(db, request)).await?;
    info!(
        buckets = outcome.breakdown.len(),
        advance = outcome.advance,
        "Leave deducted"
    );
    Ok(outcome)
}

async fn deduct_once(db: &DatabaseConnection, request: &DeductionRequest) -> Result<DeductionOutcome> {
    let txn = db.begin().await?;
    let outcome = deduct_in(&txn, request).await?;
    txn.commit().await?;
    Ok(outcome)
}
