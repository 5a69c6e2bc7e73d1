//! Administrative balance adjustments.
//!
//! An adjustment changes a bucket's `allocated` by a signed delta and always
//! leaves an ADJUSTMENT row naming the actor. The category cap is re-enforced
//! and the next period's carry-forward realigned in the same unit of work.

use crate::{
    config::LeavePolicy,
    core::{
        bucket::{require_bucket, save_bucket},
        cap::{CapEnforcementOutcome, enforce_cap_in},
        carry_forward::{RealignmentChange, realign_chain_in},
        transaction::{BucketSnapshot, LedgerEntry, record_transaction},
        unit_of_work::retry_on_conflict,
    },
    entities::{LeaveBucketModel, LeaveCategory, Operation, TransactionKind},
    errors::{Error, Result},
};
use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{info, instrument};

/// An administrative correction to one bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentRequest {
    /// Bucket owner
    pub employee_id: i64,
    /// Leave category
    pub category: LeaveCategory,
    /// Period of the bucket
    pub period: i32,
    /// Signed change to `allocated`
    pub delta: i32,
    /// Why, recorded on the ledger row
    pub reason: String,
    /// Who made the correction
    pub actor: String,
}

/// Result of an adjustment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjustmentOutcome {
    /// The bucket after adjustment and cap enforcement
    pub bucket: LeaveBucketModel,
    /// Delta actually applied; a reduction stops at zero allocated
    pub applied: i32,
    /// Cap enforcement, if it trimmed anything
    pub cap: Option<CapEnforcementOutcome>,
    /// Later periods whose carry-forward was realigned
    pub realigned: Vec<RealignmentChange>,
}

/// Applies an administrative adjustment as one unit of work.
///
/// # Errors
/// * `InvalidAmount` - zero delta, or a reduction on a bucket with nothing allocated
/// * `BucketNotFound` - no bucket for the key
#[instrument(skip(db, policy, request), fields(employee_id = request.employee_id, category = %request.category, period = request.period, delta = request.delta))]
pub async fn adjust_balance(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    request: &AdjustmentRequest,
) -> Result<AdjustmentOutcome> {
    if request.delta == 0 {
        return Err(Error::InvalidAmount { days: 0 });
    }
    let outcome = retry_on_conflict("adjust_balance", || adjust_once(db, policy, request)).await?;
    info!(
        applied = outcome.applied,
        actor = %request.actor,
        "Balance adjusted"
    );
    Ok(outcome)
}

async fn adjust_once(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    request: &AdjustmentRequest,
) -> Result<AdjustmentOutcome> {
    let category_policy = policy.category(request.category)?;
    let txn = db.begin().await?;

    let bucket = require_bucket(&txn, request.employee_id, request.category, request.period).await?;
    let new_allocated = (bucket.allocated + request.delta).max(0);
    let applied = new_allocated - bucket.allocated;
    if applied == 0 {
        return Err(Error::InvalidAmount {
            days: request.delta,
        });
    }

    let before = BucketSnapshot::from(&bucket);
    let mut adjusted = bucket;
    adjusted.allocated = new_allocated;
    let saved = save_bucket(&txn, adjusted).await?;

    let operation = if applied > 0 {
        Operation::Add
    } else {
        Operation::Subtract
    };
    record_transaction(
        &txn,
        before,
        &saved,
        LedgerEntry {
            kind: TransactionKind::Adjustment,
            operation,
            amount: applied.abs(),
            description: request.reason.clone(),
            reference_id: None,
            actor: Some(request.actor.clone()),
        },
    )
    .await?;

    // Realign first so the cap pass sees the carried amounts it produces
    let realigned =
        realign_chain_in(&txn, category_policy, request.employee_id, request.period + 1).await?;
    let cap = enforce_cap_in(&txn, category_policy, request.employee_id).await?;
    let bucket = require_bucket(&txn, request.employee_id, request.category, request.period).await?;

    txn.commit().await?;
    Ok(AdjustmentOutcome {
        bucket,
        applied,
        cap: cap.trimmed().then_some(cap),
        realigned,
    })
}
