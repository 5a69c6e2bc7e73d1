//! Hard-cap enforcement.
//!
//! When the summed `total` of a category's active buckets exceeds the hard cap,
//! the excess is removed oldest bucket first: `carried_forward` before
//! `allocated` within each bucket. `used` is never reduced, so an old bucket
//! that was already drawn down can end with `used` above its new total; its
//! `remaining` then floors at zero.

use crate::{
    config::{CategoryPolicy, LeavePolicy},
    core::{
        bucket::{list_active_category_buckets, save_bucket},
        transaction::{BucketSnapshot, LedgerEntry, record_transaction},
        unit_of_work::retry_on_conflict,
    },
    entities::{LeaveBucketModel, LeaveCategory, Operation, TransactionKind},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::{info, instrument};

/// Days to remove from one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapTrim {
    /// Bucket to trim
    pub bucket_id: i64,
    /// Period of the bucket
    pub period: i32,
    /// Removed from `carried_forward`
    pub from_carried_forward: i32,
    /// Removed from `allocated`
    pub from_allocated: i32,
}

impl CapTrim {
    /// Total days removed from the bucket.
    #[must_use]
    pub const fn amount(&self) -> i32 {
        self.from_carried_forward + self.from_allocated
    }
}

/// Plans the trims that bring `buckets` down to `hard_cap`.
///
/// `buckets` must be ordered oldest first. Returns nothing when the summed
/// total is already within the cap.
#[must_use]
pub fn plan_cap_trims(buckets: &[LeaveBucketModel], hard_cap: i32) -> Vec<CapTrim> {
    let mut excess: i32 = buckets.iter().map(LeaveBucketModel::total_days).sum::<i32>() - hard_cap;
    let mut trims = Vec::new();

    for bucket in buckets {
        if excess <= 0 {
            break;
        }
        if bucket.total_days() <= 0 {
            continue;
        }
        let from_carried_forward = excess.min(bucket.carried_forward.max(0));
        excess -= from_carried_forward;
        let from_allocated = excess.min(bucket.allocated.max(0));
        excess -= from_allocated;

        if from_carried_forward + from_allocated > 0 {
            trims.push(CapTrim {
                bucket_id: bucket.id,
                period: bucket.period,
                from_carried_forward,
                from_allocated,
            });
        }
    }
    trims
}

/// What one cap enforcement pass did for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapEnforcementOutcome {
    /// Employee
    pub employee_id: i64,
    /// Category
    pub category: LeaveCategory,
    /// Summed total before trimming
    pub total_before: i32,
    /// Summed total after trimming
    pub total_after: i32,
    /// Trims applied, oldest first
    pub trims: Vec<CapTrim>,
}

impl CapEnforcementOutcome {
    /// Whether anything was trimmed.
    #[must_use]
    pub fn trimmed(&self) -> bool {
        !self.trims.is_empty()
    }
}

/// Enforces the category cap inside the caller's transaction.
pub async fn enforce_cap_in<C>(
    db: &C,
    policy: &CategoryPolicy,
    employee_id: i64,
) -> Result<CapEnforcementOutcome>
where
    C: ConnectionTrait,
{
    let buckets = list_active_category_buckets(db, employee_id, policy.category).await?;
    let total_before: i32 = buckets.iter().map(LeaveBucketModel::total_days).sum();
    let trims = plan_cap_trims(&buckets, policy.hard_cap);

    for trim in &trims {
        let Some(bucket) = buckets.iter().find(|b| b.id == trim.bucket_id) else {
            continue;
        };
        let before = BucketSnapshot::from(bucket);
        let mut trimmed = bucket.clone();
        trimmed.carried_forward -= trim.from_carried_forward;
        trimmed.allocated -= trim.from_allocated;
        let saved = save_bucket(db, trimmed).await?;

        record_transaction(
            db,
            before,
            &saved,
            LedgerEntry::system(
                TransactionKind::CapEnforcement,
                Operation::Subtract,
                trim.amount(),
                format!(
                    "Hard cap {} exceeded: removed {} carried-forward and {} allocated days",
                    policy.hard_cap, trim.from_carried_forward, trim.from_allocated
                ),
            ),
        )
        .await?;
    }

    let total_after = total_before - trims.iter().map(CapTrim::amount).sum::<i32>();
    if total_after > policy.hard_cap {
        return Err(Error::CapExceeded {
            employee_id,
            category: policy.category,
            total: total_after,
            cap: policy.hard_cap,
        });
    }

    if !trims.is_empty() {
        info!(
            employee_id,
            category = %policy.category,
            total_before,
            total_after,
            "Hard cap enforced"
        );
    }

    Ok(CapEnforcementOutcome {
        employee_id,
        category: policy.category,
        total_before,
        total_after,
        trims,
    })
}

/// Enforces the hard cap of every configured category for one employee, as one unit of work.
#[instrument(skip(db, policy))]
pub async fn enforce_cap(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    employee_id: i64,
) -> Result<Vec<CapEnforcementOutcome>> {
    retry_on_conflict("enforce_cap", || enforce_cap_once(db, policy, employee_id)).await
}

async fn enforce_cap_once(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    employee_id: i64,
) -> Result<Vec<CapEnforcementOutcome>> {
    let txn = db.begin().await?;
    let mut outcomes = Vec::with_capacity(policy.categories.len());
    for category_policy in &policy.categories {
        outcomes.push(enforce_cap_in(&txn, category_policy, employee_id).await?);
    }
    txn.commit().await?;
    Ok(outcomes)
}
