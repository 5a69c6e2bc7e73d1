//! Carry-forward rule and realignment.
//!
//! The amount carried into period `p` is always re-derivable from the current
//! `remaining` of period `p - 1`:
//!
//! `min(prior_remaining, individual_carry_cap, hard_cap - new_allocation)`,
//! floored at zero.
//!
//! When the prior bucket changes after the carry was made (a late adjustment,
//! for example), [`realign_carry_forward`] brings the successor back in line.
//! Only `carried_forward` is rewritten; `used` is never touched.

use crate::{
    config::{CarryPolicy, CategoryPolicy, LeavePolicy},
    core::{
        bucket::{get_bucket, save_bucket},
        cap::enforce_cap_in,
        transaction::{BucketSnapshot, LedgerEntry, record_transaction},
        unit_of_work::retry_on_conflict,
    },
    entities::{LeaveBucket, LeaveBucketColumn, LeaveCategory, Operation, TransactionKind},
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{QueryOrder, TransactionTrait, prelude::*};
use std::collections::BTreeSet;
use tracing::{info, instrument, warn};

/// Which ceiling decided the carried amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarryLimit {
    /// Everything remaining was carried
    Remaining,
    /// The per-period individual carry cap
    IndividualCap,
    /// Room left under the hard cap after the new allocation
    HardCap,
}

/// Result of applying the carry-forward rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarryDecision {
    /// Days to carry
    pub amount: i32,
    /// The binding ceiling
    pub limited_by: CarryLimit,
}

/// Applies the carry-forward rule.
///
/// # Arguments
/// * `prior_remaining` - Current remaining of the previous period's bucket
/// * `individual_cap` - Most days that may leave one period
/// * `hard_cap` - Ceiling on allocated plus carried
/// * `new_allocation` - Days allocated to the new period
#[must_use]
pub fn carry_forward_amount(
    prior_remaining: i32,
    individual_cap: i32,
    hard_cap: i32,
    new_allocation: i32,
) -> CarryDecision {
    let headroom = hard_cap - new_allocation;
    let (amount, limited_by) = if prior_remaining <= individual_cap && prior_remaining <= headroom {
        (prior_remaining, CarryLimit::Remaining)
    } else if individual_cap <= headroom {
        (individual_cap, CarryLimit::IndividualCap)
    } else {
        (headroom, CarryLimit::HardCap)
    };
    CarryDecision {
        amount: amount.max(0),
        limited_by,
    }
}

/// Days the category's carry mode moves out of a prior bucket with `prior_remaining`.
#[must_use]
pub fn carry_for_policy(policy: &CategoryPolicy, prior_remaining: i32, new_allocation: i32) -> i32 {
    match policy.carry {
        CarryPolicy::CarryForward => carry_forward_amount(
            prior_remaining,
            policy.individual_carry_cap,
            policy.hard_cap,
            new_allocation,
        )
        .amount,
        CarryPolicy::Accumulate | CarryPolicy::Reset => 0,
    }
}

/// One successor bucket whose carried-forward value was rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealignmentChange {
    /// Bucket owner
    pub employee_id: i64,
    /// Leave category
    pub category: LeaveCategory,
    /// Period of the rewritten bucket
    pub period: i32,
    /// Carried forward before
    pub previous: i32,
    /// Carried forward after
    pub carried_forward: i32,
}

/// Realigns `period` (and any later periods affected in turn) against the
/// current remaining of the period before it, inside the caller's transaction.
///
/// Does nothing for categories that do not carry forward, or when the
/// bucket or its predecessor does not exist. When anything was rewritten the
/// category's hard cap is enforced before returning.
pub async fn realign_in<C>(
    db: &C,
    policy: &CategoryPolicy,
    employee_id: i64,
    period: i32,
) -> Result<Vec<RealignmentChange>>
where
    C: ConnectionTrait,
{
    let changes = realign_chain_in(db, policy, employee_id, period).await?;
    if !changes.is_empty() {
        enforce_cap_in(db, policy, employee_id).await?;
    }
    Ok(changes)
}

/// The cascade behind [`realign_in`], leaving cap enforcement to the caller.
pub(crate) async fn realign_chain_in<C>(
    db: &C,
    policy: &CategoryPolicy,
    employee_id: i64,
    period: i32,
) -> Result<Vec<RealignmentChange>>
where
    C: ConnectionTrait,
{
    let mut changes = Vec::new();
    if policy.carry != CarryPolicy::CarryForward || period < 1 {
        return Ok(changes);
    }

    let category = policy.category;
    let mut current = period;
    let Some(mut prior) = get_bucket(db, employee_id, category, current - 1).await? else {
        return Ok(changes);
    };

    while let Some(mut successor) = get_bucket(db, employee_id, category, current).await? {
        let expected = carry_for_policy(policy, prior.remaining_days(), successor.allocated);
        if expected == successor.carried_forward {
            break;
        }

        let before = BucketSnapshot::from(&successor);
        let previous = successor.carried_forward;
        successor.carried_forward = expected;
        let saved = save_bucket(db, successor).await?;
        record_transaction(
            db,
            before,
            &saved,
            LedgerEntry::system(
                TransactionKind::CarryForward,
                Operation::Set,
                expected,
                format!(
                    "Carry-forward realigned from {previous} to {expected} days (period {} remaining {})",
                    current - 1,
                    prior.remaining_days()
                ),
            ),
        )
        .await?;

        changes.push(RealignmentChange {
            employee_id,
            category,
            period: current,
            previous,
            carried_forward: expected,
        });
        prior = saved;
        current += 1;
    }

    Ok(changes)
}

/// Realigns the carried-forward value of one bucket as its own unit of work.
#[instrument(skip(db, policy))]
pub async fn realign_carry_forward(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    employee_id: i64,
    category: LeaveCategory,
    period: i32,
) -> Result<Vec<RealignmentChange>> {
    let category_policy = policy.category(category)?;
    retry_on_conflict("realign_carry_forward", || {
        realign_once(db, category_policy, employee_id, period)
    })
    .await
}

async fn realign_once(
    db: &DatabaseConnection,
    policy: &CategoryPolicy,
    employee_id: i64,
    period: i32,
) -> Result<Vec<RealignmentChange>> {
    let txn = db.begin().await?;
    let changes = realign_in(&txn, policy, employee_id, period).await?;
    txn.commit().await?;
    Ok(changes)
}

/// Outcome of a realignment sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealignmentSweep {
    /// Buckets whose carried-forward value was rewritten
    pub changes: Vec<RealignmentChange>,
    /// Successors that could not be realigned
    pub errors: usize,
}

/// Realigns the successor of every bucket written after `since`.
///
/// Each successor is its own unit of work; a failure is logged and counted
/// without stopping the sweep.
pub async fn realign_changed_since(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    since: DateTime<Utc>,
) -> Result<RealignmentSweep> {
    let carrying: Vec<LeaveCategory> = policy
        .categories
        .iter()
        .filter(|p| p.carry == CarryPolicy::CarryForward)
        .map(|p| p.category)
        .collect();
    if carrying.is_empty() {
        return Ok(RealignmentSweep::default());
    }

    let changed = LeaveBucket::find()
        .filter(LeaveBucketColumn::UpdatedAt.gt(since))
        .filter(LeaveBucketColumn::Category.is_in(carrying))
        .order_by_asc(LeaveBucketColumn::EmployeeId)
        .order_by_asc(LeaveBucketColumn::Period)
        .all(db)
        .await?;

    // The cascade stops at the first aligned successor, so every changed
    // period gets its own pass, oldest first.
    let mut seen = BTreeSet::new();
    let mut sweep = RealignmentSweep::default();
    for bucket in changed {
        if !seen.insert((bucket.employee_id, bucket.category, bucket.period)) {
            continue;
        }
        match realign_carry_forward(
            db,
            policy,
            bucket.employee_id,
            bucket.category,
            bucket.period + 1,
        )
        .await
        {
            Ok(changes) => sweep.changes.extend(changes),
            Err(e) => {
                warn!(
                    employee_id = bucket.employee_id,
                    category = %bucket.category,
                    period = bucket.period + 1,
                    error = %e,
                    "Carry-forward realignment failed"
                );
                sweep.errors += 1;
            }
        }
    }

    if !sweep.changes.is_empty() {
        info!(
            realigned = sweep.changes.len(),
            "Carry-forward realignment sweep complete"
        );
    }
    Ok(sweep)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::bucket::{list_active_category_buckets, require_bucket};
    use crate::core::transaction::get_employee_ledger;
    use crate::test_utils::{
        create_test_employee, retire_bucket, seed_bucket, setup_test_db, test_policy,
    };
    use chrono::Duration;

    #[test]
    fn test_carry_capped_by_individual_and_hard_cap() {
        let decision = carry_forward_amount(25, 20, 40, 20);
        assert_eq!(decision.amount, 20);
        assert_ne!(decision.limited_by, CarryLimit::Remaining);
    }

    #[test]
    fn test_carry_limits() {
        assert_eq!(
            carry_forward_amount(5, 20, 40, 20),
            CarryDecision {
                amount: 5,
                limited_by: CarryLimit::Remaining
            }
        );
        assert_eq!(
            carry_forward_amount(30, 20, 45, 20),
            CarryDecision {
                amount: 20,
                limited_by: CarryLimit::IndividualCap
            }
        );
        assert_eq!(
            carry_forward_amount(30, 20, 40, 25),
            CarryDecision {
                amount: 15,
                limited_by: CarryLimit::HardCap
            }
        );
        assert_eq!(carry_forward_amount(10, 20, 40, 45).amount, 0);
        assert_eq!(carry_forward_amount(-3, 20, 40, 20).amount, 0);
    }

    #[test]
    fn test_carry_for_policy_modes() {
        let policy = test_policy();
        let annual = policy.category(LeaveCategory::Annual).unwrap();
        let sick = policy.category(LeaveCategory::Sick).unwrap();
        assert_eq!(carry_for_policy(annual, 12, 20), 12);
        assert_eq!(carry_for_policy(sick, 12, 10), 0);
    }

    #[tokio::test]
    async fn test_realign_updates_stale_carry() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        // Prior period now has 6 remaining, successor still carries 10
        let prior = seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 14).await?;
        retire_bucket(&db, prior).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 10, 3).await?;

        let changes =
            realign_carry_forward(&db, &policy, employee.id, LeaveCategory::Annual, 2).await?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].previous, 10);
        assert_eq!(changes[0].carried_forward, 6);

        let successor = require_bucket(&db, employee.id, LeaveCategory::Annual, 2).await?;
        assert_eq!(successor.carried_forward, 6);
        assert_eq!(successor.used, 3);
        assert_eq!(successor.remaining, 23);

        let ledger = get_employee_ledger(&db, employee.id).await?;
        let last = ledger.last().unwrap();
        assert_eq!(last.kind, TransactionKind::CarryForward);
        assert_eq!(last.operation, Operation::Set);
        assert_eq!(last.before_carried_forward, 10);
        assert_eq!(last.after_carried_forward, 6);
        Ok(())
    }

    #[tokio::test]
    async fn test_realign_without_change_writes_nothing() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 14).await?;
        let successor = seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 6, 0).await?;
        let ledger_before = get_employee_ledger(&db, employee.id).await?.len();

        let changes =
            realign_carry_forward(&db, &policy, employee.id, LeaveCategory::Annual, 2).await?;
        assert!(changes.is_empty());

        let stored = require_bucket(&db, employee.id, LeaveCategory::Annual, 2).await?;
        assert_eq!(stored.version, successor.version);
        assert_eq!(get_employee_ledger(&db, employee.id).await?.len(), ledger_before);
        Ok(())
    }

    #[tokio::test]
    async fn test_realign_cascades_to_later_periods() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        let first = seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 18).await?;
        retire_bucket(&db, first).await?;
        // Period 2 carried 10 but should carry 2; its remaining feeds period 3
        let second = seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 10, 15).await?;
        retire_bucket(&db, second).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 3, 20, 15, 0).await?;

        let changes =
            realign_carry_forward(&db, &policy, employee.id, LeaveCategory::Annual, 2).await?;
        let periods: Vec<i32> = changes.iter().map(|c| c.period).collect();
        assert_eq!(periods, vec![2, 3]);

        let third = require_bucket(&db, employee.id, LeaveCategory::Annual, 3).await?;
        // Period 2 remaining is now 20 + 2 - 15 = 7
        assert_eq!(third.carried_forward, 7);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_reaches_stale_successor_of_later_change() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        let since = Utc::now() - Duration::minutes(1);
        // Period 2 is already aligned with period 1; period 3 is not aligned with period 2
        let first = seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 20).await?;
        retire_bucket(&db, first).await?;
        let second = seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 0, 15).await?;
        retire_bucket(&db, second).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 3, 20, 20, 0).await?;

        let sweep = realign_changed_since(&db, &policy, since).await?;
        assert_eq!(sweep.errors, 0);
        assert_eq!(sweep.changes.len(), 1);
        assert_eq!(sweep.changes[0].period, 3);

        let third = require_bucket(&db, employee.id, LeaveCategory::Annual, 3).await?;
        assert_eq!(third.carried_forward, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_realign_over_cap_enforces_cap() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        // Period 1 is still active, so raising period 2's carry breaches the cap
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 0).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 0, 0).await?;

        let changes =
            realign_carry_forward(&db, &policy, employee.id, LeaveCategory::Annual, 2).await?;
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].carried_forward, 20);

        let active = list_active_category_buckets(&db, employee.id, LeaveCategory::Annual).await?;
        assert_eq!(active.iter().map(|b| b.total).sum::<i32>(), 40);
        assert_eq!(active[0].allocated, 0);
        assert_eq!(active[1].carried_forward, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_realign_ignores_non_carrying_categories() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Sick, 1, 10, 0, 0).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Sick, 2, 10, 0, 0).await?;

        let changes =
            realign_carry_forward(&db, &policy, employee.id, LeaveCategory::Sick, 2).await?;
        assert!(changes.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_realign_changed_since_sweeps_successors() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        let since = Utc::now() - Duration::minutes(1);
        let prior = seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 16).await?;
        retire_bucket(&db, prior).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 9, 0).await?;

        let sweep = realign_changed_since(&db, &policy, since).await?;
        assert_eq!(sweep.errors, 0);
        assert_eq!(sweep.changes.len(), 1);
        assert_eq!(sweep.changes[0].carried_forward, 4);

        let quiet = realign_changed_since(&db, &policy, Utc::now() + Duration::minutes(1)).await?;
        assert!(quiet.changes.is_empty());
        Ok(())
    }
}
