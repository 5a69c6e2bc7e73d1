//! Anniversary allocation engine.
//!
//! Grants a period's entitlement exactly once per (employee, category, period).
//! The steps, all inside one unit of work:
//!
//! 1. Reject with `AlreadyAllocated` if the period's bucket exists.
//! 2. Evaluate tenure at the anniversary; an ineligible employee gets a
//!    zero-allocation bucket.
//! 3. Close the previous period's bucket when the category's carry mode
//!    supersedes it, carrying what the carry-forward rule allows.
//! 4. Create the bucket and log ALLOCATION, then CARRY_FORWARD if anything was
//!    carried.
//! 5. Enforce the hard cap across the category's active buckets.

use crate::{
    config::{CarryPolicy, CategoryPolicy, LeavePolicy},
    core::{
        bucket::{NewBucket, create_bucket, get_bucket, require_bucket, save_bucket},
        cap::{CapEnforcementOutcome, enforce_cap_in},
        carry_forward::carry_for_policy,
        roster::{completed_years, get_employee},
        transaction::{BucketSnapshot, LedgerEntry, record_transaction},
        unit_of_work::retry_on_conflict,
    },
    entities::{EmployeeModel, LeaveBucketModel, LeaveCategory, Operation, TransactionKind},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::{debug, info, instrument};

/// What happened to the previous period's bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupersededBucket {
    /// Period of the closed bucket
    pub period: i32,
    /// Days carried into the new bucket
    pub carried: i32,
    /// Days forfeited
    pub forfeited: i32,
}

/// Result of one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationOutcome {
    /// The new bucket after cap enforcement
    pub bucket: LeaveBucketModel,
    /// Days granted for the period
    pub allocated: i32,
    /// Days carried from the previous period
    pub carried_forward: i32,
    /// False when tenure was not met and a zero bucket was created
    pub eligible: bool,
    /// The previous bucket, if this allocation closed it
    pub superseded: Option<SupersededBucket>,
    /// Cap enforcement, if it trimmed anything
    pub cap: Option<CapEnforcementOutcome>,
}

/// Checks the tenure requirement at the period boundary.
///
/// # Errors
/// `EmployeeNotEligible` when fewer full years than the policy requires have
/// been completed on `anniversary_date`.
pub fn check_eligibility(
    policy: &CategoryPolicy,
    employee: &EmployeeModel,
    anniversary_date: NaiveDate,
) -> Result<()> {
    let completed = completed_years(employee.hire_date, anniversary_date);
    if completed < policy.min_tenure_years {
        return Err(Error::EmployeeNotEligible {
            employee_id: employee.id,
            category: policy.category,
            completed_years: completed,
            required_years: policy.min_tenure_years,
        });
    }
    Ok(())
}

/// Allocates one category's period inside the caller's transaction.
///
/// # Arguments
/// * `db` - Open transaction
/// * `policy` - Full leave policy
/// * `employee` - Employee being allocated
/// * `category` - Leave category
/// * `period` - Work-year period to allocate
/// * `anniversary_date` - Boundary date the period starts on
pub async fn allocate_in<C>(
    db: &C,
    policy: &LeavePolicy,
    employee: &EmployeeModel,
    category: LeaveCategory,
    period: i32,
    anniversary_date: NaiveDate,
) -> Result<AllocationOutcome>
where
    C: ConnectionTrait,
{
    let employee_id = employee.id;
    if get_bucket(db, employee_id, category, period).await?.is_some() {
        return Err(Error::AlreadyAllocated {
            employee_id,
            category,
            period,
        });
    }

    let category_policy = policy.category(category)?;
    let (base, eligible) = match check_eligibility(category_policy, employee, anniversary_date) {
        Ok(()) => (category_policy.base_allocation(employee), true),
        Err(Error::EmployeeNotEligible {
            completed_years,
            required_years,
            ..
        }) => {
            debug!(
                employee_id,
                category = %category,
                completed_years,
                required_years,
                "Tenure not met, allocating zero"
            );
            (0, false)
        }
        Err(e) => return Err(e),
    };
    if base < 0 {
        return Err(Error::InvalidAmount { days: base });
    }

    let superseded = supersede_prior(db, category_policy, employee_id, period, base).await?;
    let carried = superseded.map_or(0, |s| s.carried);

    let created = create_bucket(
        db,
        NewBucket {
            employee_id,
            category,
            period,
            allocated: base,
            carried_forward: 0,
            anniversary_date,
            expiration_date: category_policy.expiration_for(anniversary_date),
        },
    )
    .await
    .map_err(|e| match e {
        // The pre-check passed, so another writer got here first
        Error::DuplicatePeriod { .. } => Error::PersistenceConflict {
            message: format!(
                "{category} period {period} for employee {employee_id} was allocated concurrently"
            ),
        },
        other => other,
    })?;

    let description = if eligible {
        format!("Anniversary allocation for period {period}")
    } else {
        format!("Tenure requirement not met for period {period}, nothing granted")
    };
    record_transaction(
        db,
        BucketSnapshot::empty(),
        &created,
        LedgerEntry::system(TransactionKind::Allocation, Operation::Add, base, description),
    )
    .await?;

    if carried > 0 {
        let before = BucketSnapshot::from(&created);
        let mut with_carry = created;
        with_carry.carried_forward = carried;
        let saved = save_bucket(db, with_carry).await?;
        record_transaction(
            db,
            before,
            &saved,
            LedgerEntry::system(
                TransactionKind::CarryForward,
                Operation::Add,
                carried,
                format!("Carried forward from period {}", period - 1),
            ),
        )
        .await?;
    }

    let cap = enforce_cap_in(db, category_policy, employee_id).await?;
    let bucket = require_bucket(db, employee_id, category, period).await?;

    Ok(AllocationOutcome {
        bucket,
        allocated: base,
        carried_forward: carried,
        eligible,
        superseded,
        cap: cap.trimmed().then_some(cap),
    })
}

/// Closes the previous period's bucket when the carry mode supersedes it.
async fn supersede_prior<C>(
    db: &C,
    policy: &CategoryPolicy,
    employee_id: i64,
    period: i32,
    new_allocation: i32,
) -> Result<Option<SupersededBucket>>
where
    C: ConnectionTrait,
{
    if !policy.supersedes_prior() || period < 1 {
        return Ok(None);
    }
    let Some(prior) = get_bucket(db, employee_id, policy.category, period - 1).await? else {
        return Ok(None);
    };
    if !prior.is_active {
        return Ok(None);
    }

    let remaining = prior.remaining_days();
    let carried = carry_for_policy(policy, remaining, new_allocation);
    let forfeited = remaining - carried;

    let before = BucketSnapshot::from(&prior);
    let prior_period = prior.period;
    let mut closed = prior;
    closed.is_active = false;
    let closed = save_bucket(db, closed).await?;

    // Nothing forfeited, nothing to log
    if forfeited > 0 {
        let description = match policy.carry {
            CarryPolicy::CarryForward => format!(
                "Superseded by period {period}: {carried} days carried forward, {forfeited} forfeited"
            ),
            CarryPolicy::Accumulate | CarryPolicy::Reset => {
                format!("Reset at period {period}: {forfeited} days forfeited")
            }
        };
        record_transaction(
            db,
            before,
            &closed,
            LedgerEntry::system(
                TransactionKind::Expiry,
                Operation::Subtract,
                forfeited,
                description,
            ),
        )
        .await?;
    }

    Ok(Some(SupersededBucket {
        period: prior_period,
        carried,
        forfeited,
    }))
}

/// Allocates one category's period for an employee as its own unit of work.
///
/// # Errors
/// * `AlreadyAllocated` - the period's bucket already exists; nothing changed
/// * `EmployeeNotFound` - no such employee
/// * `PersistenceConflict` - lost a concurrent race twice
#[instrument(skip(db, policy))]
pub async fn allocate(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    employee_id: i64,
    category: LeaveCategory,
    period: i32,
    anniversary_date: NaiveDate,
) -> Result<AllocationOutcome> {
    let outcome = retry_on_conflict("allocate", || {
        allocate_once(db, policy, employee_id, category, period, anniversary_date)
    })
    .await?;
    info!(
        employee_id,
        category = %category,
        period,
        allocated = outcome.allocated,
        carried_forward = outcome.carried_forward,
        "Leave allocated"
    );
    Ok(outcome)
}

async fn allocate_once(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    employee_id: i64,
    category: LeaveCategory,
    period: i32,
    anniversary_date: NaiveDate,
) -> Result<AllocationOutcome> {
    let txn = db.begin().await?;
    let employee = get_employee(&txn, employee_id).await?;
    let outcome = allocate_in(&txn, policy, &employee, category, period, anniversary_date).await?;
    txn.commit().await?;
    Ok(outcome)
}
