//! Anniversary processing runs.
//!
//! One run, for one run date:
//!
//! 1. Records an `anniversary_runs` row as RUNNING.
//! 2. Allocates every category for each active employee whose anniversary is
//!    the run date. Each employee is one unit of work; a category that is
//!    already allocated is skipped, any other failure rolls that employee
//!    back and is counted without stopping the run.
//! 3. Expires buckets past their expiration date.
//! 4. Realigns carry-forward for buckets written since the previous run.
//! 5. Soft-archives transactions older than the retention window.
//! 6. Marks the run COMPLETED with its counts.
//!
//! Last-run metadata lives only in the database, never in process memory.

use crate::{
    config::LeavePolicy,
    core::{
        allocation::allocate_in,
        carry_forward::{RealignmentChange, RealignmentSweep, realign_changed_since},
        expiry::{ExpiredBucket, ExpirySweep, expire_buckets},
        roster::{find_anniversary_employees, work_year_on},
        transaction::archive_transactions_before,
        unit_of_work::retry_on_conflict,
    },
    entities::{
        AnniversaryRun, AnniversaryRunColumn, AnniversaryRunModel, EmployeeModel, LeaveCategory,
        RunStatus, anniversary_run,
    },
    errors::{Error, Result},
};
use chrono::{Duration, Months, NaiveDate, Utc};
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use std::fmt::Write as _;
use tracing::{error, info, instrument, warn};

/// Days granted to one category during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryGrant {
    /// Category
    pub category: LeaveCategory,
    /// Days allocated
    pub allocated: i32,
    /// Days carried forward
    pub carried_forward: i32,
    /// False when tenure was not met
    pub eligible: bool,
}

/// Result of one employee's unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmployeeRunStatus {
    /// At least one category was allocated
    Allocated,
    /// Every category was already allocated for the period
    AlreadyAllocated,
    /// The unit of work failed and was rolled back
    Failed {
        /// Reason reported to operators
        reason: String,
    },
}

/// Per-employee detail of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRunResult {
    /// Employee
    pub employee_id: i64,
    /// Display name
    pub name: String,
    /// Work-year period that started on the run date
    pub period: i32,
    /// What happened
    pub status: EmployeeRunStatus,
    /// Categories allocated
    pub grants: Vec<CategoryGrant>,
    /// Categories that were already allocated
    pub already_allocated: Vec<LeaveCategory>,
}

/// Everything a run did; the only result surfaced to operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Run record id
    pub run_id: i64,
    /// Date processed
    pub run_date: NaiveDate,
    /// Per-employee detail, in roster order
    pub employees: Vec<EmployeeRunResult>,
    /// Buckets expired
    pub expired: Vec<ExpiredBucket>,
    /// Carry-forward values realigned
    pub realigned: Vec<RealignmentChange>,
    /// Transactions archived
    pub archived: u64,
    /// Failures outside the per-employee units (expiry, realignment)
    pub maintenance_errors: usize,
}

impl RunSummary {
    /// Employees with at least one allocation.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.count(|s| matches!(s, EmployeeRunStatus::Allocated))
    }

    /// Employees with nothing left to allocate.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, EmployeeRunStatus::AlreadyAllocated))
    }

    /// Failed employee units plus maintenance failures.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.count(|s| matches!(s, EmployeeRunStatus::Failed { .. })) + self.maintenance_errors
    }

    fn count(&self, predicate: impl Fn(&EmployeeRunStatus) -> bool) -> usize {
        self.employees.iter().filter(|e| predicate(&e.status)).count()
    }
}

/// Allocations made for one employee inside one unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeAnniversary {
    /// Period allocated
    pub period: i32,
    /// Categories allocated
    pub grants: Vec<CategoryGrant>,
    /// Categories already allocated
    pub already_allocated: Vec<LeaveCategory>,
}

/// Allocates every configured category for an employee whose anniversary is
/// `as_of`, inside the caller's transaction.
///
/// A category that is already allocated is skipped; any other error is
/// returned so the caller can roll the whole employee back.
pub async fn process_employee_anniversary<C>(
    db: &C,
    policy: &LeavePolicy,
    employee: &EmployeeModel,
    as_of: NaiveDate,
) -> Result<EmployeeAnniversary>
where
    C: ConnectionTrait,
{
    let period = work_year_on(employee.hire_date, as_of);
    let mut grants = Vec::new();
    let mut already_allocated = Vec::new();

    for category_policy in &policy.categories {
        match allocate_in(db, policy, employee, category_policy.category, period, as_of).await {
            Ok(outcome) => grants.push(CategoryGrant {
                category: category_policy.category,
                allocated: outcome.allocated,
                carried_forward: outcome.carried_forward,
                eligible: outcome.eligible,
            }),
            Err(e) if e.is_already_allocated() => already_allocated.push(category_policy.category),
            Err(e) => return Err(e),
        }
    }

    Ok(EmployeeAnniversary {
        period,
        grants,
        already_allocated,
    })
}

async fn process_employee_once(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    employee: &EmployeeModel,
    as_of: NaiveDate,
) -> Result<EmployeeAnniversary> {
    let txn = db.begin().await?;
    let result = process_employee_anniversary(&txn, policy, employee, as_of).await?;
    txn.commit().await?;
    Ok(result)
}

/// Runs anniversary processing for `as_of`.
///
/// Per-employee failures are logged and reported in the summary; only
/// failures to read the roster or write the run record abort the run.
#[instrument(skip(db, policy))]
pub async fn run_anniversary_processing(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    as_of: NaiveDate,
) -> Result<RunSummary> {
    let previous = get_latest_finished_run(db).await?;
    let run = start_run(db, as_of).await?;
    info!(run_id = run.id, run_date = %as_of, "Anniversary run started");

    let employees = find_anniversary_employees(db, as_of).await?;
    let mut results = Vec::with_capacity(employees.len());
    for employee in &employees {
        let outcome = retry_on_conflict("process_employee_anniversary", || {
            process_employee_once(db, policy, employee, as_of)
        })
        .await;

        let result = match outcome {
            Ok(done) => EmployeeRunResult {
                employee_id: employee.id,
                name: employee.name.clone(),
                period: done.period,
                status: if done.grants.is_empty() {
                    EmployeeRunStatus::AlreadyAllocated
                } else {
                    EmployeeRunStatus::Allocated
                },
                grants: done.grants,
                already_allocated: done.already_allocated,
            },
            Err(e) => {
                error!(
                    employee_id = employee.id,
                    name = %employee.name,
                    error = %e,
                    "Anniversary allocation failed"
                );
                EmployeeRunResult {
                    employee_id: employee.id,
                    name: employee.name.clone(),
                    period: work_year_on(employee.hire_date, as_of),
                    status: EmployeeRunStatus::Failed {
                        reason: e.to_string(),
                    },
                    grants: Vec::new(),
                    already_allocated: Vec::new(),
                }
            }
        };
        results.push(result);
    }

    let mut maintenance_errors = 0;

    let expiry = expire_buckets(db, as_of).await.unwrap_or_else(|e| {
        error!(error = %e, "Expiry sweep failed");
        maintenance_errors += 1;
        ExpirySweep::default()
    });

    let realignment = match &previous {
        Some(prev) => realign_changed_since(db, policy, prev.started_at)
            .await
            .unwrap_or_else(|e| {
                error!(error = %e, "Carry-forward realignment sweep failed");
                maintenance_errors += 1;
                RealignmentSweep::default()
            }),
        None => RealignmentSweep::default(),
    };

    let archived = match archive_before_retention(db, policy, as_of).await {
        Ok(archived) => archived,
        Err(e) => {
            error!(error = %e, "Transaction archival failed");
            maintenance_errors += 1;
            0
        }
    };
    if archived > 0 {
        info!(archived, "Archived old ledger transactions");
    }

    let summary = RunSummary {
        run_id: run.id,
        run_date: as_of,
        employees: results,
        expired: expiry.expired,
        realigned: realignment.changes,
        archived,
        maintenance_errors: maintenance_errors + expiry.errors + realignment.errors,
    };
    complete_run(db, run, &summary).await?;

    info!(
        run_id = summary.run_id,
        processed = summary.processed(),
        skipped = summary.skipped(),
        errors = summary.errors(),
        expired = summary.expired.len(),
        realigned = summary.realigned.len(),
        "Anniversary run completed"
    );
    Ok(summary)
}

async fn archive_before_retention(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    as_of: NaiveDate,
) -> Result<u64> {
    let cutoff = retention_cutoff(as_of, policy.transaction_retention_years)?;
    archive_transactions_before(db, cutoff).await
}

/// Start of the retention window: midnight UTC `years` years before `as_of`.
fn retention_cutoff(as_of: NaiveDate, years: i32) -> Result<chrono::DateTime<Utc>> {
    let months = u32::try_from(years)?
        .checked_mul(12)
        .ok_or_else(|| Error::Config {
            message: format!("transaction_retention_years {years} is too large"),
        })?;
    let date = as_of
        .checked_sub_months(Months::new(months))
        .ok_or_else(|| Error::InvalidDate {
            message: format!("{as_of} minus {years} years is out of range"),
        })?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

async fn start_run(db: &DatabaseConnection, run_date: NaiveDate) -> Result<AnniversaryRunModel> {
    let model = anniversary_run::ActiveModel {
        run_date: Set(run_date),
        status: Set(RunStatus::Running),
        processed: Set(0),
        skipped: Set(0),
        errors: Set(0),
        expired: Set(0),
        realigned: Set(0),
        archived: Set(0),
        started_at: Set(Utc::now()),
        finished_at: Set(None),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

async fn complete_run(
    db: &DatabaseConnection,
    run: AnniversaryRunModel,
    summary: &RunSummary,
) -> Result<AnniversaryRunModel> {
    let mut active_model: anniversary_run::ActiveModel = run.into();
    active_model.status = Set(RunStatus::Completed);
    active_model.processed = Set(i32::try_from(summary.processed())?);
    active_model.skipped = Set(i32::try_from(summary.skipped())?);
    active_model.errors = Set(i32::try_from(summary.errors())?);
    active_model.expired = Set(i32::try_from(summary.expired.len())?);
    active_model.realigned = Set(i32::try_from(summary.realigned.len())?);
    active_model.archived = Set(i32::try_from(summary.archived)?);
    active_model.finished_at = Set(Some(Utc::now()));
    active_model.update(db).await.map_err(Into::into)
}

/// The most recent completed run, by run date.
pub async fn get_last_completed_run<C>(db: &C) -> Result<Option<AnniversaryRunModel>>
where
    C: ConnectionTrait,
{
    AnniversaryRun::find()
        .filter(AnniversaryRunColumn::Status.eq(RunStatus::Completed))
        .order_by_desc(AnniversaryRunColumn::RunDate)
        .order_by_desc(AnniversaryRunColumn::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// The most recent completed run dated on or before `date`.
///
/// Runs forced for a later date are ignored, so they cannot hold back
/// catch-up of the dates before them.
pub async fn get_last_completed_run_through<C>(
    db: &C,
    date: NaiveDate,
) -> Result<Option<AnniversaryRunModel>>
where
    C: ConnectionTrait,
{
    AnniversaryRun::find()
        .filter(AnniversaryRunColumn::Status.eq(RunStatus::Completed))
        .filter(AnniversaryRunColumn::RunDate.lte(date))
        .order_by_desc(AnniversaryRunColumn::RunDate)
        .order_by_desc(AnniversaryRunColumn::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// The completed run that started last, whatever date it processed.
async fn get_latest_finished_run(db: &DatabaseConnection) -> Result<Option<AnniversaryRunModel>> {
    AnniversaryRun::find()
        .filter(AnniversaryRunColumn::Status.eq(RunStatus::Completed))
        .order_by_desc(AnniversaryRunColumn::StartedAt)
        .order_by_desc(AnniversaryRunColumn::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Run records, newest first.
pub async fn list_runs<C>(db: &C, limit: u64) -> Result<Vec<AnniversaryRunModel>>
where
    C: ConnectionTrait,
{
    AnniversaryRun::find()
        .order_by_desc(AnniversaryRunColumn::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Run dates still owed up to `today`, oldest first.
///
/// Starts the day after the last completed run dated on or before `today`,
/// but never more than `max_catch_up_days` days back. With no such run, only
/// `today` is due.
pub async fn pending_run_dates<C>(
    db: &C,
    today: NaiveDate,
    max_catch_up_days: i64,
) -> Result<Vec<NaiveDate>>
where
    C: ConnectionTrait,
{
    let earliest = today - Duration::days(max_catch_up_days.max(0));
    let start = match get_last_completed_run_through(db, today).await? {
        Some(last) => last.run_date + Duration::days(1),
        None => today,
    };
    if start < earliest {
        warn!(%start, %earliest, "Catch-up window exceeded, skipping older dates");
    }
    Ok(start
        .max(earliest)
        .iter_days()
        .take_while(|d| *d <= today)
        .collect())
}

/// Runs every pending date up to `today`, oldest first.
pub async fn run_pending(
    db: &DatabaseConnection,
    policy: &LeavePolicy,
    today: NaiveDate,
    max_catch_up_days: i64,
) -> Result<Vec<RunSummary>> {
    let dates = pending_run_dates(db, today, max_catch_up_days).await?;
    let mut summaries = Vec::with_capacity(dates.len());
    for date in dates {
        summaries.push(run_anniversary_processing(db, policy, date).await?);
    }
    Ok(summaries)
}

/// Formats a run summary for operators.
#[must_use]
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = format!(
        "Anniversary run #{} for {} ({})\n",
        summary.run_id,
        summary.run_date,
        summary.run_date.format("%A")
    );
    let _ = writeln!(
        out,
        "  Processed: {} | Skipped: {} | Errors: {} | Expired: {} | Realigned: {} | Archived: {}",
        summary.processed(),
        summary.skipped(),
        summary.errors(),
        summary.expired.len(),
        summary.realigned.len(),
        summary.archived
    );

    for employee in &summary.employees {
        let _ = write!(
            out,
            "  {} (#{}) period {}: ",
            employee.name, employee.employee_id, employee.period
        );
        match &employee.status {
            EmployeeRunStatus::Failed { reason } => {
                let _ = writeln!(out, "FAILED - {reason}");
            }
            EmployeeRunStatus::AlreadyAllocated => out.push_str("already allocated\n"),
            EmployeeRunStatus::Allocated => {
                let grants: Vec<String> = employee
                    .grants
                    .iter()
                    .map(|g| {
                        if g.carried_forward > 0 {
                            format!("{} {} (+{} carried)", g.category, g.allocated, g.carried_forward)
                        } else {
                            format!("{} {}", g.category, g.allocated)
                        }
                    })
                    .collect();
                let _ = writeln!(out, "{}", grants.join(", "));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::bucket::{get_bucket, list_active_buckets, require_bucket};
    use crate::core::roster::{NewEmployee, create_employee};
    use crate::core::transaction::get_employee_ledger;
    use crate::entities::TransactionKind;
    use crate::test_utils::{create_test_employee, date, setup_test_db, test_policy};

    #[tokio::test]
    async fn test_run_allocates_anniversary_employees() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        // Hired 2020-01-15
        let veteran = create_test_employee(&db).await?;
        let other = create_employee(&db, NewEmployee::new("Other", date(2020, 5, 1))).await?;

        let summary = run_anniversary_processing(&db, &policy, date(2022, 1, 15)).await?;
        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.errors(), 0);
        assert_eq!(summary.employees[0].employee_id, veteran.id);
        assert_eq!(summary.employees[0].period, 2);
        assert_eq!(summary.employees[0].grants.len(), 3);

        let annual = require_bucket(&db, veteran.id, LeaveCategory::Annual, 2).await?;
        assert_eq!(annual.allocated, 20);
        assert!(list_active_buckets(&db, other.id).await?.is_empty());

        let run = get_last_completed_run(&db).await?.unwrap();
        assert_eq!(run.id, summary.run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.processed, 1);
        assert!(run.finished_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_rerun_same_date_skips() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;
        let run_date = date(2022, 1, 15);

        run_anniversary_processing(&db, &policy, run_date).await?;
        let ledger_len = get_employee_ledger(&db, employee.id).await?.len();

        let again = run_anniversary_processing(&db, &policy, run_date).await?;
        assert_eq!(again.processed(), 0);
        assert_eq!(again.skipped(), 1);
        assert_eq!(again.errors(), 0);
        assert_eq!(again.employees[0].already_allocated.len(), 3);
        assert_eq!(get_employee_ledger(&db, employee.id).await?.len(), ledger_len);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_employee_is_rolled_back_and_isolated() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let healthy = create_test_employee(&db).await?;
        let mut broken = NewEmployee::new("Broken", date(2020, 1, 15));
        broken.use_default_policy = false;
        broken.casual_allocation = Some(-5);
        let broken = create_employee(&db, broken).await?;

        let summary = run_anniversary_processing(&db, &policy, date(2022, 1, 15)).await?;
        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.errors(), 1);

        let failed = summary
            .employees
            .iter()
            .find(|e| e.employee_id == broken.id)
            .unwrap();
        assert!(matches!(failed.status, EmployeeRunStatus::Failed { .. }));

        // Annual and sick were written before casual failed; all rolled back
        assert!(list_active_buckets(&db, broken.id).await?.is_empty());
        assert!(get_employee_ledger(&db, broken.id).await?.is_empty());
        assert!(
            get_bucket(&db, healthy.id, LeaveCategory::Casual, 2)
                .await?
                .is_some()
        );

        let run = get_last_completed_run(&db).await?.unwrap();
        assert_eq!(run.errors, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_successive_anniversaries_carry_forward() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;

        run_anniversary_processing(&db, &policy, date(2021, 1, 15)).await?;
        crate::core::deduction::deduct(
            &db,
            &crate::core::deduction::DeductionRequest::new(
                employee.id,
                LeaveCategory::Annual,
                8,
                date(2021, 6, 1),
            ),
        )
        .await?;
        let summary = run_anniversary_processing(&db, &policy, date(2022, 1, 15)).await?;
        let annual = summary.employees[0]
            .grants
            .iter()
            .find(|g| g.category == LeaveCategory::Annual)
            .unwrap();
        assert_eq!(annual.carried_forward, 12);

        let current = require_bucket(&db, employee.id, LeaveCategory::Annual, 2).await?;
        assert_eq!(current.total, 32);
        let prior = require_bucket(&db, employee.id, LeaveCategory::Annual, 1).await?;
        assert!(!prior.is_active);
        Ok(())
    }

    #[tokio::test]
    async fn test_run_expires_due_buckets() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let employee = create_test_employee(&db).await?;

        // Period 1 expires 2023-12-31
        run_anniversary_processing(&db, &policy, date(2021, 1, 15)).await?;
        let summary = run_anniversary_processing(&db, &policy, date(2024, 1, 2)).await?;
        assert_eq!(summary.expired.len(), 1);
        assert_eq!(summary.expired[0].period, 1);
        assert_eq!(summary.expired[0].forfeited, 20);

        let expiries = get_employee_ledger(&db, employee.id)
            .await?
            .into_iter()
            .filter(|t| t.kind == TransactionKind::Expiry)
            .count();
        assert_eq!(expiries, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_hire_day_starts_period_zero() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let hire = date(2024, 4, 2);
        let employee = create_employee(&db, NewEmployee::new("New Hire", hire)).await?;

        let summary = run_anniversary_processing(&db, &policy, hire).await?;
        assert_eq!(summary.employees[0].period, 0);
        let annual = require_bucket(&db, employee.id, LeaveCategory::Annual, 0).await?;
        assert_eq!(annual.allocated, 0);
        let sick = require_bucket(&db, employee.id, LeaveCategory::Sick, 0).await?;
        assert_eq!(sick.allocated, 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_run_dates() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        let today = date(2024, 3, 10);

        assert_eq!(pending_run_dates(&db, today, 30).await?, vec![today]);

        run_anniversary_processing(&db, &policy, date(2024, 3, 7)).await?;
        assert_eq!(
            pending_run_dates(&db, today, 30).await?,
            vec![date(2024, 3, 8), date(2024, 3, 9), today]
        );
        assert_eq!(
            pending_run_dates(&db, today, 1).await?,
            vec![date(2024, 3, 9), today]
        );

        let summaries = run_pending(&db, &policy, today, 30).await?;
        assert_eq!(summaries.len(), 3);
        assert!(pending_run_dates(&db, today, 30).await?.is_empty());
        assert_eq!(list_runs(&db, 10).await?.len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_future_manual_run_does_not_block_catch_up() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        // Hired 2020-01-15
        let employee = create_test_employee(&db).await?;
        let today = date(2022, 1, 15);

        run_anniversary_processing(&db, &policy, date(2022, 6, 1)).await?;
        assert_eq!(pending_run_dates(&db, today, 31).await?, vec![today]);

        let summaries = run_pending(&db, &policy, today, 31).await?;
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].processed(), 1);
        assert!(
            get_bucket(&db, employee.id, LeaveCategory::Annual, 2)
                .await?
                .is_some()
        );
        assert!(pending_run_dates(&db, today, 31).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_maintenance_failure_still_completes_run() -> Result<()> {
        let db = setup_test_db().await?;
        let mut policy = test_policy();
        policy.transaction_retention_years = -1;
        create_test_employee(&db).await?;

        let summary = run_anniversary_processing(&db, &policy, date(2022, 1, 15)).await?;
        assert_eq!(summary.processed(), 1);
        assert_eq!(summary.maintenance_errors, 1);
        assert_eq!(summary.archived, 0);

        let run = get_last_completed_run(&db).await?.unwrap();
        assert_eq!(run.id, summary.run_id);
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.errors, 1);
        Ok(())
    }

    #[test]
    fn test_retention_cutoff() {
        let cutoff = retention_cutoff(date(2024, 2, 29), 3).unwrap();
        assert_eq!(cutoff.date_naive(), date(2021, 2, 28));
        assert!(retention_cutoff(date(2024, 1, 1), -1).is_err());
    }

    #[tokio::test]
    async fn test_format_run_summary() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = test_policy();
        create_test_employee(&db).await?;

        let summary = run_anniversary_processing(&db, &policy, date(2022, 1, 15)).await?;
        let text = format_run_summary(&summary);
        assert!(text.contains("Processed: 1"));
        assert!(text.contains("annual 20"));
        Ok(())
    }
}
