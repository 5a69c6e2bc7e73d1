//! Balance summaries and allocation reports.
//!
//! These functions are read-only. They return structured data that the CLI
//! formats; [`format_balance_summary`] renders the operator view.

use crate::{
    config::LeavePolicy,
    core::{
        bucket::list_active_buckets,
        roster::{get_employee, work_year_on},
    },
    entities::{
        LeaveBucketModel, LeaveCategory, LeaveTransaction, LeaveTransactionColumn,
        TransactionKind,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use std::fmt::Write as _;

/// Figures for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodFigures {
    /// Period
    pub period: i32,
    /// Days granted
    pub allocated: i32,
    /// Days consumed
    pub used: i32,
    /// Days still available
    pub remaining: i32,
    /// Days inherited
    pub carried_forward: i32,
    /// Entitlement
    pub total: i32,
}

impl From<&LeaveBucketModel> for PeriodFigures {
    fn from(bucket: &LeaveBucketModel) -> Self {
        Self {
            period: bucket.period,
            allocated: bucket.allocated,
            used: bucket.used,
            remaining: bucket.remaining_days(),
            carried_forward: bucket.carried_forward,
            total: bucket.total_days(),
        }
    }
}

/// Totals for one category across its usable buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryBalance {
    /// Category
    pub category: LeaveCategory,
    /// Summed allocated
    pub allocated: i32,
    /// Summed used
    pub used: i32,
    /// Summed remaining
    pub remaining: i32,
    /// Summed carried forward
    pub carried_forward: i32,
    /// Summed total
    pub total: i32,
    /// Days taken in advance
    pub advance: i32,
    /// Hard cap for the category
    pub hard_cap: i32,
    /// Whether the total has reached the hard cap
    pub at_cap: bool,
    /// The bucket for the work year containing the as-of date, if allocated
    pub current_period: Option<PeriodFigures>,
}

/// An employee's balance on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmployeeBalance {
    /// Employee
    pub employee_id: i64,
    /// Display name
    pub name: String,
    /// Date the balance was computed for
    pub as_of: NaiveDate,
    /// Work year containing `as_of`
    pub work_year: i32,
    /// Usable buckets, oldest first
    pub buckets: Vec<LeaveBucketModel>,
    /// One entry per configured category
    pub categories: Vec<CategoryBalance>,
}

impl EmployeeBalance {
    /// Totals for `category`, if it is configured.
    #[must_use]
    pub fn category(&self, category: LeaveCategory) -> Option<&CategoryBalance> {
        self.categories.iter().find(|c| c.category == category)
    }
}

/// Computes an employee's balance on `as_of`.
///
/// Only active buckets that have not expired on `as_of` count, whether or not
/// the expiry sweep has closed them yet.
pub async fn get_employee_balance<C>(
    db: &C,
    policy: &LeavePolicy,
    employee_id: i64,
    as_of: NaiveDate,
) -> Result<EmployeeBalance>
where
    C: ConnectionTrait,
{
    let employee = get_employee(db, employee_id).await?;
    let work_year = work_year_on(employee.hire_date, as_of);
    let buckets: Vec<LeaveBucketModel> = list_active_buckets(db, employee_id)
        .await?
        .into_iter()
        .filter(|b| b.is_usable_on(as_of))
        .collect();

    let categories = policy
        .categories
        .iter()
        .map(|category_policy| {
            let in_category: Vec<&LeaveBucketModel> = buckets
                .iter()
                .filter(|b| b.category == category_policy.category)
                .collect();
            let total: i32 = in_category.iter().map(|b| b.total_days()).sum();
            CategoryBalance {
                category: category_policy.category,
                allocated: in_category.iter().map(|b| b.allocated).sum(),
                used: in_category.iter().map(|b| b.used).sum(),
                remaining: in_category.iter().map(|b| b.remaining_days()).sum(),
                carried_forward: in_category.iter().map(|b| b.carried_forward).sum(),
                total,
                advance: in_category.iter().map(|b| b.advance).sum(),
                hard_cap: category_policy.hard_cap,
                at_cap: total >= category_policy.hard_cap,
                current_period: in_category
                    .iter()
                    .find(|b| b.period == work_year)
                    .map(|b| PeriodFigures::from(*b)),
            }
        })
        .collect();

    Ok(EmployeeBalance {
        employee_id,
        name: employee.name,
        as_of,
        work_year,
        buckets,
        categories,
    })
}

/// Renders a balance for operators.
#[must_use]
pub fn format_balance_summary(balance: &EmployeeBalance) -> String {
    let mut out = format!(
        "Leave balance for {} (#{}) as of {} (work year {})\n",
        balance.name, balance.employee_id, balance.as_of, balance.work_year
    );
    for c in &balance.categories {
        let _ = write!(
            out,
            "  {:<7} remaining {:>3} | allocated {:>3} | carried {:>3} | used {:>3} | total {:>3}/{}",
            c.category.to_string(),
            c.remaining,
            c.allocated,
            c.carried_forward,
            c.used,
            c.total,
            c.hard_cap
        );
        if c.at_cap {
            out.push_str(" (at cap)");
        }
        if c.advance > 0 {
            let _ = write!(out, " (advance {} days)", c.advance);
        }
        out.push('\n');
    }
    if balance.buckets.is_empty() {
        out.push_str("  No active leave buckets\n");
    }
    out
}

/// One allocation in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationReportEntry {
    /// Employee
    pub employee_id: i64,
    /// Category
    pub category: LeaveCategory,
    /// Period
    pub period: i32,
    /// Days granted
    pub amount: i32,
    /// When it was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Allocations recorded in a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationReport {
    /// First day, inclusive
    pub from: NaiveDate,
    /// Last day, inclusive
    pub to: NaiveDate,
    /// Number of allocations
    pub count: usize,
    /// Summed days granted
    pub total_days: i32,
    /// Allocations in commit order
    pub entries: Vec<AllocationReportEntry>,
}

/// Reports every ALLOCATION recorded between `from` and `to` (inclusive, UTC days).
pub async fn allocation_report<C>(db: &C, from: NaiveDate, to: NaiveDate) -> Result<AllocationReport>
where
    C: ConnectionTrait,
{
    if to < from {
        return Err(Error::InvalidDate {
            message: format!("report range ends ({to}) before it starts ({from})"),
        });
    }
    let start = from.and_time(chrono::NaiveTime::MIN).and_utc();
    let end = (to + Duration::days(1)).and_time(chrono::NaiveTime::MIN).and_utc();

    let entries: Vec<AllocationReportEntry> = LeaveTransaction::find()
        .filter(LeaveTransactionColumn::Kind.eq(TransactionKind::Allocation))
        .filter(LeaveTransactionColumn::CreatedAt.gte(start))
        .filter(LeaveTransactionColumn::CreatedAt.lt(end))
        .order_by_asc(LeaveTransactionColumn::Id)
        .all(db)
        .await?
        .into_iter()
        .map(|tx| AllocationReportEntry {
            employee_id: tx.employee_id,
            category: tx.category,
            period: tx.period,
            amount: tx.amount,
            recorded_at: tx.created_at,
        })
        .collect();

    Ok(AllocationReport {
        from,
        to,
        count: entries.len(),
        total_days: entries.iter().map(|e| e.amount).sum(),
        entries,
    })
}
