//! Employee roster reads and anniversary arithmetic.
//!
//! The HR system owns employee records; the ledger only reads hire date, the
//! active flag, and allocation overrides. `create_employee` exists so the CLI
//! and tests can populate the read model.

use crate::{
    entities::{Employee, EmployeeColumn, EmployeeModel, employee},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::debug;

/// Fields needed to register an employee in the roster read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEmployee {
    /// Display name
    pub name: String,
    /// Hire date
    pub hire_date: NaiveDate,
    /// Whether policy defaults apply instead of the overrides
    pub use_default_policy: bool,
    /// Annual allocation override
    pub annual_allocation: Option<i32>,
    /// Sick allocation override
    pub sick_allocation: Option<i32>,
    /// Casual allocation override
    pub casual_allocation: Option<i32>,
}

impl NewEmployee {
    /// An employee on the default policy.
    #[must_use]
    pub fn new(name: impl Into<String>, hire_date: NaiveDate) -> Self {
        Self {
            name: name.into(),
            hire_date,
            use_default_policy: true,
            annual_allocation: None,
            sick_allocation: None,
            casual_allocation: None,
        }
    }
}

/// Inserts an active employee into the roster read model.
pub async fn create_employee<C>(db: &C, new: NewEmployee) -> Result<EmployeeModel>
where
    C: ConnectionTrait,
{
    let model = employee::ActiveModel {
        name: Set(new.name),
        hire_date: Set(new.hire_date),
        is_active: Set(true),
        use_default_policy: Set(new.use_default_policy),
        annual_allocation: Set(new.annual_allocation),
        sick_allocation: Set(new.sick_allocation),
        casual_allocation: Set(new.casual_allocation),
        ..Default::default()
    };
    let created = model.insert(db).await?;
    debug!(employee_id = created.id, "Employee added to roster");
    Ok(created)
}

/// Looks up an employee, failing with `EmployeeNotFound` when absent.
pub async fn get_employee<C>(db: &C, employee_id: i64) -> Result<EmployeeModel>
where
    C: ConnectionTrait,
{
    Employee::find_by_id(employee_id)
        .one(db)
        .await?
        .ok_or(Error::EmployeeNotFound { employee_id })
}

/// Marks an employee active or inactive. Inactive employees are skipped by the scheduler.
pub async fn set_employee_active<C>(db: &C, employee_id: i64, is_active: bool) -> Result<EmployeeModel>
where
    C: ConnectionTrait,
{
    let existing = get_employee(db, employee_id).await?;
    let mut active_model: employee::ActiveModel = existing.into();
    active_model.is_active = Set(is_active);
    active_model.update(db).await.map_err(Into::into)
}

/// Active employees whose hire anniversary falls on `date`, ordered by id.
///
/// Someone hired on `date` itself matches too: that is the start of their
/// first work year (period 0).
pub async fn find_anniversary_employees<C>(db: &C, date: NaiveDate) -> Result<Vec<EmployeeModel>>
where
    C: ConnectionTrait,
{
    let employees = Employee::find()
        .filter(EmployeeColumn::IsActive.eq(true))
        .filter(EmployeeColumn::HireDate.lte(date))
        .order_by_asc(EmployeeColumn::Id)
        .all(db)
        .await?;

    Ok(employees
        .into_iter()
        .filter(|e| anniversary_in_year(e.hire_date, date.year()) == Some(date))
        .collect())
}

/// The hire anniversary in `year`. A 29 February hire falls on 28 February
/// in non-leap years.
#[must_use]
pub fn anniversary_in_year(hire_date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, hire_date.month(), hire_date.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, hire_date.month(), 28))
}

/// Full years of service completed on `on`. Zero before the first anniversary.
#[must_use]
pub fn completed_years(hire_date: NaiveDate, on: NaiveDate) -> i32 {
    if on < hire_date {
        return 0;
    }
    let mut years = on.year() - hire_date.year();
    if anniversary_in_year(hire_date, on.year()).is_some_and(|anniversary| anniversary > on) {
        years -= 1;
    }
    years.max(0)
}

/// Work-year period containing `on`; 0 is the year starting on the hire date.
#[must_use]
pub fn work_year_on(hire_date: NaiveDate, on: NaiveDate) -> i32 {
    completed_years(hire_date, on)
}
