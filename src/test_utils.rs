//! Shared test utilities for the leave ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and creating employees and buckets with sensible defaults.

use crate::{
    config::{LeavePolicy, database},
    core::{
        bucket::{NewBucket, create_bucket, save_bucket},
        roster::{NewEmployee, create_employee},
    },
    entities::{EmployeeModel, LeaveBucketModel, LeaveCategory},
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use tracing_subscriber::EnvFilter;

/// Routes tracing output through the test harness; `RUST_LOG` picks the level.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = database::create_connection("sqlite::memory:").await?;
    database::create_tables(&db).await?;
    Ok(db)
}

/// Shorthand for a calendar date in tests.
///
/// # Panics
/// On an invalid date.
#[allow(clippy::unwrap_used)]
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// The built-in policy: annual 20 days (cap 40, carry cap 20), sick and casual 10.
#[must_use]
pub fn test_policy() -> LeavePolicy {
    LeavePolicy::default()
}

/// Creates a test employee with sensible defaults.
///
/// # Defaults
/// * `name`: "Test Employee"
/// * `hire_date`: 2020-01-15
/// * `use_default_policy`: true
pub async fn create_test_employee(db: &DatabaseConnection) -> Result<EmployeeModel> {
    create_employee(db, NewEmployee::new("Test Employee", date(2020, 1, 15))).await
}

/// Creates an employee with an annual allocation override.
pub async fn create_custom_employee(
    db: &DatabaseConnection,
    name: &str,
    hire_date: NaiveDate,
    annual_allocation: Option<i32>,
) -> Result<EmployeeModel> {
    let mut new = NewEmployee::new(name, hire_date);
    new.use_default_policy = annual_allocation.is_none();
    new.annual_allocation = annual_allocation;
    create_employee(db, new).await
}

/// Inserts an active bucket directly, without ledger rows.
///
/// # Defaults
/// * `anniversary_date`: 1 January of 2020 + `period`
/// * `expiration_date`: None
pub async fn seed_bucket(
    db: &DatabaseConnection,
    employee_id: i64,
    category: LeaveCategory,
    period: i32,
    allocated: i32,
    carried_forward: i32,
    used: i32,
) -> Result<LeaveBucketModel> {
    let bucket = create_bucket(
        db,
        NewBucket {
            employee_id,
            category,
            period,
            allocated,
            carried_forward,
            anniversary_date: date(2020 + period, 1, 1),
            expiration_date: None,
        },
    )
    .await?;
    if used == 0 {
        return Ok(bucket);
    }
    let mut drawn = bucket;
    drawn.used = used;
    save_bucket(db, drawn).await
}

/// Marks a bucket inactive, as a superseding allocation would.
pub async fn retire_bucket(
    db: &DatabaseConnection,
    bucket: LeaveBucketModel,
) -> Result<LeaveBucketModel> {
    let mut retired = bucket;
    retired.is_active = false;
    save_bucket(db, retired).await
}

/// An in-memory annual bucket for pure planning tests.
#[must_use]
pub fn bucket_model(
    id: i64,
    period: i32,
    allocated: i32,
    carried_forward: i32,
    used: i32,
) -> LeaveBucketModel {
    let mut bucket = LeaveBucketModel {
        id,
        employee_id: 1,
        category: LeaveCategory::Annual,
        period,
        allocated,
        used,
        carried_forward,
        remaining: 0,
        total: 0,
        advance: 0,
        anniversary_date: date(2020 + period, 1, 1),
        expiration_date: None,
        is_active: true,
        version: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    bucket.recompute();
    bucket
}
