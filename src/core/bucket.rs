//! Balance bucket store.
//!
//! Buckets are keyed by (employee, category, period) and are never deleted.
//! Every write recomputes the derived `remaining`/`total` columns and goes
//! through an optimistic version check, so two units of work that read the
//! same bucket cannot both write it.

use crate::{
    entities::{LeaveBucket, LeaveBucketColumn, LeaveBucketModel, LeaveCategory, leave_bucket},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, SqlErr, prelude::*, sea_query::Expr};
use tracing::debug;

/// Initial values for a new bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBucket {
    /// Owner
    pub employee_id: i64,
    /// Leave category
    pub category: LeaveCategory,
    /// Work-year period
    pub period: i32,
    /// Days granted for the period
    pub allocated: i32,
    /// Days inherited from the previous period
    pub carried_forward: i32,
    /// Allocation boundary date
    pub anniversary_date: NaiveDate,
    /// Last usable day, if the bucket expires
    pub expiration_date: Option<NaiveDate>,
}

/// Fetches the bucket for a key, if any.
pub async fn get_bucket<C>(
    db: &C,
    employee_id: i64,
    category: LeaveCategory,
    period: i32,
) -> Result<Option<LeaveBucketModel>>
where
    C: ConnectionTrait,
{
    LeaveBucket::find()
        .filter(LeaveBucketColumn::EmployeeId.eq(employee_id))
        .filter(LeaveBucketColumn::Category.eq(category))
        .filter(LeaveBucketColumn::Period.eq(period))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Fetches the bucket for a key, failing with `BucketNotFound` when absent.
pub async fn require_bucket<C>(
    db: &C,
    employee_id: i64,
    category: LeaveCategory,
    period: i32,
) -> Result<LeaveBucketModel>
where
    C: ConnectionTrait,
{
    get_bucket(db, employee_id, category, period)
        .await?
        .ok_or(Error::BucketNotFound {
            employee_id,
            category,
            period,
        })
}

/// Creates a bucket with `used = 0`.
///
/// # Errors
/// `DuplicatePeriod` if a bucket already exists for the key, whether found by
/// the pre-check or reported by the unique index.
pub async fn create_bucket<C>(db: &C, new: NewBucket) -> Result<LeaveBucketModel>
where
    C: ConnectionTrait,
{
    let duplicate = || Error::DuplicatePeriod {
        employee_id: new.employee_id,
        category: new.category,
        period: new.period,
    };

    if get_bucket(db, new.employee_id, new.category, new.period)
        .await?
        .is_some()
    {
        return Err(duplicate());
    }

    let total = new.allocated + new.carried_forward;
    let now = Utc::now();
    let model = leave_bucket::ActiveModel {
        employee_id: Set(new.employee_id),
        category: Set(new.category),
        period: Set(new.period),
        allocated: Set(new.allocated),
        used: Set(0),
        carried_forward: Set(new.carried_forward),
        remaining: Set(total.max(0)),
        total: Set(total),
        advance: Set(0),
        anniversary_date: Set(new.anniversary_date),
        expiration_date: Set(new.expiration_date),
        is_active: Set(true),
        version: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match model.insert(db).await {
        Ok(bucket) => {
            debug!(
                bucket_id = bucket.id,
                employee_id = bucket.employee_id,
                category = %bucket.category,
                period = bucket.period,
                "Bucket created"
            );
            Ok(bucket)
        }
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(duplicate())
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes a mutated bucket.
///
/// Derived columns are recomputed from `allocated`, `carried_forward` and
/// `used` first. The row is only updated if its version still matches the one
/// `bucket` was read at; otherwise nothing is written and
/// `PersistenceConflict` is returned. The category hard cap is not checked
/// here: callers that change totals run cap enforcement in the same unit of
/// work.
pub async fn save_bucket<C>(db: &C, mut bucket: LeaveBucketModel) -> Result<LeaveBucketModel>
where
    C: ConnectionTrait,
{
    bucket.recompute();

    let read_version = bucket.version;
    bucket.version = read_version + 1;
    bucket.updated_at = Utc::now();

    let result = LeaveBucket::update_many()
        .col_expr(LeaveBucketColumn::Allocated, Expr::value(bucket.allocated))
        .col_expr(LeaveBucketColumn::Used, Expr::value(bucket.used))
        .col_expr(
            LeaveBucketColumn::CarriedForward,
            Expr::value(bucket.carried_forward),
        )
        .col_expr(LeaveBucketColumn::Remaining, Expr::value(bucket.remaining))
        .col_expr(LeaveBucketColumn::Total, Expr::value(bucket.total))
        .col_expr(LeaveBucketColumn::Advance, Expr::value(bucket.advance))
        .col_expr(
            LeaveBucketColumn::ExpirationDate,
            Expr::value(bucket.expiration_date),
        )
        .col_expr(LeaveBucketColumn::IsActive, Expr::value(bucket.is_active))
        .col_expr(LeaveBucketColumn::Version, Expr::value(bucket.version))
        .col_expr(LeaveBucketColumn::UpdatedAt, Expr::value(bucket.updated_at))
        .filter(LeaveBucketColumn::Id.eq(bucket.id))
        .filter(LeaveBucketColumn::Version.eq(read_version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(Error::PersistenceConflict {
            message: format!(
                "bucket {} changed since it was read at version {read_version}",
                bucket.id
            ),
        });
    }

    Ok(bucket)
}

/// All active buckets of an employee, oldest period first.
pub async fn list_active_buckets<C>(db: &C, employee_id: i64) -> Result<Vec<LeaveBucketModel>>
where
    C: ConnectionTrait,
{
    LeaveBucket::find()
        .filter(LeaveBucketColumn::EmployeeId.eq(employee_id))
        .filter(LeaveBucketColumn::IsActive.eq(true))
        .order_by_asc(LeaveBucketColumn::Period)
        .order_by_asc(LeaveBucketColumn::Category)
        .order_by_asc(LeaveBucketColumn::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active buckets of one category, oldest period first.
pub async fn list_active_category_buckets<C>(
    db: &C,
    employee_id: i64,
    category: LeaveCategory,
) -> Result<Vec<LeaveBucketModel>>
where
    C: ConnectionTrait,
{
    LeaveBucket::find()
        .filter(LeaveBucketColumn::EmployeeId.eq(employee_id))
        .filter(LeaveBucketColumn::Category.eq(category))
        .filter(LeaveBucketColumn::IsActive.eq(true))
        .order_by_asc(LeaveBucketColumn::Period)
        .order_by_asc(LeaveBucketColumn::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active buckets of one category that have not expired on `as_of`, oldest first.
pub async fn list_usable_buckets<C>(
    db: &C,
    employee_id: i64,
    category: LeaveCategory,
    as_of: NaiveDate,
) -> Result<Vec<LeaveBucketModel>>
where
    C: ConnectionTrait,
{
    Ok(list_active_category_buckets(db, employee_id, category)
        .await?
        .into_iter()
        .filter(|b| b.is_usable_on(as_of))
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{create_test_employee, date, seed_bucket, setup_test_db};

    fn new_bucket(employee_id: i64, period: i32, allocated: i32) -> NewBucket {
        NewBucket {
            employee_id,
            category: LeaveCategory::Annual,
            period,
            allocated,
            carried_forward: 0,
            anniversary_date: date(2020 + period, 1, 1),
            expiration_date: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_get_bucket() -> Result<()> {
        let db = setup_test_db().await?;
        let employee = create_test_employee(&db).await?;

        let created = create_bucket(&db, new_bucket(employee.id, 1, 20)).await?;
        assert_eq!(created.total, 20);
        assert_eq!(created.remaining, 20);
        assert_eq!(created.used, 0);
        assert_eq!(created.version, 0);

        let fetched = get_bucket(&db, employee.id, LeaveCategory::Annual, 1)
            .await?
            .unwrap();
        assert_eq!(fetched, created);

        assert!(
            get_bucket(&db, employee.id, LeaveCategory::Sick, 1)
                .await?
                .is_none()
        );
        assert!(matches!(
            require_bucket(&db, employee.id, LeaveCategory::Sick, 1).await,
            Err(Error::BucketNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_duplicate_period_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let employee = create_test_employee(&db).await?;

        create_bucket(&db, new_bucket(employee.id, 1, 20)).await?;
        let second = create_bucket(&db, new_bucket(employee.id, 1, 15)).await;
        assert!(matches!(second, Err(Error::DuplicatePeriod { period: 1, .. })));

        let all = list_active_buckets(&db, employee.id).await?;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].allocated, 20);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_recomputes_and_bumps_version() -> Result<()> {
        let db = setup_test_db().await?;
        let employee = create_test_employee(&db).await?;
        let mut bucket = create_bucket(&db, new_bucket(employee.id, 1, 20)).await?;

        bucket.used = 8;
        bucket.carried_forward = 3;
        // Stale derived values are ignored
        bucket.remaining = 999;
        let saved = save_bucket(&db, bucket).await?;
        assert_eq!(saved.total, 23);
        assert_eq!(saved.remaining, 15);
        assert_eq!(saved.version, 1);

        let stored = require_bucket(&db, employee.id, LeaveCategory::Annual, 1).await?;
        assert_eq!(stored.remaining, 15);
        assert_eq!(stored.version, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_save_with_stale_version_conflicts() -> Result<()> {
        let db = setup_test_db().await?;
        let employee = create_test_employee(&db).await?;
        let bucket = create_bucket(&db, new_bucket(employee.id, 1, 20)).await?;

        let mut first = bucket.clone();
        first.used = 5;
        save_bucket(&db, first).await?;

        let mut stale = bucket;
        stale.used = 7;
        let result = save_bucket(&db, stale).await;
        assert!(matches!(result, Err(Error::PersistenceConflict { .. })));

        let stored = require_bucket(&db, employee.id, LeaveCategory::Annual, 1).await?;
        assert_eq!(stored.used, 5);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_active_orders_oldest_first() -> Result<()> {
        let db = setup_test_db().await?;
        let employee = create_test_employee(&db).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 3, 20, 0, 0).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Sick, 1, 10, 0, 0).await?;
        let mut old = seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 0).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 0, 0).await?;

        let periods: Vec<i32> = list_active_buckets(&db, employee.id)
            .await?
            .iter()
            .map(|b| b.period)
            .collect();
        assert_eq!(periods, vec![1, 1, 2, 3]);

        old.is_active = false;
        save_bucket(&db, old).await?;
        let annual: Vec<i32> =
            list_active_category_buckets(&db, employee.id, LeaveCategory::Annual)
                .await?
                .iter()
                .map(|b| b.period)
                .collect();
        assert_eq!(annual, vec![2, 3]);
        Ok(())
    }

    #[tokio::test]
    async fn test_usable_buckets_exclude_expired() -> Result<()> {
        let db = setup_test_db().await?;
        let employee = create_test_employee(&db).await?;
        let mut expired = seed_bucket(&db, employee.id, LeaveCategory::Annual, 1, 20, 0, 0).await?;
        expired.expiration_date = Some(date(2023, 12, 31));
        save_bucket(&db, expired).await?;
        seed_bucket(&db, employee.id, LeaveCategory::Annual, 2, 20, 0, 0).await?;

        let usable =
            list_usable_buckets(&db, employee.id, LeaveCategory::Annual, date(2024, 1, 1)).await?;
        assert_eq!(usable.len(), 1);
        assert_eq!(usable[0].period, 2);
        Ok(())
    }
}
