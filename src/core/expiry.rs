//! Bucket expiry.
//!
//! A bucket whose expiration date has passed is marked inactive and its
//! remaining days are forfeited with one EXPIRY row. Each bucket is its own
//! unit of work, so a failure on one does not hold up the rest.

use crate::{
    core::{
        bucket::save_bucket,
        transaction::{BucketSnapshot, LedgerEntry, record_transaction},
        unit_of_work::retry_on_conflict,
    },
    entities::{LeaveBucket, LeaveBucketColumn, LeaveCategory, Operation, TransactionKind},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, TransactionTrait, prelude::*};
use tracing::{info, warn};

/// One bucket closed by expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiredBucket {
    /// Bucket id
    pub bucket_id: i64,
    /// Owner
    pub employee_id: i64,
    /// Category
    pub category: LeaveCategory,
    /// Period
    pub period: i32,
    /// Days forfeited
    pub forfeited: i32,
}

/// Outcome of an expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpirySweep {
    /// Buckets closed
    pub expired: Vec<ExpiredBucket>,
    /// Buckets that failed to close
    pub errors: usize,
}

/// Expires one bucket if it is still active and past its expiration date.
///
/// Returns `None` when there was nothing to do, which makes a repeated call
/// a no-op.
pub async fn expire_bucket(
    db: &DatabaseConnection,
    bucket_id: i64,
    as_of: NaiveDate,
) -> Result<Option<ExpiredBucket>> {
    retry_on_conflict("expire_bucket", || expire_once(db, bucket_id, as_of)).await
}

async fn expire_once(
    db: &DatabaseConnection,
    bucket_id: i64,
    as_of: NaiveDate,
) -> Result<Option<ExpiredBucket>> {
    let txn = db.begin().await?;
    let Some(bucket) = LeaveBucket::find_by_id(bucket_id).one(&txn).await? else {
        return Ok(None);
    };
    if !bucket.is_active || bucket.expiration_date.is_none_or(|expires| expires >= as_of) {
        return Ok(None);
    }

    let forfeited = bucket.remaining_days();
    let before = BucketSnapshot::from(&bucket);
    let mut closed = bucket;
    closed.is_active = false;
    let closed = save_bucket(&txn, closed).await?;

    let expired_on = closed
        .expiration_date
        .map_or_else(String::new, |d| d.to_string());
    record_transaction(
        &txn,
        before,
        &closed,
        LedgerEntry::system(
            TransactionKind::Expiry,
            Operation::Subtract,
            forfeited,
            format!("Expired after {expired_on}: {forfeited} days forfeited"),
        ),
    )
    .await?;
    txn.commit().await?;

    Ok(Some(ExpiredBucket {
        bucket_id: closed.id,
        employee_id: closed.employee_id,
        category: closed.category,
        period: closed.period,
        forfeited,
    }))
}

/// Expires every active bucket whose expiration date is before `as_of`.
pub async fn expire_buckets(db: &DatabaseConnection, as_of: NaiveDate) -> Result<ExpirySweep> {
    let due = LeaveBucket::find()
        .filter(LeaveBucketColumn::IsActive.eq(true))
        .filter(LeaveBucketColumn::ExpirationDate.lt(as_of))
        .order_by_asc(LeaveBucketColumn::Id)
        .all(db)
        .await?;

    let mut sweep = ExpirySweep::default();
    for bucket in due {
        match expire_bucket(db, bucket.id, as_of).await {
            Ok(Some(expired)) => sweep.expired.push(expired),
            Ok(None) => {}
            Err(e) => {
                warn!(
                    bucket_id = bucket.id,
                    employee_id = bucket.employee_id,
                    error = %e,
                    "Failed to expire bucket"
                );
                sweep.errors += 1;
            }
        }
    }

    if !sweep.expired.is_empty() {
        info!(
            expired = sweep.expired.len(),
            forfeited = sweep.expired.iter().map(|e| e.forfeited).sum::<i32>(),
            "Expired leave buckets"
        );
    }
    Ok(sweep)
}
