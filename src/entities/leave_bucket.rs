//! Leave bucket entity - One employee's entitlement for one category and period.
//!
//! `remaining` and `total` are stored for querying and auditing, but they are
//! always derived from `allocated`, `carried_forward` and `used`. Code reads
//! them through [`Model::total_days`] and [`Model::remaining_days`], and the
//! store calls [`Model::recompute`] before every write.

use super::sea_orm_active_enums::LeaveCategory;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Leave bucket database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "leave_buckets")]
pub struct Model {
    /// Unique identifier for the bucket
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owner of the bucket
    #[sea_orm(indexed)]
    pub employee_id: i64,
    /// Leave category
    pub category: LeaveCategory,
    /// Work-year index; 0 is the hire year
    pub period: i32,
    /// Days granted for this period
    pub allocated: i32,
    /// Cumulative days consumed, never decreases
    pub used: i32,
    /// Days inherited from the previous period
    pub carried_forward: i32,
    /// Derived: `max(0, allocated + carried_forward - used)`
    pub remaining: i32,
    /// Derived: `allocated + carried_forward`
    pub total: i32,
    /// Days consumed beyond the pool under explicit authorization
    pub advance: i32,
    /// Allocation boundary date for this period
    pub anniversary_date: Date,
    /// Last day the bucket may be drawn from, if it expires
    pub expiration_date: Option<Date>,
    /// False once superseded or expired; rows are never deleted
    pub is_active: bool,
    /// Optimistic concurrency counter, bumped on every write
    pub version: i32,
    /// When the bucket was created
    pub created_at: DateTimeUtc,
    /// When the bucket was last written
    pub updated_at: DateTimeUtc,
}

impl Model {
    /// `allocated + carried_forward`
    #[must_use]
    pub const fn total_days(&self) -> i32 {
        self.allocated + self.carried_forward
    }

    /// `max(0, total - used)`
    #[must_use]
    pub fn remaining_days(&self) -> i32 {
        (self.total_days() - self.used).max(0)
    }

    /// Refreshes the stored derived columns from their inputs.
    pub fn recompute(&mut self) {
        self.total = self.total_days();
        self.remaining = self.remaining_days();
    }

    /// Whether the bucket can still be drawn from on `as_of`.
    #[must_use]
    pub fn is_usable_on(&self, as_of: Date) -> bool {
        self.is_active && self.expiration_date.is_none_or(|expires| expires >= as_of)
    }
}

/// Defines relationships between `LeaveBucket` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each bucket belongs to one employee
    #[sea_orm(
        belongs_to = "super::employee::Entity",
        from = "Column::EmployeeId",
        to = "super::employee::Column::Id"
    )]
    Employee,
}

impl Related<super::employee::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Employee.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn bucket(allocated: i32, carried_forward: i32, used: i32) -> Model {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        Model {
            id: 1,
            employee_id: 1,
            category: LeaveCategory::Annual,
            period: 1,
            allocated,
            used,
            carried_forward,
            remaining: 0,
            total: 0,
            advance: 0,
            anniversary_date: date,
            expiration_date: None,
            is_active: true,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_derived_figures() {
        let mut b = bucket(20, 5, 8);
        b.recompute();
        assert_eq!(b.total, 25);
        assert_eq!(b.remaining, 17);
    }

    #[test]
    fn test_remaining_floors_at_zero() {
        let mut b = bucket(10, 0, 14);
        b.recompute();
        assert_eq!(b.total, 10);
        assert_eq!(b.remaining, 0);
    }

    #[test]
    fn test_usable_respects_expiration() {
        let mut b = bucket(20, 0, 0);
        b.expiration_date = NaiveDate::from_ymd_opt(2026, 12, 31);
        assert!(b.is_usable_on(NaiveDate::from_ymd_opt(2026, 12, 31).unwrap()));
        assert!(!b.is_usable_on(NaiveDate::from_ymd_opt(2027, 1, 1).unwrap()));

        b.expiration_date = None;
        b.is_active = false;
        assert!(!b.is_usable_on(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()));
    }
}
