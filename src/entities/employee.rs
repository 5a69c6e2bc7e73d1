//! Employee entity - The roster fields the ledger reads.
//!
//! The HR system owns employee records; this table mirrors only what the ledger
//! needs: hire date, active flag, and per-employee allocation overrides.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Employee roster model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "employees")]
pub struct Model {
    /// Unique identifier for the employee
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name used in logs and summaries
    pub name: String,
    /// Hire date; anniversaries are derived from it
    pub hire_date: Date,
    /// Inactive employees are never picked up by the scheduler
    pub is_active: bool,
    /// When false, the overrides below replace the policy allocation
    pub use_default_policy: bool,
    /// Annual allocation override in days
    pub annual_allocation: Option<i32>,
    /// Sick allocation override in days
    pub sick_allocation: Option<i32>,
    /// Casual allocation override in days
    pub casual_allocation: Option<i32>,
}

/// Defines relationships between Employee and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One employee has many buckets
    #[sea_orm(has_many = "super::leave_bucket::Entity")]
    LeaveBuckets,
    /// One employee has many ledger transactions
    #[sea_orm(has_many = "super::leave_transaction::Entity")]
    LeaveTransactions,
}

impl Related<super::leave_bucket::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LeaveBuckets.def()
    }
}

impl Related<super::leave_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LeaveTransactions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
