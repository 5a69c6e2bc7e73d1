//! Leave transaction entity - Append-only record of every bucket mutation.
//!
//! Each row captures the bucket summary before and after the mutation. Rows are
//! inserted in the same database transaction as the bucket write and are never
//! updated afterwards, except for the `is_archived` retention flag.

use super::sea_orm_active_enums::{LeaveCategory, Operation, TransactionKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Leave transaction database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "leave_transactions")]
pub struct Model {
    /// Unique identifier; increases in commit order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Employee whose bucket changed
    #[sea_orm(indexed)]
    pub employee_id: i64,
    /// Bucket that changed
    pub bucket_id: Option<i64>,
    /// Category of the bucket
    pub category: LeaveCategory,
    /// Period of the bucket
    #[sea_orm(indexed)]
    pub period: i32,
    /// Kind of mutation
    pub kind: TransactionKind,
    /// Direction of `amount`
    pub operation: Operation,
    /// Days involved in the mutation
    pub amount: i32,
    /// Snapshot before: allocated
    pub before_allocated: i32,
    /// Snapshot before: used
    pub before_used: i32,
    /// Snapshot before: carried forward
    pub before_carried_forward: i32,
    /// Snapshot before: remaining
    pub before_remaining: i32,
    /// Snapshot before: total
    pub before_total: i32,
    /// Snapshot after: allocated
    pub after_allocated: i32,
    /// Snapshot after: used
    pub after_used: i32,
    /// Snapshot after: carried forward
    pub after_carried_forward: i32,
    /// Snapshot after: remaining
    pub after_remaining: i32,
    /// Snapshot after: total
    pub after_total: i32,
    /// Human-readable explanation
    pub description: String,
    /// External leave request id, for usage rows
    pub reference_id: Option<String>,
    /// Who triggered the mutation; `None` means the system
    pub actor: Option<String>,
    /// When the transaction was recorded
    pub created_at: DateTimeUtc,
    /// Soft-archived after the retention window
    pub is_archived: bool,
}

/// Defines relationships between `LeaveTransaction` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each transaction belongs to one employee
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
