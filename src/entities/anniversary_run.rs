//! Anniversary run entity - One row per scheduler trigger.
//!
//! The scheduler keeps no state in memory between triggers. Each run is
//! recorded here as RUNNING when it starts and COMPLETED with its counts when it
//! finishes, so several scheduler instances see the same history.

use super::sea_orm_active_enums::RunStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Anniversary run database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "anniversary_runs")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Date the run processed anniversaries for
    pub run_date: Date,
    /// RUNNING until the summary is written
    pub status: RunStatus,
    /// Employees whose allocation succeeded
    pub processed: i32,
    /// Employees with nothing left to allocate (already allocated)
    pub skipped: i32,
    /// Employees whose unit of work failed
    pub errors: i32,
    /// Buckets marked inactive by the expiry scan
    pub expired: i32,
    /// Buckets whose carry-forward was realigned
    pub realigned: i32,
    /// Transactions soft-archived by retention
    pub archived: i32,
    /// When the run started
    pub started_at: DateTimeUtc,
    /// When the run finished
    pub finished_at: Option<DateTimeUtc>,
}

/// `AnniversaryRun` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
