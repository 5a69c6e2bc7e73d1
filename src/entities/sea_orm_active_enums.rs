//! String-backed enums shared by the ledger tables.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Leave category a bucket belongs to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum LeaveCategory {
    /// Annual (earned) leave
    #[sea_orm(string_value = "annual")]
    Annual,
    /// Sick leave
    #[sea_orm(string_value = "sick")]
    Sick,
    /// Casual leave
    #[sea_orm(string_value = "casual")]
    Casual,
}

impl fmt::Display for LeaveCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Annual => "annual",
            Self::Sick => "sick",
            Self::Casual => "casual",
        };
        f.write_str(name)
    }
}

/// What kind of mutation a ledger transaction records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// New period entitlement granted
    #[sea_orm(string_value = "ALLOCATION")]
    Allocation,
    /// Days consumed by an approved request
    #[sea_orm(string_value = "USAGE")]
    Usage,
    /// Days inherited from the prior period
    #[sea_orm(string_value = "CARRY_FORWARD")]
    CarryForward,
    /// Days trimmed to respect the hard cap
    #[sea_orm(string_value = "CAP_ENFORCEMENT")]
    CapEnforcement,
    /// Bucket closed (expired or superseded), remaining forfeited
    #[sea_orm(string_value = "EXPIRY")]
    Expiry,
    /// Manual administrative correction
    #[sea_orm(string_value = "ADJUSTMENT")]
    Adjustment,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Allocation => "ALLOCATION",
            Self::Usage => "USAGE",
            Self::CarryForward => "CARRY_FORWARD",
            Self::CapEnforcement => "CAP_ENFORCEMENT",
            Self::Expiry => "EXPIRY",
            Self::Adjustment => "ADJUSTMENT",
        };
        f.write_str(name)
    }
}

/// Direction of the amount recorded on a transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(8))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    /// Amount added to the bucket
    #[sea_orm(string_value = "ADD")]
    Add,
    /// Amount removed from the bucket
    #[sea_orm(string_value = "SUBTRACT")]
    Subtract,
    /// Field overwritten with the amount
    #[sea_orm(string_value = "SET")]
    Set,
}

/// Lifecycle of one scheduler run record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run started and has not finished
    #[sea_orm(string_value = "running")]
    Running,
    /// Run finished; counts are final
    #[sea_orm(string_value = "completed")]
    Completed,
}
