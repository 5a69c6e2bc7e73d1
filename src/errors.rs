//! Unified error type for the leave ledger.
//!
//! Every engine returns [`Result`]. Variants carry enough context (employee,
//! category, period, amounts) for the caller to decide whether to recover,
//! retry, or surface the failure.

use crate::entities::LeaveCategory;
use sea_orm::{DbErr, RuntimeErr};
use thiserror::Error;

/// Errors produced by the ledger and its collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// Any database failure not classified more precisely below
    #[error("Database error: {0}")]
    Database(DbErr),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// The roster has no employee with this id
    #[error("Employee {employee_id} not found")]
    EmployeeNotFound {
        /// Requested employee
        employee_id: i64,
    },

    /// No bucket exists for the key
    #[error("No {category} bucket for employee {employee_id} in period {period}")]
    BucketNotFound {
        /// Bucket owner
        employee_id: i64,
        /// Leave category
        category: LeaveCategory,
        /// Accrual period
        period: i32,
    },

    /// Allocation for this period has already happened
    #[error("{category} leave already allocated for employee {employee_id} in period {period}")]
    AlreadyAllocated {
        /// Bucket owner
        employee_id: i64,
        /// Leave category
        category: LeaveCategory,
        /// Accrual period
        period: i32,
    },

    /// A bucket with the same (employee, category, period) key already exists
    #[error("Duplicate {category} bucket for employee {employee_id} in period {period}")]
    DuplicatePeriod {
        /// Bucket owner
        employee_id: i64,
        /// Leave category
        category: LeaveCategory,
        /// Accrual period
        period: i32,
    },

    /// The deduction asks for more than the active buckets hold
    #[error("Insufficient balance: available {available} days, requested {requested} days")]
    InsufficientBalance {
        /// Sum of remaining across eligible buckets
        available: i32,
        /// Days requested
        requested: i32,
    },

    /// A write would leave the category total above its hard cap
    #[error(
        "Cap exceeded for employee {employee_id} ({category}): total {total} days, cap {cap} days"
    )]
    CapExceeded {
        /// Bucket owner
        employee_id: i64,
        /// Leave category
        category: LeaveCategory,
        /// Summed total across active buckets after the write
        total: i32,
        /// Hard cap for the category
        cap: i32,
    },

    /// Tenure requirement not met at the allocation boundary
    #[error(
        "Employee {employee_id} not eligible for {category} leave: {completed_years} of {required_years} years completed"
    )]
    EmployeeNotEligible {
        /// Employee
        employee_id: i64,
        /// Leave category
        category: LeaveCategory,
        /// Full years completed at the boundary
        completed_years: i32,
        /// Years required by policy
        required_years: i32,
    },

    /// A concurrent writer changed the row first, or the database was busy
    #[error("Persistence conflict: {message}")]
    PersistenceConflict {
        /// Detail from the unit-of-work layer
        message: String,
    },

    /// A day amount that makes no sense for the operation
    #[error("Invalid amount: {days} days")]
    InvalidAmount {
        /// Offending amount
        days: i32,
    },

    /// A date that cannot be used (unparseable or out of range)
    #[error("Invalid date: {message}")]
    InvalidDate {
        /// What went wrong
        message: String,
    },

    /// Integer conversion failure
    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl Error {
    /// Whether the unit of work should be retried.
    #[must_use]
    pub const fn is_persistence_conflict(&self) -> bool {
        matches!(self, Self::PersistenceConflict { .. })
    }

    /// Whether this is the "already done" outcome of an allocation.
    #[must_use]
    pub const fn is_already_allocated(&self) -> bool {
        matches!(
            self,
            Self::AlreadyAllocated { .. } | Self::DuplicatePeriod { .. }
        )
    }
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if is_busy(&err) {
            return Self::PersistenceConflict {
                message: err.to_string(),
            };
        }
        Self::Database(err)
    }
}

/// SQLite reports lock contention as SQLITE_BUSY / SQLITE_LOCKED.
fn is_busy(err: &DbErr) -> bool {
    let message = match err {
        DbErr::Conn(RuntimeErr::SqlxError(e))
        | DbErr::Exec(RuntimeErr::SqlxError(e))
        | DbErr::Query(RuntimeErr::SqlxError(e)) => e.to_string(),
        _ => return false,
    };
    let message = message.to_lowercase();
    message.contains("database is locked") || message.contains("database table is locked")
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
