//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod anniversary_run;
pub mod employee;
pub mod leave_bucket;
pub mod leave_transaction;
pub mod sea_orm_active_enums;

// Re-export specific types to avoid conflicts
pub use anniversary_run::{
    Column as AnniversaryRunColumn, Entity as AnniversaryRun, Model as AnniversaryRunModel,
};
pub use employee::{Column as EmployeeColumn, Entity as Employee, Model as EmployeeModel};
pub use leave_bucket::{
    Column as LeaveBucketColumn, Entity as LeaveBucket, Model as LeaveBucketModel,
};
pub use leave_transaction::{
    Column as LeaveTransactionColumn, Entity as LeaveTransaction, Model as LeaveTransactionModel,
};
pub use sea_orm_active_enums::{LeaveCategory, Operation, RunStatus, TransactionKind};
