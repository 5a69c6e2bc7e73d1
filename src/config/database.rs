//! Database configuration module for the leave ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`; the composite unique key on buckets and the
//! transaction-log indexes are created explicitly because they cannot be expressed
//! on a single column.

use crate::entities::{
    AnniversaryRun, Employee, LeaveBucket, LeaveBucketColumn, LeaveTransaction,
    LeaveTransactionColumn,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use tracing::{debug, info};

/// `SQLite` path used when `DATABASE_URL` is not set.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/leave_ledger.sqlite?mode=rwc";

/// Establishes a connection to the given database URL.
///
/// `SQLite` allows a single writer, so the pool is kept to one connection:
/// units of work queue for it instead of failing with `SQLITE_BUSY`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    debug!("Connecting to database at {}", database_url);
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    Database::connect(options).await.map_err(Into::into)
}

/// Creates all tables and indexes if they do not exist yet.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let employee_table = schema
        .create_table_from_entity(Employee)
        .if_not_exists()
        .to_owned();
    let bucket_table = schema
        .create_table_from_entity(LeaveBucket)
        .if_not_exists()
        .to_owned();
    let transaction_table = schema
        .create_table_from_entity(LeaveTransaction)
        .if_not_exists()
        .to_owned();
    let run_table = schema
        .create_table_from_entity(AnniversaryRun)
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&employee_table)).await?;
    db.execute(builder.build(&bucket_table)).await?;
    db.execute(builder.build(&transaction_table)).await?;
    db.execute(builder.build(&run_table)).await?;

    // One bucket per (employee, category, period)
    let bucket_key = Index::create()
        .name("idx_leave_buckets_employee_category_period")
        .table(LeaveBucket)
        .col(LeaveBucketColumn::EmployeeId)
        .col(LeaveBucketColumn::Category)
        .col(LeaveBucketColumn::Period)
        .unique()
        .if_not_exists()
        .to_owned();
    let transaction_employee = Index::create()
        .name("idx_leave_transactions_employee")
        .table(LeaveTransaction)
        .col(LeaveTransactionColumn::EmployeeId)
        .col(LeaveTransactionColumn::Id)
        .if_not_exists()
        .to_owned();
    let transaction_period = Index::create()
        .name("idx_leave_transactions_period")
        .table(LeaveTransaction)
        .col(LeaveTransactionColumn::Period)
        .if_not_exists()
        .to_owned();

    db.execute(builder.build(&bucket_key)).await?;
    db.execute(builder.build(&transaction_employee)).await?;
    db.execute(builder.build(&transaction_period)).await?;

    info!("Database tables ensured");
    Ok(())
}
