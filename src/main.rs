//! Operational CLI for the leave ledger.
//!
//! Usage:
//!   leave-ledger init
//!   leave-ledger employee-add --name "Ada" --hire-date 2021-03-01
//!   leave-ledger run --date 2024-03-01
//!   leave-ledger balance --employee 1
//!   leave-ledger deduct --employee 1 --category annual --days 3 --reference REQ-42
//!   leave-ledger serve

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use leave_ledger::{
    config::{database, policy::load_policy_or_default},
    core::{
        adjustment::{AdjustmentRequest, adjust_balance},
        anniversary::{format_run_summary, run_anniversary_processing},
        deduction::{DeductionRequest, deduct},
        report::{allocation_report, format_balance_summary, get_employee_balance},
        roster::{NewEmployee, create_employee},
        transaction::get_employee_transaction_history,
    },
    entities::LeaveCategory,
    errors::Result,
    scheduler::{AnniversaryScheduler, DEFAULT_CATCH_UP_DAYS},
};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Employee leave-balance ledger
#[derive(Parser, Debug)]
#[command(name = "leave-ledger")]
#[command(about = "Anniversary allocation, carry-forward and deduction of employee leave")]
struct Cli {
    /// Database URL
    #[arg(long, env = "DATABASE_URL", default_value = database::DEFAULT_DATABASE_URL)]
    database_url: String,

    /// Leave policy TOML file; the built-in policy is used when it is missing
    #[arg(long, env = "LEAVE_POLICY_PATH", default_value = "leave_policy.toml")]
    policy: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create tables and indexes
    Init,

    /// Run the anniversary scheduler until ctrl-c
    Serve {
        /// Seconds between checks for owed runs
        #[arg(long, env = "SCHEDULER_INTERVAL_SECS", default_value_t = 3600)]
        interval_secs: u64,

        /// Maximum number of missed days to catch up on
        #[arg(long, default_value_t = DEFAULT_CATCH_UP_DAYS)]
        catch_up_days: i64,
    },

    /// Run anniversary processing once
    Run {
        /// Run date (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show an employee's balance
    Balance {
        /// Employee id
        #[arg(short, long)]
        employee: i64,

        /// Balance date (defaults to today, UTC)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Show an employee's recent transactions
    History {
        /// Employee id
        #[arg(short, long)]
        employee: i64,

        /// Restrict to one period
        #[arg(long)]
        period: Option<i32>,

        /// Maximum rows
        #[arg(short, long, default_value_t = 20)]
        limit: u64,
    },

    /// Record approved leave
    Deduct {
        /// Employee id
        #[arg(short, long)]
        employee: i64,

        /// Leave category
        #[arg(short, long, value_enum)]
        category: LeaveCategory,

        /// Whole days taken
        #[arg(short, long)]
        days: i32,

        /// External leave request id
        #[arg(long)]
        reference: Option<String>,

        /// Approver
        #[arg(long)]
        actor: Option<String>,

        /// Book any shortfall as advance leave
        #[arg(long)]
        allow_negative: bool,
    },

    /// Apply an administrative correction to one bucket
    Adjust {
        /// Employee id
        #[arg(short, long)]
        employee: i64,

        /// Leave category
        #[arg(short, long, value_enum)]
        category: LeaveCategory,

        /// Bucket period
        #[arg(short, long)]
        period: i32,

        /// Signed change to the allocation
        #[arg(long, allow_hyphen_values = true)]
        delta: i32,

        /// Reason recorded on the ledger
        #[arg(long)]
        reason: String,

        /// Who made the correction
        #[arg(long, default_value = "admin")]
        actor: String,
    },

    /// Report allocations recorded in a date range
    Report {
        /// First day, inclusive
        #[arg(long)]
        from: NaiveDate,

        /// Last day, inclusive
        #[arg(long)]
        to: NaiveDate,
    },

    /// Add an employee to the roster
    EmployeeAdd {
        /// Display name
        #[arg(long)]
        name: String,

        /// Hire date
        #[arg(long)]
        hire_date: NaiveDate,

        /// Annual allocation override
        #[arg(long)]
        annual: Option<i32>,

        /// Sick allocation override
        #[arg(long)]
        sick: Option<i32>,

        /// Casual allocation override
        #[arg(long)]
        casual: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env before clap reads env fallbacks
    dotenv().ok();
    let cli = Cli::parse();

    // 3. Load the leave policy
    let policy = load_policy_or_default(&cli.policy)
        .inspect_err(|e| error!("Failed to load leave policy: {}", e))?;

    // 4. Connect and make sure the schema exists
    let db = database::create_connection(&cli.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database ready");

    let today = Utc::now().date_naive();
    match cli.command {
        Commands::Init => println!("Database initialized at {}", cli.database_url),
        Commands::Serve {
            interval_secs,
            catch_up_days,
        } => {
            AnniversaryScheduler::new(db, Arc::new(policy), Duration::from_secs(interval_secs))
                .with_catch_up_days(catch_up_days)
                .run()
                .await?;
        }
        Commands::Run { date } => {
            let summary = run_anniversary_processing(&db, &policy, date.unwrap_or(today)).await?;
            print!("{}", format_run_summary(&summary));
        }
        Commands::Balance { employee, as_of } => {
            let balance =
                get_employee_balance(&db, &policy, employee, as_of.unwrap_or(today)).await?;
            print!("{}", format_balance_summary(&balance));
        }
        Commands::History {
            employee,
            period,
            limit,
        } => {
            let rows = get_employee_transaction_history(&db, employee, period, limit).await?;
            if rows.is_empty() {
                println!("No transactions for employee #{employee}");
            }
            for tx in rows {
                println!(
                    "#{:<5} {} {:<7} p{:<2} {:<14} {:>4} days | remaining {} -> {} | {}",
                    tx.id,
                    tx.created_at.format("%Y-%m-%d %H:%M"),
                    tx.category.to_string(),
                    tx.period,
                    tx.kind.to_string(),
                    tx.amount,
                    tx.before_remaining,
                    tx.after_remaining,
                    tx.description
                );
            }
        }
        Commands::Deduct {
            employee,
            category,
            days,
            reference,
            actor,
            allow_negative,
        } => {
            let mut request = DeductionRequest::new(employee, category, days, today);
            request.reference_id = reference;
            request.actor = actor;
            request.allow_negative = allow_negative;
            let outcome = deduct(&db, &request).await?;
            for part in &outcome.breakdown {
                println!(
                    "Took {} days from period {} ({} remaining)",
                    part.taken, part.period, part.remaining_after
                );
            }
            if outcome.advance > 0 {
                println!("{} days booked as advance leave", outcome.advance);
            }
        }
        Commands::Adjust {
            employee,
            category,
            period,
            delta,
            reason,
            actor,
        } => {
            let request = AdjustmentRequest {
                employee_id: employee,
                category,
                period,
                delta,
                reason,
                actor,
            };
            let outcome = adjust_balance(&db, &policy, &request).await?;
            println!(
                "Applied {} days; period {} now allocated {}, remaining {}",
                outcome.applied,
                outcome.bucket.period,
                outcome.bucket.allocated,
                outcome.bucket.remaining
            );
            if outcome.cap.is_some() {
                println!("Hard cap enforced after adjustment");
            }
            for change in &outcome.realigned {
                println!(
                    "Period {} carry-forward {} -> {}",
                    change.period, change.previous, change.carried_forward
                );
            }
        }
        Commands::Report { from, to } => {
            let report = allocation_report(&db, from, to).await?;
            println!(
                "{} allocations totalling {} days between {} and {}",
                report.count, report.total_days, report.from, report.to
            );
            for entry in &report.entries {
                println!(
                    "  employee #{} {} period {}: {} days",
                    entry.employee_id, entry.category, entry.period, entry.amount
                );
            }
        }
        Commands::EmployeeAdd {
            name,
            hire_date,
            annual,
            sick,
            casual,
        } => {
            let mut new = NewEmployee::new(name, hire_date);
            new.use_default_policy = annual.is_none() && sick.is_none() && casual.is_none();
            new.annual_allocation = annual;
            new.sick_allocation = sick;
            new.casual_allocation = casual;
            let employee = create_employee(&db, new).await?;
            println!(
                "Added {} (#{}) hired {}",
                employee.name, employee.id, employee.hire_date
            );
        }
    }

    Ok(())
}
