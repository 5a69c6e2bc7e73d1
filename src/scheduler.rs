//! Long-lived anniversary scheduler.
//!
//! A thin adapter around [`run_pending`]: a tokio interval wakes it, it works
//! out which run dates are still owed from the stored run records, and runs
//! them oldest first. It holds no run state of its own, so restarting it (or
//! running it next to a manual `run` from the CLI) cannot double-allocate.

use crate::{
    config::LeavePolicy,
    core::anniversary::{RunSummary, format_run_summary, run_anniversary_processing, run_pending},
    errors::Result,
};
use chrono::{NaiveDate, Utc};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

/// Default number of past days a restarted scheduler will catch up on
pub const DEFAULT_CATCH_UP_DAYS: i64 = 31;

/// Periodic trigger for anniversary processing.
#[derive(Debug, Clone)]
pub struct AnniversaryScheduler {
    db: DatabaseConnection,
    policy: Arc<LeavePolicy>,
    interval: Duration,
    catch_up_days: i64,
}

impl AnniversaryScheduler {
    /// Creates a scheduler that checks for owed runs every `interval`.
    #[must_use]
    pub const fn new(db: DatabaseConnection, policy: Arc<LeavePolicy>, interval: Duration) -> Self {
        Self {
            db,
            policy,
            interval,
            catch_up_days: DEFAULT_CATCH_UP_DAYS,
        }
    }

    /// Limits how many missed days are replayed after downtime.
    #[must_use]
    pub const fn with_catch_up_days(mut self, days: i64) -> Self {
        self.catch_up_days = days;
        self
    }

    /// Forces a run for `as_of`, whether or not it is owed.
    pub async fn trigger(&self, as_of: NaiveDate) -> Result<RunSummary> {
        run_anniversary_processing(&self.db, &self.policy, as_of).await
    }

    /// Runs every date owed up to `today`.
    pub async fn tick(&self, today: NaiveDate) -> Result<Vec<RunSummary>> {
        run_pending(&self.db, &self.policy, today, self.catch_up_days).await
    }

    /// Runs until ctrl-c. Failed ticks are logged and retried on the next one.
    pub async fn run(self) -> Result<()> {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.interval.as_secs(),
            catch_up_days = self.catch_up_days,
            "Anniversary scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(Utc::now().date_naive()).await {
                        Ok(summaries) => {
                            for summary in &summaries {
                                info!("{}", format_run_summary(summary));
                            }
                        }
                        Err(e) => error!(error = %e, "Anniversary tick failed"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping scheduler");
                    break;
                }
            }
        }
        Ok(())
    }
}
