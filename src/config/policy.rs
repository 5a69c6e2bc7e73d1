//! Leave policy loading from `leave_policy.toml`
//!
//! The policy parameterises the single ledger engine per category: how much is
//! granted each period, the tenure needed before anything is granted, what
//! happens to the previous period's bucket, and the caps that bound the total.
//!
//! ```toml
//! transaction_retention_years = 3
//!
//! [[categories]]
//! category = "annual"
//! allocation = 20
//! min_tenure_years = 1
//! carry = "carry_forward"
//! individual_carry_cap = 20
//! hard_cap = 40
//! validity_years = 2
//! ```

use crate::entities::{EmployeeModel, LeaveCategory};
use crate::errors::{Error, Result};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// What happens to the previous period's bucket when a new one is allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CarryPolicy {
    /// Previous bucket is superseded; its remaining carries over under caps
    CarryForward,
    /// Previous buckets stay active until they expire; the hard cap trims the oldest
    Accumulate,
    /// Previous bucket is superseded; its remaining is forfeited
    Reset,
}

/// Policy for one leave category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPolicy {
    /// Category this policy applies to
    pub category: LeaveCategory,
    /// Days granted per period
    pub allocation: i32,
    /// Full years of service required at the period boundary
    #[serde(default)]
    pub min_tenure_years: i32,
    /// Treatment of the previous period's bucket
    pub carry: CarryPolicy,
    /// Most days that may be carried out of a single period
    #[serde(default)]
    pub individual_carry_cap: i32,
    /// Ceiling on the summed total across the category's active buckets
    pub hard_cap: i32,
    /// Buckets expire on 31 December of the anniversary year plus this many years
    #[serde(default)]
    pub validity_years: Option<i32>,
}

impl CategoryPolicy {
    /// Days granted to `employee` for a period, honouring per-employee overrides.
    #[must_use]
    pub fn base_allocation(&self, employee: &EmployeeModel) -> i32 {
        if employee.use_default_policy {
            return self.allocation;
        }
        let override_days = match self.category {
            LeaveCategory::Annual => employee.annual_allocation,
            LeaveCategory::Sick => employee.sick_allocation,
            LeaveCategory::Casual => employee.casual_allocation,
        };
        override_days.unwrap_or(self.allocation)
    }

    /// Expiration date for a bucket allocated on `anniversary_date`.
    #[must_use]
    pub fn expiration_for(&self, anniversary_date: NaiveDate) -> Option<NaiveDate> {
        self.validity_years
            .and_then(|years| NaiveDate::from_ymd_opt(anniversary_date.year() + years, 12, 31))
    }

    /// Whether allocation of a new period closes the previous bucket.
    #[must_use]
    pub const fn supersedes_prior(&self) -> bool {
        matches!(self.carry, CarryPolicy::CarryForward | CarryPolicy::Reset)
    }
}

/// Complete leave policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeavePolicy {
    /// One entry per category the ledger manages
    pub categories: Vec<CategoryPolicy>,
    /// Transactions older than this are soft-archived
    #[serde(default = "default_retention_years")]
    pub transaction_retention_years: i32,
}

const fn default_retention_years() -> i32 {
    3
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            categories: vec![
                CategoryPolicy {
                    category: LeaveCategory::Annual,
                    allocation: 20,
                    min_tenure_years: 1,
                    carry: CarryPolicy::CarryForward,
                    individual_carry_cap: 20,
                    hard_cap: 40,
                    validity_years: Some(2),
                },
                CategoryPolicy {
                    category: LeaveCategory::Sick,
                    allocation: 10,
                    min_tenure_years: 0,
                    carry: CarryPolicy::Reset,
                    individual_carry_cap: 0,
                    hard_cap: 10,
                    validity_years: None,
                },
                CategoryPolicy {
                    category: LeaveCategory::Casual,
                    allocation: 10,
                    min_tenure_years: 0,
                    carry: CarryPolicy::Reset,
                    individual_carry_cap: 0,
                    hard_cap: 10,
                    validity_years: None,
                },
            ],
            transaction_retention_years: default_retention_years(),
        }
    }
}

impl LeavePolicy {
    /// Policy for `category`, or a configuration error if it is not managed.
    pub fn category(&self, category: LeaveCategory) -> Result<&CategoryPolicy> {
        self.categories
            .iter()
            .find(|p| p.category == category)
            .ok_or_else(|| Error::Config {
                message: format!("No policy configured for {category} leave"),
            })
    }

    /// Checks the policy for values the engines cannot honour.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.categories {
            if !seen.insert(p.category) {
                return Err(Error::Config {
                    message: format!("{} leave is configured more than once", p.category),
                });
            }
            if p.allocation < 0
                || p.min_tenure_years < 0
                || p.individual_carry_cap < 0
                || p.hard_cap < 0
            {
                return Err(Error::Config {
                    message: format!("{} leave policy contains a negative value", p.category),
                });
            }
            if p.allocation > p.hard_cap {
                return Err(Error::Config {
                    message: format!(
                        "{} allocation {} exceeds hard cap {}",
                        p.category, p.allocation, p.hard_cap
                    ),
                });
            }
            if p.individual_carry_cap > p.hard_cap {
                return Err(Error::Config {
                    message: format!(
                        "{} individual carry cap {} exceeds hard cap {}",
                        p.category, p.individual_carry_cap, p.hard_cap
                    ),
                });
            }
            if p.validity_years.is_some_and(|years| years < 0) {
                return Err(Error::Config {
                    message: format!("{} validity_years cannot be negative", p.category),
                });
            }
        }
        if self.transaction_retention_years < 1 {
            return Err(Error::Config {
                message: "transaction_retention_years must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads and validates a leave policy from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The policy fails validation
pub fn load_policy<P: AsRef<Path>>(path: P) -> Result<LeavePolicy> {
    let path = path.as_ref();
    debug!("Loading leave policy from {:?}", path);
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read policy file {}: {e}", path.display()),
    })?;

    let policy: LeavePolicy = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })?;
    policy.validate()?;
    Ok(policy)
}

/// Loads the policy file if it exists, otherwise falls back to the built-in policy.
pub fn load_policy_or_default<P: AsRef<Path>>(path: P) -> Result<LeavePolicy> {
    let path = path.as_ref();
    if path.exists() {
        return load_policy(path);
    }
    info!(
        "Policy file {} not found, using built-in leave policy",
        path.display()
    );
    Ok(LeavePolicy::default())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_policy() {
        let toml_str = r#"
            transaction_retention_years = 5

            [[categories]]
            category = "annual"
            allocation = 20
            min_tenure_years = 1
            carry = "carry_forward"
            individual_carry_cap = 20
            hard_cap = 40
            validity_years = 2

            [[categories]]
            category = "sick"
            allocation = 10
            carry = "reset"
            hard_cap = 10
        "#;

        let policy: LeavePolicy = toml::from_str(toml_str).unwrap();
        policy.validate().unwrap();
        assert_eq!(policy.transaction_retention_years, 5);
        assert_eq!(policy.categories.len(), 2);

        let annual = policy.category(LeaveCategory::Annual).unwrap();
        assert_eq!(annual.carry, CarryPolicy::CarryForward);
        assert_eq!(annual.validity_years, Some(2));

        let sick = policy.category(LeaveCategory::Sick).unwrap();
        assert_eq!(sick.min_tenure_years, 0);
        assert_eq!(sick.validity_years, None);
        assert!(sick.supersedes_prior());

        assert!(matches!(
            policy.category(LeaveCategory::Casual),
            Err(Error::Config { .. })
        ));
    }

    #[test]
    fn test_default_policy_is_valid() {
        let policy = LeavePolicy::default();
        policy.validate().unwrap();
        let annual = policy.category(LeaveCategory::Annual).unwrap();
        assert_eq!(annual.allocation, 20);
        assert_eq!(annual.hard_cap, 40);
        assert_eq!(annual.individual_carry_cap, 20);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_overcaps() {
        let mut policy = LeavePolicy::default();
        policy.categories.push(policy.categories[0].clone());
        assert!(matches!(policy.validate(), Err(Error::Config { .. })));

        let mut policy = LeavePolicy::default();
        policy.categories[0].allocation = 50;
        assert!(matches!(policy.validate(), Err(Error::Config { .. })));

        let mut policy = LeavePolicy::default();
        policy.categories[0].individual_carry_cap = 41;
        assert!(matches!(policy.validate(), Err(Error::Config { .. })));
    }

    #[test]
    fn test_expiration_for() {
        let policy = LeavePolicy::default();
        let annual = policy.category(LeaveCategory::Annual).unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(
            annual.expiration_for(date),
            NaiveDate::from_ymd_opt(2026, 12, 31)
        );

        let sick = policy.category(LeaveCategory::Sick).unwrap();
        assert_eq!(sick.expiration_for(date), None);
    }

    #[test]
    fn test_base_allocation_overrides() {
        let policy = LeavePolicy::default();
        let annual = policy.category(LeaveCategory::Annual).unwrap();
        let mut employee = EmployeeModel {
            id: 1,
            name: "Override".to_string(),
            hire_date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            is_active: true,
            use_default_policy: true,
            annual_allocation: Some(25),
            sick_allocation: None,
            casual_allocation: None,
        };
        assert_eq!(annual.base_allocation(&employee), 20);

        employee.use_default_policy = false;
        assert_eq!(annual.base_allocation(&employee), 25);

        let sick = policy.category(LeaveCategory::Sick).unwrap();
        assert_eq!(sick.base_allocation(&employee), 10);
    }

    #[test]
    fn test_load_policy_missing_file() {
        let result = load_policy("/definitely/not/here.toml");
        assert!(matches!(result, Err(Error::Config { .. })));

        let fallback = load_policy_or_default("/definitely/not/here.toml").unwrap();
        assert_eq!(fallback, LeavePolicy::default());
    }
}
