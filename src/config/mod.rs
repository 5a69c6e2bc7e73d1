/// Database connection management and table creation
pub mod database;

/// Leave policy loading from `leave_policy.toml`
pub mod policy;

pub use policy::{CarryPolicy, CategoryPolicy, LeavePolicy};
