//! Core ledger logic, independent of any delivery surface.
//!
//! Engines are plain async functions over a `ConnectionTrait`. Public entry
//! points open one database transaction per unit of work and commit it; the
//! `*_in` variants run inside a transaction the caller already holds.

/// Administrative balance adjustments
pub mod adjustment;
/// Anniversary allocation engine
pub mod allocation;
/// Anniversary processing runs and catch-up
pub mod anniversary;
/// Balance bucket store
pub mod bucket;
/// Hard-cap enforcement
pub mod cap;
/// Carry-forward rule and realignment
pub mod carry_forward;
/// Oldest-first deduction engine
pub mod deduction;
/// Bucket expiry
pub mod expiry;
/// Balance summaries and reports
pub mod report;
/// Employee roster reads and anniversary arithmetic
pub mod roster;
/// Append-only transaction log
pub mod transaction;
/// Unit-of-work retry policy
pub mod unit_of_work;
