//! Retention policy shared by the cleanup jobs.
//!
//! Both jobs apply the same rule: an item is eligible for deletion once it is
//! strictly older than the configured number of days. The jobs share the rule,
//! not the code that enumerates or deletes items.
//!
//! - [`RetentionPolicy`] computes ages, cutoffs and eligibility.
//! - [`RunSummary`] counts per-item outcomes for a single invocation.

mod policy;
mod summary;

pub use policy::{RetentionPolicy, age_days};
pub use summary::RunSummary;
