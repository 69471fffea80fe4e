//! Retention jobs.
//!
//! - **Blob cleanup**: deletes Archive-tier blobs older than the retention
//!   window from every container in a storage account.
//! - **Database cleanup**: purges aged rows from the `Logs` and `AuditTrail`
//!   tables, authenticating with the connection string first and an identity
//!   token second.
//!
//! Jobs follow a consistent pattern:
//! 1. An `invoke` entry point that builds real clients from job configuration
//! 2. A `run_*` function that performs a single pass against trait objects
//! 3. A structured result type with a [`RunSummary`](crate::retention::RunSummary)
//! 4. Optional recurring execution through [`schedule::run_on_schedule`]
//!
//! Only [`JobError`] aborts a run. Failures on individual blobs or tables are
//! logged and counted in the summary.

pub mod blob_cleanup;
pub mod database_cleanup;
pub mod schedule;

pub use blob_cleanup::{BlobRunResult, run_blob_cleanup};
pub use database_cleanup::{
    DatabaseRunResult, TableOutcome, TableReport, connect_with_fallback, run_database_cleanup,
};
pub use schedule::{parse_schedule, run_on_schedule};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort a job invocation.
#[derive(Debug, Error)]
pub enum JobError {
    /// Missing or invalid configuration, raised before any I/O.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The storage account or database could not be reached or authenticated.
    #[error("Connectivity error: {0}")]
    Connectivity(String),
}

pub type JobResult<T> = Result<T, JobError>;
