//! Scheduled retention cleanup for Azure Blob Storage archives and SQL audit
//! tables.
//!
//! Two independent jobs share one retention policy:
//! - [`jobs::blob_cleanup`] deletes Archive-tier blobs older than the window
//! - [`jobs::database_cleanup`] deletes aged rows from `Logs` and `AuditTrail`
//!
//! Both authenticate with workload identity tokens (managed identity, then the
//! Azure CLI) and re-read their configuration from the environment on every run.

pub mod config;
pub mod db;
pub mod identity;
pub mod jobs;
pub mod observability;
pub mod retention;
pub mod storage;

#[cfg(test)]
mod tests;
