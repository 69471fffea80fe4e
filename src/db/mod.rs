//! Relational database access for the database cleanup job.
//!
//! The job talks to the database through two seams:
//! - [`SqlConnector`] opens a session with a given [`SqlAuth`]
//! - [`SqlSession`] runs the handful of statements a cleanup pass needs
//!
//! [`MssqlConnector`] implements them for SQL Server and Azure SQL with
//! `tiberius` (requires the `database-mssql` feature). [`MemoryConnector`]
//! is a scripted in-process implementation for tests.

mod error;
mod memory;
#[cfg(feature = "database-mssql")]
mod mssql;

use std::fmt;

use async_trait::async_trait;
pub use error::{DbError, DbResult};
pub use memory::{MemoryConnector, MemoryDatabase, SessionEvent};
#[cfg(feature = "database-mssql")]
pub use mssql::MssqlConnector;

use crate::identity::AccessToken;

/// A table and the timestamp column that ages its rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupTarget {
    pub table: &'static str,
    pub timestamp_column: &'static str,
}

impl CleanupTarget {
    pub const fn new(table: &'static str, timestamp_column: &'static str) -> Self {
        Self {
            table,
            timestamp_column,
        }
    }
}

/// Tables purged by the database job, in processing order.
pub const DEFAULT_TARGETS: [CleanupTarget; 2] = [
    CleanupTarget::new("Logs", "CreatedDate"),
    CleanupTarget::new("AuditTrail", "Timestamp"),
];

/// Credentials used to open a session.
#[derive(Debug, Clone)]
pub enum SqlAuth {
    /// Whatever authentication the connection string itself specifies.
    ConnectionString,
    /// An Entra ID access token presented at login.
    AccessToken(AccessToken),
}

impl SqlAuth {
    pub fn mode(&self) -> AuthMode {
        match self {
            SqlAuth::ConnectionString => AuthMode::ConnectionString,
            SqlAuth::AccessToken(_) => AuthMode::AccessToken,
        }
    }
}

/// Which authentication state produced the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    ConnectionString,
    AccessToken,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::ConnectionString => f.write_str("connection_string"),
            AuthMode::AccessToken => f.write_str("access_token"),
        }
    }
}

/// Opens database sessions.
#[async_trait]
pub trait SqlConnector: Send + Sync {
    async fn connect(&self, auth: SqlAuth) -> DbResult<Box<dyn SqlSession>>;

    /// Server/database description safe for logs.
    fn target(&self) -> String;
}

/// An open database session.
///
/// `count_expired` and `delete_expired` receive the retention offset in days
/// (zero or negative) and compare `timestamp_column < DATEADD(day, offset, GETDATE())`.
#[async_trait]
pub trait SqlSession: Send {
    /// The authentication state this session was opened with.
    fn auth_mode(&self) -> AuthMode;

    async fn server_version(&mut self) -> DbResult<String>;

    async fn table_exists(&mut self, table: &str) -> DbResult<bool>;

    async fn count_expired(&mut self, target: &CleanupTarget, day_offset: i32) -> DbResult<i64>;

    async fn begin(&mut self) -> DbResult<()>;

    /// Returns the number of rows deleted.
    async fn delete_expired(&mut self, target: &CleanupTarget, day_offset: i32) -> DbResult<u64>;

    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;
}

/// Quote an identifier for T-SQL, doubling any closing bracket.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
