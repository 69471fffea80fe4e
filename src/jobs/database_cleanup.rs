//! Database retention job.
//!
//! Purges rows older than the retention window from each cleanup target. Every
//! table is handled in its own transaction: a failure rolls back that table
//! only and the job continues with the next one.
//!
//! Authentication is attempted in two states. The connection string is tried
//! first with whatever authentication it specifies, by default the host's
//! managed identity. If that login fails, an access token for the SQL scope is
//! requested from the full identity chain (managed identity, then Azure CLI)
//! and presented instead.

#[cfg(feature = "database-mssql")]
use std::sync::Arc;
use std::time::Instant;

use super::{JobError, JobResult};
#[cfg(feature = "database-mssql")]
use crate::{
    config::DatabaseJobConfig,
    db::MssqlConnector,
    identity::{CachedTokenProvider, CredentialChain},
};
use crate::{
    db::{AuthMode, CleanupTarget, DEFAULT_TARGETS, DbResult, SqlAuth, SqlConnector, SqlSession},
    identity::{SQL_DATABASE_SCOPE, TokenProvider},
    retention::{RetentionPolicy, RunSummary},
};

/// What happened to a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    /// The table is not in the catalog; no delete was attempted.
    Missing,
    /// The delete committed.
    Purged {
        /// Rows matching the cutoff before the delete (diagnostic only).
        candidates: i64,
        deleted: u64,
    },
    /// The table's transaction was rolled back.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: &'static str,
    pub outcome: TableOutcome,
}

/// Results from a single database cleanup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseRunResult {
    pub auth_mode: AuthMode,
    pub server_version: String,
    pub tables: Vec<TableReport>,
    /// `deleted` is the total row count across all tables.
    pub summary: RunSummary,
    pub duration_ms: u64,
}

/// Resolve configuration from the environment and run one pass.
#[cfg(feature = "database-mssql")]
pub async fn run_from_env() -> JobResult<DatabaseRunResult> {
    let config = DatabaseJobConfig::from_env()?;
    invoke(&config).await
}

/// Run one pass against the configured SQL database.
#[cfg(feature = "database-mssql")]
pub async fn invoke(config: &DatabaseJobConfig) -> JobResult<DatabaseRunResult> {
    tracing::info!(
        target_db = %config.masked_target(),
        retention_days = config.retention.retention_days,
        "Database retention cleanup started"
    );

    let client_id = config.managed_identity_client_id.as_deref();
    let mut connector = MssqlConnector::from_config(config);
    match CredentialChain::managed_identity_only(client_id) {
        Ok(identity) => connector = connector.with_identity(Arc::new(identity)),
        Err(e) => tracing::debug!(error = %e, "No managed identity for connection string login"),
    }
    let chain = CredentialChain::platform_default(client_id)
        .map_err(|e| JobError::Connectivity(e.to_string()))?;
    let tokens = CachedTokenProvider::new(Arc::new(chain));

    run_with(&connector, &tokens, config.retention.policy()).await
}

/// Connect with fallback and purge the default targets.
pub async fn run_with(
    connector: &dyn SqlConnector,
    tokens: &dyn TokenProvider,
    policy: RetentionPolicy,
) -> JobResult<DatabaseRunResult> {
    let mut session = connect_with_fallback(connector, tokens).await?;
    run_database_cleanup(session.as_mut(), &DEFAULT_TARGETS, policy).await
}

/// Open a session, trying the connection string first and an identity token
/// second.
pub async fn connect_with_fallback(
    connector: &dyn SqlConnector,
    tokens: &dyn TokenProvider,
) -> JobResult<Box<dyn SqlSession>> {
    let target = connector.target();

    let first_error = match connector.connect(SqlAuth::ConnectionString).await {
        Ok(session) => {
            tracing::info!(target_db = %target, auth = %AuthMode::ConnectionString, "Connected to database");
            return Ok(session);
        }
        Err(e) => e,
    };
    tracing::warn!(
        target_db = %target,
        error = %first_error,
        "Connection string login failed, retrying with access token"
    );

    let token = tokens.token(SQL_DATABASE_SCOPE).await.map_err(|e| {
        JobError::Connectivity(format!(
            "connection string login failed ({}) and no access token was available: {}",
            first_error, e
        ))
    })?;

    match connector.connect(SqlAuth::AccessToken(token)).await {
        Ok(session) => {
            tracing::info!(target_db = %target, auth = %AuthMode::AccessToken, "Connected to database");
            Ok(session)
        }
        Err(e) => Err(JobError::Connectivity(format!(
            "connection string login failed ({}) and access token login failed: {}",
            first_error, e
        ))),
    }
}

/// Purge every target over an open session.
///
/// Fails only when the server version probe fails. Per-table errors are
/// recorded in the returned reports.
pub async fn run_database_cleanup(
    session: &mut dyn SqlSession,
    targets: &[CleanupTarget],
    policy: RetentionPolicy,
) -> JobResult<DatabaseRunResult> {
    let start = Instant::now();

    let server_version = session
        .server_version()
        .await
        .map_err(|e| JobError::Connectivity(format!("server version query failed: {}", e)))?;
    tracing::info!(
        server_version = %server_version.lines().next().unwrap_or_default(),
        "Database server"
    );

    let day_offset = policy.day_offset();
    let mut summary = RunSummary::default();
    let mut tables = Vec::with_capacity(targets.len());

    for target in targets {
        let outcome = match session.table_exists(target.table).await {
            Ok(false) => {
                tracing::warn!(table = target.table, "Table does not exist, skipping");
                summary.skipped += 1;
                TableOutcome::Missing
            }
            Ok(true) => {
                summary.processed += 1;
                match purge_table(session, target, day_offset).await {
                    Ok((candidates, deleted)) => {
                        summary.deleted += deleted;
                        TableOutcome::Purged {
                            candidates,
                            deleted,
                        }
                    }
                    Err(e) => {
                        tracing::error!(table = target.table, error = %e, "Failed to purge table, rolling back");
                        if let Err(rollback_error) = session.rollback().await {
                            tracing::error!(
                                table = target.table,
                                error = %rollback_error,
                                "Rollback failed"
                            );
                        }
                        summary.errors += 1;
                        TableOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(table = target.table, error = %e, "Failed to check table existence");
                summary.errors += 1;
                TableOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        tables.push(TableReport {
            table: target.table,
            outcome,
        });
    }

    let duration_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        processed = summary.processed,
        rows_deleted = summary.deleted,
        skipped = summary.skipped,
        errors = summary.errors,
        duration_ms,
        "Database retention cleanup complete"
    );

    Ok(DatabaseRunResult {
        auth_mode: session.auth_mode(),
        server_version,
        tables,
        summary,
        duration_ms,
    })
}

async fn purge_table(
    session: &mut dyn SqlSession,
    target: &CleanupTarget,
    day_offset: i32,
) -> DbResult<(i64, u64)> {
    let candidates = session.count_expired(target, day_offset).await?;
    tracing::info!(
        table = target.table,
        column = target.timestamp_column,
        candidates,
        "Rows past retention"
    );

    session.begin().await?;
    let deleted = session.delete_expired(target, day_offset).await?;
    session.commit().await?;

    tracing::info!(table = target.table, deleted, "Deleted expired rows");
    Ok((candidates, deleted))
}
