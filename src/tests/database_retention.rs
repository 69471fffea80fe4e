use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::{
    config::{ConfigError, DatabaseJobConfig},
    db::{AuthMode, MemoryConnector, MemoryDatabase, SessionEvent},
    identity::{CachedTokenProvider, StaticTokenProvider},
    jobs::{JobError, TableOutcome, database_cleanup},
    retention::RetentionPolicy,
};

fn audit_database() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new();
    let now = Utc::now();
    db.create_table(
        "Logs",
        vec![
            now - Duration::days(365),
            now - Duration::days(91),
            now - Duration::days(89),
            now - Duration::hours(1),
        ],
    );
    db.create_table(
        "AuditTrail",
        vec![now - Duration::days(180), now - Duration::days(30)],
    );
    db
}

#[tokio::test]
async fn test_connection_string_rejected_then_token_login_purges() {
    let db = audit_database();
    let connector = MemoryConnector::new(db.clone()).reject(AuthMode::ConnectionString);
    let tokens = CachedTokenProvider::new(Arc::new(StaticTokenProvider::new("sql-token")));

    let result = database_cleanup::run_with(&connector, &tokens, RetentionPolicy::new(90))
        .await
        .unwrap();

    assert_eq!(result.auth_mode, AuthMode::AccessToken);
    assert_eq!(result.summary.processed, 2);
    assert_eq!(result.summary.deleted, 3);
    assert_eq!(result.summary.errors, 0);
    assert_eq!(db.row_count("Logs"), Some(2));
    assert_eq!(db.row_count("AuditTrail"), Some(1));
    assert_eq!(
        db.events()[..2],
        [
            SessionEvent::Rejected(AuthMode::ConnectionString),
            SessionEvent::Connected(AuthMode::AccessToken),
        ]
    );
}

#[tokio::test]
async fn test_missing_table_gets_no_delete_and_run_continues() {
    let db = MemoryDatabase::new();
    db.create_table("AuditTrail", vec![Utc::now() - Duration::days(200)]);
    let connector = MemoryConnector::new(db.clone());
    let tokens = StaticTokenProvider::new("unused");

    let result = database_cleanup::run_with(&connector, &tokens, RetentionPolicy::new(90))
        .await
        .unwrap();

    assert_eq!(result.tables[0].table, "Logs");
    assert_eq!(result.tables[0].outcome, TableOutcome::Missing);
    assert_eq!(db.delete_attempts("Logs"), 0);
    assert_eq!(db.delete_attempts("AuditTrail"), 1);
    assert_eq!(db.row_count("AuditTrail"), Some(0));
}

#[tokio::test]
async fn test_failing_first_table_is_rolled_back_second_still_purged() {
    let db = audit_database();
    db.fail_deletes_on("Logs");
    let connector = MemoryConnector::new(db.clone());
    let tokens = StaticTokenProvider::new("unused");

    let result = database_cleanup::run_with(&connector, &tokens, RetentionPolicy::new(90))
        .await
        .unwrap();

    assert!(matches!(result.tables[0].outcome, TableOutcome::Failed { .. }));
    assert_eq!(
        result.tables[1].outcome,
        TableOutcome::Purged {
            candidates: 1,
            deleted: 1
        }
    );
    assert_eq!(db.row_count("Logs"), Some(4));
    assert_eq!(db.row_count("AuditTrail"), Some(1));

    // Logs: begin, delete, rollback. AuditTrail: begin, delete, commit.
    let tx_events: Vec<SessionEvent> = db
        .events()
        .into_iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::Begin
                    | SessionEvent::Delete(_)
                    | SessionEvent::Commit
                    | SessionEvent::Rollback
            )
        })
        .collect();
    assert_eq!(
        tx_events,
        vec![
            SessionEvent::Begin,
            SessionEvent::Delete("Logs".to_string()),
            SessionEvent::Rollback,
            SessionEvent::Begin,
            SessionEvent::Delete("AuditTrail".to_string()),
            SessionEvent::Commit,
        ]
    );
}

#[tokio::test]
async fn test_rerun_deletes_nothing_new() {
    let db = audit_database();
    let connector = MemoryConnector::new(db.clone());
    let tokens = StaticTokenProvider::new("unused");

    let first = database_cleanup::run_with(&connector, &tokens, RetentionPolicy::new(90))
        .await
        .unwrap();
    let second = database_cleanup::run_with(&connector, &tokens, RetentionPolicy::new(90))
        .await
        .unwrap();

    assert_eq!(first.summary.deleted, 3);
    assert_eq!(second.summary.deleted, 0);
    assert_eq!(second.summary.errors, 0);
}

#[test]
fn test_missing_sql_settings_is_config_error_naming_both() {
    let err: JobError = DatabaseJobConfig::from_lookup(&|name: &str| match name {
        "RETENTION_DAYS" => Some("30".to_string()),
        _ => None,
    })
    .unwrap_err()
    .into();

    assert!(matches!(err, JobError::Config(ConfigError::MissingAll(_))));
    let message = err.to_string();
    assert!(message.contains("SQL_SERVER"), "{}", message);
    assert!(message.contains("SQL_DATABASE"), "{}", message);
}

#[cfg(feature = "database-mssql")]
mod env {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_unset_server_fails_before_connecting() {
        temp_env::with_vars(
            [
                ("SQL_SERVER", None),
                ("SQL_DATABASE", Some("operations")),
                ("SQL_CONNECTION_STRING", None::<&str>),
            ],
            || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();
                let err = runtime
                    .block_on(database_cleanup::run_from_env())
                    .unwrap_err();
                assert!(matches!(err, JobError::Config(_)), "{:?}", err);
            },
        );
    }
}
