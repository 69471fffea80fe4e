//! Scripted in-memory database for tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::{AuthMode, CleanupTarget, DbError, DbResult, SqlAuth, SqlConnector, SqlSession};

/// Something a session did, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected(AuthMode),
    Rejected(AuthMode),
    Version,
    TableExists(String),
    Count(String),
    Begin,
    Delete(String),
    Commit,
    Rollback,
}

type Tables = HashMap<String, Vec<DateTime<Utc>>>;

#[derive(Default)]
struct State {
    tables: Tables,
    snapshot: Option<Tables>,
    events: Vec<SessionEvent>,
    failing_deletes: HashSet<String>,
    version_fails: bool,
}

/// Tables of row timestamps, shared between a connector and the test that
/// inspects it.
#[derive(Default)]
pub struct MemoryDatabase {
    state: Mutex<State>,
}

impl MemoryDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create (or replace) a table whose rows carry the given timestamps.
    pub fn create_table(&self, table: &str, rows: Vec<DateTime<Utc>>) {
        self.lock().tables.insert(table.to_string(), rows);
    }

    /// Rows currently in `table`, or None if it does not exist.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.lock().tables.get(table).map(Vec::len)
    }

    /// Make the DELETE on `table` fail after it has removed its rows, so only
    /// a rollback restores them.
    pub fn fail_deletes_on(&self, table: &str) {
        self.lock().failing_deletes.insert(table.to_string());
    }

    pub fn fail_version_query(&self) {
        self.lock().version_fails = true;
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.lock().events.clone()
    }

    /// Number of DELETE statements issued against `table`.
    pub fn delete_attempts(&self, table: &str) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Delete(t) if t == table))
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, event: SessionEvent) {
        self.lock().events.push(event);
    }
}

/// Connector that hands out sessions on a [`MemoryDatabase`].
pub struct MemoryConnector {
    db: Arc<MemoryDatabase>,
    rejected: Vec<AuthMode>,
}

impl MemoryConnector {
    pub fn new(db: Arc<MemoryDatabase>) -> Self {
        Self {
            db,
            rejected: Vec::new(),
        }
    }

    /// Refuse logins made with `mode`.
    pub fn reject(mut self, mode: AuthMode) -> Self {
        self.rejected.push(mode);
        self
    }
}

#[async_trait]
impl SqlConnector for MemoryConnector {
    async fn connect(&self, auth: SqlAuth) -> DbResult<Box<dyn SqlSession>> {
        let mode = auth.mode();
        if self.rejected.contains(&mode) {
            self.db.record(SessionEvent::Rejected(mode));
            return Err(DbError::Auth(format!("login rejected for {}", mode)));
        }
        self.db.record(SessionEvent::Connected(mode));
        Ok(Box::new(MemorySession {
            db: self.db.clone(),
            mode,
        }))
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

struct MemorySession {
    db: Arc<MemoryDatabase>,
    mode: AuthMode,
}

fn cutoff(day_offset: i32) -> DateTime<Utc> {
    Utc::now() + Duration::days(i64::from(day_offset))
}

#[async_trait]
impl SqlSession for MemorySession {
    fn auth_mode(&self) -> AuthMode {
        self.mode
    }

    async fn server_version(&mut self) -> DbResult<String> {
        self.db.record(SessionEvent::Version);
        if self.db.lock().version_fails {
            return Err(DbError::Query("version query failed".to_string()));
        }
        Ok("Memory SQL 1.0".to_string())
    }

    async fn table_exists(&mut self, table: &str) -> DbResult<bool> {
        self.db.record(SessionEvent::TableExists(table.to_string()));
        Ok(self.db.lock().tables.contains_key(table))
    }

    async fn count_expired(&mut self, target: &CleanupTarget, day_offset: i32) -> DbResult<i64> {
        self.db.record(SessionEvent::Count(target.table.to_string()));
        let cutoff = cutoff(day_offset);
        let state = self.db.lock();
        let rows = state
            .tables
            .get(target.table)
            .ok_or_else(|| DbError::Query(format!("Invalid object name '{}'", target.table)))?;
        Ok(rows.iter().filter(|ts| **ts < cutoff).count() as i64)
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.db.record(SessionEvent::Begin);
        let mut state = self.db.lock();
        let snapshot = state.tables.clone();
        state.snapshot = Some(snapshot);
        Ok(())
    }

    async fn delete_expired(&mut self, target: &CleanupTarget, day_offset: i32) -> DbResult<u64> {
        self.db.record(SessionEvent::Delete(target.table.to_string()));
        let cutoff = cutoff(day_offset);
        let mut state = self.db.lock();
        let fails = state.failing_deletes.contains(target.table);
        let rows = state
            .tables
            .get_mut(target.table)
            .ok_or_else(|| DbError::Query(format!("Invalid object name '{}'", target.table)))?;

        let before = rows.len();
        rows.retain(|ts| *ts >= cutoff);
        let deleted = (before - rows.len()) as u64;

        if fails {
            return Err(DbError::Query(format!(
                "The DELETE statement conflicted with a constraint on '{}'",
                target.table
            )));
        }
        Ok(deleted)
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.db.record(SessionEvent::Commit);
        self.db.lock().snapshot = None;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.db.record(SessionEvent::Rollback);
        let mut state = self.db.lock();
        if let Some(snapshot) = state.snapshot.take() {
            state.tables = snapshot;
        }
        Ok(())
    }
}
