//! SQLite persistence for Docharbor
//!
//! The build table is the single source of truth for job state: the
//! queue's ready set is the ordered `queued` rows, and the
//! `queued → running` transition is a compare-and-set inside one
//! transaction so at most one build per target runs at a time.

mod builds;
mod repos;
mod targets;

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tracing::debug;

/// Store error
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: i64 },

    #[error("repository {repository_id} already tracks {ref_kind} {ref_name}")]
    DuplicateTarget { repository_id: i64, ref_kind: String, ref_name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Handle on the docharbor database
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (creating if needed) the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        debug!(path = %path.display(), "opening store");
        let conn = Connection::open(path)?;
        // WAL keeps reads cheap while a worker writes a transition.
        let _ = conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()));
        Self::from_connection(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS repositories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    provider TEXT NOT NULL DEFAULT 'github',
    url TEXT NOT NULL,
    docs_path TEXT NOT NULL DEFAULT 'docs',
    auth_token TEXT,
    deploy_key TEXT,
    verify_tls INTEGER NOT NULL DEFAULT 1,
    public INTEGER NOT NULL DEFAULT 0,
    install_extras TEXT NOT NULL DEFAULT '',
    main_target_id INTEGER,
    project_name TEXT,
    project_version TEXT,
    project_summary TEXT,
    project_homepage TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    ref_kind TEXT NOT NULL,
    ref_name TEXT NOT NULL,
    slug TEXT NOT NULL,
    auto_build INTEGER NOT NULL DEFAULT 1,
    env_manager TEXT,
    last_built_commit TEXT,
    latest_successful_build_id INTEGER,
    created_at TEXT NOT NULL,
    UNIQUE (repository_id, ref_kind, ref_name),
    UNIQUE (repository_id, slug)
);

CREATE TABLE IF NOT EXISTS builds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
    target_id INTEGER NOT NULL REFERENCES targets(id) ON DELETE CASCADE,
    status TEXT NOT NULL DEFAULT 'queued',
    triggered_by TEXT NOT NULL DEFAULT 'manual',
    commit_sha TEXT,
    error_kind TEXT,
    workspace_path TEXT,
    log_path TEXT,
    artifact_path TEXT,
    created_at TEXT NOT NULL,
    started_at TEXT,
    finished_at TEXT,
    duration_secs REAL
);

CREATE INDEX IF NOT EXISTS idx_builds_status ON builds (status);
CREATE INDEX IF NOT EXISTS idx_builds_target_status ON builds (target_id, status);
";

pub(crate) fn now() -> String {
    Utc::now().to_rfc3339()
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Read a text column into a `FromStr` enum
pub(crate) fn get_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

/// Read a nullable text column into a `FromStr` enum
pub(crate) fn get_opt_enum<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| s.parse().map_err(|e| conversion_error(idx, e))).transpose()
}

/// Read an RFC 3339 text column
pub(crate) fn get_datetime(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

/// Read a nullable RFC 3339 text column
pub(crate) fn get_opt_datetime(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_error(idx, e))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_parent_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/dir/docharbor.db");
        let _store = Store::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn schema_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("docharbor.db");
        drop(Store::open(&path).unwrap());
        drop(Store::open(&path).unwrap());
    }
}
