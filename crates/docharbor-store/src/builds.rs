//! Build-job persistence: queue reads, state transitions, recovery

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use docharbor_core::{BuildJob, BuildStatus, BuildTrigger, FailureKind};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::{get_datetime, get_enum, get_opt_datetime, get_opt_enum, now, Result, Store, StoreError};

const BUILD_COLS: &str = "id, repository_id, target_id, status, triggered_by, commit_sha, \
    error_kind, workspace_path, log_path, artifact_path, created_at, started_at, finished_at, \
    duration_secs";

impl Store {
    /// Persist a new job in `queued`. Enqueueing always succeeds; the
    /// ready set is unbounded in the store.
    pub fn enqueue_build(&self, target_id: i64, trigger: BuildTrigger) -> Result<BuildJob> {
        let conn = self.conn();
        let repository_id: i64 = conn
            .query_row(
                "SELECT repository_id FROM targets WHERE id = ?1",
                params![target_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(StoreError::NotFound { what: "target", id: target_id })?;

        conn.execute(
            "INSERT INTO builds (repository_id, target_id, status, triggered_by, created_at) \
             VALUES (?1, ?2, 'queued', ?3, ?4)",
            params![repository_id, target_id, trigger.to_string(), now()],
        )?;
        let id = conn.last_insert_rowid();
        info!(build = id, target = target_id, %trigger, "build queued");
        build_by_id(&conn, id)
    }

    pub fn build(&self, id: i64) -> Result<BuildJob> {
        build_by_id(&self.conn(), id)
    }

    pub fn recent_builds(&self, limit: usize) -> Result<Vec<BuildJob>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BUILD_COLS} FROM builds ORDER BY id DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], read_build)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Whether a job for the target is queued or running. The monitor
    /// uses this to suppress duplicate enqueues.
    pub fn has_active_build(&self, target_id: i64) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM builds WHERE target_id = ?1 AND status IN ('queued', 'running')",
            params![target_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Claim the oldest queued job whose target has nothing running.
    ///
    /// The candidate select and the `queued → running` compare-and-set
    /// share one transaction, which is what guarantees at most one
    /// running build per target.
    pub fn claim_next_queued(&self) -> Result<Option<BuildJob>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let candidate: Option<i64> = tx
            .query_row(
                "SELECT b.id FROM builds b \
                 WHERE b.status = 'queued' AND NOT EXISTS \
                   (SELECT 1 FROM builds r WHERE r.target_id = b.target_id AND r.status = 'running') \
                 ORDER BY b.created_at ASC, b.id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        let changed = tx.execute(
            "UPDATE builds SET status = 'running', started_at = ?1 \
             WHERE id = ?2 AND status = 'queued'",
            params![now(), id],
        )?;
        if changed != 1 {
            tx.commit()?;
            return Ok(None);
        }

        let job = build_by_id(&tx, id)?;
        tx.commit()?;
        Ok(Some(job))
    }

    /// Record the workspace and log locations chosen for a running job
    pub fn record_build_paths(&self, id: i64, workspace: &Path, log: &Path) -> Result<()> {
        self.conn().execute(
            "UPDATE builds SET workspace_path = ?1, log_path = ?2 WHERE id = ?3",
            params![workspace.display().to_string(), log.display().to_string(), id],
        )?;
        Ok(())
    }

    /// Record (or refine) the commit a running job resolved to
    pub fn record_build_commit(&self, id: i64, commit: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE builds SET commit_sha = ?1 WHERE id = ?2",
            params![commit, id],
        )?;
        Ok(())
    }

    /// Write a terminal state with timestamps and duration
    pub fn finish_build(
        &self,
        id: i64,
        status: BuildStatus,
        error_kind: Option<FailureKind>,
        artifact_path: Option<&Path>,
    ) -> Result<BuildJob> {
        debug_assert!(status.is_terminal());
        let conn = self.conn();
        let finished = Utc::now();
        let started: Option<Option<String>> = conn
            .query_row("SELECT started_at FROM builds WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        let started = started.ok_or(StoreError::NotFound { what: "build", id })?;

        let duration = started
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|s| (finished - s.with_timezone(&Utc)).num_milliseconds() as f64 / 1000.0);

        conn.execute(
            "UPDATE builds SET status = ?1, error_kind = ?2, artifact_path = ?3, \
             finished_at = ?4, duration_secs = ?5 WHERE id = ?6",
            params![
                status.to_string(),
                error_kind.map(|k| k.to_string()),
                artifact_path.map(|p| p.display().to_string()),
                finished.to_rfc3339(),
                duration,
                id,
            ],
        )?;
        info!(build = id, %status, "build finished");
        build_by_id(&conn, id)
    }

    /// Cancel a job still in `queued`; returns false when it already
    /// left that state.
    pub fn cancel_queued(&self, id: i64) -> Result<bool> {
        let changed = self.conn().execute(
            "UPDATE builds SET status = 'cancelled', finished_at = ?1 \
             WHERE id = ?2 AND status = 'queued'",
            params![now(), id],
        )?;
        Ok(changed == 1)
    }

    /// Startup recovery: every job left in `running` by a previous
    /// process is failed with the interrupted kind. Returns the
    /// affected rows so their workspaces can be removed.
    pub fn fail_interrupted_builds(&self) -> Result<Vec<BuildJob>> {
        let conn = self.conn();
        let ids: Vec<i64> = {
            let mut stmt = conn.prepare("SELECT id FROM builds WHERE status = 'running'")?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut failed = Vec::with_capacity(ids.len());
        for id in ids {
            warn!(build = id, "interrupted build found at startup");
            conn.execute(
                "UPDATE builds SET status = 'failed', error_kind = ?1, finished_at = ?2 \
                 WHERE id = ?3 AND status = 'running'",
                params![FailureKind::InterruptedAtStartup.to_string(), now(), id],
            )?;
            failed.push(build_by_id(&conn, id)?);
        }
        Ok(failed)
    }

    /// Forget log files of terminal builds finished before the cutoff.
    ///
    /// Clears `log_path` and returns the forgotten paths so the caller
    /// can unlink them.
    pub fn take_expired_log_paths(&self, cutoff: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let conn = self.conn();
        let rows: Vec<(i64, String)> = {
            let mut stmt = conn.prepare(
                "SELECT id, log_path FROM builds \
                 WHERE log_path IS NOT NULL AND finished_at IS NOT NULL AND finished_at < ?1",
            )?;
            let mapped =
                stmt.query_map(params![cutoff.to_rfc3339()], |row| Ok((row.get(0)?, row.get(1)?)))?;
            mapped.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let mut paths = Vec::with_capacity(rows.len());
        for (id, path) in rows {
            conn.execute("UPDATE builds SET log_path = NULL WHERE id = ?1", params![id])?;
            paths.push(PathBuf::from(path));
        }
        Ok(paths)
    }
}

pub(crate) fn build_by_id(conn: &Connection, id: i64) -> Result<BuildJob> {
    conn.query_row(
        &format!("SELECT {BUILD_COLS} FROM builds WHERE id = ?1"),
        params![id],
        read_build,
    )
    .optional()?
    .ok_or(StoreError::NotFound { what: "build", id })
}

fn read_build(row: &Row<'_>) -> rusqlite::Result<BuildJob> {
    let workspace: Option<String> = row.get(7)?;
    let log: Option<String> = row.get(8)?;
    let artifact: Option<String> = row.get(9)?;
    Ok(BuildJob {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        target_id: row.get(2)?,
        status: get_enum(row, 3)?,
        triggered_by: get_enum(row, 4)?,
        commit_sha: row.get(5)?,
        error_kind: get_opt_enum(row, 6)?,
        workspace_path: workspace.map(PathBuf::from),
        log_path: log.map(PathBuf::from),
        artifact_path: artifact.map(PathBuf::from),
        created_at: get_datetime(row, 10)?,
        started_at: get_opt_datetime(row, 11)?,
        finished_at: get_opt_datetime(row, 12)?,
        duration_secs: row.get(13)?,
    })
}

#[cfg(test)]
mod tests {
    use docharbor_core::{NewRepository, NewTarget, RefKind};

    use super::*;

    fn fixture() -> (Store, i64, i64) {
        let store = Store::open_in_memory().unwrap();
        let repo = store
            .create_repository(&NewRepository::new("widget", "https://x/w.git"))
            .unwrap();
        let target = store
            .create_target(&NewTarget::new(repo.id, RefKind::Branch, "main"))
            .unwrap();
        (store, repo.id, target.id)
    }

    #[test]
    fn enqueue_persists_a_queued_row() {
        let (store, repo, target) = fixture();
        let job = store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        assert_eq!(job.status, BuildStatus::Queued);
        assert_eq!(job.repository_id, repo);
        assert_eq!(job.triggered_by, BuildTrigger::Manual);
        assert!(store.has_active_build(target).unwrap());
    }

    #[test]
    fn claims_are_fifo() {
        let (store, _repo, target) = fixture();
        let other = store
            .create_repository(&NewRepository::new("other", "https://x/o.git"))
            .unwrap();
        let second_target = store
            .create_target(&NewTarget::new(other.id, RefKind::Branch, "main"))
            .unwrap()
            .id;

        let first = store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        let second = store.enqueue_build(second_target, BuildTrigger::Auto).unwrap();

        assert_eq!(store.claim_next_queued().unwrap().unwrap().id, first.id);
        assert_eq!(store.claim_next_queued().unwrap().unwrap().id, second.id);
        assert!(store.claim_next_queued().unwrap().is_none());
    }

    #[test]
    fn claim_skips_targets_with_a_running_build() {
        let (store, _repo, target) = fixture();
        store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        store.enqueue_build(target, BuildTrigger::Manual).unwrap();

        let first = store.claim_next_queued().unwrap().unwrap();
        assert_eq!(first.status, BuildStatus::Running);
        // second row for the same target must wait
        assert!(store.claim_next_queued().unwrap().is_none());

        store.finish_build(first.id, BuildStatus::Succeeded, None, None).unwrap();
        let second = store.claim_next_queued().unwrap().unwrap();
        assert_ne!(second.id, first.id);
    }

    #[test]
    fn finish_stamps_duration() {
        let (store, _repo, target) = fixture();
        store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        let job = store.claim_next_queued().unwrap().unwrap();
        let done = store
            .finish_build(job.id, BuildStatus::Succeeded, None, Some(Path::new("/a/b")))
            .unwrap();
        assert_eq!(done.status, BuildStatus::Succeeded);
        assert!(done.finished_at.is_some());
        assert!(done.duration_secs.unwrap() >= 0.0);
        assert_eq!(done.artifact_path, Some(PathBuf::from("/a/b")));
    }

    #[test]
    fn cancel_only_hits_queued_rows() {
        let (store, _repo, target) = fixture();
        let job = store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        assert!(store.cancel_queued(job.id).unwrap());
        assert_eq!(store.build(job.id).unwrap().status, BuildStatus::Cancelled);
        // a second cancel finds nothing queued
        assert!(!store.cancel_queued(job.id).unwrap());

        let job = store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        store.claim_next_queued().unwrap().unwrap();
        assert!(!store.cancel_queued(job.id).unwrap());
    }

    #[test]
    fn interrupted_builds_fail_at_startup() {
        let (store, _repo, target) = fixture();
        store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        let running = store.claim_next_queued().unwrap().unwrap();
        store
            .record_build_paths(running.id, Path::new("/w/5"), Path::new("/l/5.log"))
            .unwrap();

        let failed = store.fail_interrupted_builds().unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].status, BuildStatus::Failed);
        assert_eq!(failed[0].error_kind, Some(FailureKind::InterruptedAtStartup));
        assert_eq!(failed[0].workspace_path, Some(PathBuf::from("/w/5")));

        // queued work survives recovery
        let job = store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        assert!(store.fail_interrupted_builds().unwrap().is_empty());
        assert_eq!(store.build(job.id).unwrap().status, BuildStatus::Queued);
    }

    #[test]
    fn expired_logs_are_taken_once() {
        let (store, _repo, target) = fixture();
        store.enqueue_build(target, BuildTrigger::Manual).unwrap();
        let job = store.claim_next_queued().unwrap().unwrap();
        store
            .record_build_paths(job.id, Path::new("/w/1"), Path::new("/l/1.log"))
            .unwrap();
        store.finish_build(job.id, BuildStatus::Failed, None, None).unwrap();

        let horizon = Utc::now() + chrono::Duration::seconds(1);
        let paths = store.take_expired_log_paths(horizon).unwrap();
        assert_eq!(paths, vec![PathBuf::from("/l/1.log")]);
        assert!(store.take_expired_log_paths(horizon).unwrap().is_empty());
    }
}
