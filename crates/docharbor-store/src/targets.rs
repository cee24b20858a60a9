//! Tracked-target persistence

use docharbor_core::{slugify, NewTarget, TrackedTarget};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::{get_datetime, get_enum, get_opt_enum, now, Result, Store, StoreError};

const TARGET_COLS: &str = "id, repository_id, ref_kind, ref_name, slug, auto_build, \
    env_manager, last_built_commit, latest_successful_build_id, created_at";

impl Store {
    /// Track a new target.
    ///
    /// The slug is derived from the ref name; when another target of
    /// the repository already claimed it, a kind-prefixed slug keeps
    /// `(repository, slug)` unique.
    pub fn create_target(&self, new: &NewTarget) -> Result<TrackedTarget> {
        let conn = self.conn();

        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM targets WHERE repository_id = ?1 AND ref_kind = ?2 AND ref_name = ?3",
                params![new.repository_id, new.ref_kind.to_string(), new.ref_name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::DuplicateTarget {
                repository_id: new.repository_id,
                ref_kind: new.ref_kind.to_string(),
                ref_name: new.ref_name.clone(),
            });
        }

        let plain = slugify(&new.ref_name);
        let taken: Option<i64> = conn
            .query_row(
                "SELECT id FROM targets WHERE repository_id = ?1 AND slug = ?2",
                params![new.repository_id, plain],
                |row| row.get(0),
            )
            .optional()?;
        let slug = if taken.is_some() {
            format!("{}-{}", new.ref_kind, plain)
        } else {
            plain
        };

        conn.execute(
            "INSERT INTO targets (repository_id, ref_kind, ref_name, slug, auto_build, \
             env_manager, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                new.repository_id,
                new.ref_kind.to_string(),
                new.ref_name,
                slug,
                new.auto_build,
                new.env_manager.map(|m| m.to_string()),
                now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(target = id, repository = new.repository_id, ref_name = %new.ref_name, %slug, "target tracked");
        target_by_id(&conn, id)
    }

    pub fn target(&self, id: i64) -> Result<TrackedTarget> {
        target_by_id(&self.conn(), id)
    }

    pub fn targets_for_repository(&self, repository_id: i64) -> Result<Vec<TrackedTarget>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TARGET_COLS} FROM targets WHERE repository_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt.query_map(params![repository_id], read_target)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Targets the monitor sweeps
    pub fn auto_build_targets(&self) -> Result<Vec<TrackedTarget>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TARGET_COLS} FROM targets WHERE auto_build = 1 ORDER BY id"
        ))?;
        let rows = stmt.query_map([], read_target)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Record a successful publication: advances `last_built_commit`
    /// and the latest-successful-build reference together.
    pub fn record_successful_build(
        &self,
        target_id: i64,
        build_id: i64,
        commit: &str,
    ) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE targets SET last_built_commit = ?1, latest_successful_build_id = ?2 \
             WHERE id = ?3",
            params![commit, build_id, target_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "target", id: target_id });
        }
        Ok(())
    }

    /// Forget the published artifact (invoked by artifact cleanup)
    pub fn clear_latest_successful_build(&self, target_id: i64) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE targets SET latest_successful_build_id = NULL WHERE id = ?1",
            params![target_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "target", id: target_id });
        }
        Ok(())
    }
}

pub(crate) fn target_by_id(conn: &Connection, id: i64) -> Result<TrackedTarget> {
    conn.query_row(
        &format!("SELECT {TARGET_COLS} FROM targets WHERE id = ?1"),
        params![id],
        read_target,
    )
    .optional()?
    .ok_or(StoreError::NotFound { what: "target", id })
}

fn read_target(row: &Row<'_>) -> rusqlite::Result<TrackedTarget> {
    Ok(TrackedTarget {
        id: row.get(0)?,
        repository_id: row.get(1)?,
        ref_kind: get_enum(row, 2)?,
        ref_name: row.get(3)?,
        slug: row.get(4)?,
        auto_build: row.get(5)?,
        env_manager: get_opt_enum(row, 6)?,
        last_built_commit: row.get(7)?,
        latest_successful_build_id: row.get(8)?,
        created_at: get_datetime(row, 9)?,
    })
}

#[cfg(test)]
mod tests {
    use docharbor_core::{EnvManager, NewRepository, RefKind};

    use super::*;

    fn store_with_repo() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let repo = store
            .create_repository(&NewRepository::new("widget", "https://x/w.git"))
            .unwrap();
        (store, repo.id)
    }

    #[test]
    fn slug_comes_from_ref_name() {
        let (store, repo) = store_with_repo();
        let target = store
            .create_target(&NewTarget::new(repo, RefKind::Branch, "release/1.2"))
            .unwrap();
        assert_eq!(target.slug, "release-1.2");
        assert!(target.auto_build);
        assert_eq!(target.env_manager, None);
    }

    #[test]
    fn colliding_slug_gets_kind_prefix() {
        let (store, repo) = store_with_repo();
        let branch = store.create_target(&NewTarget::new(repo, RefKind::Branch, "main")).unwrap();
        let tag = store.create_target(&NewTarget::new(repo, RefKind::Tag, "main")).unwrap();
        assert_eq!(branch.slug, "main");
        assert_eq!(tag.slug, "tag-main");
    }

    #[test]
    fn duplicate_target_is_rejected() {
        let (store, repo) = store_with_repo();
        store.create_target(&NewTarget::new(repo, RefKind::Branch, "main")).unwrap();
        let err = store
            .create_target(&NewTarget::new(repo, RefKind::Branch, "main"))
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateTarget { .. }));
    }

    #[test]
    fn env_manager_override_round_trips() {
        let (store, repo) = store_with_repo();
        let mut new = NewTarget::new(repo, RefKind::Branch, "main");
        new.env_manager = Some(EnvManager::Pyenv);
        let target = store.create_target(&new).unwrap();
        assert_eq!(store.target(target.id).unwrap().env_manager, Some(EnvManager::Pyenv));
    }

    #[test]
    fn auto_build_listing_filters() {
        let (store, repo) = store_with_repo();
        store.create_target(&NewTarget::new(repo, RefKind::Branch, "main")).unwrap();
        let mut manual = NewTarget::new(repo, RefKind::Tag, "v1");
        manual.auto_build = false;
        store.create_target(&manual).unwrap();

        let autos = store.auto_build_targets().unwrap();
        assert_eq!(autos.len(), 1);
        assert_eq!(autos[0].ref_name, "main");
    }

    #[test]
    fn successful_build_advances_commit_and_reference() {
        let (store, repo) = store_with_repo();
        let target = store.create_target(&NewTarget::new(repo, RefKind::Branch, "main")).unwrap();
        store.record_successful_build(target.id, 7, "abc123").unwrap();

        let target = store.target(target.id).unwrap();
        assert_eq!(target.last_built_commit.as_deref(), Some("abc123"));
        assert_eq!(target.latest_successful_build_id, Some(7));

        store.clear_latest_successful_build(target.id).unwrap();
        let target = store.target(target.id).unwrap();
        assert_eq!(target.latest_successful_build_id, None);
        // the last built commit is only advanced by publications
        assert_eq!(target.last_built_commit.as_deref(), Some("abc123"));
    }

    #[test]
    fn repository_delete_cascades_to_targets() {
        let (store, repo) = store_with_repo();
        let target = store.create_target(&NewTarget::new(repo, RefKind::Branch, "main")).unwrap();
        store.delete_repository(repo).unwrap();
        assert!(matches!(store.target(target.id), Err(StoreError::NotFound { .. })));
    }
}
