//! Repository persistence

use docharbor_core::{NewRepository, ProjectMetadata, Repository};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

use crate::{get_datetime, get_enum, now, Result, Store, StoreError};

const REPO_COLS: &str = "id, name, provider, url, docs_path, auth_token, deploy_key, \
    verify_tls, public, install_extras, main_target_id, project_name, project_version, \
    project_summary, project_homepage, created_at";

impl Store {
    /// Register a repository
    pub fn create_repository(&self, new: &NewRepository) -> Result<Repository> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO repositories (name, provider, url, docs_path, auth_token, deploy_key, \
             verify_tls, public, install_extras, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                new.name,
                new.provider.to_string(),
                new.url,
                new.docs_path,
                new.auth_token,
                new.deploy_key,
                new.verify_tls,
                new.public,
                new.install_extras.join(","),
                now(),
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!(repository = id, name = %new.name, "repository registered");
        repository_by_id(&conn, id)
    }

    pub fn repository(&self, id: i64) -> Result<Repository> {
        repository_by_id(&self.conn(), id)
    }

    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {REPO_COLS} FROM repositories ORDER BY id"))?;
        let rows = stmt.query_map([], read_repository)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Designate (or clear) the target whose builds update project metadata
    pub fn set_main_target(&self, repository_id: i64, target_id: Option<i64>) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE repositories SET main_target_id = ?1 WHERE id = ?2",
            params![target_id, repository_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "repository", id: repository_id });
        }
        Ok(())
    }

    /// Write manifest-derived metadata onto the repository row.
    ///
    /// Only invoked for successful builds of the main target.
    pub fn update_repository_metadata(&self, id: i64, meta: &ProjectMetadata) -> Result<()> {
        let changed = self.conn().execute(
            "UPDATE repositories SET project_name = COALESCE(?1, name), project_version = ?2, \
             project_summary = ?3, project_homepage = ?4 WHERE id = ?5",
            params![meta.name, meta.version, meta.summary, meta.homepage, id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "repository", id });
        }
        Ok(())
    }

    /// Remove a repository; targets and builds cascade
    pub fn delete_repository(&self, id: i64) -> Result<()> {
        let changed = self.conn().execute("DELETE FROM repositories WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StoreError::NotFound { what: "repository", id });
        }
        info!(repository = id, "repository deleted");
        Ok(())
    }
}

pub(crate) fn repository_by_id(conn: &Connection, id: i64) -> Result<Repository> {
    conn.query_row(
        &format!("SELECT {REPO_COLS} FROM repositories WHERE id = ?1"),
        params![id],
        read_repository,
    )
    .optional()?
    .ok_or(StoreError::NotFound { what: "repository", id })
}

fn read_repository(row: &Row<'_>) -> rusqlite::Result<Repository> {
    let extras: String = row.get(9)?;
    Ok(Repository {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: get_enum(row, 2)?,
        url: row.get(3)?,
        docs_path: row.get(4)?,
        auth_token: row.get(5)?,
        deploy_key: row.get(6)?,
        verify_tls: row.get(7)?,
        public: row.get(8)?,
        install_extras: extras
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.trim().to_string())
            .collect(),
        main_target_id: row.get(10)?,
        project_name: row.get(11)?,
        project_version: row.get(12)?,
        project_summary: row.get(13)?,
        project_homepage: row.get(14)?,
        created_at: get_datetime(row, 15)?,
    })
}

#[cfg(test)]
mod tests {
    use docharbor_core::Provider;

    use super::*;

    #[test]
    fn create_and_fetch_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut new = NewRepository::new("widget", "https://example.com/widget.git");
        new.provider = Provider::Gitlab;
        new.auth_token = Some("tok".into());
        new.install_extras = vec!["typing".into()];

        let created = store.create_repository(&new).unwrap();
        let fetched = store.repository(created.id).unwrap();
        assert_eq!(fetched.name, "widget");
        assert_eq!(fetched.provider, Provider::Gitlab);
        assert_eq!(fetched.docs_path, "docs");
        assert_eq!(fetched.auth_token.as_deref(), Some("tok"));
        assert_eq!(fetched.install_extras, vec!["typing"]);
        assert!(fetched.verify_tls);
    }

    #[test]
    fn missing_repository_is_not_found() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.repository(42),
            Err(StoreError::NotFound { what: "repository", id: 42 })
        ));
    }

    #[test]
    fn metadata_update_keeps_name_fallback() {
        let store = Store::open_in_memory().unwrap();
        let repo = store
            .create_repository(&NewRepository::new("widget", "https://x/w.git"))
            .unwrap();

        let meta = ProjectMetadata {
            name: None,
            version: Some("2.0".into()),
            summary: Some("docs".into()),
            homepage: None,
        };
        store.update_repository_metadata(repo.id, &meta).unwrap();
        let repo = store.repository(repo.id).unwrap();
        assert_eq!(repo.project_name.as_deref(), Some("widget"));
        assert_eq!(repo.project_version.as_deref(), Some("2.0"));
    }

    #[test]
    fn list_orders_by_id() {
        let store = Store::open_in_memory().unwrap();
        store.create_repository(&NewRepository::new("a", "https://x/a.git")).unwrap();
        store.create_repository(&NewRepository::new("b", "https://x/b.git")).unwrap();
        let names: Vec<_> =
            store.list_repositories().unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
