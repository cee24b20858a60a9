//! On-demand cleanup operations
//!
//! Invoked from the admin surface: delete a target's published
//! artifacts, prune old logs, or purge a repository entirely.

use std::time::Duration;

use chrono::Utc;
use docharbor_store::Store;
use tracing::{info, warn};

use crate::error::Result;
use crate::layout::Layout;
use crate::publish::Publisher;

/// Remove the published artifact for a target and clear its
/// latest-successful-build reference. The refs index is rewritten so
/// the serving side stops advertising the artifact.
pub fn delete_target_artifacts(store: &Store, layout: &Layout, target_id: i64) -> Result<()> {
    let target = store.target(target_id)?;
    let publisher = Publisher::new(layout.clone());
    publisher.remove_artifact(target.repository_id, &target.slug)?;
    store.clear_latest_successful_build(target_id)?;
    publisher.write_refs_index(store, target.repository_id)?;
    Ok(())
}

/// Delete logs of terminal builds older than the retention horizon.
/// Returns how many files were removed.
pub fn prune_logs(store: &Store, older_than: Duration) -> Result<usize> {
    let cutoff = Utc::now()
        - chrono::Duration::from_std(older_than).unwrap_or_else(|_| chrono::Duration::days(36500));
    let mut removed = 0;
    for path in store.take_expired_log_paths(cutoff)? {
        match std::fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), %e, "failed to remove log"),
        }
    }
    info!(removed, "log retention pass complete");
    Ok(removed)
}

/// Remove a repository and everything derived from it: targets and
/// builds (cascade in the store), workspaces, logs, and artifacts.
pub fn purge_repository(store: &Store, layout: &Layout, repository_id: i64) -> Result<()> {
    // Confirm it exists before touching the filesystem.
    let _ = store.repository(repository_id)?;

    for dir in [layout.repo_dir(repository_id), layout.repo_artifacts_dir(repository_id)] {
        if dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                warn!(path = %dir.display(), %e, "failed to remove repository data");
            }
        }
    }
    store.delete_repository(repository_id)?;
    info!(repository = repository_id, "repository purged");
    Ok(())
}
