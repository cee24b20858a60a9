//! Atomic artifact publication and the refs.json index
//!
//! The generator's `out/` tree is moved to a temporary sibling of the
//! final artifact path and swapped in with renames, so readers only
//! ever see the old artifact or the new one. The displaced directory
//! is deleted afterwards. Callers hold the per-target publication lock
//! across the swap.

use std::path::{Path, PathBuf};

use docharbor_core::TrackedTarget;
use docharbor_store::Store;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BuildError, Result};
use crate::layout::Layout;

/// One target in the refs.json index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefEntry {
    pub slug: String,
    pub ref_type: String,
    pub ref_name: String,
    pub has_artifact: bool,
    pub url: String,
}

/// Contents of `/<repo-id>/refs.json`, consumed by the injected
/// navigation snippet through the external HTTP server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefsIndex {
    pub repository: i64,
    pub targets: Vec<RefEntry>,
}

/// Publication-store operations
#[derive(Debug, Clone)]
pub struct Publisher {
    layout: Layout,
}

impl Publisher {
    pub fn new(layout: Layout) -> Self {
        Self { layout }
    }

    /// Swap `out_dir` into the stable artifact path for the target.
    ///
    /// The previous artifact stays served until the final rename and is
    /// removed only after the swap; on failure it is left in place.
    pub fn publish(
        &self,
        repository_id: i64,
        target: &TrackedTarget,
        build_id: i64,
        out_dir: &Path,
    ) -> Result<PathBuf> {
        if !out_dir.is_dir() {
            return Err(BuildError::publish(format!(
                "generator produced no output directory at {}",
                out_dir.display()
            )));
        }

        let final_dir = self.layout.artifact_dir(repository_id, &target.slug);
        let parent = final_dir
            .parent()
            .ok_or_else(|| BuildError::publish("artifact path has no parent"))?;
        std::fs::create_dir_all(parent).map_err(|e| {
            BuildError::publish(format!("creating {}: {e}", parent.display()))
        })?;

        let incoming = parent.join(format!(".incoming-{}-{build_id}", target.slug));
        let displaced = parent.join(format!(".displaced-{}-{build_id}", target.slug));
        remove_stale(&incoming);
        remove_stale(&displaced);

        std::fs::rename(out_dir, &incoming).map_err(|e| {
            BuildError::publish(format!("staging output next to artifact: {e}"))
        })?;

        let had_previous = final_dir.exists();
        if had_previous {
            std::fs::rename(&final_dir, &displaced).map_err(|e| {
                BuildError::publish(format!("displacing previous artifact: {e}"))
            })?;
        }

        if let Err(e) = std::fs::rename(&incoming, &final_dir) {
            // Put the previous artifact back so it keeps being served.
            if had_previous {
                if let Err(restore) = std::fs::rename(&displaced, &final_dir) {
                    warn!(target = target.id, %restore, "failed to restore displaced artifact");
                }
            }
            return Err(BuildError::publish(format!("installing new artifact: {e}")));
        }

        if had_previous {
            if let Err(e) = std::fs::remove_dir_all(&displaced) {
                warn!(target = target.id, %e, "failed to delete displaced artifact");
            }
        }

        info!(target = target.id, artifact = %final_dir.display(), "artifact published");
        Ok(final_dir)
    }

    /// Rewrite `refs.json` for a repository from the store's current
    /// view of its targets.
    pub fn write_refs_index(&self, store: &Store, repository_id: i64) -> Result<RefsIndex> {
        let targets = store.targets_for_repository(repository_id)?;
        let entries = targets
            .iter()
            .map(|t| {
                let artifact_dir = self.layout.artifact_dir(repository_id, &t.slug);
                RefEntry {
                    slug: t.slug.clone(),
                    ref_type: t.ref_kind.to_string(),
                    ref_name: t.ref_name.clone(),
                    has_artifact: t.latest_successful_build_id.is_some() && artifact_dir.is_dir(),
                    url: format!("/{repository_id}/{}/", t.slug),
                }
            })
            .collect();
        let index = RefsIndex { repository: repository_id, targets: entries };

        let path = self.layout.refs_index_path(repository_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let body = serde_json::to_string_pretty(&index)
            .map_err(|e| BuildError::publish(format!("encoding refs index: {e}")))?;
        // Write-then-rename keeps the index readable at all times.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body.as_bytes())?;
        std::fs::rename(&tmp, &path)?;
        Ok(index)
    }

    /// Delete the published artifact directory for one target
    pub fn remove_artifact(&self, repository_id: i64, slug: &str) -> Result<()> {
        let dir = self.layout.artifact_dir(repository_id, slug);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
            info!(repository = repository_id, %slug, "artifact removed");
        }
        Ok(())
    }
}

fn remove_stale(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_dir_all(path) {
            warn!(path = %path.display(), %e, "failed to remove stale publication directory");
        }
    }
}
