//! On-disk layout of workspaces, logs, and published artifacts
//!
//! ```text
//! <data>/repos/<repo-id>/<target-slug>/workspaces/<build-id>/{src,env,out}
//! <data>/repos/<repo-id>/<target-slug>/logs/<build-id>.log
//! <data>/artifacts/<repo-id>/<target-slug>/
//! <data>/artifacts/<repo-id>/refs.json
//! ```
//!
//! The artifact side of this layout is an external contract: the HTTP
//! server serves those directories directly.

use std::path::{Path, PathBuf};

/// A build's private on-disk directories
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Directory owned exclusively by one build
    pub root: PathBuf,
    /// Checkout
    pub src: PathBuf,
    /// Dependency environment
    pub env: PathBuf,
    /// Generator output, moved away on publication
    pub out: PathBuf,
}

/// Path scheme rooted at the configured data directory
#[derive(Debug, Clone)]
pub struct Layout {
    data_dir: PathBuf,
}

impl Layout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn target_dir(&self, repository_id: i64, slug: &str) -> PathBuf {
        self.data_dir.join("repos").join(repository_id.to_string()).join(slug)
    }

    pub fn repo_dir(&self, repository_id: i64) -> PathBuf {
        self.data_dir.join("repos").join(repository_id.to_string())
    }

    pub fn workspace(&self, repository_id: i64, slug: &str, build_id: i64) -> Workspace {
        let root = self
            .target_dir(repository_id, slug)
            .join("workspaces")
            .join(build_id.to_string());
        Workspace {
            src: root.join("src"),
            env: root.join("env"),
            out: root.join("out"),
            root,
        }
    }

    pub fn log_path(&self, repository_id: i64, slug: &str, build_id: i64) -> PathBuf {
        self.target_dir(repository_id, slug).join("logs").join(format!("{build_id}.log"))
    }

    pub fn repo_artifacts_dir(&self, repository_id: i64) -> PathBuf {
        self.data_dir.join("artifacts").join(repository_id.to_string())
    }

    /// Stable path the artifact for `(repository, target)` is served from
    pub fn artifact_dir(&self, repository_id: i64, slug: &str) -> PathBuf {
        self.repo_artifacts_dir(repository_id).join(slug)
    }

    pub fn refs_index_path(&self, repository_id: i64) -> PathBuf {
        self.repo_artifacts_dir(repository_id).join("refs.json")
    }

    /// Every `workspaces/` directory currently on disk, for the
    /// startup orphan sweep.
    pub fn workspace_parents(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut parents = Vec::new();
        let repos = self.data_dir.join("repos");
        if !repos.is_dir() {
            return Ok(parents);
        }
        for repo_entry in std::fs::read_dir(&repos)? {
            let repo_dir = repo_entry?.path();
            if !repo_dir.is_dir() {
                continue;
            }
            for target_entry in std::fs::read_dir(&repo_dir)? {
                let workspaces = target_entry?.path().join("workspaces");
                if workspaces.is_dir() {
                    parents.push(workspaces);
                }
            }
        }
        Ok(parents)
    }
}
