//! Per-job build executor
//!
//! Drives one claimed job through the pipeline: workspace allocation,
//! clone, ref checkout, environment provisioning, documentation
//! generation, snippet injection, and atomic publication. Failures at
//! any step record their kind on the build row; the workspace is
//! removed whatever the outcome and the previously published artifact
//! is never touched on failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docharbor_core::process::run_logged;
use docharbor_core::{
    BuildJob, BuildLog, BuildStatus, CommandSpec, EnvManager, ProcessError, ProjectMetadata,
    Repository, TrackedTarget,
};
use docharbor_env::{ProvisionRequest, Provisioner};
use docharbor_git::{CheckoutRequest, CloneRequest, GitClient};
use docharbor_manifest::Manifest;
use docharbor_store::Store;
use tracing::{error, info, warn};

use crate::error::{BuildError, Result};
use crate::inject::{inject_navigation, NavContext};
use crate::layout::{Layout, Workspace};
use crate::locks::PublishLocks;
use crate::publish::Publisher;

/// Cooperative cancellation flag checked at step boundaries.
///
/// Once publication starts the executor stops looking at it.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Timeout for the documentation generator
    pub doc_build_timeout: Duration,
    /// Backend used when the target carries no override
    pub default_env_manager: EnvManager,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            doc_build_timeout: Duration::from_secs(600),
            default_env_manager: EnvManager::Uv,
        }
    }
}

/// Runs builds end to end
pub struct BuildExecutor {
    store: Arc<Store>,
    git: Arc<dyn GitClient>,
    provisioner: Arc<dyn Provisioner>,
    layout: Layout,
    publisher: Publisher,
    locks: PublishLocks,
    config: ExecutorConfig,
}

struct Published {
    artifact_dir: std::path::PathBuf,
}

impl BuildExecutor {
    pub fn new(
        store: Arc<Store>,
        git: Arc<dyn GitClient>,
        provisioner: Arc<dyn Provisioner>,
        layout: Layout,
        locks: PublishLocks,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            git,
            provisioner,
            publisher: Publisher::new(layout.clone()),
            layout,
            locks,
            config,
        }
    }

    /// Drive a claimed (already `running`) job to a terminal state.
    ///
    /// Never propagates an error: every failure is recorded on the
    /// build row and in the log, and the worker stays alive.
    pub async fn run(&self, job: BuildJob, cancel: CancelFlag) {
        let build_id = job.id;
        info!(build = build_id, target = job.target_id, "build started");

        let (workspace, outcome) = self.execute(&job, &cancel).await;

        let finished = match outcome {
            Ok(published) => self.store.finish_build(
                build_id,
                BuildStatus::Succeeded,
                None,
                Some(&published.artifact_dir),
            ),
            Err(BuildError::Cancelled) => {
                info!(build = build_id, "build cancelled");
                self.store.finish_build(build_id, BuildStatus::Cancelled, None, None)
            }
            Err(err) => {
                let kind = err.failure_kind();
                warn!(build = build_id, %err, ?kind, "build failed");
                self.stamp_failure(&job, &err);
                self.store.finish_build(build_id, BuildStatus::Failed, kind, None)
            }
        };
        if let Err(e) = finished {
            error!(build = build_id, %e, "failed to record terminal build state");
        }

        // The workspace never outlives the job, success or not.
        if let Some(workspace) = workspace {
            if let Err(e) = std::fs::remove_dir_all(&workspace.root) {
                if workspace.root.exists() {
                    warn!(build = build_id, %e, "failed to remove workspace");
                }
            }
        }
    }

    async fn execute(
        &self,
        job: &BuildJob,
        cancel: &CancelFlag,
    ) -> (Option<Workspace>, Result<Published>) {
        // Repository and target rows are read at dispatch time, so an
        // override changed while the job sat queued takes effect here.
        let (repo, target) = match self.load_rows(job) {
            Ok(rows) => rows,
            Err(e) => return (None, Err(e)),
        };

        let workspace = self.layout.workspace(repo.id, &target.slug, job.id);
        let result = self.pipeline(job, &repo, &target, &workspace, cancel).await;
        (Some(workspace), result)
    }

    fn load_rows(&self, job: &BuildJob) -> Result<(Repository, TrackedTarget)> {
        let repo = self.store.repository(job.repository_id)?;
        let target = self.store.target(job.target_id)?;
        Ok((repo, target))
    }

    async fn pipeline(
        &self,
        job: &BuildJob,
        repo: &Repository,
        target: &TrackedTarget,
        workspace: &Workspace,
        cancel: &CancelFlag,
    ) -> Result<Published> {
        // 1. Allocate the workspace and open the log.
        std::fs::create_dir_all(&workspace.root)?;
        let log_path = self.layout.log_path(repo.id, &target.slug, job.id);
        let mut log = BuildLog::open(&log_path)?;
        self.store.record_build_paths(job.id, &workspace.root, &log_path)?;
        log.append_line(&format!(
            "build {} for {} ({} {})",
            job.id, repo.name, target.ref_kind, target.ref_name
        ))?;

        self.check_cancelled(cancel)?;

        // 2. Clone.
        let head = self
            .git
            .clone_repo(
                &CloneRequest {
                    url: repo.url.clone(),
                    dest: workspace.src.clone(),
                    auth: repo.auth(),
                    verify_tls: repo.verify_tls,
                },
                &mut log,
            )
            .await?;
        self.store.record_build_commit(job.id, &head)?;

        self.check_cancelled(cancel)?;

        // 3. Check out the tracked ref.
        let commit = self
            .git
            .checkout(
                &CheckoutRequest {
                    url: repo.url.clone(),
                    dest: workspace.src.clone(),
                    ref_kind: target.ref_kind,
                    ref_name: target.ref_name.clone(),
                    auth: repo.auth(),
                    verify_tls: repo.verify_tls,
                },
                &mut log,
            )
            .await?;
        self.store.record_build_commit(job.id, &commit)?;

        self.check_cancelled(cancel)?;

        // 4. Provision the environment.
        let backend = target.env_manager.unwrap_or(self.config.default_env_manager);
        let env = self
            .provisioner
            .provision(
                &ProvisionRequest {
                    src_dir: workspace.src.clone(),
                    env_dir: workspace.env.clone(),
                    backend,
                    operator_extras: repo.install_extras.clone(),
                },
                &mut log,
            )
            .await?;

        self.check_cancelled(cancel)?;

        // 5. Run the documentation generator.
        self.build_docs(repo, workspace, &env.executable("sphinx-build"), &mut log).await?;

        // 6. Inject the navigation snippet.
        let metadata = read_metadata(&workspace.src);
        let version = metadata
            .version
            .clone()
            .or_else(|| repo.project_version.clone())
            .unwrap_or_else(|| "unknown".to_string());
        inject_navigation(
            &workspace.out,
            &NavContext {
                repository_id: repo.id,
                target_slug: &target.slug,
                ref_kind: target.ref_kind,
                ref_name: &target.ref_name,
                version: &version,
            },
        )?;

        // Last boundary where a cancellation request is honored.
        self.check_cancelled(cancel)?;

        // 7. Publish under the per-target lock.
        let _guard = self.locks.acquire(repo.id, target.id).await;
        let artifact_dir = self.publisher.publish(repo.id, target, job.id, &workspace.out)?;
        self.store.record_successful_build(target.id, job.id, &commit)?;
        if repo.main_target_id == Some(target.id) && !metadata.is_empty() {
            self.store.update_repository_metadata(repo.id, &metadata)?;
        }
        self.publisher.write_refs_index(&self.store, repo.id)?;
        drop(_guard);

        log.append_line(&format!("published {} at {}", target.slug, artifact_dir.display()))?;
        Ok(Published { artifact_dir })
    }

    async fn build_docs(
        &self,
        repo: &Repository,
        workspace: &Workspace,
        sphinx_build: &std::path::Path,
        log: &mut BuildLog,
    ) -> Result<()> {
        let docs_dir = workspace.src.join(&repo.docs_path);
        if !docs_dir.is_dir() {
            return Err(BuildError::doc_build(format!(
                "docs path {} missing from checkout",
                repo.docs_path
            )));
        }

        let spec = CommandSpec::new(sphinx_build.display().to_string())
            .args(["-b", "html"])
            .arg(docs_dir.display().to_string())
            .arg(workspace.out.display().to_string())
            .timeout(self.config.doc_build_timeout);
        run_logged(&spec, log).await.map_err(|e| match e {
            ProcessError::Timeout { secs, .. } => {
                BuildError::doc_build(format!("generator timed out after {secs}s"))
            }
            other => BuildError::doc_build(other.to_string()),
        })
    }

    fn check_cancelled(&self, cancel: &CancelFlag) -> Result<()> {
        if cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Stamp the failure kind and message into the build log
    fn stamp_failure(&self, job: &BuildJob, err: &BuildError) {
        let Ok(build) = self.store.build(job.id) else { return };
        let Some(log_path) = build.log_path else { return };
        if let Ok(mut log) = BuildLog::open(&log_path) {
            let kind = err
                .failure_kind()
                .map(|k| k.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let _ = log.append_line(&format!("build failed ({kind}): {err}"));
        }
    }
}

fn read_metadata(src_dir: &std::path::Path) -> ProjectMetadata {
    match Manifest::load(src_dir) {
        Ok(Some(manifest)) => manifest.metadata(),
        _ => ProjectMetadata::default(),
    }
}
