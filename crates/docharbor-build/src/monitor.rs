//! Auto-build monitor
//!
//! A single cooperative task that periodically compares the remote
//! head of every auto-tracked target with its last built commit and
//! enqueues a rebuild when the ref advanced. Sweeps never overlap; a
//! sweep that runs longer than the interval rolls straight into the
//! next one. Errors on individual targets are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use docharbor_core::BuildTrigger;
use docharbor_git::{GitClient, RemoteHeadRequest};
use docharbor_store::Store;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::queue::BuildQueue;

/// Monitor configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between sweep starts
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval: Duration::from_secs(60) }
    }
}

/// Periodic watcher over auto-build targets
pub struct AutoBuildMonitor {
    store: Arc<Store>,
    git: Arc<dyn GitClient>,
    queue: Arc<BuildQueue>,
    config: MonitorConfig,
}

impl AutoBuildMonitor {
    pub fn new(
        store: Arc<Store>,
        git: Arc<dyn GitClient>,
        queue: Arc<BuildQueue>,
        config: MonitorConfig,
    ) -> Self {
        Self { store, git, queue, config }
    }

    /// Run the sweep loop until the shutdown signal flips
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.config.interval.as_secs(), "auto-build monitor started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                let started = tokio::time::Instant::now();
                self.sweep().await;

                let elapsed = started.elapsed();
                if elapsed < self.config.interval {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.interval - elapsed) => {}
                        _ = shutdown.changed() => {}
                    }
                }
            }
            info!("auto-build monitor stopped");
        })
    }

    /// One pass over every auto-build target
    pub async fn sweep(&self) {
        let targets = match self.store.auto_build_targets() {
            Ok(targets) => targets,
            Err(e) => {
                warn!(%e, "sweep aborted: cannot list auto-build targets");
                return;
            }
        };

        for target in targets {
            if let Err(e) = self.check_target(&target).await {
                warn!(target = target.id, ref_name = %target.ref_name, %e, "sweep check failed");
            }
        }
    }

    async fn check_target(
        &self,
        target: &docharbor_core::TrackedTarget,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // A job already queued or running suppresses the enqueue.
        if self.store.has_active_build(target.id)? {
            debug!(target = target.id, "skipping: build already active");
            return Ok(());
        }

        let repo = self.store.repository(target.repository_id)?;
        let remote = self
            .git
            .remote_head(&RemoteHeadRequest {
                url: repo.url.clone(),
                ref_kind: target.ref_kind,
                ref_name: target.ref_name.clone(),
                auth: repo.auth(),
                verify_tls: repo.verify_tls,
            })
            .await?;

        let Some(remote) = remote else {
            debug!(target = target.id, "remote no longer has the ref");
            return Ok(());
        };

        if target.last_built_commit.as_deref() == Some(remote.as_str()) {
            return Ok(());
        }

        info!(
            target = target.id,
            ref_name = %target.ref_name,
            %remote,
            last_built = target.last_built_commit.as_deref().unwrap_or("none"),
            "remote advanced; enqueueing auto build"
        );
        self.queue.enqueue(target.id, BuildTrigger::Auto)?;
        Ok(())
    }
}
