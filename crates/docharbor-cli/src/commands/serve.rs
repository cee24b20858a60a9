//! Serve command implementation

use std::sync::Arc;

use color_eyre::eyre::Result;
use docharbor_build::{
    recover_on_startup, AutoBuildMonitor, BuildExecutor, BuildQueue, ExecutorConfig, Layout,
    MonitorConfig, PublishLocks, QueueConfig,
};
use docharbor_env::{CliProvisioner, Provisioner};
use docharbor_git::{GitCli, GitClient};
use tracing::info;

/// Serve command implementation
pub struct ServeCommand;

impl ServeCommand {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self) -> Result<()> {
        let (settings, store) = super::open_store()?;
        let layout = Layout::new(settings.data_dir.clone());

        // Fail interrupted builds and sweep orphan workspaces before
        // any worker can claim a job.
        let report = recover_on_startup(&store, &layout)?;
        if !report.interrupted_builds.is_empty() {
            info!(
                builds = ?report.interrupted_builds,
                "recovered builds interrupted by the previous shutdown"
            );
        }

        let git: Arc<dyn GitClient> = Arc::new(GitCli::new(settings.git_timeout));
        let provisioner: Arc<dyn Provisioner> =
            Arc::new(CliProvisioner::new(settings.default_python_version.clone()));

        let executor = Arc::new(BuildExecutor::new(
            Arc::clone(&store),
            Arc::clone(&git),
            provisioner,
            layout,
            PublishLocks::new(),
            ExecutorConfig {
                doc_build_timeout: settings.doc_build_timeout,
                default_env_manager: settings.env_manager,
            },
        ));

        let queue = BuildQueue::new(
            Arc::clone(&store),
            executor,
            QueueConfig { workers: settings.build_workers, ..QueueConfig::default() },
        );
        queue.start();

        let monitor = AutoBuildMonitor::new(
            store,
            git,
            Arc::clone(&queue),
            MonitorConfig { interval: settings.auto_build_interval },
        );
        let monitor_handle = monitor.spawn(queue.shutdown_signal());

        println!("docharbor serving builds from {}", settings.data_dir.display());
        info!(workers = settings.build_workers, "service ready");

        tokio::signal::ctrl_c().await?;
        info!("shutdown requested");

        queue.shutdown().await;
        let _ = monitor_handle.await;
        println!("✓ Shut down cleanly");
        Ok(())
    }
}
