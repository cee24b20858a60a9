//! Clean command implementation

use std::time::Duration;

use color_eyre::eyre::Result;
use docharbor_build::{delete_target_artifacts, prune_logs, purge_repository, Layout};

/// Clean command implementation
pub struct CleanCommand {
    target: Option<i64>,
    purge_repo: Option<i64>,
    logs_older_than_days: Option<u64>,
}

impl CleanCommand {
    pub fn new(
        target: Option<i64>,
        purge_repo: Option<i64>,
        logs_older_than_days: Option<u64>,
    ) -> Self {
        Self { target, purge_repo, logs_older_than_days }
    }

    pub async fn execute(&self) -> Result<()> {
        if self.target.is_none() && self.purge_repo.is_none() && self.logs_older_than_days.is_none()
        {
            println!("Nothing to clean: pass --target, --purge-repo, or --logs-older-than-days");
            return Ok(());
        }

        let (settings, store) = super::open_store()?;
        let layout = Layout::new(settings.data_dir.clone());

        if let Some(target) = self.target {
            delete_target_artifacts(&store, &layout, target)?;
            println!("✓ Artifacts for target {target} removed");
        }

        if let Some(days) = self.logs_older_than_days {
            let removed = prune_logs(&store, Duration::from_secs(days * 24 * 60 * 60))?;
            println!("✓ Removed {removed} expired build logs");
        }

        if let Some(repo) = self.purge_repo {
            purge_repository(&store, &layout, repo)?;
            println!("✓ Repository {repo} purged");
        }

        Ok(())
    }
}
