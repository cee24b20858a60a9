//! Status command implementation

use color_eyre::eyre::Result;

/// Status command implementation
pub struct StatusCommand {
    limit: usize,
}

impl StatusCommand {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub async fn execute(&self) -> Result<()> {
        let (_settings, store) = super::open_store()?;
        let builds = store.recent_builds(self.limit)?;
        if builds.is_empty() {
            println!("No builds yet");
            return Ok(());
        }

        println!(
            "{:>6}  {:>6}  {:<10}  {:<7}  {:<10}  {:>9}  {}",
            "build", "target", "status", "trigger", "commit", "duration", "finished"
        );
        for build in builds {
            let commit = build
                .commit_sha
                .as_deref()
                .map(|sha| sha.chars().take(10).collect::<String>())
                .unwrap_or_else(|| "-".to_string());
            let duration = build
                .duration_secs
                .map(|d| format!("{d:.1}s"))
                .unwrap_or_else(|| "-".to_string());
            let finished = build
                .finished_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string());
            let status = match build.error_kind {
                Some(kind) => format!("{} ({kind})", build.status),
                None => build.status.to_string(),
            };
            println!(
                "{:>6}  {:>6}  {:<10}  {:<7}  {:<10}  {:>9}  {}",
                build.id, build.target_id, status, build.triggered_by, commit, duration, finished
            );
        }
        Ok(())
    }
}
