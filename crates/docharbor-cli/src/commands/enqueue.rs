//! Enqueue and cancel command implementations

use color_eyre::eyre::Result;
use docharbor_core::BuildTrigger;

/// Enqueue command implementation
pub struct EnqueueCommand {
    target_id: i64,
}

impl EnqueueCommand {
    pub fn new(target_id: i64) -> Self {
        Self { target_id }
    }

    pub async fn execute(&self) -> Result<()> {
        let (_settings, store) = super::open_store()?;
        let job = store.enqueue_build(self.target_id, BuildTrigger::Manual)?;
        println!("✓ Build {} queued for target {}", job.id, self.target_id);
        println!("  a running `docharbor serve` will pick it up");
        Ok(())
    }
}

/// Cancel command implementation.
///
/// Only queued builds can be cancelled from here; a running build is
/// owned by the serve process and stops at its next step boundary only
/// when signalled in-process.
pub struct CancelCommand {
    build_id: i64,
}

impl CancelCommand {
    pub fn new(build_id: i64) -> Self {
        Self { build_id }
    }

    pub async fn execute(&self) -> Result<()> {
        let (_settings, store) = super::open_store()?;
        if store.cancel_queued(self.build_id)? {
            println!("✓ Build {} cancelled", self.build_id);
        } else {
            let job = store.build(self.build_id)?;
            println!("Build {} is {} and was not cancelled", self.build_id, job.status);
        }
        Ok(())
    }
}
