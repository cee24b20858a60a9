//! Startup recovery
//!
//! Runs once before the worker pool starts: jobs a previous process
//! left in `running` are failed with the interrupted kind, and every
//! workspace directory still on disk is removed. Queued jobs allocate
//! their workspaces only after being claimed, so anything found under
//! a `workspaces/` directory at boot is an orphan.

use docharbor_store::Store;
use tracing::{info, warn};

use crate::error::Result;
use crate::layout::Layout;

/// What recovery found and cleaned
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Builds transitioned `running` → `failed`
    pub interrupted_builds: Vec<i64>,
    /// Orphan workspace directories removed
    pub removed_workspaces: usize,
}

/// Recover from an unclean shutdown
pub fn recover_on_startup(store: &Store, layout: &Layout) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for job in store.fail_interrupted_builds()? {
        report.interrupted_builds.push(job.id);
    }

    for parent in layout.workspace_parents()? {
        let entries = match std::fs::read_dir(&parent) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %parent.display(), %e, "cannot scan workspace directory");
                continue;
            }
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            match std::fs::remove_dir_all(&path) {
                Ok(()) => {
                    report.removed_workspaces += 1;
                    info!(path = %path.display(), "removed orphan workspace");
                }
                Err(e) => warn!(path = %path.display(), %e, "failed to remove orphan workspace"),
            }
        }
    }

    if !report.interrupted_builds.is_empty() || report.removed_workspaces > 0 {
        info!(
            interrupted = report.interrupted_builds.len(),
            workspaces = report.removed_workspaces,
            "startup recovery complete"
        );
    }
    Ok(report)
}
