//! Build orchestration for Docharbor
//!
//! This crate coordinates documentation builds end to end: the worker
//! pool consuming the persistent queue, the per-job executor pipeline,
//! the auto-build monitor, and the publication store with its atomic
//! artifact swaps.

pub mod error;
pub mod executor;
pub mod inject;
pub mod layout;
pub mod locks;
pub mod maintenance;
pub mod monitor;
pub mod publish;
pub mod queue;
pub mod recovery;

pub use error::{BuildError, Result};
pub use executor::{BuildExecutor, CancelFlag, ExecutorConfig};
pub use inject::{inject_navigation, NavContext};
pub use layout::{Layout, Workspace};
pub use locks::PublishLocks;
pub use maintenance::{delete_target_artifacts, prune_logs, purge_repository};
pub use monitor::{AutoBuildMonitor, MonitorConfig};
pub use publish::{Publisher, RefEntry, RefsIndex};
pub use queue::{BuildQueue, CancelOutcome, QueueConfig};
pub use recovery::{recover_on_startup, RecoveryReport};
