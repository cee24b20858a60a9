//! Error types for the git driver

use docharbor_core::{FailureKind, ProcessError};
use thiserror::Error;

/// Git driver error
#[derive(Error, Debug)]
pub enum GitError {
    /// The invocation exceeded the configured timeout and was killed
    #[error("git {operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// The remote has no such ref
    #[error("remote has no ref {refspec}")]
    RefNotFound { refspec: String },

    /// The remote rejected the supplied access material
    #[error("authentication rejected: {detail}")]
    AuthRejected { detail: String },

    /// git exited non-zero for some other reason
    #[error("git {operation} failed with status {code}")]
    CommandFailed { operation: String, code: i32 },

    /// Spawning git or touching the filesystem failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GitError>;

impl GitError {
    /// Stable kind persisted on a failed build row
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::GitTimeout,
            Self::RefNotFound { .. } => FailureKind::RefNotFound,
            Self::AuthRejected { .. } => FailureKind::AuthMaterialInvalid,
            Self::CommandFailed { .. } | Self::Io(_) => FailureKind::GitFailed,
        }
    }

    pub(crate) fn from_process(operation: &str, err: ProcessError) -> Self {
        match err {
            ProcessError::Timeout { secs, .. } => {
                Self::Timeout { operation: operation.to_string(), secs }
            }
            ProcessError::ExitStatus { code, .. } => {
                Self::CommandFailed { operation: operation.to_string(), code }
            }
            ProcessError::Spawn { source, .. } => Self::Io(source),
            ProcessError::Io(source) => Self::Io(source),
        }
    }
}
