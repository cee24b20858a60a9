//! Error types for build orchestration

use docharbor_core::FailureKind;
use docharbor_env::EnvError;
use docharbor_git::GitError;
use docharbor_store::StoreError;
use thiserror::Error;

/// Build orchestration error
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("environment provisioning failed: {0}")]
    Env(#[from] EnvError),

    #[error("documentation build failed: {reason}")]
    DocBuild { reason: String },

    #[error("publication failed: {reason}")]
    Publish { reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("build cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    pub fn doc_build(reason: impl Into<String>) -> Self {
        Self::DocBuild { reason: reason.into() }
    }

    pub fn publish(reason: impl Into<String>) -> Self {
        Self::Publish { reason: reason.into() }
    }

    /// Kind recorded on the failed build row; `None` for cancellation,
    /// which is its own terminal status rather than a failure.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Git(e) => Some(e.failure_kind()),
            Self::Env(_) => Some(FailureKind::EnvProvisionFailed),
            Self::DocBuild { .. } => Some(FailureKind::DocBuildFailed),
            Self::Publish { .. } => Some(FailureKind::PublishFailed),
            Self::Store(_) | Self::Io(_) => Some(FailureKind::Internal),
            Self::Cancelled => None,
        }
    }
}
