//! Build job model and status machinery

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Lifecycle status of a build job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildStatus {
    /// Terminal states are immutable except for on-disk cleanup
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

impl FromStr for BuildStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(Error::invalid_value("build status", other)),
        }
    }
}

/// How a build was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildTrigger {
    Manual,
    Auto,
}

impl fmt::Display for BuildTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl FromStr for BuildTrigger {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "auto" => Ok(Self::Auto),
            other => Err(Error::invalid_value("build trigger", other)),
        }
    }
}

/// Stable classification of why a build failed.
///
/// Persisted on the build row and stamped into the log; failures are
/// never retried automatically within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    AuthMaterialInvalid,
    RefNotFound,
    GitTimeout,
    /// Git invocation failed for a reason other than auth, a missing
    /// ref, or a timeout (network outage, corrupt remote, ...)
    GitFailed,
    EnvProvisionFailed,
    DocBuildFailed,
    PublishFailed,
    InterruptedAtStartup,
    /// Orchestration failure outside the pipeline's external tools
    /// (workspace allocation, state persistence)
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AuthMaterialInvalid => "auth_material_invalid",
            Self::RefNotFound => "ref_not_found",
            Self::GitTimeout => "git_timeout",
            Self::GitFailed => "git_failed",
            Self::EnvProvisionFailed => "env_provision_failed",
            Self::DocBuildFailed => "doc_build_failed",
            Self::PublishFailed => "publish_failed",
            Self::InterruptedAtStartup => "interrupted_at_startup",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

impl FromStr for FailureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth_material_invalid" => Ok(Self::AuthMaterialInvalid),
            "ref_not_found" => Ok(Self::RefNotFound),
            "git_timeout" => Ok(Self::GitTimeout),
            "git_failed" => Ok(Self::GitFailed),
            "env_provision_failed" => Ok(Self::EnvProvisionFailed),
            "doc_build_failed" => Ok(Self::DocBuildFailed),
            "publish_failed" => Ok(Self::PublishFailed),
            "interrupted_at_startup" => Ok(Self::InterruptedAtStartup),
            "internal" => Ok(Self::Internal),
            other => Err(Error::invalid_value("failure kind", other)),
        }
    }
}

/// One build job row
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub id: i64,
    pub repository_id: i64,
    pub target_id: i64,
    pub status: BuildStatus,
    pub triggered_by: BuildTrigger,
    /// Commit the build resolved to (set after clone, refined by checkout)
    pub commit_sha: Option<String>,
    pub error_kind: Option<FailureKind>,
    pub workspace_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub artifact_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_secs: Option<f64>,
}
