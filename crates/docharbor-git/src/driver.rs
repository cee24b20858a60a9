//! Git driver trait and request types

use std::path::PathBuf;

use async_trait::async_trait;
use docharbor_core::{BuildLog, GitAuth, RefKind};

use crate::error::Result;

/// Clone a remote into a fresh directory
#[derive(Debug, Clone)]
pub struct CloneRequest {
    pub url: String,
    pub dest: PathBuf,
    pub auth: GitAuth,
    pub verify_tls: bool,
}

/// Fetch one ref explicitly and check out a detached head at it
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub url: String,
    pub dest: PathBuf,
    pub ref_kind: RefKind,
    pub ref_name: String,
    pub auth: GitAuth,
    pub verify_tls: bool,
}

/// Resolve a remote ref to a commit id without a working tree
#[derive(Debug, Clone)]
pub struct RemoteHeadRequest {
    pub url: String,
    pub ref_kind: RefKind,
    pub ref_name: String,
    pub auth: GitAuth,
    pub verify_tls: bool,
}

/// Git operations needed by the executor and the auto-build monitor.
///
/// Implementations run child processes; the trait exists so
/// orchestration can be exercised against mock drivers.
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Clone `url` into `dest`, returning the commit id of the default
    /// branch head. Output is appended to the build log.
    async fn clone_repo(&self, req: &CloneRequest, log: &mut BuildLog) -> Result<String>;

    /// Fetch the requested ref and check out a detached head at it,
    /// returning the resolved commit id.
    async fn checkout(&self, req: &CheckoutRequest, log: &mut BuildLog) -> Result<String>;

    /// Commit id the remote currently has for the ref, or `None` when
    /// the ref does not exist. Never touches a workspace.
    async fn remote_head(&self, req: &RemoteHeadRequest) -> Result<Option<String>>;

    /// Sorted unique branch or tag names present on the remote
    async fn list_remote_refs(
        &self,
        url: &str,
        ref_kind: RefKind,
        auth: &GitAuth,
        verify_tls: bool,
    ) -> Result<Vec<String>>;
}
