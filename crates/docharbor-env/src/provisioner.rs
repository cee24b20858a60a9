//! Provisioner trait and request types

use std::path::PathBuf;

use async_trait::async_trait;
use docharbor_core::{BuildLog, EnvManager};

use crate::error::Result;

/// One environment-provisioning request
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    /// Checked-out source tree the dependencies are read from
    pub src_dir: PathBuf,
    /// Directory the environment is created in; recreated from scratch
    pub env_dir: PathBuf,
    /// Backend selected for this build (target override or global default)
    pub backend: EnvManager,
    /// Extras names the operator explicitly configured for the repository
    pub operator_extras: Vec<String>,
}

/// A provisioned environment ready to run the documentation generator
#[derive(Debug, Clone)]
pub struct ProvisionedEnv {
    /// Directory containing the environment's executables
    pub bin_dir: PathBuf,
}

impl ProvisionedEnv {
    /// Path of an executable inside the environment
    pub fn executable(&self, name: &str) -> PathBuf {
        if cfg!(windows) {
            self.bin_dir.join(format!("{name}.exe"))
        } else {
            self.bin_dir.join(name)
        }
    }
}

/// Environment provisioning behind a trait so orchestration can be
/// tested with mock backends.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Create a fresh environment in `env_dir`, install the
    /// documentation generator, the project, and the selected extras,
    /// appending all tool output to the build log.
    async fn provision(&self, req: &ProvisionRequest, log: &mut BuildLog) -> Result<ProvisionedEnv>;
}
