//! Per-build dependency environments for Docharbor
//!
//! Two backends behind one trait: `uv` creates and populates a
//! self-contained environment in a single resolver invocation; `pyenv`
//! pins an interpreter version first and installs with pip into a
//! conventional virtualenv.

pub mod cli;
pub mod error;
pub mod provisioner;

pub use cli::CliProvisioner;
pub use error::{EnvError, Result};
pub use provisioner::{ProvisionRequest, ProvisionedEnv, Provisioner};
