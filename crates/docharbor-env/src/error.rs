//! Error types for environment provisioning

use docharbor_manifest::ManifestError;
use thiserror::Error;

/// Environment provisioning error; every variant aborts the build
/// with the provision-failed kind.
#[derive(Error, Debug)]
pub enum EnvError {
    #[error("no interpreter version: manifest, version file, and configured default are all silent")]
    NoPythonVersion,

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Process(#[from] docharbor_core::ProcessError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EnvError>;
