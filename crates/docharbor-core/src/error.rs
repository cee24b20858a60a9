//! Error types for the core library

use thiserror::Error;

/// Core error type for docharbor operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Child process error
    #[error(transparent)]
    Process(#[from] crate::process::ProcessError),

    /// A persisted or user-supplied value did not parse into its enum
    #[error("invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: String },
}

/// Result type alias for docharbor operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn invalid_value(what: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue { what, value: value.into() }
    }
}
