//! Git integration for Docharbor
//!
//! This crate drives the `git` command-line client for clones,
//! ref checkouts, and working-tree-free remote lookups, with access
//! material scoped to single invocations.

pub mod auth;
pub mod cli;
pub mod driver;
pub mod error;

pub use auth::{inject_token, redact_url, ScopedAuth};
pub use cli::GitCli;
pub use driver::{CheckoutRequest, CloneRequest, GitClient, RemoteHeadRequest};
pub use error::{GitError, Result};
