//! Core types and traits for Docharbor
//!
//! This crate provides the fundamental data structures and error types
//! used throughout the docharbor project.

pub mod build;
pub mod error;
pub mod process;
pub mod repo;
pub mod target;

pub use build::{BuildJob, BuildStatus, BuildTrigger, FailureKind};
pub use error::{Error, Result};
pub use process::{BuildLog, CapturedOutput, CommandSpec, ProcessError};
pub use repo::{GitAuth, NewRepository, ProjectMetadata, Provider, Repository};
pub use target::{slugify, EnvManager, NewTarget, RefKind, TrackedTarget};
