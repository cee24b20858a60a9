//! Tracked targets: the unit of build scheduling

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of git ref a target follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Branch,
    Tag,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::Tag => write!(f, "tag"),
        }
    }
}

impl FromStr for RefKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branch" => Ok(Self::Branch),
            "tag" => Ok(Self::Tag),
            other => Err(Error::invalid_value("ref kind", other)),
        }
    }
}

impl RefKind {
    /// Full refspec for this kind, e.g. `refs/heads/main`
    pub fn refspec(&self, ref_name: &str) -> String {
        match self {
            Self::Branch => format!("refs/heads/{ref_name}"),
            Self::Tag => format!("refs/tags/{ref_name}"),
        }
    }
}

/// Environment-manager backend used to provision a build environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvManager {
    /// Fast single-invocation resolver
    Uv,
    /// Interpreter-pinning toolchain plus a conventional virtualenv
    Pyenv,
}

impl Default for EnvManager {
    fn default() -> Self {
        Self::Uv
    }
}

impl fmt::Display for EnvManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uv => write!(f, "uv"),
            Self::Pyenv => write!(f, "pyenv"),
        }
    }
}

impl FromStr for EnvManager {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uv" => Ok(Self::Uv),
            "pyenv" => Ok(Self::Pyenv),
            other => Err(Error::invalid_value("environment manager", other)),
        }
    }
}

/// Derive a URL-safe slug from a ref name.
///
/// Matches the published artifact paths: `release/1.2` becomes
/// `release-1.2`. Uniqueness per repository is enforced by the store,
/// which falls back to a kind-prefixed slug on collision.
pub fn slugify(ref_name: &str) -> String {
    ref_name.replace(['/', ' '], "-")
}

/// A tracked `(repository, ref)` pair
#[derive(Debug, Clone)]
pub struct TrackedTarget {
    pub id: i64,
    pub repository_id: i64,
    pub ref_kind: RefKind,
    pub ref_name: String,
    pub slug: String,
    pub auto_build: bool,
    /// Backend override; `None` inherits the configured default
    pub env_manager: Option<EnvManager>,
    pub last_built_commit: Option<String>,
    pub latest_successful_build_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to track a new target
#[derive(Debug, Clone)]
pub struct NewTarget {
    pub repository_id: i64,
    pub ref_kind: RefKind,
    pub ref_name: String,
    pub auto_build: bool,
    pub env_manager: Option<EnvManager>,
}

impl NewTarget {
    pub fn new(repository_id: i64, ref_kind: RefKind, ref_name: impl Into<String>) -> Self {
        Self {
            repository_id,
            ref_kind,
            ref_name: ref_name.into(),
            auto_build: true,
            env_manager: None,
        }
    }
}
