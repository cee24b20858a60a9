//! Repository model and access material

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Hosting provider a repository lives on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Gitlab,
    Generic,
}

impl Default for Provider {
    fn default() -> Self {
        Self::Github
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Github => write!(f, "github"),
            Self::Gitlab => write!(f, "gitlab"),
            Self::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(Self::Github),
            "gitlab" => Ok(Self::Gitlab),
            "generic" => Ok(Self::Generic),
            other => Err(Error::invalid_value("provider", other)),
        }
    }
}

/// Access material handed to the git driver for one invocation.
///
/// Credentials are never written into a clone's remote configuration;
/// they live only as long as the child process that needs them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitAuth {
    /// Anonymous HTTPS, or SSH through the ambient agent
    Anonymous,
    /// HTTPS bearer-like token injected into the URL for one call
    Token(String),
    /// Private SSH key written to an ephemeral 0600 file for one call
    DeployKey(String),
}

impl GitAuth {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

/// Project metadata read from a checkout's manifest.
///
/// Propagated onto the repository row only by builds of the designated
/// main target, and only on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: Option<String>,
    pub version: Option<String>,
    pub summary: Option<String>,
    pub homepage: Option<String>,
}

impl ProjectMetadata {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.version.is_none()
            && self.summary.is_none()
            && self.homepage.is_none()
    }
}

/// A registered repository
#[derive(Debug, Clone)]
pub struct Repository {
    pub id: i64,
    pub name: String,
    pub provider: Provider,
    pub url: String,
    /// Docs source subpath inside the checkout
    pub docs_path: String,
    pub auth_token: Option<String>,
    pub deploy_key: Option<String>,
    pub verify_tls: bool,
    pub public: bool,
    /// Extras names the operator explicitly asked to install
    pub install_extras: Vec<String>,
    /// Target whose builds update the project metadata columns
    pub main_target_id: Option<i64>,
    pub project_name: Option<String>,
    pub project_version: Option<String>,
    pub project_summary: Option<String>,
    pub project_homepage: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// Access material for git invocations. A token wins over a deploy
    /// key when both are configured.
    pub fn auth(&self) -> GitAuth {
        if let Some(token) = self.auth_token.as_deref().filter(|t| !t.is_empty()) {
            return GitAuth::Token(token.to_string());
        }
        if let Some(key) = self.deploy_key.as_deref().filter(|k| !k.is_empty()) {
            return GitAuth::DeployKey(key.to_string());
        }
        GitAuth::Anonymous
    }
}

/// Fields required to register a repository
#[derive(Debug, Clone)]
pub struct NewRepository {
    pub name: String,
    pub provider: Provider,
    pub url: String,
    pub docs_path: String,
    pub auth_token: Option<String>,
    pub deploy_key: Option<String>,
    pub verify_tls: bool,
    pub public: bool,
    pub install_extras: Vec<String>,
}

impl NewRepository {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provider: Provider::default(),
            url: url.into(),
            docs_path: "docs".to_string(),
            auth_token: None,
            deploy_key: None,
            verify_tls: true,
            public: false,
            install_extras: Vec::new(),
        }
    }
}
