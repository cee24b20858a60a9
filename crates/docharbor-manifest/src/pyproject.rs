//! pyproject.toml parsing

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use docharbor_core::ProjectMetadata;
use serde::Deserialize;
use thiserror::Error;

/// Manifest parsing errors
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("I/O error reading manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Default, Deserialize)]
struct RawPyProject {
    project: Option<RawProject>,
    tool: Option<RawTool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProject {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(rename = "requires-python")]
    requires_python: Option<String>,
    urls: Option<BTreeMap<String, String>>,
    #[serde(rename = "optional-dependencies")]
    optional_dependencies: Option<BTreeMap<String, toml::Value>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTool {
    poetry: Option<RawPoetry>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPoetry {
    extras: Option<BTreeMap<String, toml::Value>>,
    group: Option<BTreeMap<String, toml::Value>>,
}

/// A parsed project manifest
#[derive(Debug)]
pub struct Manifest {
    raw: RawPyProject,
}

impl Manifest {
    /// Load `pyproject.toml` from a checkout root; `None` when absent
    pub fn load(checkout_root: &Path) -> Result<Option<Self>, ManifestError> {
        let path = checkout_root.join("pyproject.toml");
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)?;
        Ok(Some(Self::parse(&text)?))
    }

    /// Parse manifest text
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        Ok(Self { raw: toml::from_str(text)? })
    }

    /// Union of extras names across the three declaration sources:
    /// PEP 621 optional-dependencies, the legacy poetry extras table,
    /// and poetry dependency groups (one extras name per group).
    pub fn discovered_extras(&self) -> BTreeSet<String> {
        let mut extras = BTreeSet::new();
        if let Some(project) = &self.raw.project {
            if let Some(optional) = &project.optional_dependencies {
                extras.extend(optional.keys().cloned());
            }
        }
        if let Some(poetry) = self.raw.tool.as_ref().and_then(|t| t.poetry.as_ref()) {
            if let Some(legacy) = &poetry.extras {
                extras.extend(legacy.keys().cloned());
            }
            if let Some(groups) = &poetry.group {
                extras.extend(groups.keys().cloned());
            }
        }
        extras
    }

    /// Project metadata for the repository row
    pub fn metadata(&self) -> ProjectMetadata {
        let Some(project) = &self.raw.project else {
            return ProjectMetadata::default();
        };
        let homepage = project.urls.as_ref().and_then(|urls| {
            urls.get("Homepage").or_else(|| urls.get("homepage")).cloned()
        });
        ProjectMetadata {
            name: project.name.clone(),
            version: project.version.clone(),
            summary: project.description.clone(),
            homepage,
        }
    }

    /// Lowest interpreter version acceptable to `requires-python`.
    ///
    /// Only lower-bound and exact specifiers name a concrete version;
    /// a constraint made of upper bounds alone yields `None`.
    pub fn python_version_floor(&self) -> Option<String> {
        let constraint = self
            .raw
            .project
            .as_ref()
            .and_then(|p| p.requires_python.as_deref())?;
        for clause in constraint.split(',') {
            let clause = clause.trim();
            let version = clause
                .strip_prefix(">=")
                .or_else(|| clause.strip_prefix("=="))
                .or_else(|| clause.strip_prefix("~="));
            if let Some(version) = version {
                let version = version.trim().trim_end_matches(".*");
                if !version.is_empty() && version.starts_with(|c: char| c.is_ascii_digit()) {
                    return Some(version.to_string());
                }
            }
        }
        None
    }
}
