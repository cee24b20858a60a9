//! Configuration management for Docharbor
//!
//! Settings are read from `DOCHARBOR_*` environment variables (the
//! surrounding process owns the env file itself). Handles `${VAR}`
//! expansion inside the data-directory value, validation, and creation
//! of the on-disk directory skeleton.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use docharbor_core::EnvManager;
use regex::Regex;
use thiserror::Error;

const ENV_PREFIX: &str = "DOCHARBOR_";

/// Configuration error
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value} ({reason})")]
    Invalid { name: String, value: String, reason: String },

    #[error("environment variable not found: {name}")]
    MissingEnvVar { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main settings structure
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of all workspaces, logs, artifacts, and the database
    pub data_dir: PathBuf,

    /// Number of concurrent build workers; fixed for the process lifetime
    pub build_workers: usize,

    /// Timeout applied to each git invocation
    pub git_timeout: Duration,

    /// Timeout applied to the documentation generator
    pub doc_build_timeout: Duration,

    /// Default environment-manager backend (targets may override)
    pub env_manager: EnvManager,

    /// Interpreter version used by the pinned backend when neither the
    /// manifest nor a version file names one
    pub default_python_version: Option<String>,

    /// Delay between auto-build monitor sweeps
    pub auto_build_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".docharbor"),
            build_workers: 5,
            git_timeout: Duration::from_secs(120),
            doc_build_timeout: Duration::from_secs(600),
            env_manager: EnvManager::Uv,
            default_python_version: None,
            auto_build_interval: Duration::from_secs(60),
        }
    }
}

impl Settings {
    /// Load settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Settings::default();

        if let Some(dir) = get_var(&get, "DATA_DIR") {
            settings.data_dir = expand_path(Path::new(&dir), &get)?;
        }
        if let Some(raw) = get_var(&get, "BUILD_WORKERS") {
            settings.build_workers = parse_number(&raw, "BUILD_WORKERS")?;
        }
        if let Some(raw) = get_var(&get, "GIT_TIMEOUT_SECS") {
            settings.git_timeout = Duration::from_secs(parse_number(&raw, "GIT_TIMEOUT_SECS")?);
        }
        if let Some(raw) = get_var(&get, "DOC_BUILD_TIMEOUT_SECS") {
            settings.doc_build_timeout =
                Duration::from_secs(parse_number(&raw, "DOC_BUILD_TIMEOUT_SECS")?);
        }
        if let Some(raw) = get_var(&get, "ENV_MANAGER") {
            settings.env_manager =
                EnvManager::from_str(&raw).map_err(|_| ConfigError::Invalid {
                    name: "ENV_MANAGER".to_string(),
                    value: raw,
                    reason: "expected uv or pyenv".to_string(),
                })?;
        }
        if let Some(version) = get_var(&get, "DEFAULT_PYTHON_VERSION") {
            if !version.is_empty() {
                settings.default_python_version = Some(version);
            }
        }
        if let Some(raw) = get_var(&get, "AUTO_BUILD_INTERVAL_SECS") {
            settings.auto_build_interval =
                Duration::from_secs(parse_number(&raw, "AUTO_BUILD_INTERVAL_SECS")?);
        }

        settings.validate()?;
        Ok(settings)
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        if self.build_workers == 0 {
            return Err(ConfigError::Invalid {
                name: "BUILD_WORKERS".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.auto_build_interval < Duration::from_secs(10) {
            return Err(ConfigError::Invalid {
                name: "AUTO_BUILD_INTERVAL_SECS".to_string(),
                value: self.auto_build_interval.as_secs().to_string(),
                reason: "must be at least 10 seconds".to_string(),
            });
        }
        if self.git_timeout.is_zero() || self.doc_build_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "timeouts".to_string(),
                value: "0".to_string(),
                reason: "timeouts must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// SQLite database path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("docharbor.db")
    }

    /// Root of per-target workspaces and logs
    pub fn repos_dir(&self) -> PathBuf {
        self.data_dir.join("repos")
    }

    /// Root of published artifacts
    pub fn artifacts_dir(&self) -> PathBuf {
        self.data_dir.join("artifacts")
    }

    /// Create all filesystem directories required by the service
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.repos_dir())?;
        std::fs::create_dir_all(self.artifacts_dir())?;
        Ok(())
    }
}

fn get_var(get: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    get(&format!("{ENV_PREFIX}{name}")).filter(|v| !v.trim().is_empty())
}

fn parse_number<T: FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name: name.to_string(),
        value: raw.to_string(),
        reason: "expected a positive integer".to_string(),
    })
}

/// Expand `${VAR}` and `$VAR` references in a path
fn expand_path(path: &Path, get: &impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    let path_str = path.to_string_lossy();
    let env_var_re =
        Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("Invalid regex");

    let mut result = path_str.to_string();
    for cap in env_var_re.captures_iter(&path_str) {
        let var_name = cap.get(1).or_else(|| cap.get(2)).unwrap().as_str();
        let var_value = get(var_name).ok_or_else(|| ConfigError::MissingEnvVar {
            name: var_name.to_string(),
        })?;
        result = result.replace(&cap[0], &var_value);
    }

    Ok(PathBuf::from(result))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_env_is_empty() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings.build_workers, 5);
        assert_eq!(settings.git_timeout, Duration::from_secs(120));
        assert_eq!(settings.doc_build_timeout, Duration::from_secs(600));
        assert_eq!(settings.env_manager, EnvManager::Uv);
        assert_eq!(settings.auto_build_interval, Duration::from_secs(60));
    }

    #[test]
    fn env_overrides_are_honored() {
        let settings = Settings::from_lookup(lookup(&[
            ("DOCHARBOR_DATA_DIR", "/srv/docharbor"),
            ("DOCHARBOR_BUILD_WORKERS", "2"),
            ("DOCHARBOR_ENV_MANAGER", "pyenv"),
            ("DOCHARBOR_DEFAULT_PYTHON_VERSION", "3.12"),
            ("DOCHARBOR_AUTO_BUILD_INTERVAL_SECS", "300"),
        ]))
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/srv/docharbor"));
        assert_eq!(settings.build_workers, 2);
        assert_eq!(settings.env_manager, EnvManager::Pyenv);
        assert_eq!(settings.default_python_version.as_deref(), Some("3.12"));
        assert_eq!(settings.auto_build_interval, Duration::from_secs(300));
    }

    #[test]
    fn data_dir_expands_variables() {
        let settings = Settings::from_lookup(lookup(&[
            ("DOCHARBOR_DATA_DIR", "${HOME_BASE}/docs"),
            ("HOME_BASE", "/var/lib"),
        ]))
        .unwrap();
        assert_eq!(settings.data_dir, PathBuf::from("/var/lib/docs"));
    }

    #[test]
    fn unknown_expansion_variable_is_an_error() {
        let err = Settings::from_lookup(lookup(&[("DOCHARBOR_DATA_DIR", "${NOPE}/docs")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar { .. }));
    }

    #[test]
    fn zero_workers_rejected() {
        let err =
            Settings::from_lookup(lookup(&[("DOCHARBOR_BUILD_WORKERS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn short_interval_rejected() {
        let err = Settings::from_lookup(lookup(&[("DOCHARBOR_AUTO_BUILD_INTERVAL_SECS", "5")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn derived_paths_hang_off_data_dir() {
        let mut settings = Settings::default();
        settings.data_dir = PathBuf::from("/srv/dh");
        assert_eq!(settings.database_path(), PathBuf::from("/srv/dh/docharbor.db"));
        assert_eq!(settings.repos_dir(), PathBuf::from("/srv/dh/repos"));
        assert_eq!(settings.artifacts_dir(), PathBuf::from("/srv/dh/artifacts"));
    }

    #[test]
    fn ensure_dirs_creates_skeleton() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.data_dir = tmp.path().join("data");
        settings.ensure_dirs().unwrap();
        assert!(settings.repos_dir().is_dir());
        assert!(settings.artifacts_dir().is_dir());
    }
}
