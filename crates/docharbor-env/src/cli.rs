//! uv / pyenv provisioning over their command-line tools

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use docharbor_core::process::run_logged;
use docharbor_core::{BuildLog, CommandSpec, EnvManager};
use docharbor_manifest::{requirements_fallback, select_install_extras, Manifest};
use tracing::{debug, info};

use crate::error::{EnvError, Result};
use crate::provisioner::{ProvisionRequest, ProvisionedEnv, Provisioner};

/// Provisioner that shells out to `uv` or `pyenv`+`pip`
pub struct CliProvisioner {
    /// Interpreter version the pinned backend falls back to
    pub default_python_version: Option<String>,
}

impl CliProvisioner {
    pub fn new(default_python_version: Option<String>) -> Self {
        Self { default_python_version }
    }

    /// Interpreter version for the pinned backend, in priority order:
    /// manifest constraint, version file at the checkout root, then
    /// the configured default.
    fn resolve_python_version(
        &self,
        src_dir: &Path,
        manifest: Option<&Manifest>,
    ) -> Result<String> {
        if let Some(floor) = manifest.and_then(|m| m.python_version_floor()) {
            return Ok(floor);
        }
        let version_file = src_dir.join(".python-version");
        if version_file.is_file() {
            let text = std::fs::read_to_string(&version_file)?;
            if let Some(line) = text.lines().next().map(str::trim).filter(|l| !l.is_empty()) {
                return Ok(line.to_string());
            }
        }
        self.default_python_version.clone().ok_or(EnvError::NoPythonVersion)
    }

    async fn provision_uv(
        &self,
        req: &ProvisionRequest,
        install: &InstallPlan,
        log: &mut BuildLog,
    ) -> Result<ProvisionedEnv> {
        let env_dir = req.env_dir.display().to_string();
        run_logged(&CommandSpec::new("uv").args(["venv", env_dir.as_str()]), log).await?;

        let env = ProvisionedEnv { bin_dir: bin_dir(&req.env_dir) };
        let python = env.executable("python").display().to_string();

        let mut spec = CommandSpec::new("uv")
            .args(["pip", "install", "--python", python.as_str()])
            .args(install.specs.iter().cloned())
            .cwd(&req.src_dir);
        for (k, v) in &install.pip_args_tail {
            spec = spec.args([k.clone(), v.clone()]);
        }
        run_logged(&spec, log).await?;
        Ok(env)
    }

    async fn provision_pyenv(
        &self,
        req: &ProvisionRequest,
        install: &InstallPlan,
        manifest: Option<&Manifest>,
        log: &mut BuildLog,
    ) -> Result<ProvisionedEnv> {
        let version = self.resolve_python_version(&req.src_dir, manifest)?;
        debug!(%version, "ensuring pyenv interpreter");
        run_logged(&CommandSpec::new("pyenv").args(["install", "-s", version.as_str()]), log)
            .await?;

        let env_dir = req.env_dir.display().to_string();
        run_logged(
            &CommandSpec::new("pyenv")
                .args(["exec", "python", "-m", "venv", env_dir.as_str()])
                .env("PYENV_VERSION", version.as_str()),
            log,
        )
        .await?;

        let env = ProvisionedEnv { bin_dir: bin_dir(&req.env_dir) };
        let python = env.executable("python").display().to_string();

        let mut spec = CommandSpec::new(python)
            .args(["-m", "pip", "install"])
            .args(install.specs.iter().cloned())
            .cwd(&req.src_dir);
        for (k, v) in &install.pip_args_tail {
            spec = spec.args([k.clone(), v.clone()]);
        }
        run_logged(&spec, log).await?;
        Ok(env)
    }
}

#[async_trait]
impl Provisioner for CliProvisioner {
    async fn provision(&self, req: &ProvisionRequest, log: &mut BuildLog) -> Result<ProvisionedEnv> {
        // Environments are never reused across jobs.
        if req.env_dir.exists() {
            std::fs::remove_dir_all(&req.env_dir)?;
        }
        if let Some(parent) = req.env_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manifest = Manifest::load(&req.src_dir)?;
        let install = InstallPlan::for_checkout(&req.src_dir, manifest.as_ref(), &req.operator_extras);
        log.append_line(&format!(
            "provisioning {} environment with: {}",
            req.backend,
            install.describe()
        ))?;

        let env = match req.backend {
            EnvManager::Uv => self.provision_uv(req, &install, log).await?,
            EnvManager::Pyenv => {
                self.provision_pyenv(req, &install, manifest.as_ref(), log).await?
            }
        };
        info!(backend = %req.backend, env = %req.env_dir.display(), "environment provisioned");
        Ok(env)
    }
}

fn bin_dir(env_dir: &Path) -> PathBuf {
    if cfg!(windows) {
        env_dir.join("Scripts")
    } else {
        env_dir.join("bin")
    }
}

/// What a single installer invocation should install
#[derive(Debug, Clone, PartialEq, Eq)]
struct InstallPlan {
    /// Requirement specs (always starts with the doc generator)
    specs: Vec<String>,
    /// Trailing `-r <file>` pairs
    pip_args_tail: Vec<(String, String)>,
}

impl InstallPlan {
    fn for_checkout(
        src_dir: &Path,
        manifest: Option<&Manifest>,
        operator_extras: &[String],
    ) -> Self {
        let mut specs = vec!["sphinx".to_string()];
        let mut pip_args_tail = Vec::new();

        match manifest {
            Some(manifest) => {
                let extras = select_install_extras(&manifest.discovered_extras(), operator_extras);
                specs.push(project_install_spec(&extras));
            }
            None => {
                if has_legacy_build_files(src_dir) {
                    specs.push(".".to_string());
                }
                if let Some(req_file) = requirements_fallback(src_dir) {
                    pip_args_tail
                        .push(("-r".to_string(), req_file.display().to_string()));
                }
            }
        }

        Self { specs, pip_args_tail }
    }

    fn describe(&self) -> String {
        let mut parts = self.specs.clone();
        for (flag, value) in &self.pip_args_tail {
            parts.push(format!("{flag} {value}"));
        }
        parts.join(" ")
    }
}

/// Install spec for the project itself, with extras when selected
fn project_install_spec(extras: &[String]) -> String {
    if extras.is_empty() {
        ".".to_string()
    } else {
        format!(".[{}]", extras.join(","))
    }
}

fn has_legacy_build_files(src_dir: &Path) -> bool {
    src_dir.join("setup.py").is_file() || src_dir.join("setup.cfg").is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn project_spec_with_and_without_extras() {
        assert_eq!(project_install_spec(&[]), ".");
        assert_eq!(
            project_install_spec(&["dev".to_string(), "docs".to_string()]),
            ".[dev,docs]"
        );
    }

    #[test]
    fn plan_prefers_manifest_extras() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::parse(
            "[project]\nname = \"w\"\n[project.optional-dependencies]\ndocs = []\ntest = []\n",
        )
        .unwrap();
        let plan = InstallPlan::for_checkout(tmp.path(), Some(&manifest), &[]);
        assert_eq!(plan.specs, vec!["sphinx", ".[docs]"]);
        assert!(plan.pip_args_tail.is_empty());
    }

    #[test]
    fn plan_falls_back_to_requirements_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("requirements.txt"), "sphinx\n").unwrap();
        let plan = InstallPlan::for_checkout(tmp.path(), None, &[]);
        assert_eq!(plan.specs, vec!["sphinx"]);
        assert_eq!(
            plan.pip_args_tail,
            vec![("-r".to_string(), tmp.path().join("requirements.txt").display().to_string())]
        );
    }

    #[test]
    fn plan_installs_legacy_projects() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("setup.py"), "from setuptools import setup\n").unwrap();
        let plan = InstallPlan::for_checkout(tmp.path(), None, &[]);
        assert_eq!(plan.specs, vec!["sphinx", "."]);
    }

    #[test]
    fn python_version_prefers_manifest_floor() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".python-version"), "3.9.1\n").unwrap();
        let manifest =
            Manifest::parse("[project]\nname = \"w\"\nrequires-python = \">=3.11\"\n").unwrap();

        let provisioner = CliProvisioner::new(Some("3.8".to_string()));
        let version = provisioner.resolve_python_version(tmp.path(), Some(&manifest)).unwrap();
        assert_eq!(version, "3.11");
    }

    #[test]
    fn python_version_reads_version_file() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".python-version"), "3.9.1\nignored\n").unwrap();

        let provisioner = CliProvisioner::new(Some("3.8".to_string()));
        let version = provisioner.resolve_python_version(tmp.path(), None).unwrap();
        assert_eq!(version, "3.9.1");
    }

    #[test]
    fn python_version_falls_back_to_default() {
        let tmp = TempDir::new().unwrap();
        let provisioner = CliProvisioner::new(Some("3.12".to_string()));
        assert_eq!(provisioner.resolve_python_version(tmp.path(), None).unwrap(), "3.12");
    }

    #[test]
    fn python_version_missing_everywhere_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let provisioner = CliProvisioner::new(None);
        let err = provisioner.resolve_python_version(tmp.path(), None).unwrap_err();
        assert!(matches!(err, EnvError::NoPythonVersion));
    }

    #[test]
    fn executable_paths_live_in_bin() {
        let env = ProvisionedEnv { bin_dir: bin_dir(Path::new("/w/env")) };
        if cfg!(windows) {
            assert!(env.executable("python").ends_with("python.exe"));
        } else {
            assert_eq!(env.executable("sphinx-build"), PathBuf::from("/w/env/bin/sphinx-build"));
        }
    }
}
