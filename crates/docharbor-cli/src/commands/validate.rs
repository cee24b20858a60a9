//! Validate command implementation

use std::time::Duration;

use color_eyre::eyre::Result;
use docharbor_config::Settings;
use docharbor_core::process::run_captured;
use docharbor_core::{CommandSpec, EnvManager};

/// Validate command implementation: settings sanity plus PATH checks
/// for the external tools the pipeline shells out to.
pub struct ValidateCommand;

impl ValidateCommand {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self) -> Result<()> {
        let settings = Settings::from_env()?;
        println!("✓ Settings loaded");
        println!("  data dir: {}", settings.data_dir.display());
        println!("  workers: {}", settings.build_workers);
        println!("  env manager: {}", settings.env_manager);
        println!("  git timeout: {}s", settings.git_timeout.as_secs());
        println!("  doc build timeout: {}s", settings.doc_build_timeout.as_secs());
        println!("  auto-build interval: {}s", settings.auto_build_interval.as_secs());

        let mut ok = true;
        ok &= check_tool("git", &["--version"]).await;
        match settings.env_manager {
            EnvManager::Uv => ok &= check_tool("uv", &["--version"]).await,
            EnvManager::Pyenv => {
                ok &= check_tool("pyenv", &["--version"]).await;
                if settings.default_python_version.is_none() {
                    println!(
                        "  note: pyenv backend with no default interpreter; projects must \
                         declare a version"
                    );
                }
            }
        }

        if ok {
            println!("✓ All required tools found");
            Ok(())
        } else {
            println!("✗ Some required tools are missing from PATH");
            std::process::exit(1);
        }
    }
}

async fn check_tool(program: &str, args: &[&str]) -> bool {
    let spec = CommandSpec::new(program)
        .args(args.iter().copied())
        .timeout(Duration::from_secs(10));
    match run_captured(&spec).await {
        Ok(out) if out.success() => {
            println!("  found {}: {}", program, out.stdout.lines().next().unwrap_or("").trim());
            true
        }
        Ok(out) => {
            println!("  ✗ {program} exited with status {}", out.code);
            false
        }
        Err(e) => {
            println!("  ✗ {program} not usable: {e}");
            false
        }
    }
}
