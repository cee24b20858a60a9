//! Tracked-target administration commands

use clap::Subcommand;
use color_eyre::eyre::Result;
use docharbor_core::{EnvManager, NewTarget, RefKind};
use docharbor_git::{GitCli, GitClient};

#[derive(Subcommand, Debug)]
pub enum TargetCommands {
    /// Track a branch or tag of a repository
    Add {
        /// Repository the target belongs to
        #[arg(long, value_name = "ID")]
        repo: i64,

        /// Ref kind: branch or tag
        #[arg(long, value_name = "KIND", default_value = "branch")]
        kind: String,

        /// Ref name, e.g. main or v1.2
        #[arg(long, value_name = "NAME")]
        name: String,

        /// Do not rebuild automatically when the ref advances
        #[arg(long)]
        no_auto: bool,

        /// Environment-manager override: uv or pyenv
        #[arg(long, value_name = "MANAGER")]
        env_manager: Option<String>,

        /// Verify against the remote's refs before tracking
        #[arg(long)]
        check_remote: bool,
    },

    /// List tracked targets of a repository
    List {
        /// Repository to list
        #[arg(long, value_name = "ID")]
        repo: i64,
    },
}

impl TargetCommands {
    pub async fn execute(self) -> Result<()> {
        let (settings, store) = super::open_store()?;
        match self {
            Self::Add { repo, kind, name, no_auto, env_manager, check_remote } => {
                let ref_kind = kind.parse::<RefKind>()?;

                if check_remote {
                    let repository = store.repository(repo)?;
                    let git = GitCli::new(settings.git_timeout);
                    let known = git
                        .list_remote_refs(
                            &repository.url,
                            ref_kind,
                            &repository.auth(),
                            repository.verify_tls,
                        )
                        .await?;
                    if !known.iter().any(|r| r == &name) {
                        println!("✗ Remote has no {ref_kind} named {name}");
                        println!("  known: {}", known.join(", "));
                        return Ok(());
                    }
                }

                let mut new = NewTarget::new(repo, ref_kind, name);
                new.auto_build = !no_auto;
                new.env_manager =
                    env_manager.as_deref().map(str::parse::<EnvManager>).transpose()?;
                let target = store.create_target(&new)?;
                println!(
                    "✓ Tracking {} {} as target #{} (slug {})",
                    target.ref_kind, target.ref_name, target.id, target.slug
                );
            }
            Self::List { repo } => {
                let targets = store.targets_for_repository(repo)?;
                if targets.is_empty() {
                    println!("No targets tracked for repository {repo}");
                    return Ok(());
                }
                for target in targets {
                    let auto = if target.auto_build { "auto" } else { "manual" };
                    let manager = target
                        .env_manager
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "inherit".to_string());
                    let last = target.last_built_commit.as_deref().unwrap_or("never built");
                    println!(
                        "#{:<4} {:<6} {:<20} slug={:<16} {:<6} env={:<7} last={}",
                        target.id, target.ref_kind, target.ref_name, target.slug, auto, manager,
                        last
                    );
                }
            }
        }
        Ok(())
    }
}
