//! Repository administration commands

use clap::Subcommand;
use color_eyre::eyre::Result;
use docharbor_core::{NewRepository, Provider};

#[derive(Subcommand, Debug)]
pub enum RepoCommands {
    /// Register a repository
    Add {
        /// Display name
        name: String,

        /// Clone URL (https or ssh)
        url: String,

        /// Hosting provider
        #[arg(long, value_name = "PROVIDER", default_value = "github")]
        provider: String,

        /// Docs source subpath inside the checkout
        #[arg(long, value_name = "PATH", default_value = "docs")]
        docs_path: String,

        /// HTTPS access token for private clones
        #[arg(long, value_name = "TOKEN")]
        auth_token: Option<String>,

        /// Read the SSH deploy key from this file
        #[arg(long, value_name = "FILE")]
        deploy_key_file: Option<std::path::PathBuf>,

        /// Disable TLS verification for this repository
        #[arg(long)]
        no_verify_tls: bool,

        /// Mark the published documentation as public
        #[arg(long)]
        public: bool,

        /// Extras names to install beyond the dev/docs defaults
        #[arg(long, value_name = "NAME")]
        extra: Vec<String>,
    },

    /// List registered repositories
    List,

    /// Designate the target whose builds update project metadata
    SetMain {
        /// Repository to update
        #[arg(long, value_name = "ID")]
        repo: i64,

        /// Main target; omit to clear the designation
        #[arg(long, value_name = "ID")]
        target: Option<i64>,
    },
}

impl RepoCommands {
    pub async fn execute(self) -> Result<()> {
        let (_settings, store) = super::open_store()?;
        match self {
            Self::Add {
                name,
                url,
                provider,
                docs_path,
                auth_token,
                deploy_key_file,
                no_verify_tls,
                public,
                extra,
            } => {
                let deploy_key = match deploy_key_file {
                    Some(path) => Some(std::fs::read_to_string(path)?),
                    None => None,
                };
                let new = NewRepository {
                    name,
                    provider: provider.parse::<Provider>()?,
                    url,
                    docs_path,
                    auth_token,
                    deploy_key,
                    verify_tls: !no_verify_tls,
                    public,
                    install_extras: extra,
                };
                let repo = store.create_repository(&new)?;
                println!("✓ Repository {} registered as #{}", repo.name, repo.id);
            }
            Self::List => {
                let repos = store.list_repositories()?;
                if repos.is_empty() {
                    println!("No repositories registered");
                    return Ok(());
                }
                for repo in repos {
                    let version = repo.project_version.as_deref().unwrap_or("-");
                    println!(
                        "#{:<4} {:<20} {:<9} {} (docs: {}, version: {})",
                        repo.id, repo.name, repo.provider, repo.url, repo.docs_path, version
                    );
                }
            }
            Self::SetMain { repo, target } => {
                store.set_main_target(repo, target)?;
                match target {
                    Some(target) => println!("✓ Target {target} is now the main target"),
                    None => println!("✓ Main target cleared"),
                }
            }
        }
        Ok(())
    }
}
