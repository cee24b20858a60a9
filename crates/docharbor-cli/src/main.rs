//! Main CLI entry point for Docharbor

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

mod commands;

/// Docharbor - continuously built documentation for tracked git refs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the build service: startup recovery, worker pool, monitor
    Serve,

    /// Queue a build for a tracked target
    Enqueue {
        /// Target to build
        #[arg(long, value_name = "ID")]
        target: i64,
    },

    /// Cancel a build that is still queued
    Cancel {
        /// Build to cancel
        #[arg(long, value_name = "ID")]
        build: i64,
    },

    /// Show recent builds
    Status {
        /// How many builds to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Manage repositories
    #[command(subcommand)]
    Repo(commands::RepoCommands),

    /// Manage tracked targets
    #[command(subcommand)]
    Target(commands::TargetCommands),

    /// Remove artifacts, old logs, or whole repositories
    Clean {
        /// Delete the published artifacts of one target
        #[arg(long, value_name = "ID")]
        target: Option<i64>,

        /// Purge a repository with everything derived from it
        #[arg(long, value_name = "ID")]
        purge_repo: Option<i64>,

        /// Delete build logs older than this many days
        #[arg(long, value_name = "DAYS")]
        logs_older_than_days: Option<u64>,
    },

    /// Check settings and external tool availability
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet)?;

    let result = match cli.command {
        Commands::Serve => commands::ServeCommand::new().execute().await,
        Commands::Enqueue { target } => commands::EnqueueCommand::new(target).execute().await,
        Commands::Cancel { build } => commands::CancelCommand::new(build).execute().await,
        Commands::Status { limit } => commands::StatusCommand::new(limit).execute().await,
        Commands::Repo(cmd) => cmd.execute().await,
        Commands::Target(cmd) => cmd.execute().await,
        Commands::Clean { target, purge_repo, logs_older_than_days } => {
            commands::CleanCommand::new(target, purge_repo, logs_older_than_days)
                .execute()
                .await
        }
        Commands::Validate => commands::ValidateCommand::new().execute().await,
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

fn setup_logging(verbose: u8, quiet: u8) -> Result<()> {
    let log_level = match (verbose, quiet) {
        (0, 0) => "info",
        (1, 0) => "debug",
        (v, 0) if v >= 2 => "trace",
        (0, 1) => "warn",
        (0, 2) => "error",
        (0, q) if q > 2 => "off",
        _ => "info",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}
