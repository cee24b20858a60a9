//! Command implementations

mod clean;
mod enqueue;
mod repos;
mod serve;
mod status;
mod targets;
mod validate;

use std::sync::Arc;

use color_eyre::eyre::{Result, WrapErr};
use docharbor_config::Settings;
use docharbor_store::Store;

pub use clean::CleanCommand;
pub use enqueue::{CancelCommand, EnqueueCommand};
pub use repos::RepoCommands;
pub use serve::ServeCommand;
pub use status::StatusCommand;
pub use targets::TargetCommands;
pub use validate::ValidateCommand;

/// Load settings and open the store, the shared preamble of most
/// commands.
pub(crate) fn open_store() -> Result<(Settings, Arc<Store>)> {
    let settings = Settings::from_env().wrap_err("loading settings from the environment")?;
    settings.ensure_dirs().wrap_err("creating data directories")?;
    let store = Store::open(&settings.database_path()).wrap_err("opening the database")?;
    Ok((settings, Arc::new(store)))
}
