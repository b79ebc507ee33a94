pub mod cli;
pub mod config;
pub mod core;
pub mod providers;

use anyhow::Result;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Resolve and persist missing month-start prices and rates.
    Fetch,
    /// Valuate the ledger against the caches and write the report.
    Build,
    /// Render the report in the terminal.
    View,
    /// Remove cache files and the report.
    Clean,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("Portfolio tracker starting...");

    let config = match config_path {
        Some(path) => config::AppConfig::load_from_path(path)?,
        None => config::AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    match command {
        AppCommand::Fetch => cli::fetch::run(&config).await,
        AppCommand::Build => cli::build::run(&config),
        AppCommand::View => cli::view::run(&config),
        AppCommand::Clean => cli::clean::run(&config),
    }
}
