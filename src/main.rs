use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use folio::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for folio::AppCommand {
    fn from(cmd: Commands) -> folio::AppCommand {
        match cmd {
            Commands::Fetch => folio::AppCommand::Fetch,
            Commands::Build => folio::AppCommand::Build,
            Commands::View => folio::AppCommand::View,
            Commands::Clean => folio::AppCommand::Clean,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Fetch missing month-start prices and exchange rates into the caches
    Fetch,
    /// Build the monthly valuation report from the ledger and caches
    Build,
    /// Display the valuation report as a table
    View,
    /// Remove cache files and the report
    Clean,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => folio::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> anyhow::Result<()> {
    use anyhow::Context;

    let path = folio::config::AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let default_config = r#"---
# Transactions ledger (CSV with a header row):
# ticker,purchase_date,quantity,price,transaction_fees[,currency]
ledger: "my-tickers.csv"

# Currency in which portfolio value is reported
currency: "USD"

providers:
  yahoo:
    base_url: "https://query1.finance.yahoo.com"
"#;

    std::fs::write(&path, default_config)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}
