use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use ratekeeper::core::log::init_logging;

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

impl From<Commands> for ratekeeper::AppCommand {
    fn from(cmd: Commands) -> ratekeeper::AppCommand {
        match cmd {
            Commands::Rate => ratekeeper::AppCommand::Rate,
            Commands::Serve => ratekeeper::AppCommand::Serve,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Print the current exchange rate
    Rate,
    /// Serve the exchange rate over HTTP
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => ratekeeper::cli::setup::setup_at_path(path),
            None => ratekeeper::cli::setup::setup(),
        },
        Some(cmd) => ratekeeper::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
