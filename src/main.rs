use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fxrate::cli::setup::setup;
use fxrate::core::log::init_logging;

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

impl From<Commands> for fxrate::AppCommand {
    fn from(cmd: Commands) -> fxrate::AppCommand {
        match cmd {
            Commands::Rate { from, to } => fxrate::AppCommand::Rate { from, to },
            Commands::Convert { amount, from, to } => {
                fxrate::AppCommand::Convert { amount, from, to }
            }
            Commands::Refresh { secret } => fxrate::AppCommand::Refresh { secret },
            Commands::Rates => fxrate::AppCommand::Rates,
            Commands::Set { from, to, rate } => fxrate::AppCommand::Set { from, to, rate },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Resolve the exchange rate between two currencies
    Rate { from: String, to: String },
    /// Convert an amount from one currency to another
    Convert {
        amount: f64,
        from: String,
        to: String,
    },
    /// Refresh every tracked pair from the provider
    Refresh {
        /// Shared refresh secret; a `Bearer <token>` value is also accepted
        #[arg(short, long, env = "FXRATE_REFRESH_SECRET")]
        secret: String,
    },
    /// List stored rate records
    Rates,
    /// Store a manual rate (and its inverse)
    Set { from: String, to: String, rate: f64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => fxrate::run_command(cmd.into(), cli.config_path.as_deref()).await,
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
