//! Strata CLI - operator tool for the tiered memory subsystem

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use strata::Config;
use strata_cli::commands::{ConfigCommand, ContextCommand, MigrateCommand, ReportCommand};
use strata_cli::error::CliResult;
use strata_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Strata CLI - migrate legacy memory and inspect assembled context")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Migrate a legacy export into the tiers")]
    Migrate(MigrateCommand),

    #[clap(about = "Assemble context for a query")]
    Context(ContextCommand),

    #[clap(about = "Show a saved migration report")]
    Report(ReportCommand),

    #[clap(about = "Print the effective configuration")]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    init_logging();

    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Migrate(cmd) => cmd.execute(config, format).await,
        Command::Context(cmd) => cmd.execute(config, format).await,
        Command::Report(cmd) => cmd.execute(format).await,
        Command::Config(cmd) => cmd.execute(&config, format).await,
    }
}

// Logs go to stderr so `--json` output stays parseable.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
