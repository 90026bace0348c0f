//! Spindrift CLI - Command-line interface
//!
//! Runs the API server or performs a one-shot stream request.

mod commands;

use clap::Parser;
use spindrift_core::tracing_setup::{CliLogLevel, init_tracing};

#[derive(Parser)]
#[command(name = "spindrift")]
#[command(about = "Stream torrents through a public tunnel URL")]
struct Cli {
    /// Console log level
    #[arg(long, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_level.as_tracing_level(), None)?;
    commands::handle_command(cli.command).await
}
