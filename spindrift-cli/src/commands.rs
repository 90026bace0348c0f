//! CLI command implementations

use std::sync::Arc;

use anyhow::bail;
use clap::Subcommand;
use spindrift_core::config::SpindriftConfig;
use spindrift_core::mode::RuntimeMode;
use spindrift_core::orchestrator::{StreamOrchestrator, StreamOutcome, StreamRequest};
use spindrift_core::process::{ProcessSpawner, ScriptedSpawner, TokioProcessSpawner};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the JSON API server
    Serve {
        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Runtime mode: production or development
        #[arg(long, default_value_t = RuntimeMode::Production)]
        mode: RuntimeMode,
    },
    /// Request a public streaming URL for one magnet link and print it
    Stream {
        /// Magnet link to stream
        magnet: String,
        /// Runtime mode: production or development
        #[arg(long, default_value_t = RuntimeMode::Production)]
        mode: RuntimeMode,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns an error if the server fails to start or the stream request
/// does not produce a URL.
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve { host, port, mode } => serve(host, port, mode).await,
        Commands::Stream { magnet, mode } => stream_once(magnet, mode).await,
    }
}

/// Run the API server until interrupted.
async fn serve(host: Option<String>, port: Option<u16>, mode: RuntimeMode) -> anyhow::Result<()> {
    let mut config = SpindriftConfig::from_env();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    println!("Starting Spindrift API server...");
    println!("URL: http://{}:{}", config.server.host, config.server.port);
    println!("Mode: {mode}");
    println!("Press Ctrl+C to stop the server");

    spindrift_web::run_server(config, mode)
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))
}

/// Run a single stream request from the command line.
///
/// Prints the public URL on success. The spawned processes keep streaming
/// until this process exits.
async fn stream_once(magnet: String, mode: RuntimeMode) -> anyhow::Result<()> {
    let config = SpindriftConfig::from_env();
    let spawner: Arc<dyn ProcessSpawner> = match mode {
        RuntimeMode::Production => Arc::new(TokioProcessSpawner),
        RuntimeMode::Development => Arc::new(ScriptedSpawner::development(&config)),
    };
    let orchestrator = StreamOrchestrator::new(config, spawner);

    match orchestrator.handle(&StreamRequest { magnet }).await {
        StreamOutcome::Success { url } => {
            println!("{url}");
            println!("Streaming continues while this process runs; press Ctrl+C to stop.");
            let _ = tokio::signal::ctrl_c().await;
            orchestrator.registry().shutdown_all().await;
            Ok(())
        }
        StreamOutcome::Failure { error } => {
            if let Some(details) = error.diagnostic() {
                eprintln!("{details}");
            }
            bail!("{error}")
        }
    }
}
