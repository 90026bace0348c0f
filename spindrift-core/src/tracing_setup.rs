//! Tracing setup for Spindrift
//!
//! Console output stays at the user-chosen level; a debug log file on disk
//! keeps enough detail to diagnose a failed tunnel session after the fact.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

const LOG_FILE_NAME: &str = "spindrift-last-run.log";

/// Initialize console plus file logging.
///
/// The debug log overwrites the previous run's file in `logs_dir`
/// (defaulting to `logs/`). `RUST_LOG` overrides `console_level` for the
/// console output.
///
/// # Errors
/// - `SpindriftError::Io` - logs directory or log file could not be created
pub fn init_tracing(console_level: Level, logs_dir: Option<&Path>) -> crate::Result<()> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new("logs"));
    create_dir_all(logs_dir)?;
    let log_file_path = logs_dir.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(log_file)
                .with_filter(EnvFilter::new("debug")),
        )
        .init();

    tracing::info!("Debug log: {}", log_file_path.display());
    Ok(())
}

/// Console log level as selected on the command line.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl CliLogLevel {
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

impl std::fmt::Display for CliLogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CliLogLevel::Error => "error",
            CliLogLevel::Warn => "warn",
            CliLogLevel::Info => "info",
            CliLogLevel::Debug => "debug",
            CliLogLevel::Trace => "trace",
        };
        f.write_str(name)
    }
}
