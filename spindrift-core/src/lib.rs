//! Spindrift Core - magnet-to-public-URL stream orchestration
//!
//! This crate provides the building blocks for turning a magnet link into a
//! publicly reachable streaming URL: port allocation, external process
//! supervision, tunnel output scanning, and the per-request orchestrator
//! that ties them together.

pub mod config;
pub mod launcher;
pub mod magnet;
pub mod mode;
pub mod orchestrator;
pub mod port;
pub mod process;
pub mod registry;
pub mod scanner;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SpindriftConfig;
pub use magnet::MagnetError;
pub use mode::RuntimeMode;
pub use orchestrator::{StreamError, StreamOrchestrator, StreamOutcome, StreamRequest};
pub use port::PortError;
pub use process::ProcessError;
pub use registry::SessionRegistry;

/// Core errors that can bubble up from any Spindrift subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SpindriftError {
    #[error("Magnet error: {0}")]
    Magnet(#[from] MagnetError),

    #[error("Port error: {0}")]
    Port(#[from] PortError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpindriftError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SpindriftError::Magnet(e) => format!("Invalid magnet link: {e}"),
            SpindriftError::Port(_) => "No local port could be allocated".to_string(),
            SpindriftError::Process(_) => "A helper process failed".to_string(),
            SpindriftError::Configuration { reason } => {
                format!("Configuration error: {reason}")
            }
            SpindriftError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(self, SpindriftError::Magnet(_))
    }
}

pub type Result<T> = std::result::Result<T, SpindriftError>;
