//! Stream request orchestration
//!
//! One request: validate the magnet link, allocate a port, launch the
//! streaming engine and the tunnel against it, then race the tunnel's URL
//! announcement against a fixed deadline. Exactly one outcome is produced;
//! no error escapes past [`StreamOrchestrator::handle`].

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::config::SpindriftConfig;
use crate::launcher::{self, TunnelError};
use crate::magnet;
use crate::port::{PortAllocator, PortReservations};
use crate::process::{ManagedProcess, ProcessSpawner};
use crate::registry::SessionRegistry;

/// A streaming request as received from the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    pub magnet: String,
}

/// Why a stream request failed.
///
/// Every failure is recovered into this taxonomy at the orchestrator
/// boundary; callers map it onto their own error surface.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("invalid input: {reason}")]
    InvalidMagnet { reason: String },

    #[error("allocation error: {reason}")]
    PortAllocation { reason: String },

    #[error("failed to launch '{command}': {reason}")]
    Launch { command: String, reason: String },

    #[error("tunnel did not report a URL in time")]
    UrlTimeout { diagnostic: String },

    #[error("tunnel exited before reporting a URL")]
    TunnelRejected { diagnostic: String },
}

impl StreamError {
    /// Diagnostic text accumulated from the tunnel's stderr, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            StreamError::UrlTimeout { diagnostic } | StreamError::TunnelRejected { diagnostic } => {
                (!diagnostic.is_empty()).then_some(diagnostic.as_str())
            }
            _ => None,
        }
    }

    /// Whether the failure is the caller's fault (malformed input).
    pub fn is_user_error(&self) -> bool {
        matches!(self, StreamError::InvalidMagnet { .. })
    }
}

/// Result of one stream request. Produced exactly once per request.
#[derive(Debug)]
pub enum StreamOutcome {
    /// The tunnel reported a public URL; the stream is live.
    Success { url: String },
    /// The request failed; diagnostic detail is on the error.
    Failure { error: StreamError },
}

impl StreamOutcome {
    /// The public URL, if the request succeeded.
    pub fn url(&self) -> Option<&str> {
        match self {
            StreamOutcome::Success { url } => Some(url),
            StreamOutcome::Failure { .. } => None,
        }
    }
}

/// Coordinates one stream request end to end.
///
/// Stateless between requests apart from the port reservation table and the
/// session registry; concurrent requests are fully independent.
pub struct StreamOrchestrator {
    config: SpindriftConfig,
    spawner: Arc<dyn ProcessSpawner>,
    allocator: PortAllocator,
    registry: SessionRegistry,
}

impl StreamOrchestrator {
    pub fn new(config: SpindriftConfig, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let reservations = PortReservations::new();
        Self {
            config,
            spawner,
            allocator: PortAllocator::new(reservations.clone()),
            registry: SessionRegistry::new(reservations),
        }
    }

    /// Registry of live sessions started by this orchestrator.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Handle one stream request.
    ///
    /// Never returns an error and never blocks past the configured
    /// deadline: every internal failure becomes a `Failure` outcome.
    pub async fn handle(&self, request: &StreamRequest) -> StreamOutcome {
        match self.try_handle(request).await {
            Ok(url) => StreamOutcome::Success { url },
            Err(error) => {
                tracing::warn!("Stream request failed: {}", error);
                StreamOutcome::Failure { error }
            }
        }
    }

    async fn try_handle(&self, request: &StreamRequest) -> Result<String, StreamError> {
        // 1. Validation, before any side effect
        magnet::parse(&request.magnet).map_err(|e| StreamError::InvalidMagnet {
            reason: e.to_string(),
        })?;

        // 2. Port allocation; the reservation is dropped automatically on
        //    every failure path below
        let port = self
            .allocator
            .allocate()
            .await
            .map_err(|e| StreamError::PortAllocation {
                reason: e.to_string(),
            })?;

        // 3. Launch both processes before any waiting begins
        let mut streamer = launcher::launch_streamer(
            self.spawner.as_ref(),
            &self.config.streamer,
            &request.magnet,
            port.get(),
        )
        .await
        .map_err(|e| StreamError::Launch {
            command: self.config.streamer.executable.clone(),
            reason: e.to_string(),
        })?;

        // The streamer's output is never scanned; drain it so it cannot
        // wedge on a full pipe while seeding the stream
        let _ = streamer.drain_to_log();

        let mut tunnel =
            match launcher::launch_tunnel(self.spawner.as_ref(), &self.config.tunnel, port.get())
                .await
            {
                Ok(tunnel) => tunnel,
                Err(e) => {
                    terminate_quietly(&mut streamer).await;
                    return Err(StreamError::Launch {
                        command: self.config.tunnel.executable.clone(),
                        reason: e.to_string(),
                    });
                }
            };

        // 4. Race URL extraction against the deadline. The diagnostic
        //    buffer is shared so the timeout path still sees stderr text
        //    accumulated by the dropped extraction future.
        let diagnostic = Arc::new(Mutex::new(String::new()));
        let wait = launcher::await_public_url(&mut tunnel, diagnostic.clone());

        match tokio::time::timeout(self.config.orchestrator.url_deadline, wait).await {
            Ok(Ok(url)) => {
                // 5. Success: the processes outlive this request under the
                //    registry's ownership
                self.registry
                    .register(port, url.clone(), streamer, tunnel)
                    .await;
                Ok(url)
            }
            Ok(Err(TunnelError::Exited { diagnostic })) => {
                terminate_quietly(&mut streamer).await;
                terminate_quietly(&mut tunnel).await;
                Err(StreamError::TunnelRejected { diagnostic })
            }
            Err(_elapsed) => {
                terminate_quietly(&mut streamer).await;
                terminate_quietly(&mut tunnel).await;
                let diagnostic = diagnostic.lock().expect("diagnostic lock").clone();
                Err(StreamError::UrlTimeout { diagnostic })
            }
        }
    }
}

/// Best-effort teardown on a failure path.
async fn terminate_quietly(process: &mut ManagedProcess) {
    if let Err(e) = process.terminate().await {
        tracing::warn!("Failed to terminate '{}': {}", process.command(), e);
    }
}
