//! Session registry
//!
//! Successful requests hand their process pair to the registry so the
//! stream outlives the HTTP response with a tracked owner. Every session
//! stays stoppable: by port, or all at once on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::port::{AllocatedPort, PortReservations};
use crate::process::ManagedProcess;

/// A live stream: one streaming engine plus one tunnel, keyed by port.
struct StreamSession {
    public_url: String,
    started_at: Instant,
    streamer: ManagedProcess,
    tunnel: ManagedProcess,
}

/// Snapshot of an active session for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub port: u16,
    pub url: String,
    pub uptime_seconds: u64,
}

/// Tracks live stream sessions and owns their process teardown.
///
/// Shares the port reservation table with the allocator so a session's port
/// is never reallocated while its processes are running.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<u16, StreamSession>>>,
    reservations: PortReservations,
}

impl SessionRegistry {
    pub fn new(reservations: PortReservations) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            reservations,
        }
    }

    /// Take ownership of a successful request's processes.
    ///
    /// The port reservation transfers to the registry and is held until the
    /// session is shut down.
    pub async fn register(
        &self,
        port: AllocatedPort,
        public_url: String,
        mut streamer: ManagedProcess,
        mut tunnel: ManagedProcess,
    ) {
        let port = port.hand_off();
        tracing::info!("Registered stream session on port {} at {}", port, public_url);

        // Nothing reads a registered session's output anymore; keep both
        // children from blocking on full pipes for the session's lifetime.
        let _ = streamer.drain_to_log();
        let _ = tunnel.drain_to_log();

        self.sessions.write().await.insert(
            port,
            StreamSession {
                public_url,
                started_at: Instant::now(),
                streamer,
                tunnel,
            },
        );
    }

    /// Snapshot of all active sessions.
    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(port, session)| SessionInfo {
                port: *port,
                url: session.public_url.clone(),
                uptime_seconds: session.started_at.elapsed().as_secs(),
            })
            .collect()
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Terminate the session on `port` and release its reservation.
    ///
    /// Returns false if no session is registered on that port.
    pub async fn shutdown(&self, port: u16) -> bool {
        let Some(mut session) = self.sessions.write().await.remove(&port) else {
            return false;
        };

        tracing::info!("Shutting down stream session on port {}", port);
        if let Err(e) = session.streamer.terminate().await {
            tracing::warn!("Failed to terminate streamer on port {}: {}", port, e);
        }
        if let Err(e) = session.tunnel.terminate().await {
            tracing::warn!("Failed to terminate tunnel on port {}: {}", port, e);
        }
        self.reservations.release(port);
        true
    }

    /// Terminate every active session.
    pub async fn shutdown_all(&self) {
        let ports: Vec<u16> = self.sessions.read().await.keys().copied().collect();
        for port in ports {
            self.shutdown(port).await;
        }
    }
}
