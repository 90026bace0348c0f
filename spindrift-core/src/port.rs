//! Local port allocation
//!
//! Ports are chosen by the OS (bind to port 0) rather than by sequential
//! guessing, and a shared reservation table keeps a port owned by a live
//! session from being handed to a second concurrent request.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;

/// Attempts before giving up when the OS keeps returning reserved ports.
const MAX_ALLOCATION_ATTEMPTS: usize = 16;

/// Errors from port allocation.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("failed to bind an ephemeral port: {reason}")]
    Bind { reason: String },

    #[error("no unreserved port after {attempts} attempts")]
    Exhausted { attempts: usize },
}

/// Shared table of ports currently owned by a request or live session.
///
/// Cloned between the allocator and the session registry so a session's
/// port stays reserved until the session is shut down.
#[derive(Debug, Clone, Default)]
pub struct PortReservations {
    inner: Arc<Mutex<HashSet<u16>>>,
}

impl PortReservations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve `port`. Returns false if it was already reserved.
    pub fn reserve(&self, port: u16) -> bool {
        self.inner.lock().expect("reservations lock").insert(port)
    }

    /// Release `port` back for future allocation.
    pub fn release(&self, port: u16) {
        self.inner.lock().expect("reservations lock").remove(&port);
    }

    /// Whether `port` is currently reserved.
    pub fn is_reserved(&self, port: u16) -> bool {
        self.inner.lock().expect("reservations lock").contains(&port)
    }
}

/// An OS-allocated local port, reserved for one request.
///
/// The reservation is released on drop unless ownership is handed off to a
/// longer-lived session via [`AllocatedPort::hand_off`].
#[derive(Debug)]
pub struct AllocatedPort {
    port: u16,
    reservations: PortReservations,
    handed_off: bool,
}

impl AllocatedPort {
    /// The port number.
    pub fn get(&self) -> u16 {
        self.port
    }

    /// Transfer reservation ownership to the caller.
    ///
    /// The port stays reserved; the new owner must eventually call
    /// [`PortReservations::release`].
    pub fn hand_off(mut self) -> u16 {
        self.handed_off = true;
        self.port
    }
}

impl Drop for AllocatedPort {
    fn drop(&mut self) {
        if !self.handed_off {
            self.reservations.release(self.port);
        }
    }
}

/// Allocates free local ports for stream sessions.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    reservations: PortReservations,
}

impl PortAllocator {
    pub fn new(reservations: PortReservations) -> Self {
        Self { reservations }
    }

    /// Obtain a currently free, unreserved local port.
    ///
    /// Binds to port 0 so the OS picks the port, then records it in the
    /// reservation table. Retries a bounded number of times if the OS hands
    /// back a port still reserved by a live session.
    ///
    /// # Errors
    /// - `PortError::Bind` - the OS refused to bind any port
    /// - `PortError::Exhausted` - every attempt returned a reserved port
    pub async fn allocate(&self) -> Result<AllocatedPort, PortError> {
        for _ in 0..MAX_ALLOCATION_ATTEMPTS {
            let addr = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
            let listener = TcpListener::bind(addr).await.map_err(|e| PortError::Bind {
                reason: e.to_string(),
            })?;
            let port = listener
                .local_addr()
                .map_err(|e| PortError::Bind {
                    reason: e.to_string(),
                })?
                .port();
            // Close the listener before the child process binds the port
            drop(listener);

            if self.reservations.reserve(port) {
                tracing::debug!("Allocated port {}", port);
                return Ok(AllocatedPort {
                    port,
                    reservations: self.reservations.clone(),
                    handed_off: false,
                });
            }
        }

        Err(PortError::Exhausted {
            attempts: MAX_ALLOCATION_ATTEMPTS,
        })
    }
}
