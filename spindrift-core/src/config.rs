//! Centralized configuration for Spindrift.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use std::time::Duration;

/// Central configuration for all Spindrift components.
///
/// Groups related settings into logical sections and supports environment
/// variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SpindriftConfig {
    pub streamer: StreamerConfig,
    pub tunnel: TunnelConfig,
    pub orchestrator: OrchestratorConfig,
    pub server: ServerConfig,
}

/// Configuration for the external torrent-streaming engine.
///
/// The engine is expected to serve the torrent's primary content over HTTP
/// on the port passed via `--port`.
#[derive(Debug, Clone)]
pub struct StreamerConfig {
    /// Executable name or path of the streaming engine
    pub executable: String,
    /// Extra arguments inserted before the magnet link
    pub extra_args: Vec<String>,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            executable: "peerflix".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Configuration for the external tunnel provider.
///
/// The provider is expected to print the public URL somewhere in its
/// standard output shortly after startup.
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Executable name or path of the tunnel provider
    pub executable: String,
    /// Extra arguments inserted before `--port`
    pub extra_args: Vec<String>,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            executable: "lt".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Per-request orchestration parameters.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long to wait for the tunnel to report its public URL
    pub url_deadline: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            url_deadline: Duration::from_secs(10),
        }
    }
}

/// HTTP API server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind the API server to
    pub host: String,
    /// Port to bind the API server to
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl SpindriftConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via `SPINDRIFT_*` environment variables
    /// while maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(executable) = std::env::var("SPINDRIFT_STREAMER_BIN") {
            config.streamer.executable = executable;
        }

        if let Ok(executable) = std::env::var("SPINDRIFT_TUNNEL_BIN") {
            config.tunnel.executable = executable;
        }

        if let Ok(deadline) = std::env::var("SPINDRIFT_URL_DEADLINE_SECS") {
            if let Ok(seconds) = deadline.parse::<u64>() {
                config.orchestrator.url_deadline = Duration::from_secs(seconds);
            }
        }

        if let Ok(host) = std::env::var("SPINDRIFT_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("SPINDRIFT_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = port;
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Uses a short URL deadline so timeout paths complete quickly.
    pub fn for_testing() -> Self {
        Self {
            orchestrator: OrchestratorConfig {
                url_deadline: Duration::from_millis(250),
            },
            ..Default::default()
        }
    }
}
