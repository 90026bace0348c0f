//! Launchers for the streaming engine and tunnel provider
//!
//! Both external programs are spawned through the process supervisor with
//! explicit argument vectors. The streamer is fire-and-forget: readiness is
//! inferred through the tunnel becoming reachable, never verified directly.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{StreamerConfig, TunnelConfig};
use crate::process::{ManagedProcess, ProcessError, ProcessSpawner};
use crate::scanner::UrlScanner;

/// Errors while waiting for the tunnel's public URL.
#[derive(Debug, thiserror::Error)]
pub enum TunnelError {
    #[error("tunnel exited before reporting a URL")]
    Exited { diagnostic: String },
}

/// Grace period for stderr chunks still in flight after stdout closes.
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// Quiet period after which a URL candidate at the end of the output is
/// accepted as complete.
///
/// A tunnel that prints its URL without a trailing newline and then goes
/// silent would otherwise hold the candidate back until the deadline.
const URL_SETTLE_GRACE: Duration = Duration::from_millis(50);

/// Spawn the streaming engine serving `magnet` over HTTP on `port`.
///
/// No readiness handshake is performed; only the spawn itself can fail.
///
/// # Errors
/// - `ProcessError::SpawnFailed` - executable missing or not runnable
pub async fn launch_streamer(
    spawner: &dyn ProcessSpawner,
    config: &StreamerConfig,
    magnet: &str,
    port: u16,
) -> Result<ManagedProcess, ProcessError> {
    let mut args = config.extra_args.clone();
    args.push(magnet.to_string());
    args.push("--port".to_string());
    args.push(port.to_string());

    tracing::info!("Launching streaming engine '{}' on port {}", config.executable, port);
    spawner.spawn(&config.executable, &args).await
}

/// Spawn the tunnel provider exposing local `port` publicly.
///
/// # Errors
/// - `ProcessError::SpawnFailed` - executable missing or not runnable
pub async fn launch_tunnel(
    spawner: &dyn ProcessSpawner,
    config: &TunnelConfig,
    port: u16,
) -> Result<ManagedProcess, ProcessError> {
    let mut args = config.extra_args.clone();
    args.push("--port".to_string());
    args.push(port.to_string());

    tracing::info!("Launching tunnel provider '{}' for port {}", config.executable, port);
    spawner.spawn(&config.executable, &args).await
}

/// Wait for the tunnel to announce its public URL.
///
/// Scans stdout chunks in arrival order for the first URL-shaped token
/// while accumulating stderr into `diagnostic`. The diagnostic buffer is
/// shared so the caller still sees it when this future is dropped at the
/// deadline.
///
/// # Errors
/// - `TunnelError::Exited` - stdout closed before any URL appeared; carries
///   the accumulated stderr text
pub async fn await_public_url(
    process: &mut ManagedProcess,
    diagnostic: Arc<Mutex<String>>,
) -> Result<String, TunnelError> {
    let mut scanner = UrlScanner::new();
    let mut stderr_open = true;

    loop {
        // A candidate at the buffer end only grows if more output follows;
        // accept it once the tunnel stays quiet for the grace period
        if scanner.has_pending() {
            match tokio::time::timeout(URL_SETTLE_GRACE, process.stdout.recv()).await {
                Ok(Some(bytes)) => {
                    if let Some(url) = scanner.push(&bytes) {
                        tracing::info!("Tunnel reported public URL: {}", url);
                        return Ok(url);
                    }
                }
                Ok(None) => return stream_closed(process, &mut scanner, &diagnostic).await,
                Err(_quiet) => {
                    if let Some(url) = scanner.flush() {
                        tracing::info!("Tunnel reported public URL: {}", url);
                        return Ok(url);
                    }
                }
            }
            continue;
        }

        tokio::select! {
            chunk = process.stdout.recv() => match chunk {
                Some(bytes) => {
                    if let Some(url) = scanner.push(&bytes) {
                        tracing::info!("Tunnel reported public URL: {}", url);
                        return Ok(url);
                    }
                }
                None => return stream_closed(process, &mut scanner, &diagnostic).await,
            },
            chunk = process.stderr.recv(), if stderr_open => match chunk {
                Some(bytes) => {
                    diagnostic
                        .lock()
                        .expect("diagnostic lock")
                        .push_str(&String::from_utf8_lossy(&bytes));
                }
                None => stderr_open = false,
            },
        }
    }
}

/// Resolve the wait after stdout closed: a URL at the very end of the
/// output still counts, otherwise the exit is reported with whatever
/// stderr accumulated.
async fn stream_closed(
    process: &mut ManagedProcess,
    scanner: &mut UrlScanner,
    diagnostic: &Arc<Mutex<String>>,
) -> Result<String, TunnelError> {
    if let Some(url) = scanner.flush() {
        tracing::info!("Tunnel reported public URL: {}", url);
        return Ok(url);
    }
    drain_stderr(process, diagnostic).await;
    let text = diagnostic.lock().expect("diagnostic lock").clone();
    Err(TunnelError::Exited { diagnostic: text })
}

/// Collect stderr chunks still in flight after the tunnel exited.
async fn drain_stderr(process: &mut ManagedProcess, diagnostic: &Arc<Mutex<String>>) {
    while let Ok(Some(bytes)) =
        tokio::time::timeout(STDERR_DRAIN_TIMEOUT, process.stderr.recv()).await
    {
        diagnostic
            .lock()
            .expect("diagnostic lock")
            .push_str(&String::from_utf8_lossy(&bytes));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{ProcessScript, ScriptedSpawner};

    fn tunnel_config(executable: &str) -> TunnelConfig {
        TunnelConfig {
            executable: executable.to_string(),
            extra_args: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_await_url_resolves_first_match() {
        let spawner = ScriptedSpawner::new().with_script(
            "fake-tunnel",
            ProcessScript::new()
                .stdout_chunk(Duration::ZERO, "starting...\n")
                .stdout_chunk(
                    Duration::from_millis(5),
                    "your url is https://abc123.example.com\n",
                )
                .stdout_chunk(Duration::from_millis(5), "https://ignored.example.com\n"),
        );

        let mut process = launch_tunnel(&spawner, &tunnel_config("fake-tunnel"), 9000)
            .await
            .unwrap();
        let diagnostic = Arc::new(Mutex::new(String::new()));

        let url = await_public_url(&mut process, diagnostic).await.unwrap();
        assert_eq!(url, "https://abc123.example.com");
    }

    #[tokio::test]
    async fn test_await_url_accepts_trailing_token_once_quiet() {
        // URL printed without a trailing newline; the tunnel stays alive
        // and silent afterwards
        let spawner = ScriptedSpawner::new().with_script(
            "fake-tunnel",
            ProcessScript::new()
                .stdout_chunk(Duration::ZERO, "your url is https://tail.example.com"),
        );

        let mut process = launch_tunnel(&spawner, &tunnel_config("fake-tunnel"), 9000)
            .await
            .unwrap();
        let diagnostic = Arc::new(Mutex::new(String::new()));

        let url = tokio::time::timeout(
            Duration::from_secs(2),
            await_public_url(&mut process, diagnostic),
        )
        .await
        .expect("candidate was held back past the quiet period")
        .unwrap();
        assert_eq!(url, "https://tail.example.com");
    }

    #[tokio::test]
    async fn test_await_url_rejects_with_stderr_diagnostic() {
        let spawner = ScriptedSpawner::new().with_script(
            "fake-tunnel",
            ProcessScript::new()
                .stderr_chunk(Duration::ZERO, "error: connection refused\n")
                .exits(),
        );

        let mut process = launch_tunnel(&spawner, &tunnel_config("fake-tunnel"), 9000)
            .await
            .unwrap();
        let diagnostic = Arc::new(Mutex::new(String::new()));

        let err = await_public_url(&mut process, diagnostic)
            .await
            .unwrap_err();
        let TunnelError::Exited { diagnostic } = err;
        assert!(diagnostic.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_streamer_argv_carries_magnet_and_port() {
        let spawner = ScriptedSpawner::new();
        let config = StreamerConfig {
            executable: "fake-streamer".to_string(),
            extra_args: Vec::new(),
        };

        let process = launch_streamer(&spawner, &config, "magnet:?xt=urn:btih:abc", 9000)
            .await
            .unwrap();

        assert_eq!(process.command(), "fake-streamer");
        assert_eq!(spawner.spawned_commands(), vec!["fake-streamer"]);
    }
}
