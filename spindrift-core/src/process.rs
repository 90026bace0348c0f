//! External process supervision
//!
//! Spawns child programs without a shell intermediary and exposes their
//! stdout/stderr as ordered chunk streams. The `ProcessSpawner` trait is the
//! seam between production (real OS processes) and development/test
//! (scripted processes), so orchestration logic can be exercised without
//! the external binaries installed.

use std::collections::{HashMap, HashSet};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};

/// Errors from spawning or terminating a child process.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    #[error("failed to terminate '{command}': {reason}")]
    TerminateFailed { command: String, reason: String },
}

/// Capacity of each per-stream chunk channel.
///
/// Bounded so a chatty child cannot grow memory without the consumer
/// keeping up; the reader task applies backpressure by awaiting sends.
const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Read buffer size for the stdio reader tasks.
const READ_BUFFER_SIZE: usize = 4096;

/// Termination hook for a spawned process.
#[async_trait]
pub trait ProcessControl: Send + Sync {
    /// Kill the underlying process. Idempotent; errors after the process
    /// has already exited are not reported.
    async fn terminate(&mut self) -> Result<(), ProcessError>;

    /// OS process id, if the process is real and still known.
    fn id(&self) -> Option<u32>;
}

/// A spawned child process with its output streams.
///
/// Stdout and stderr arrive as independent append-only chunk sequences in
/// arrival order. The owner is responsible for eventual termination, either
/// directly or by handing the process to the session registry.
pub struct ManagedProcess {
    command: String,
    /// Ordered stdout chunks; closes when the stream ends
    pub stdout: mpsc::Receiver<Bytes>,
    /// Ordered stderr chunks; closes when the stream ends
    pub stderr: mpsc::Receiver<Bytes>,
    control: Box<dyn ProcessControl>,
}

impl ManagedProcess {
    /// Command this process was spawned from.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// OS process id, if known.
    pub fn id(&self) -> Option<u32> {
        self.control.id()
    }

    /// Kill the underlying process.
    ///
    /// # Errors
    /// - `ProcessError::TerminateFailed` - the kill signal could not be sent
    pub async fn terminate(&mut self) -> Result<(), ProcessError> {
        self.control.terminate().await
    }

    /// Detach both output streams into a background drain task.
    ///
    /// A long-lived child would otherwise block on write once the chunk
    /// channel and the OS pipe fill. Remaining output is forwarded to debug
    /// logs; the task resolves with the drained byte count once both
    /// streams close. Safe to call more than once.
    pub fn drain_to_log(&mut self) -> tokio::task::JoinHandle<u64> {
        let mut stdout = detach(&mut self.stdout);
        let mut stderr = detach(&mut self.stderr);
        let command = self.command.clone();

        tokio::spawn(async move {
            let mut total = 0u64;
            let mut stdout_open = true;
            let mut stderr_open = true;
            while stdout_open || stderr_open {
                tokio::select! {
                    chunk = stdout.recv(), if stdout_open => match chunk {
                        Some(bytes) => {
                            total += bytes.len() as u64;
                            tracing::debug!(
                                "[{} stdout] {}",
                                command,
                                String::from_utf8_lossy(&bytes).trim_end()
                            );
                        }
                        None => stdout_open = false,
                    },
                    chunk = stderr.recv(), if stderr_open => match chunk {
                        Some(bytes) => {
                            total += bytes.len() as u64;
                            tracing::debug!(
                                "[{} stderr] {}",
                                command,
                                String::from_utf8_lossy(&bytes).trim_end()
                            );
                        }
                        None => stderr_open = false,
                    },
                }
            }
            total
        })
    }
}

/// Swap a receiver out for an already-closed one, so later reads see EOF.
fn detach(slot: &mut mpsc::Receiver<Bytes>) -> mpsc::Receiver<Bytes> {
    let (tx, rx) = mpsc::channel(1);
    drop(tx);
    std::mem::replace(slot, rx)
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("command", &self.command)
            .field("id", &self.control.id())
            .finish_non_exhaustive()
    }
}

/// Abstraction over process creation.
///
/// The argument vector is passed directly to the OS with no shell in
/// between, so user-controlled text (magnet links) cannot inject into a
/// command line.
#[async_trait]
pub trait ProcessSpawner: Send + Sync {
    /// Spawn `command` with `args` and wire up its output streams.
    ///
    /// # Errors
    /// - `ProcessError::SpawnFailed` - executable missing or not runnable
    async fn spawn(&self, command: &str, args: &[String]) -> Result<ManagedProcess, ProcessError>;
}

/// Production spawner backed by `tokio::process`.
pub struct TokioProcessSpawner;

struct TokioProcessControl {
    command: String,
    child: tokio::process::Child,
}

#[async_trait]
impl ProcessControl for TokioProcessControl {
    async fn terminate(&mut self) -> Result<(), ProcessError> {
        if let Err(e) = self.child.start_kill() {
            // InvalidInput means the process already exited
            if e.kind() != std::io::ErrorKind::InvalidInput {
                return Err(ProcessError::TerminateFailed {
                    command: self.command.clone(),
                    reason: e.to_string(),
                });
            }
        }
        // Reap so the OS entry is released
        let _ = self.child.wait().await;
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

#[async_trait]
impl ProcessSpawner for TokioProcessSpawner {
    async fn spawn(&self, command: &str, args: &[String]) -> Result<ManagedProcess, ProcessError> {
        let mut child = tokio::process::Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed {
                command: command.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!("Spawned '{}' (pid {:?})", command, child.id());

        let stdout_pipe = child.stdout.take().ok_or_else(|| ProcessError::SpawnFailed {
            command: command.to_string(),
            reason: "stdout pipe unavailable".to_string(),
        })?;
        let stderr_pipe = child.stderr.take().ok_or_else(|| ProcessError::SpawnFailed {
            command: command.to_string(),
            reason: "stderr pipe unavailable".to_string(),
        })?;

        let stdout = pump_stream(stdout_pipe);
        let stderr = pump_stream(stderr_pipe);

        Ok(ManagedProcess {
            command: command.to_string(),
            stdout,
            stderr,
            control: Box::new(TokioProcessControl {
                command: command.to_string(),
                child,
            }),
        })
    }
}

/// Forward a stdio pipe into a chunk channel, preserving arrival order.
///
/// The task ends when the pipe closes (process exit) or the receiver is
/// dropped (consumer detached).
fn pump_stream<R>(mut reader: R) -> mpsc::Receiver<Bytes>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    rx
}

/// Scripted output for one stream of a [`ScriptedSpawner`] process.
///
/// Each entry is a delay before the chunk is delivered, preserving order.
#[derive(Debug, Clone, Default)]
pub struct ProcessScript {
    stdout: Vec<(Duration, String)>,
    stderr: Vec<(Duration, String)>,
    exits: bool,
}

impl ProcessScript {
    /// A silent process that stays alive until terminated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stdout chunk delivered after `delay`.
    #[must_use]
    pub fn stdout_chunk(mut self, delay: Duration, text: &str) -> Self {
        self.stdout.push((delay, text.to_string()));
        self
    }

    /// Append a stderr chunk delivered after `delay`.
    #[must_use]
    pub fn stderr_chunk(mut self, delay: Duration, text: &str) -> Self {
        self.stderr.push((delay, text.to_string()));
        self
    }

    /// Close both streams after the scripted chunks, simulating exit.
    #[must_use]
    pub fn exits(mut self) -> Self {
        self.exits = true;
        self
    }
}

/// Scripted spawner for development mode and tests.
///
/// Spawning a command plays back its registered [`ProcessScript`]; commands
/// without a script behave as silent long-running processes. Spawned
/// commands are recorded so tests can assert what was (not) launched.
#[derive(Default)]
pub struct ScriptedSpawner {
    scripts: Mutex<HashMap<String, ProcessScript>>,
    failing: Mutex<HashSet<String>>,
    spawned: Mutex<Vec<String>>,
}

impl ScriptedSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the script played back when `command` is spawned.
    #[must_use]
    pub fn with_script(self, command: &str, script: ProcessScript) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(command.to_string(), script);
        self
    }

    /// Make spawning `command` fail, simulating a missing executable.
    #[must_use]
    pub fn with_failing(self, command: &str) -> Self {
        self.failing
            .lock()
            .expect("failing lock")
            .insert(command.to_string());
        self
    }

    /// Commands spawned so far, in order.
    pub fn spawned_commands(&self) -> Vec<String> {
        self.spawned.lock().expect("spawned lock").clone()
    }

    /// Spawner preset for development mode: the tunnel stand-in announces a
    /// synthetic public URL shortly after startup.
    pub fn development(config: &crate::config::SpindriftConfig) -> Self {
        Self::new().with_script(
            &config.tunnel.executable,
            ProcessScript::new().stdout_chunk(
                Duration::from_millis(150),
                "your url is: https://spindrift-dev.loca.lt\n",
            ),
        )
    }
}

struct ScriptedControl {
    shutdown: Vec<oneshot::Sender<()>>,
}

#[async_trait]
impl ProcessControl for ScriptedControl {
    async fn terminate(&mut self) -> Result<(), ProcessError> {
        for tx in self.shutdown.drain(..) {
            let _ = tx.send(());
        }
        Ok(())
    }

    fn id(&self) -> Option<u32> {
        None
    }
}

/// Play back one scripted stream; holds the channel open until shutdown
/// unless the script exits.
fn play_script(
    chunks: Vec<(Duration, String)>,
    exits: bool,
) -> (mpsc::Receiver<Bytes>, oneshot::Sender<()>) {
    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        for (delay, text) in chunks {
            tokio::time::sleep(delay).await;
            if tx.send(Bytes::from(text)).await.is_err() {
                return;
            }
        }
        if !exits {
            // Keep the sender alive until terminated or dropped
            let _ = shutdown_rx.await;
        }
    });

    (rx, shutdown_tx)
}

#[async_trait]
impl ProcessSpawner for ScriptedSpawner {
    async fn spawn(&self, command: &str, _args: &[String]) -> Result<ManagedProcess, ProcessError> {
        if self.failing.lock().expect("failing lock").contains(command) {
            return Err(ProcessError::SpawnFailed {
                command: command.to_string(),
                reason: "No such file or directory".to_string(),
            });
        }

        self.spawned
            .lock()
            .expect("spawned lock")
            .push(command.to_string());

        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get(command)
            .cloned()
            .unwrap_or_default();

        let (stdout, stdout_shutdown) = play_script(script.stdout, script.exits);
        let (stderr, stderr_shutdown) = play_script(script.stderr, script.exits);

        Ok(ManagedProcess {
            command: command.to_string(),
            stdout,
            stderr,
            control: Box::new(ScriptedControl {
                shutdown: vec![stdout_shutdown, stderr_shutdown],
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tokio_spawner_captures_stdout() {
        let spawner = TokioProcessSpawner;
        let mut process = spawner
            .spawn("echo", &["hello".to_string()])
            .await
            .unwrap();

        let mut output = String::new();
        while let Some(chunk) = process.stdout.recv().await {
            output.push_str(&String::from_utf8_lossy(&chunk));
        }
        assert_eq!(output.trim(), "hello");

        process.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_unblocks_high_volume_output() {
        let spawner = TokioProcessSpawner;
        let mut process = spawner
            .spawn("seq", &["1".to_string(), "200000".to_string()])
            .await
            .unwrap();

        // ~1.4MB of output, far more than the chunk channel plus the OS
        // pipe can hold. The child can only run to completion if the drain
        // task keeps consuming.
        let drained = process.drain_to_log();
        let total = tokio::time::timeout(Duration::from_secs(10), drained)
            .await
            .expect("child blocked on a full pipe")
            .unwrap();
        assert!(total > 1_000_000);

        process.terminate().await.unwrap();
    }

    #[tokio::test]
    async fn test_drain_after_detach_sees_closed_streams() {
        let spawner = ScriptedSpawner::new();
        let mut process = spawner.spawn("silent", &[]).await.unwrap();

        let first = process.drain_to_log();
        let second = process.drain_to_log();
        assert_eq!(second.await.unwrap(), 0);

        process.terminate().await.unwrap();
        assert_eq!(first.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tokio_spawner_missing_executable() {
        let spawner = TokioProcessSpawner;
        let result = spawner
            .spawn("spindrift-does-not-exist", &[])
            .await;
        assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
    }

    #[tokio::test]
    async fn test_scripted_chunks_arrive_in_order() {
        let spawner = ScriptedSpawner::new().with_script(
            "fake",
            ProcessScript::new()
                .stdout_chunk(Duration::ZERO, "first ")
                .stdout_chunk(Duration::from_millis(5), "second")
                .exits(),
        );

        let mut process = spawner.spawn("fake", &[]).await.unwrap();
        let mut output = String::new();
        while let Some(chunk) = process.stdout.recv().await {
            output.push_str(&String::from_utf8_lossy(&chunk));
        }
        assert_eq!(output, "first second");
    }

    #[tokio::test]
    async fn test_scripted_terminate_closes_streams() {
        let spawner = ScriptedSpawner::new();
        let mut process = spawner.spawn("silent", &[]).await.unwrap();

        process.terminate().await.unwrap();
        assert!(process.stdout.recv().await.is_none());
        assert!(process.stderr.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_scripted_failing_command() {
        let spawner = ScriptedSpawner::new().with_failing("broken");
        let result = spawner.spawn("broken", &[]).await;
        assert!(matches!(result, Err(ProcessError::SpawnFailed { .. })));
        assert!(spawner.spawned_commands().is_empty());
    }
}
