//! Stdio transport for child-process MCP servers
//!
//! This module implements [`StdioClientTransport`], which spawns a server
//! process and communicates with it over its stdin/stdout pipes using
//! newline-delimited JSON framing. This is the standard transport for
//! locally-installed MCP servers.
//!
//! # Protocol
//!
//! - Outbound messages are written to the child's stdin as a single JSON
//!   object followed by a newline (`\n`).
//! - Inbound messages are read from the child's stdout, one JSON object per
//!   line (newline stripped before delivery). Line buffering accumulates
//!   bytes until the newline, so multi-byte UTF-8 characters split across
//!   read chunks reassemble correctly.
//! - The child's stderr is forwarded to the diagnostic stream and logged
//!   via `tracing::debug!`. Stderr output MUST NOT be treated as an error
//!   condition.
//!
//! # Lifecycle
//!
//! The transport is created via [`StdioClientTransport::spawn`]. Three
//! background Tokio tasks are started immediately: one feeds stdin, one
//! drains stdout, one drains stderr. When the child exits, its stdout
//! closes and the receive stream ends. When the transport is dropped, a
//! best-effort SIGTERM (Unix) or `start_kill` (non-Unix) is sent to the
//! child process.

use std::collections::HashMap;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex};

use crate::error::{McpError, Result};
use crate::transport::Transport;

/// Stdio-based MCP transport that drives a child server process.
///
/// Communication happens over the child's stdin (outbound) and stdout
/// (inbound) using newline-delimited JSON. The child's stderr is captured
/// and forwarded through [`Transport::receive_err`] as diagnostic-only
/// output.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use mcpkit::transport::stdio::StdioClientTransport;
///
/// # fn main() -> mcpkit::error::Result<()> {
/// let transport = StdioClientTransport::spawn(
///     "mcpkit-server".into(),
///     vec!["--transport".into(), "stdio".into()],
///     HashMap::new(),
///     None,
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct StdioClientTransport {
    /// Sender side of the stdin channel; `send()` writes here.
    stdin_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for stdout lines (one JSON message per line).
    stdout_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Shared receiver for stderr lines (diagnostics only).
    stderr_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Handle to the spawned child process; used by `Drop`.
    child: Arc<Mutex<Child>>,
}

impl StdioClientTransport {
    /// Spawn a server process and wire up its stdio pipes.
    ///
    /// The environment of the child is built by first clearing all
    /// inherited variables and then applying the caller-supplied `env`
    /// map. If `working_dir` is `Some`, the child's working directory is
    /// set accordingly.
    ///
    /// # Arguments
    ///
    /// * `executable` - Path to the server executable.
    /// * `args` - Command-line arguments passed to the executable.
    /// * `env` - Environment variables for the child process.
    /// * `working_dir` - Optional working directory for the child process.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] if the process cannot be spawned or
    /// if the stdio pipes are unavailable.
    pub fn spawn(
        executable: PathBuf,
        args: Vec<String>,
        env: HashMap<String, String>,
        working_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let mut cmd = Command::new(&executable);
        cmd.args(&args);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.env_clear().envs(&env);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::Transport(format!(
                "failed to spawn MCP server `{}`: {}",
                executable.display(),
                e
            ))
        })?;

        // All three handles are guaranteed Some because of Stdio::piped().
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable after spawn".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable after spawn".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| McpError::Transport("child stderr unavailable after spawn".into()))?;

        let (stdin_tx, mut stdin_rx) = mpsc::unbounded_channel::<String>();
        let (stdout_tx, stdout_rx) = mpsc::unbounded_channel::<String>();
        let (stderr_tx, stderr_rx) = mpsc::unbounded_channel::<String>();

        // Background task: forward stdin_rx -> child stdin, one message per
        // line. A single writer task serializes all writes.
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(msg) = stdin_rx.recv().await {
                let line = format!("{}\n", msg);
                if stdin.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdin.flush().await.is_err() {
                    break;
                }
            }
        });

        // Background task: drain child stdout -> stdout_tx.
        tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if stdout_tx.send(line).is_err() {
                    break;
                }
            }
        });

        // Background task: drain child stderr -> stderr_tx + tracing log.
        tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            while let Ok(Some(line)) = lines.next_line().await {
                tracing::debug!(target: "mcpkit::transport::stdio", "server stderr: {}", line);
                if stderr_tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            stdin_tx,
            stdout_rx: Arc::new(Mutex::new(stdout_rx)),
            stderr_rx: Arc::new(Mutex::new(stderr_rx)),
            child: Arc::new(Mutex::new(child)),
        })
    }
}

#[async_trait::async_trait]
impl Transport for StdioClientTransport {
    /// Enqueue a JSON-RPC message for the child's stdin.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] if the internal channel is closed
    /// (i.e. the background writer task has exited after a child exit).
    async fn send(&self, message: String) -> Result<()> {
        self.stdin_tx
            .send(message)
            .map_err(|e| McpError::Transport(format!("stdin channel closed: {}", e)))
    }

    /// Returns the stream of JSON-RPC messages from the child's stdout
    /// (one complete JSON object per item, newline stripped).
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stdout_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Returns the stream of diagnostic lines from the child's stderr.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.stderr_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }
}

impl Drop for StdioClientTransport {
    /// Best-effort termination of the child process on drop.
    ///
    /// On Unix, sends SIGTERM to the child PID. On non-Unix platforms,
    /// calls `start_kill()` on the child handle. Must not block.
    fn drop(&mut self) {
        // If the lock is held elsewhere, skip the kill; the OS reparents
        // and reaps the child when this process exits.
        if let Ok(child) = self.child.try_lock() {
            #[cfg(unix)]
            {
                if let Some(pid) = child.id() {
                    // SAFETY: pid comes from a live tokio::process::Child.
                    unsafe {
                        libc::kill(pid as libc::pid_t, libc::SIGTERM);
                    }
                }
            }
            #[cfg(not(unix))]
            {
                let mut child = child;
                let _ = child.start_kill();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[test]
    fn test_spawn_nonexistent_executable_returns_error() {
        let result = StdioClientTransport::spawn(
            PathBuf::from("/nonexistent/binary/that/does/not/exist"),
            vec![],
            HashMap::new(),
            None,
        );
        assert!(result.is_err(), "expected error for missing executable");
        let msg = result.unwrap_err().to_string();
        assert!(
            msg.contains("failed to spawn"),
            "unexpected error message: {msg}"
        );
    }

    /// `cat` makes a convenient echo peer: whatever we write to stdin comes
    /// back on stdout with the same framing.
    #[tokio::test]
    async fn test_spawn_echo_peer_stdout_arrives_on_receive() {
        let transport =
            StdioClientTransport::spawn(PathBuf::from("cat"), vec![], HashMap::new(), None);
        // Skip if `cat` is unavailable (rare, but possible in CI).
        let transport = match transport {
            Ok(t) => t,
            Err(_) => return,
        };

        let msg = r#"{"jsonrpc":"2.0","id":1,"method":"ping","params":{}}"#.to_string();
        transport.send(msg.clone()).await.unwrap();

        let mut stream = transport.receive();
        let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended unexpectedly");

        assert_eq!(received, msg);
    }

    /// Messages sent in order arrive in order.
    #[tokio::test]
    async fn test_send_order_preserved_on_wire() {
        let transport =
            StdioClientTransport::spawn(PathBuf::from("cat"), vec![], HashMap::new(), None);
        let transport = match transport {
            Ok(t) => t,
            Err(_) => return,
        };

        for i in 0..10 {
            transport
                .send(format!(r#"{{"jsonrpc":"2.0","id":{i},"method":"ping"}}"#))
                .await
                .unwrap();
        }

        let mut stream = transport.receive();
        for i in 0..10 {
            let received = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("timed out")
                .expect("stream ended");
            assert!(received.contains(&format!("\"id\":{i}")));
        }
    }

    #[tokio::test]
    async fn test_receive_err_empty_when_no_stderr() {
        let transport =
            StdioClientTransport::spawn(PathBuf::from("cat"), vec![], HashMap::new(), None);
        let transport = match transport {
            Ok(t) => t,
            Err(_) => return,
        };

        let mut err_stream = transport.receive_err();
        let result = tokio::time::timeout(Duration::from_millis(100), err_stream.next()).await;
        assert!(
            result.is_err(),
            "expected timeout (no stderr), but got a message"
        );
    }

    #[tokio::test]
    async fn test_spawn_with_working_dir_succeeds() {
        let tmp = std::env::temp_dir();
        let result =
            StdioClientTransport::spawn(PathBuf::from("cat"), vec![], HashMap::new(), Some(tmp));
        let _ = result;
    }
}
