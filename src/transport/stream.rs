//! Duplex byte-stream transport
//!
//! [`StreamTransport`] frames newline-delimited JSON over any pair of
//! `AsyncRead`/`AsyncWrite` halves supplied by the caller. No process or
//! connection management happens here; the two halves are whatever the
//! caller already owns:
//!
//! - the process's own stdin/stdout, for the server side of the stdio
//!   transport ([`StreamTransport::from_stdio`]);
//! - `tokio::io::duplex` pipes, for in-memory sessions and tests
//!   ([`StreamTransport::pair`]).
//!
//! Framing matches the stdio transport exactly: one JSON object per line,
//! writes serialized through a single producer task, reads line-buffered.

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};

use crate::error::{McpError, Result};
use crate::transport::Transport;

/// Newline-delimited JSON transport over an externally supplied duplex
/// stream.
///
/// # Examples
///
/// ```no_run
/// use mcpkit::transport::stream::StreamTransport;
///
/// // Two wired halves of an in-memory session (needs a Tokio runtime):
/// let (client_side, server_side) = StreamTransport::pair(64 * 1024);
/// # let _ = (client_side, server_side);
/// ```
#[derive(Debug)]
pub struct StreamTransport {
    /// Sender side of the write channel; `send()` writes here.
    write_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver for inbound lines.
    read_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl StreamTransport {
    /// Wrap a reader/writer pair in a transport.
    ///
    /// Two background Tokio tasks are started: a single writer that drains
    /// the outbound channel onto `writer` (one message per line, flushed),
    /// and a reader that splits `reader` into lines and forwards non-empty
    /// ones. The receive stream ends when `reader` reaches EOF.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<String>();
        let (read_tx, read_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let mut writer = writer;
            while let Some(msg) = write_rx.recv().await {
                let line = format!("{}\n", msg);
                if writer.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if writer.flush().await.is_err() {
                    break;
                }
            }
        });

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if read_tx.send(trimmed.to_string()).is_err() {
                    break;
                }
            }
        });

        Self {
            write_tx,
            read_rx: Arc::new(Mutex::new(read_rx)),
        }
    }

    /// A transport over this process's own stdin/stdout.
    ///
    /// This is the server side of the stdio transport: the parent process
    /// owns the pipes and this process just reads and writes them. Nothing
    /// else may write to stdout while the transport is alive.
    pub fn from_stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Two fully wired in-memory transports, each the other's peer.
    ///
    /// `max_buf_size` bounds each underlying pipe. Useful for driving a
    /// client and a server in the same process.
    pub fn pair(max_buf_size: usize) -> (Self, Self) {
        let (a, b) = tokio::io::duplex(max_buf_size);
        let (a_read, a_write) = tokio::io::split(a);
        let (b_read, b_write) = tokio::io::split(b);
        (Self::new(a_read, a_write), Self::new(b_read, b_write))
    }
}

#[async_trait::async_trait]
impl Transport for StreamTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.write_tx
            .send(message)
            .map_err(|_| McpError::Transport("stream writer closed".to_string()))
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.read_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Always empty; a plain byte stream has no diagnostic side channel.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        Box::pin(futures::stream::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_pair_round_trip() {
        let (a, b) = StreamTransport::pair(4096);

        a.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string())
            .await
            .unwrap();

        let mut stream = b.receive();
        let received = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");
        assert!(received.contains("\"method\":\"ping\""));
    }

    #[tokio::test]
    async fn test_order_preserved_across_pipe() {
        let (a, b) = StreamTransport::pair(4096);
        for i in 0..20 {
            a.send(format!(r#"{{"jsonrpc":"2.0","id":{i},"method":"ping"}}"#))
                .await
                .unwrap();
        }
        let mut stream = b.receive();
        for i in 0..20 {
            let received = tokio::time::timeout(Duration::from_secs(2), stream.next())
                .await
                .expect("timed out")
                .expect("stream ended");
            assert!(received.contains(&format!("\"id\":{i}")), "got {received}");
        }
    }

    #[tokio::test]
    async fn test_receive_ends_on_peer_drop() {
        let (a, b) = StreamTransport::pair(4096);
        drop(a);
        let mut stream = b.receive();
        let item = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for end-of-stream");
        assert!(item.is_none(), "expected end-of-stream after peer drop");
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let (read_half, mut write_half) = {
            let (a, b) = tokio::io::duplex(1024);
            let (a_read, _a_write) = tokio::io::split(a);
            let (_b_read, b_write) = tokio::io::split(b);
            (a_read, b_write)
        };
        let sink = tokio::io::sink();
        let t = StreamTransport::new(read_half, sink);

        write_half
            .write_all(b"\n  \n{\"jsonrpc\":\"2.0\",\"method\":\"x\"}\n")
            .await
            .unwrap();

        let mut stream = t.receive();
        let received = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out")
            .expect("stream ended");
        assert!(received.starts_with('{'));
    }
}
