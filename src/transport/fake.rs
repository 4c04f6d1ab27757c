//! In-process fake transport for unit tests
//!
//! [`FakeTransport::new`] returns a `(FakeTransport, FakeTransportHandle)`
//! pair. Wire the [`FakeTransport`] into the code under test; from the test
//! side, use the [`FakeTransportHandle`] to:
//!
//! - Read what the endpoint sent: `handle.outbound_rx.recv().await`
//! - Inject peer messages: `handle.inbound_tx.send(json_string)`
//!
//! ```text
//! endpoint send() ----> outbound_tx ----> outbound_rx (handle reads)
//! handle inbound_tx --> inbound_rx  ----> endpoint receive()
//! ```

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};

use crate::error::{McpError, Result};
use crate::transport::Transport;

/// In-process fake transport for use in tests.
#[derive(Debug)]
pub struct FakeTransport {
    /// What the endpoint writes; drained by `handle.outbound_rx`.
    outbound_tx: mpsc::UnboundedSender<String>,
    /// Populated by `handle.inbound_tx`; exposed via `receive()`.
    inbound_rx: Arc<Mutex<mpsc::UnboundedReceiver<String>>>,
}

/// The test side of a [`FakeTransport`].
#[derive(Debug)]
pub struct FakeTransportHandle {
    /// Messages the endpoint sent, in submission order.
    pub outbound_rx: mpsc::UnboundedReceiver<String>,
    /// Inject messages for the endpoint to receive.
    pub inbound_tx: mpsc::UnboundedSender<String>,
}

impl FakeTransport {
    /// Create a new `(FakeTransport, FakeTransportHandle)` pair.
    pub fn new() -> (Self, FakeTransportHandle) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

        (
            Self {
                outbound_tx,
                inbound_rx: Arc::new(Mutex::new(inbound_rx)),
            },
            FakeTransportHandle {
                outbound_rx,
                inbound_tx,
            },
        )
    }
}

impl FakeTransportHandle {
    /// Inject a JSON value as a serialized inbound message.
    pub fn inject(&self, value: &serde_json::Value) {
        let _ = self.inbound_tx.send(value.to_string());
    }

    /// Receive the next outbound message as a parsed JSON value.
    pub async fn next_outbound(&mut self) -> Option<serde_json::Value> {
        let raw = self.outbound_rx.recv().await?;
        serde_json::from_str(&raw).ok()
    }
}

#[async_trait::async_trait]
impl Transport for FakeTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx
            .send(message)
            .map_err(|_| McpError::Transport("fake transport handle dropped".to_string()))
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.inbound_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        Box::pin(futures::stream::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_fake_transport_round_trip() {
        let (transport, mut handle) = FakeTransport::new();

        transport
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#.to_string())
            .await
            .unwrap();
        let sent = handle.next_outbound().await.unwrap();
        assert_eq!(sent["method"], "ping");

        handle.inject(&serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        let received = transport.receive().next().await.unwrap();
        assert!(received.contains("result"));
    }

    #[tokio::test]
    async fn test_send_fails_after_handle_dropped() {
        let (transport, handle) = FakeTransport::new();
        drop(handle);
        let result = transport.send("{}".to_string()).await;
        assert!(result.is_err());
    }
}
