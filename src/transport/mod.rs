//! Transport abstraction and implementations
//!
//! This module defines the [`Transport`] trait that every transport must
//! satisfy. Concrete implementations live in submodules:
//!
//! - [`stdio::StdioClientTransport`] -- spawns a child process and
//!   communicates over its stdin/stdout pipes (newline-delimited JSON).
//! - [`stream::StreamTransport`] -- the same framing over an externally
//!   supplied duplex byte stream; covers the server side of stdio (the
//!   process's own stdin/stdout) and in-memory pipes for tests.
//! - [`sse::SseClientTransport`] -- HTTP client half of the SSE pair: an
//!   event-stream for inbound messages plus a POST channel for outbound.
//! - [`sse_server`] -- axum-served counterpart of the SSE pair.
//! - [`fake::FakeTransport`] -- in-process fake used in unit tests
//!   (cfg(test) only).
//!
//! # Design
//!
//! The [`Transport`] trait is intentionally minimal: callers `send` a
//! serialized JSON-RPC string and `receive` a stream of serialized JSON-RPC
//! strings (one per logical message). Framing, session management, and
//! reconnection are the responsibility of each concrete implementation.
//! Sends must reach the wire in submission order; the receive stream yields
//! messages in wire order and ends when the peer disconnects.
//!
//! The `receive_err` stream carries transport-level diagnostics (e.g.
//! stderr output from a child process). Diagnostic output MUST NOT be
//! treated as an error condition.

use std::pin::Pin;

use futures::Stream;

use crate::error::Result;

/// Abstraction over the byte-level message channel an endpoint drives.
///
/// Implementations exist for stdio (child process), duplex streams, and
/// SSE/HTTP. A [`fake::FakeTransport`] is provided for tests. The trait is
/// used polymorphically through `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send a complete JSON-RPC message string to the remote peer.
    ///
    /// The string MUST be a single, complete JSON object with no embedded
    /// newlines. The transport applies whatever framing the medium needs
    /// (a trailing newline for stdio, an HTTP POST for SSE). Submission
    /// order is preserved on the wire.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::McpError::Transport`] if the underlying I/O
    /// channel has failed or closed.
    async fn send(&self, message: String) -> Result<()>;

    /// Returns the stream of inbound JSON-RPC message strings.
    ///
    /// Each item is a single, complete JSON object with leading/trailing
    /// whitespace stripped, delivered in wire order. The stream ends when
    /// the transport is closed or the remote peer disconnects.
    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;

    /// Returns a stream of transport-level diagnostic strings.
    ///
    /// For the stdio transport this carries lines written to the child
    /// process's stderr. For other transports the stream may be empty.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>>;
}

pub mod sse;
pub mod sse_server;
pub mod stdio;
pub mod stream;

#[cfg(test)]
pub mod fake;
