//! mcpkit - Model Context Protocol runtime
//!
//! A bidirectional JSON-RPC 2.0 session layer with the server-side dispatch
//! machinery for tools, prompts, resources, sampling, logging, and
//! progress, plus the standard MCP transports.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `types`: JSON-RPC envelopes, the request-id scalar, and every MCP wire
//!   type
//! - `endpoint`: the correlation engine one side of a session runs
//!   (pending slots, cancellation, progress routing, lifecycle)
//! - `transport`: the `Transport` trait and the stdio, stream, and SSE
//!   implementations
//! - `client`: typed client façade (handshake, request wrappers,
//!   subscriptions, sampling/roots/elicitation handlers)
//! - `server`: server façade (method dispatch, tool/prompt/resource
//!   registries, sessions)
//! - `config`: configuration for the reference server binary
//! - `error`: error types and the crate `Result` alias
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcpkit::client::Client;
//! use mcpkit::server::{ParamKind, Server, ToolBuilder};
//! use mcpkit::transport::stream::StreamTransport;
//! use mcpkit::types::{CallToolResult, ClientCapabilities, Implementation};
//!
//! #[tokio::main]
//! async fn main() -> mcpkit::error::Result<()> {
//!     let server = Server::builder("demo", "0.1.0")
//!         .tool(
//!             ToolBuilder::new("echo")
//!                 .required_param("message", ParamKind::String, "The text to echo")
//!                 .invoke(|args, _ctx| async move {
//!                     let message = args
//!                         .get("message")
//!                         .and_then(|m| m.as_str())
//!                         .unwrap_or_default();
//!                     Ok(CallToolResult::text(format!("Echo: {message}")))
//!                 }),
//!         )
//!         .build();
//!
//!     let (client_side, server_side) = StreamTransport::pair(64 * 1024);
//!     let _session = server.serve(Arc::new(server_side));
//!
//!     let session = Client::over(Arc::new(client_side))
//!         .initialize(
//!             Implementation { name: "host".into(), version: "1.0".into() },
//!             ClientCapabilities::default(),
//!         )
//!         .await?;
//!     let tools = session.list_tools().await?;
//!     assert_eq!(tools[0].name, "echo");
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use client::{Client, InitializedClient};
pub use endpoint::{CallOptions, Endpoint, EndpointState};
pub use error::{McpError, Result};
pub use server::{Server, ServerSession};
