//! Error types for mcpkit
//!
//! This module defines the crate-wide error enum and `Result` alias, using
//! `thiserror` for ergonomic error handling.
//!
//! Two error planes coexist in the protocol. JSON-RPC errors travel in Error
//! envelopes and surface to callers as [`McpError::Rpc`], carrying the code,
//! message, and optional data the peer sent. Everything else (transport I/O,
//! timeouts, local cancellation, session shutdown) is a local failure and has
//! its own variant. Tool-level failures are *not* errors at this layer: they
//! are successful responses whose `CallToolResult.isError` is true.

use thiserror::Error;

use crate::types::JsonRpcError;

/// Main error type for mcpkit operations.
///
/// Every `call` on a session resolves to one of four terminal outcomes:
/// a decoded result, [`McpError::Rpc`], [`McpError::Cancelled`] (or
/// [`McpError::Timeout`]), or [`McpError::Closed`] /
/// [`McpError::Transport`].
#[derive(Error, Debug)]
pub enum McpError {
    /// The peer answered with a JSON-RPC error envelope.
    #[error("JSON-RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Transport-level I/O failure (broken pipe, HTTP failure, closed channel).
    #[error("transport error: {0}")]
    Transport(String),

    /// No response arrived before the caller's deadline.
    #[error("request timed out: {method}")]
    Timeout {
        /// The method of the request that timed out.
        method: String,
    },

    /// The caller cancelled the request locally.
    #[error("request cancelled: {method}")]
    Cancelled {
        /// The method of the request that was cancelled.
        method: String,
    },

    /// The session closed while the request was outstanding, or a new call
    /// was attempted on a closing session.
    #[error("session closed")]
    Closed,

    /// The peer negotiated a protocol version this implementation does not
    /// support.
    #[error("unsupported protocol version: got {got}, supported {supported:?}")]
    ProtocolVersion {
        /// Versions this implementation accepts.
        supported: Vec<String>,
        /// The version the peer selected.
        got: String,
    },

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request errors from the SSE client transport.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl McpError {
    /// Build an [`McpError::Rpc`] from a code and message.
    ///
    /// Handlers throw this when a failure must surface as a JSON-RPC Error
    /// envelope rather than an `isError` tool result.
    pub fn rpc(code: i32, message: impl Into<String>) -> Self {
        Self::Rpc(JsonRpcError {
            code,
            message: message.into(),
            data: None,
        })
    }

    /// Shorthand for a `-32602 Invalid params` protocol error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::rpc(crate::types::error_codes::INVALID_PARAMS, message)
    }

    /// Shorthand for a `-32601 Method not found` protocol error.
    pub fn method_not_found(method: &str) -> Self {
        Self::rpc(
            crate::types::error_codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    /// Convert this error into the JSON-RPC error object sent on the wire.
    ///
    /// [`McpError::Rpc`] passes through unchanged. Every other variant maps
    /// to `-32603 Internal error` with a redacted message; the full detail
    /// stays in the local logs only.
    pub fn to_json_rpc(&self) -> JsonRpcError {
        match self {
            Self::Rpc(e) => e.clone(),
            _ => JsonRpcError {
                code: crate::types::error_codes::INTERNAL_ERROR,
                message: "internal error".to_string(),
                data: None,
            },
        }
    }
}

/// Convenience result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::error_codes;

    #[test]
    fn test_error_display_messages() {
        let e = McpError::rpc(error_codes::METHOD_NOT_FOUND, "Method not found: nope");
        assert!(e.to_string().contains("-32601"));
        assert!(e.to_string().contains("nope"));

        let e = McpError::Timeout {
            method: "tools/list".to_string(),
        };
        assert!(e.to_string().contains("tools/list"));

        let e = McpError::Transport("connection reset".to_string());
        assert!(e.to_string().contains("connection reset"));

        let e = McpError::ProtocolVersion {
            supported: vec!["2025-03-26".to_string()],
            got: "1999-01-01".to_string(),
        };
        assert!(e.to_string().contains("1999-01-01"));
    }

    #[test]
    fn test_to_json_rpc_passes_rpc_through() {
        let e = McpError::invalid_params("unknown tool: nope");
        let rpc = e.to_json_rpc();
        assert_eq!(rpc.code, error_codes::INVALID_PARAMS);
        assert!(rpc.message.contains("nope"));
    }

    #[test]
    fn test_to_json_rpc_redacts_internal_detail() {
        let e = McpError::Transport("secret socket path /tmp/xyz".to_string());
        let rpc = e.to_json_rpc();
        assert_eq!(rpc.code, error_codes::INTERNAL_ERROR);
        assert_eq!(rpc.message, "internal error");
    }
}
