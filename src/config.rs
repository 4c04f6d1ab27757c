//! Configuration for the reference server binary
//!
//! This module handles loading, parsing, and validating the server's YAML
//! configuration, with CLI and environment overrides applied by the binary
//! on top of what the file provides.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};
use crate::types::LoggingLevel;

/// Which transport the reference server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Newline-delimited JSON over this process's stdin/stdout.
    Stdio,
    /// The SSE event-stream + HTTP POST pair.
    Sse,
}

impl std::str::FromStr for TransportKind {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdio" => Ok(Self::Stdio),
            "sse" => Ok(Self::Sse),
            other => Err(McpError::Config(format!(
                "unknown transport '{other}' (expected 'stdio' or 'sse')"
            ))),
        }
    }
}

/// SSE transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseConfig {
    /// Listen address, e.g. `127.0.0.1:8080`.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Path of the event-stream resource.
    #[serde(default = "default_sse_path")]
    pub sse_path: String,
    /// Path of the message POST resource.
    #[serde(default = "default_message_path")]
    pub message_path: String,
    /// Accept stateless session-id blobs on the POST resource.
    #[serde(default)]
    pub stateless: bool,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            sse_path: default_sse_path(),
            message_path: default_message_path(),
            stateless: false,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_sse_path() -> String {
    "/sse".to_string()
}

fn default_message_path() -> String {
    "/messages".to_string()
}

fn default_page_size() -> usize {
    crate::server::DEFAULT_PAGE_SIZE
}

fn default_log_level() -> LoggingLevel {
    LoggingLevel::Info
}

/// Main configuration for the reference server.
///
/// # Examples
///
/// ```
/// use mcpkit::config::ServerConfig;
///
/// let config = ServerConfig::default();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Which transport to serve.
    #[serde(default = "default_transport")]
    pub transport: TransportKind,
    /// SSE settings; ignored for stdio.
    #[serde(default)]
    pub sse: SseConfig,
    /// Items per page on the `*/list` endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Minimum level for `notifications/message` before a client calls
    /// `logging/setLevel`.
    #[serde(default = "default_log_level")]
    pub log_level: LoggingLevel,
}

fn default_transport() -> TransportKind {
    TransportKind::Stdio
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: default_transport(),
            sse: SseConfig::default(),
            page_size: default_page_size(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    ///
    /// A missing `path` yields the defaults; a path that exists but fails
    /// to parse is an error.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] when the file cannot be read or
    /// parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| {
            McpError::Config(format!("cannot read config {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| McpError::Config(format!("cannot parse config {}: {e}", path.display())))
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] for a zero page size, an unparseable
    /// bind address, or resource paths that do not start with `/`.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(McpError::Config("page_size must be at least 1".to_string()));
        }
        if self.transport == TransportKind::Sse {
            self.sse.bind.parse::<SocketAddr>().map_err(|e| {
                McpError::Config(format!("invalid bind address '{}': {e}", self.sse.bind))
            })?;
            for path in [&self.sse.sse_path, &self.sse.message_path] {
                if !path.starts_with('/') {
                    return Err(McpError::Config(format!(
                        "resource path '{path}' must start with '/'"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        ServerConfig::default().validate().unwrap();
    }

    #[test]
    fn test_load_missing_path_gives_defaults() {
        let config = ServerConfig::load(None).unwrap();
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.page_size, crate::server::DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_load_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "transport: sse\nsse:\n  bind: \"0.0.0.0:9000\"\n  stateless: true\npage_size: 10\nlog_level: debug"
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.transport, TransportKind::Sse);
        assert_eq!(config.sse.bind, "0.0.0.0:9000");
        assert!(config.sse.stateless);
        assert_eq!(config.page_size, 10);
        assert_eq!(config.log_level, LoggingLevel::Debug);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_bind() {
        let config = ServerConfig {
            transport: TransportKind::Sse,
            sse: SseConfig {
                bind: "not-an-address".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let config = ServerConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transport_kind_from_str() {
        assert_eq!("stdio".parse::<TransportKind>().unwrap(), TransportKind::Stdio);
        assert_eq!("sse".parse::<TransportKind>().unwrap(), TransportKind::Sse);
        assert!("carrier-pigeon".parse::<TransportKind>().is_err());
    }
}
