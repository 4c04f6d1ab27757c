//! Stdio transport integration tests
//!
//! Spawns the `mcpkit-server` binary as a child process and drives it over
//! real stdin/stdout pipes: the full handshake, tool listing and calls,
//! resource reads through both the exact and template paths, and ping.
//!
//! Cargo injects `CARGO_BIN_EXE_mcpkit-server` when building integration
//! tests, so the binary is always the one from this build.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use mcpkit::client::{Client, InitializedClient, ServerCapabilityFlag};
use mcpkit::endpoint::CallOptions;
use mcpkit::error::McpError;
use mcpkit::transport::stdio::StdioClientTransport;
use mcpkit::types::{ClientCapabilities, Content, Implementation, ResourceContents};

fn server_exe() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_mcpkit-server"))
}

/// Spawn the reference server over stdio and complete the handshake.
async fn spawn_and_initialize() -> InitializedClient {
    let transport = StdioClientTransport::spawn(
        server_exe(),
        vec!["--transport".to_string(), "stdio".to_string()],
        HashMap::new(),
        None,
    )
    .expect("failed to spawn mcpkit-server");

    Client::over(Arc::new(transport))
        .initialize(
            Implementation {
                name: "stdio-test".to_string(),
                version: "1.0".to_string(),
            },
            ClientCapabilities::default(),
        )
        .await
        .expect("handshake over stdio should succeed")
}

#[tokio::test]
async fn test_initialize_over_stdio() {
    let session = spawn_and_initialize().await;
    assert_eq!(session.server_info().name, "mcpkit-server");
    assert!(session.capable(ServerCapabilityFlag::Tools));
    assert!(session.capable(ServerCapabilityFlag::Resources));
    session.close().await;
}

#[tokio::test]
async fn test_list_tools_and_call_echo() {
    let session = spawn_and_initialize().await;

    let tools = session.list_tools().await.unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"echo"), "tools were: {names:?}");

    let echo = tools.iter().find(|t| t.name == "echo").unwrap();
    assert_eq!(echo.input_schema["properties"]["message"]["type"], "string");

    let mut args = serde_json::Map::new();
    args.insert("message".to_string(), serde_json::json!("Hello"));
    let result = session
        .call_tool("echo", Some(args), CallOptions::default())
        .await
        .unwrap();
    assert!(!result.is_error);
    match &result.content[0] {
        Content::Text(t) => assert_eq!(t.text, "Echo: Hello"),
        other => panic!("expected text content, got {other:?}"),
    }

    session.close().await;
}

#[tokio::test]
async fn test_unknown_tool_over_stdio() {
    let session = spawn_and_initialize().await;

    let err = session
        .call_tool("nope", Some(serde_json::Map::new()), CallOptions::default())
        .await
        .unwrap_err();
    match err {
        McpError::Rpc(rpc) => {
            assert_eq!(rpc.code, -32602);
            assert!(rpc.message.contains("nope"));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }

    session.close().await;
}

#[tokio::test]
async fn test_read_direct_and_templated_resources() {
    let session = spawn_and_initialize().await;

    // Direct resource.
    let contents = session.read_resource("test://r/1").await.unwrap();
    match &contents[0] {
        ResourceContents::Text(t) => {
            assert_eq!(t.uri, "test://r/1");
            assert!(t.text.contains("test://r/1"));
        }
        other => panic!("expected text contents, got {other:?}"),
    }

    // Outside the direct range, the template takes over.
    let contents = session.read_resource("test://r/77").await.unwrap();
    match &contents[0] {
        ResourceContents::Text(t) => assert!(t.text.contains("generated")),
        other => panic!("expected text contents, got {other:?}"),
    }

    session.close().await;
}

#[tokio::test]
async fn test_prompts_over_stdio() {
    let session = spawn_and_initialize().await;

    let prompts = session.list_prompts().await.unwrap();
    let names: Vec<&str> = prompts.iter().map(|p| p.name.as_str()).collect();
    assert!(names.contains(&"simple_prompt"));
    assert!(names.contains(&"complex_prompt"));

    let mut args = HashMap::new();
    args.insert("temperature".to_string(), "0.7".to_string());
    let rendered = session
        .get_prompt("complex_prompt", Some(args))
        .await
        .unwrap();
    assert!(!rendered.messages.is_empty());

    // Missing a required argument fails with a protocol error.
    let err = session.get_prompt("complex_prompt", None).await.unwrap_err();
    assert!(matches!(err, McpError::Rpc(_)));

    session.close().await;
}

#[tokio::test]
async fn test_ping_over_stdio() {
    let session = spawn_and_initialize().await;
    session.ping().await.unwrap();
    session.close().await;
}
