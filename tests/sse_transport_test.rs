//! SSE transport integration tests
//!
//! Binds the axum-served SSE/POST pair on an ephemeral localhost port,
//! connects the SSE client transport, and runs real sessions over HTTP:
//! the endpoint-event handshake, tool calls, and the stateless POST mode.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mcpkit::client::Client;
use mcpkit::endpoint::CallOptions;
use mcpkit::server::{ParamKind, Server, ToolBuilder};
use mcpkit::transport::sse::SseClientTransport;
use mcpkit::transport::sse_server::{router, SseServerOptions, StatelessSessionId};
use mcpkit::types::{CallToolResult, ClientCapabilities, Content, Implementation};

fn echo_server() -> Server {
    Server::builder("sse-test-server", "0.1.0")
        .tool(
            ToolBuilder::new("echo")
                .description("Echoes input")
                .required_param("message", ParamKind::String, "The text to echo")
                .invoke(|args, _ctx| async move {
                    let message = args
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or_default();
                    Ok(CallToolResult::text(format!("Echo: {message}")))
                }),
        )
        .build()
}

/// Bind the router on an ephemeral port and return the base URL.
async fn start(options: SseServerOptions) -> (String, Server) {
    let server = echo_server();
    let app = router(server.clone(), options);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

#[tokio::test]
async fn test_endpoint_event_names_post_resource() {
    let (base, _server) = start(SseServerOptions::default()).await;

    let transport = SseClientTransport::connect(
        url::Url::parse(&format!("{base}/sse")).unwrap(),
        HashMap::new(),
        Duration::from_secs(5),
    )
    .await
    .expect("SSE connect should succeed");

    let post_url = transport.post_url();
    assert!(post_url.path().ends_with("/messages"));
    assert!(
        post_url.query().unwrap_or("").starts_with("sessionId="),
        "post url was: {post_url}"
    );
}

#[tokio::test]
async fn test_full_session_over_sse() {
    let (base, _server) = start(SseServerOptions::default()).await;

    let transport = SseClientTransport::connect(
        url::Url::parse(&format!("{base}/sse")).unwrap(),
        HashMap::new(),
        Duration::from_secs(5),
    )
    .await
    .unwrap();

    let session = Client::over(Arc::new(transport))
        .initialize(
            Implementation {
                name: "sse-test".to_string(),
                version: "1.0".to_string(),
            },
            ClientCapabilities::default(),
        )
        .await
        .expect("handshake over SSE should succeed");

    assert_eq!(session.server_info().name, "sse-test-server");

    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "echo");

    let mut args = serde_json::Map::new();
    args.insert("message".to_string(), serde_json::json!("over sse"));
    let result = session
        .call_tool("echo", Some(args), CallOptions::default())
        .await
        .unwrap();
    match &result.content[0] {
        Content::Text(t) => assert_eq!(t.text, "Echo: over sse"),
        other => panic!("expected text content, got {other:?}"),
    }

    session.ping().await.unwrap();
}

#[tokio::test]
async fn test_post_with_unknown_session_is_404() {
    let (base, _server) = start(SseServerOptions::default()).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/messages?sessionId=ghost"))
        .header("Content-Type", "application/json")
        .body(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stateless_post_rehydrates_and_answers_in_body() {
    let (base, _server) = start(SseServerOptions {
        stateless: true,
        ..Default::default()
    })
    .await;

    let session_id = StatelessSessionId {
        client_info: Implementation {
            name: "stateless-host".to_string(),
            version: "1.0".to_string(),
        },
        capabilities: ClientCapabilities::default(),
        user: Some("alice".to_string()),
    }
    .encode();

    let response = reqwest::Client::new()
        .post(format!("{base}/messages?sessionId={session_id}"))
        .header("Content-Type", "application/json")
        .body(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"echo","arguments":{"message":"stateless"}}}"#,
        )
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["id"], 7);
    assert_eq!(body["result"]["content"][0]["text"], "Echo: stateless");
}

#[tokio::test]
async fn test_stateless_notification_acknowledged_without_body() {
    let (base, _server) = start(SseServerOptions {
        stateless: true,
        ..Default::default()
    })
    .await;

    let session_id = StatelessSessionId {
        client_info: Implementation {
            name: "stateless-host".to_string(),
            version: "1.0".to_string(),
        },
        capabilities: ClientCapabilities::default(),
        user: None,
    }
    .encode();

    let response = reqwest::Client::new()
        .post(format!("{base}/messages?sessionId={session_id}"))
        .header("Content-Type", "application/json")
        .body(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);
}
