//! SSE + HTTP POST server transport
//!
//! The axum-served counterpart of
//! [`sse::SseClientTransport`](super::sse::SseClientTransport). Two routes
//! form one logical channel per session:
//!
//! - `GET {sse_path}` opens the event stream. The handler creates a fresh
//!   [`ServerSession`], immediately emits an `endpoint` event whose data is
//!   the POST URL (`{message_path}?sessionId=...`), then relays every
//!   outbound envelope as a `message` event with a monotonically increasing
//!   event id. Keep-alive comments flow automatically.
//! - `POST {message_path}?sessionId=...` injects one envelope into the
//!   session's inbound channel and answers `202 Accepted`.
//!
//! Dropping the GET stream (client disconnect) tears the session down and
//! releases its id.
//!
//! # Stateless mode
//!
//! With [`SseServerOptions::stateless`] enabled, a POST whose session id is
//! not live is treated as a [`StatelessSessionId`]: an opaque base64url
//! blob carrying the client's declared identity and a user claim. The
//! handler rehydrates an ephemeral, pre-initialized session, dispatches the
//! one envelope, and returns the response envelope in the POST body.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine as _;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{McpError, Result};
use crate::server::{Server, ServerSession};
use crate::transport::Transport;
use crate::types::{ClientCapabilities, Implementation, LATEST_PROTOCOL_VERSION};

/// How long a stateless POST waits for the response envelope.
const STATELESS_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Route configuration for [`router`].
#[derive(Debug, Clone)]
pub struct SseServerOptions {
    /// Path of the event-stream resource.
    pub sse_path: String,
    /// Path of the message POST resource.
    pub message_path: String,
    /// Accept POSTs whose session id is a [`StatelessSessionId`] blob.
    pub stateless: bool,
}

impl Default for SseServerOptions {
    fn default() -> Self {
        Self {
            sse_path: "/sse".to_string(),
            message_path: "/messages".to_string(),
            stateless: false,
        }
    }
}

/// Session identity for the stateless HTTP mode: everything needed to
/// rehydrate an endpoint lives in the id itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatelessSessionId {
    /// The client's declared identity.
    pub client_info: Implementation,
    /// The capabilities the client would have advertised in `initialize`.
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    /// Opaque user claim attached by the host's auth layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl StatelessSessionId {
    /// Encode to the opaque base64url form used as a session id.
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
    }

    /// Decode from a session id; `None` when the id is not a blob.
    pub fn decode(session_id: &str) -> Option<Self> {
        let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(session_id)
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

/// Channel-backed transport wired between an axum handler pair and a
/// [`ServerSession`]'s endpoint.
#[derive(Debug)]
struct SseSessionTransport {
    outbound_tx: mpsc::UnboundedSender<String>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

#[async_trait::async_trait]
impl Transport for SseSessionTransport {
    async fn send(&self, message: String) -> Result<()> {
        self.outbound_tx
            .send(message)
            .map_err(|_| McpError::Transport("event stream closed".to_string()))
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

struct SessionEntry {
    inbound_tx: mpsc::UnboundedSender<String>,
    session: ServerSession,
}

struct SseState {
    server: Server,
    options: SseServerOptions,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

/// Build the axum router exposing `server` over the SSE/POST pair.
///
/// # Examples
///
/// ```no_run
/// use mcpkit::server::Server;
/// use mcpkit::transport::sse_server::{router, SseServerOptions};
///
/// let server = Server::builder("demo", "0.1.0").build();
/// let app: axum::Router = router(server, SseServerOptions::default());
/// # let _ = app;
/// ```
pub fn router(server: Server, options: SseServerOptions) -> Router {
    let state = Arc::new(SseState {
        server,
        options: options.clone(),
        sessions: Mutex::new(HashMap::new()),
    });
    Router::new()
        .route(&options.sse_path, get(handle_sse))
        .route(&options.message_path, post(handle_message))
        .with_state(state)
}

/// Bind `addr` and serve until the process is stopped.
///
/// # Errors
///
/// Returns [`McpError::Io`] when the listener cannot bind or the server
/// loop fails.
pub async fn serve(addr: SocketAddr, server: Server, options: SseServerOptions) -> Result<()> {
    let app = router(server, options);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("SSE transport listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    #[serde(rename = "sessionId")]
    session_id: String,
}

async fn handle_sse(
    State(state): State<Arc<SseState>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();

    let transport = SseSessionTransport {
        outbound_tx,
        inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
    };
    let session = state.server.serve(Arc::new(transport));

    state.sessions.lock().unwrap().insert(
        session_id.clone(),
        SessionEntry {
            inbound_tx,
            session: session.clone(),
        },
    );
    tracing::debug!("SSE session {session_id} connected");

    let endpoint_data = format!("{}?sessionId={}", state.options.message_path, session_id);
    let stream = SessionStream {
        state: Arc::clone(&state),
        session_id,
        outbound_rx,
        endpoint_sent: false,
        endpoint_data,
        next_event_id: 0,
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// The per-session event stream: the `endpoint` event first, then one
/// `message` event per outbound envelope. Dropping it (client disconnect)
/// closes the session and frees its id.
struct SessionStream {
    state: Arc<SseState>,
    session_id: String,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    endpoint_sent: bool,
    endpoint_data: String,
    next_event_id: u64,
}

impl Stream for SessionStream {
    type Item = std::result::Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if !self.endpoint_sent {
            self.endpoint_sent = true;
            let event = Event::default()
                .event("endpoint")
                .data(self.endpoint_data.clone());
            return Poll::Ready(Some(Ok(event)));
        }

        match self.outbound_rx.poll_recv(cx) {
            Poll::Ready(Some(message)) => {
                let id = self.next_event_id;
                self.next_event_id += 1;
                let event = Event::default()
                    .event("message")
                    .id(id.to_string())
                    .data(message);
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for SessionStream {
    fn drop(&mut self) {
        let entry = self
            .state
            .sessions
            .lock()
            .unwrap()
            .remove(&self.session_id);
        if let Some(entry) = entry {
            tracing::debug!("SSE session {} disconnected", self.session_id);
            entry.session.endpoint().close_nowait();
        }
    }
}

async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    // Live session: inject and acknowledge.
    {
        let sessions = state.sessions.lock().unwrap();
        if let Some(entry) = sessions.get(&query.session_id) {
            return match entry.inbound_tx.send(body) {
                Ok(()) => StatusCode::ACCEPTED.into_response(),
                Err(_) => StatusCode::GONE.into_response(),
            };
        }
    }

    if state.options.stateless {
        if let Some(identity) = StatelessSessionId::decode(&query.session_id) {
            return stateless_dispatch(&state, identity, body).await;
        }
    }

    (StatusCode::NOT_FOUND, "unknown session").into_response()
}

/// Rehydrate an ephemeral endpoint from the identity blob, dispatch the
/// single envelope, and return the response (if the envelope was a
/// request) in the POST body.
async fn stateless_dispatch(
    state: &Arc<SseState>,
    identity: StatelessSessionId,
    body: String,
) -> Response {
    let is_request = serde_json::from_str::<serde_json::Value>(&body)
        .map(|v| v.get("id").is_some_and(|id| !id.is_null()) && v.get("method").is_some())
        .unwrap_or(false);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<String>();
    let transport = SseSessionTransport {
        outbound_tx,
        inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
    };

    let session = state.server.serve(Arc::new(transport));
    session.adopt_ready(
        LATEST_PROTOCOL_VERSION,
        identity.client_info,
        identity.capabilities,
    );

    if inbound_tx.send(body).is_err() {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let response = if is_request {
        match tokio::time::timeout(STATELESS_RESPONSE_TIMEOUT, outbound_rx.recv()).await {
            Ok(Some(envelope)) => (
                StatusCode::OK,
                [("content-type", "application/json")],
                envelope,
            )
                .into_response(),
            Ok(None) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
            Err(_) => StatusCode::GATEWAY_TIMEOUT.into_response(),
        }
    } else {
        StatusCode::ACCEPTED.into_response()
    };

    session.endpoint().close_nowait();
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_stateless_session_id_round_trip() {
        let id = StatelessSessionId {
            client_info: Implementation {
                name: "host".to_string(),
                version: "2.0".to_string(),
            },
            capabilities: ClientCapabilities::default(),
            user: Some("alice".to_string()),
        };
        let encoded = id.encode();
        // base64url: no padding, no '+', no '/'.
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));

        let decoded = StatelessSessionId::decode(&encoded).expect("decodes");
        assert_eq!(decoded.client_info.name, "host");
        assert_eq!(decoded.user.as_deref(), Some("alice"));
    }

    #[test]
    fn test_stateless_decode_rejects_garbage() {
        assert!(StatelessSessionId::decode("not a blob").is_none());
        assert!(StatelessSessionId::decode("").is_none());
        let not_json = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("hello");
        assert!(StatelessSessionId::decode(&not_json).is_none());
    }

    #[test]
    fn test_default_options_paths() {
        let options = SseServerOptions::default();
        assert_eq!(options.sse_path, "/sse");
        assert_eq!(options.message_path, "/messages");
        assert!(!options.stateless);
    }
}
