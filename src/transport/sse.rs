//! SSE + HTTP POST client transport
//!
//! Two HTTP resources form one logical channel: a long-lived
//! `text/event-stream` GET for server-to-client envelopes, and an HTTP POST
//! endpoint for client-to-server envelopes. On connect the server
//! immediately emits an `endpoint` SSE event whose data is the POST URL for
//! this session (relative URLs are resolved against the stream URL);
//! subsequent `message` events each carry one JSON envelope.
//!
//! # Reconnection
//!
//! Every SSE `id:` field is remembered; [`SseClientTransport::reconnect`]
//! re-issues the GET with `Last-Event-ID` so a server that supports
//! resumption can replay missed events.
//!
//! # Authorization
//!
//! Callers inject static headers (e.g. `Authorization: Bearer ...`) via the
//! `headers` map; the full token-acquisition flow is the host's concern.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, RwLock};

use crate::error::{McpError, Result};
use crate::transport::Transport;

/// One parsed SSE event.
#[derive(Debug, Clone)]
pub struct SseEvent {
    /// The `event:` field, when present.
    pub event: Option<String>,
    /// The joined `data:` lines.
    pub data: String,
}

/// Client half of the SSE/POST transport pair.
///
/// # Examples
///
/// ```no_run
/// use std::collections::HashMap;
/// use std::time::Duration;
/// use url::Url;
/// use mcpkit::transport::sse::SseClientTransport;
///
/// # #[tokio::main]
/// # async fn main() -> mcpkit::error::Result<()> {
/// let transport = SseClientTransport::connect(
///     Url::parse("http://localhost:8080/sse").unwrap(),
///     HashMap::new(),
///     Duration::from_secs(10),
/// )
/// .await?;
/// # let _ = transport;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SseClientTransport {
    http_client: Arc<reqwest::Client>,
    /// The event-stream URL, kept for reconnects.
    stream_url: url::Url,
    /// The POST URL announced by the server's `endpoint` event.
    post_url: url::Url,
    /// Static extra headers merged into every request.
    headers: HashMap<String, String>,
    /// Per-POST timeout.
    request_timeout: Duration,
    /// Sender for inbound JSON-RPC message strings; cloned into the parse
    /// task on (re)connect.
    response_tx: mpsc::UnboundedSender<String>,
    /// Shared receiver exposed via `receive()`.
    response_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
    /// Last SSE event ID, used for stream resumption via `Last-Event-ID`.
    last_event_id: Arc<RwLock<Option<String>>>,
}

impl SseClientTransport {
    /// Open the event stream and wait for the server's `endpoint` event.
    ///
    /// # Arguments
    ///
    /// * `stream_url` - The SSE resource (e.g. `http://host/sse`).
    /// * `headers` - Extra headers added to every request; auth tokens go
    ///   here.
    /// * `timeout` - Bound on waiting for the `endpoint` event, and the
    ///   per-POST timeout afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] if the GET fails, if the stream
    /// ends, or if no `endpoint` event arrives within `timeout`; the POST
    /// URL failing to parse is also a transport error.
    pub async fn connect(
        stream_url: url::Url,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self> {
        // No global client timeout: it would sever the long-lived stream.
        let http_client = Arc::new(
            reqwest::Client::builder()
                .connect_timeout(timeout)
                .build()?,
        );

        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let last_event_id = Arc::new(RwLock::new(None));

        let mut event_rx = open_stream(
            &http_client,
            &stream_url,
            &headers,
            &last_event_id,
        )
        .await?;

        // The first event names the POST resource for this session.
        let endpoint_event = tokio::time::timeout(timeout, async {
            while let Some(event) = event_rx.recv().await {
                if event.event.as_deref() == Some("endpoint") {
                    return Some(event.data);
                }
                tracing::debug!("ignoring pre-endpoint SSE event: {:?}", event.event);
            }
            None
        })
        .await
        .map_err(|_| McpError::Transport("timed out waiting for endpoint event".to_string()))?
        .ok_or_else(|| McpError::Transport("stream ended before endpoint event".to_string()))?;

        let post_url = stream_url
            .join(&endpoint_event)
            .map_err(|e| McpError::Transport(format!("bad endpoint URL '{endpoint_event}': {e}")))?;

        spawn_router(event_rx, response_tx.clone());

        Ok(Self {
            http_client,
            stream_url,
            post_url,
            headers,
            request_timeout: timeout,
            response_tx,
            response_rx: Arc::new(tokio::sync::Mutex::new(response_rx)),
            last_event_id,
        })
    }

    /// The POST URL the server assigned to this session.
    pub fn post_url(&self) -> &url::Url {
        &self.post_url
    }

    /// Re-open the event stream after a disconnect, passing
    /// `Last-Event-ID` so the server can replay missed events. The POST
    /// URL from the original `endpoint` event is kept.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] if the GET fails.
    pub async fn reconnect(&self) -> Result<()> {
        let event_rx = open_stream(
            &self.http_client,
            &self.stream_url,
            &self.headers,
            &self.last_event_id,
        )
        .await?;
        spawn_router(event_rx, self.response_tx.clone());
        Ok(())
    }
}

/// Issue the GET and spawn the byte-level SSE parser. Returns the parsed
/// event channel.
async fn open_stream(
    http_client: &Arc<reqwest::Client>,
    stream_url: &url::Url,
    headers: &HashMap<String, String>,
    last_event_id: &Arc<RwLock<Option<String>>>,
) -> Result<mpsc::UnboundedReceiver<SseEvent>> {
    let mut request = http_client
        .get(stream_url.as_str())
        .header("Accept", "text/event-stream");
    {
        let lei = last_event_id.read().await;
        if let Some(id) = lei.as_deref() {
            request = request.header("Last-Event-ID", id);
        }
    }
    for (k, v) in headers {
        request = request.header(k.as_str(), v.as_str());
    }

    let response = request
        .send()
        .await
        .map_err(|e| McpError::Transport(format!("SSE stream request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(McpError::Transport(format!(
            "SSE stream returned HTTP {status}"
        )));
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let byte_stream = response.bytes_stream();
    let last_event_id = Arc::clone(last_event_id);
    tokio::spawn(async move {
        parse_sse_stream(byte_stream, event_tx, last_event_id).await;
    });
    Ok(event_rx)
}

/// Forward `message` events (the default event type included) to the
/// inbound channel; later `endpoint` events are ignored.
fn spawn_router(
    mut event_rx: mpsc::UnboundedReceiver<SseEvent>,
    response_tx: mpsc::UnboundedSender<String>,
) {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match event.event.as_deref() {
                Some("message") | None => {
                    if response_tx.send(event.data).is_err() {
                        break;
                    }
                }
                Some("endpoint") => {
                    tracing::debug!("ignoring repeated endpoint event");
                }
                Some(other) => {
                    tracing::debug!("ignoring unknown SSE event type: {other}");
                }
            }
        }
    });
}

#[async_trait::async_trait]
impl Transport for SseClientTransport {
    /// POST one JSON-RPC message to the session's message resource.
    ///
    /// # Errors
    ///
    /// Non-2xx statuses and request failures surface as
    /// [`McpError::Transport`].
    async fn send(&self, message: String) -> Result<()> {
        let mut request = self
            .http_client
            .post(self.post_url.as_str())
            .header("Content-Type", "application/json")
            .timeout(self.request_timeout)
            .body(message);
        for (k, v) in &self.headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("HTTP POST failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let www_authenticate = response
                .headers()
                .get("WWW-Authenticate")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            return Err(McpError::Transport(format!(
                "unauthorized: {www_authenticate}"
            )));
        }
        if !status.is_success() {
            return Err(McpError::Transport(format!(
                "HTTP POST returned status {status}"
            )));
        }

        // Some servers answer stateless POSTs with the response envelope in
        // the body instead of (or in addition to) the event stream.
        let content_type = response
            .headers()
            .get("Content-Type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if content_type.contains("application/json") {
            let body = response
                .text()
                .await
                .map_err(|e| McpError::Transport(format!("failed to read POST body: {e}")))?;
            if !body.is_empty() {
                let _ = self.response_tx.send(body);
            }
        }

        Ok(())
    }

    fn receive(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        let rx = Arc::clone(&self.response_rx);
        Box::pin(futures::stream::unfold(rx, |rx| async move {
            let mut guard = rx.lock().await;
            let item = guard.recv().await?;
            drop(guard);
            Some((item, rx))
        }))
    }

    /// Always empty; HTTP errors surface through `send`.
    fn receive_err(&self) -> Pin<Box<dyn Stream<Item = String> + Send + '_>> {
        Box::pin(futures::stream::empty())
    }
}

// ---------------------------------------------------------------------------
// SSE parser
// ---------------------------------------------------------------------------

/// Parse an SSE byte stream and forward complete events to `event_tx`.
///
/// Runs until the stream ends or errors. Field handling:
///
/// - `id:` -- stored in `last_event_id` for reconnect headers.
/// - `event: ping` / `data: [PING]` (case-insensitive) -- discarded.
/// - empty `data` -- discarded.
/// - `retry:` -- ignored; reconnect timing is the caller's responsibility.
pub async fn parse_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>>,
    event_tx: mpsc::UnboundedSender<SseEvent>,
    last_event_id: Arc<RwLock<Option<String>>>,
) {
    use futures::StreamExt;

    // Accumulates raw text between `\n\n` boundaries.
    let mut buffer = String::new();

    tokio::pin!(byte_stream);

    while let Some(chunk_result) = byte_stream.next().await {
        let chunk = match chunk_result {
            Ok(c) => c,
            Err(_) => break,
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(s) => s.to_string(),
            Err(_) => continue,
        };

        buffer.push_str(&text);

        // SSE events are separated by blank lines.
        while let Some(pos) = buffer.find("\n\n") {
            let event_block = buffer[..pos].to_string();
            buffer = buffer[pos + 2..].to_string();
            process_sse_event(&event_block, &event_tx, &last_event_id).await;
        }
    }

    if !buffer.is_empty() {
        process_sse_event(&buffer, &event_tx, &last_event_id).await;
    }
}

/// Process a single SSE event block (the text between two blank lines).
async fn process_sse_event(
    event_block: &str,
    event_tx: &mpsc::UnboundedSender<SseEvent>,
    last_event_id: &Arc<RwLock<Option<String>>>,
) {
    let mut data_lines: Vec<&str> = Vec::new();
    let mut event_type: Option<&str> = None;
    let mut event_id: Option<&str> = None;

    for line in event_block.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.trim());
        } else if let Some(value) = line.strip_prefix("id:") {
            event_id = Some(value.trim());
        } else if let Some(value) = line.strip_prefix("event:") {
            event_type = Some(value.trim());
        } else if line.starts_with("retry:") {
            // Ignored: reconnect timing is the caller's responsibility.
        }
        // Lines starting with `:` are SSE comments; all others are ignored.
    }

    if let Some(id) = event_id {
        let mut guard = last_event_id.write().await;
        *guard = Some(id.to_string());
    }

    if let Some(et) = event_type {
        if et.eq_ignore_ascii_case("ping") {
            return;
        }
    }

    let data = data_lines.join("\n");
    if data.eq_ignore_ascii_case("[ping]") || data.is_empty() {
        return;
    }

    let _ = event_tx.send(SseEvent {
        event: event_type.map(|s| s.to_string()),
        data,
    });
}
