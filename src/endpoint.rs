//! Transport-agnostic JSON-RPC 2.0 session endpoint
//!
//! This module provides [`Endpoint`], the correlation engine that one side
//! of an MCP session runs. An endpoint owns two long-running tasks over a
//! [`Transport`]: a single writer that serializes every outbound envelope in
//! submission order through a bounded queue, and a single reader that
//! classifies inbound envelopes and dispatches them.
//!
//! # Design
//!
//! - Outgoing requests are tracked in a `pending` map keyed by
//!   [`RequestId`]. Each entry holds a `oneshot::Sender` completed exactly
//!   once by the matching response, the matching error, local cancellation,
//!   a deadline, or session shutdown.
//! - Incoming requests are forked onto their own task and tracked in an
//!   `incoming` map holding a per-request [`CancellationToken`]. The peer's
//!   `notifications/cancelled` is the only way to fire it remotely;
//!   shutdown fires all of them at once (each token is a child of the
//!   endpoint's shutdown token).
//! - `notifications/progress` is routed to the sink registered for its
//!   token; unknown tokens are dropped.
//! - Either façade (client or server) registers request and notification
//!   handlers by method name. Notification handlers run inline on the
//!   reader task and must not block; request handlers are always forked.
//! - Shared mutable state sits behind `std::sync::Mutex` and is only held
//!   for short critical sections, never across an await point.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{McpError, Result};
use crate::transport::Transport;
use crate::types::{
    error_codes, CancelledNotificationParams, Implementation, JsonRpcError, JsonRpcErrorResponse,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, Message, ProgressNotificationParams,
    ProgressToken, RequestId, RequestMeta, METHOD_INITIALIZE, NOTIF_CANCELLED, NOTIF_INITIALIZED,
    NOTIF_MESSAGE, NOTIF_PROGRESS,
};

/// Capacity of the bounded outbound queue. A full queue blocks `send` (and
/// therefore `call`) until the writer drains it; messages are never dropped
/// or reordered.
pub const SEND_QUEUE_CAPACITY: usize = 64;

/// How long `close()` waits for in-flight handlers to observe cancellation
/// before abandoning them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Locally-cancelled ids are remembered so a late response is dropped
/// silently instead of warned about. The set is cleared wholesale past this
/// bound; losing an entry only upgrades a trace log to a warning.
const CANCELLED_IDS_BOUND: usize = 1024;

/// Convenience alias for a boxed, `Send`-safe async future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A request handler: receives the raw `params` value and a
/// [`RequestContext`], returns the raw `result` value or a JSON-RPC error.
type RequestHandler = Arc<
    dyn Fn(
            Option<serde_json::Value>,
            RequestContext,
        ) -> BoxFuture<'static, std::result::Result<serde_json::Value, JsonRpcError>>
        + Send
        + Sync,
>;

/// A notification handler: called inline on the reader task with the raw
/// `params` value. Must not block; spawn internally for heavy work.
type NotificationHandler = Arc<dyn Fn(Option<serde_json::Value>) + Send + Sync>;

/// A progress sink: called with each progress notification routed to the
/// token it was registered under.
pub type ProgressSink = Arc<dyn Fn(ProgressNotificationParams) + Send + Sync>;

/// Session lifecycle states.
///
/// Pending requests created before `Closing` fail with [`McpError::Closed`]
/// when the endpoint closes; new calls are refused from `Closing` on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Constructed, handshake not started.
    Created,
    /// Initialize request in flight.
    Initializing,
    /// Handshake complete; full dispatch enabled.
    Ready,
    /// `close()` in progress; no new calls accepted.
    Closing,
    /// Fully shut down.
    Closed,
}

/// What the handshake established about the remote peer.
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// The negotiated protocol revision.
    pub protocol_version: String,
    /// The peer's name and version.
    pub info: Implementation,
    /// The peer's capability record, kept raw; each façade decodes the
    /// side it cares about.
    pub capabilities: serde_json::Value,
}

/// Per-call options for [`Endpoint::call`].
#[derive(Default)]
pub struct CallOptions {
    /// Deadline for the whole call. No timer is armed when `None`.
    pub timeout: Option<Duration>,
    /// Local cancellation handle. Cancelling removes the pending slot and
    /// emits `notifications/cancelled` to the peer exactly once.
    pub cancel: Option<CancellationToken>,
    /// When set, a progress token is attached to the request's `_meta` and
    /// the sink receives every `notifications/progress` for it.
    pub progress: Option<ProgressSink>,
}

impl CallOptions {
    /// Set a deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a cancellation handle.
    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Attach a progress sink.
    #[must_use]
    pub fn with_progress(mut self, sink: impl Fn(ProgressNotificationParams) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }
}

/// Context handed to every incoming-request handler.
#[derive(Clone)]
pub struct RequestContext {
    endpoint: Endpoint,
    /// The peer's id for this request.
    pub request_id: RequestId,
    /// Progress token the caller attached, if any.
    pub progress_token: Option<ProgressToken>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// The endpoint this request arrived on. Handlers use it to issue
    /// calls back to the peer mid-request.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Cancellation handle tied to the peer's `notifications/cancelled`
    /// for this request and to endpoint shutdown. Handlers are expected to
    /// poll or propagate it.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether cancellation has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Emit `notifications/progress` for this request's token.
    ///
    /// A no-op when the caller did not attach a token.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Closed`] if the session is shutting down.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Result<()> {
        let Some(token) = &self.progress_token else {
            return Ok(());
        };
        self.endpoint
            .notify(
                NOTIF_PROGRESS,
                &ProgressNotificationParams {
                    progress_token: token.clone(),
                    progress,
                    total,
                    message,
                },
            )
            .await
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("progress_token", &self.progress_token)
            .finish_non_exhaustive()
    }
}

struct PendingSlot {
    tx: oneshot::Sender<std::result::Result<serde_json::Value, JsonRpcError>>,
    method: String,
}

struct EndpointInner {
    /// Monotonically increasing request id counter.
    next_id: AtomicI64,
    state: Mutex<EndpointState>,
    /// In-flight outgoing requests waiting for a response.
    pending: Mutex<HashMap<RequestId, PendingSlot>>,
    /// Ids of locally cancelled or timed-out calls whose response may still
    /// arrive and must be dropped silently.
    cancelled_calls: Mutex<HashSet<RequestId>>,
    /// In-flight incoming requests and their cancellation sources.
    incoming: Mutex<HashMap<RequestId, CancellationToken>>,
    /// Progress sinks keyed by the token attached to the outgoing request.
    progress_sinks: Mutex<HashMap<ProgressToken, ProgressSink>>,
    request_handlers: Mutex<HashMap<String, RequestHandler>>,
    notification_handlers: Mutex<HashMap<String, NotificationHandler>>,
    /// Bounded ordered write queue; `None` once closing.
    outbound_tx: Mutex<Option<mpsc::Sender<String>>>,
    /// Fired on shutdown; parent of every incoming request's token.
    shutdown: CancellationToken,
    /// Handshake results, set by the owning façade.
    peer: Mutex<Option<PeerInfo>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

/// One side of an MCP session.
///
/// Cheap to clone; all clones share the same session state. The endpoint
/// is the sole owner of the transport tasks: dropping every clone after
/// [`Endpoint::close`] releases the transport.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mcpkit::endpoint::{CallOptions, Endpoint};
/// use mcpkit::transport::stream::StreamTransport;
///
/// # #[tokio::main]
/// # async fn main() -> mcpkit::error::Result<()> {
/// let (local, _remote) = StreamTransport::pair(4096);
/// let endpoint = Endpoint::new(Arc::new(local));
/// endpoint.mark_ready();
/// let _pong: serde_json::Value = endpoint
///     .call("ping", serde_json::json!({}), CallOptions::default())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<EndpointInner>,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("state", &self.state())
            .field("next_id", &self.inner.next_id.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Build an endpoint over `transport` and start its reader and writer
    /// tasks.
    ///
    /// The endpoint starts in [`EndpointState::Created`]; a façade performs
    /// the handshake and calls [`Endpoint::mark_ready`].
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(SEND_QUEUE_CAPACITY);
        let shutdown = CancellationToken::new();

        let inner = Arc::new(EndpointInner {
            next_id: AtomicI64::new(1),
            state: Mutex::new(EndpointState::Created),
            pending: Mutex::new(HashMap::new()),
            cancelled_calls: Mutex::new(HashSet::new()),
            incoming: Mutex::new(HashMap::new()),
            progress_sinks: Mutex::new(HashMap::new()),
            request_handlers: Mutex::new(HashMap::new()),
            notification_handlers: Mutex::new(HashMap::new()),
            outbound_tx: Mutex::new(Some(outbound_tx)),
            shutdown: shutdown.clone(),
            peer: Mutex::new(None),
            writer: Mutex::new(None),
            reader: Mutex::new(None),
        });

        // Writer: the single producer that puts envelopes on the wire in
        // submission order. A transport write failure is unrecoverable and
        // tears the session down.
        let writer_transport = Arc::clone(&transport);
        let writer_shutdown = shutdown.clone();
        let writer = tokio::spawn(async move {
            while let Some(line) = outbound_rx.recv().await {
                if let Err(e) = writer_transport.send(line).await {
                    tracing::error!("transport write failed, closing session: {e}");
                    writer_shutdown.cancel();
                    break;
                }
            }
        });

        // Reader: the single consumer that classifies and dispatches
        // envelopes in arrival order, forking a task per incoming request.
        let endpoint = Self {
            inner: Arc::clone(&inner),
        };
        let reader_shutdown = shutdown;
        let reader = tokio::spawn(async move {
            let mut stream = transport.receive();
            loop {
                tokio::select! {
                    biased;

                    _ = reader_shutdown.cancelled() => break,

                    item = stream.next() => match item {
                        Some(line) => endpoint.dispatch_line(&line).await,
                        None => {
                            endpoint.on_transport_eof();
                            break;
                        }
                    }
                }
            }
        });

        *inner.writer.lock().unwrap() = Some(writer);
        *inner.reader.lock().unwrap() = Some(reader);

        Self { inner }
    }

    // -- state and peer bookkeeping --------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> EndpointState {
        *self.inner.state.lock().unwrap()
    }

    /// Enter [`EndpointState::Initializing`]; called by the façade when the
    /// handshake starts.
    pub fn mark_initializing(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == EndpointState::Created {
            *state = EndpointState::Initializing;
        }
    }

    /// Enter [`EndpointState::Ready`]; called by the façade when the
    /// handshake completes. Handlers registered afterwards take effect
    /// immediately.
    pub fn mark_ready(&self) {
        let mut state = self.inner.state.lock().unwrap();
        if matches!(*state, EndpointState::Created | EndpointState::Initializing) {
            *state = EndpointState::Ready;
        }
    }

    /// Record what the handshake established about the peer.
    pub fn set_peer(&self, peer: PeerInfo) {
        *self.inner.peer.lock().unwrap() = Some(peer);
    }

    /// The peer's handshake record, once established.
    pub fn peer(&self) -> Option<PeerInfo> {
        self.inner.peer.lock().unwrap().clone()
    }

    // -- handler registration --------------------------------------------

    /// Register a handler for an incoming request method.
    ///
    /// The handler receives the raw `params` value and a
    /// [`RequestContext`]; its return value becomes the `result` (or
    /// `error`) envelope. Registering a second handler for the same method
    /// replaces the first.
    pub fn on_request<F>(&self, method: impl Into<String>, f: F)
    where
        F: Fn(
                Option<serde_json::Value>,
                RequestContext,
            ) -> BoxFuture<'static, std::result::Result<serde_json::Value, JsonRpcError>>
            + Send
            + Sync
            + 'static,
    {
        self.inner
            .request_handlers
            .lock()
            .unwrap()
            .insert(method.into(), Arc::new(f));
    }

    /// Register a handler for an incoming notification method.
    ///
    /// The handler runs inline on the reader task and must not block.
    /// Registering a second handler for the same method replaces the first.
    pub fn on_notification<F>(&self, method: impl Into<String>, f: F)
    where
        F: Fn(Option<serde_json::Value>) + Send + Sync + 'static,
    {
        self.inner
            .notification_handlers
            .lock()
            .unwrap()
            .insert(method.into(), Arc::new(f));
    }

    // -- outgoing --------------------------------------------------------

    /// Send a request and await its typed result.
    ///
    /// Allocates the next id, installs the pending slot, writes the
    /// request, then suspends until one of the four terminal outcomes.
    ///
    /// # Errors
    ///
    /// [`McpError::Rpc`] when the peer answers with an error envelope,
    /// [`McpError::Timeout`] when `options.timeout` elapses,
    /// [`McpError::Cancelled`] when `options.cancel` fires, and
    /// [`McpError::Closed`] when the session shuts down first.
    pub async fn call<P, R>(&self, method: &str, params: P, options: CallOptions) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let params = if params.is_null() { None } else { Some(params) };
        let value = self.call_value(method, params, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Untyped variant of [`Endpoint::call`]: raw params in, raw result out.
    pub async fn call_value(
        &self,
        method: &str,
        mut params: Option<serde_json::Value>,
        options: CallOptions,
    ) -> Result<serde_json::Value> {
        if matches!(
            self.state(),
            EndpointState::Closing | EndpointState::Closed
        ) {
            return Err(McpError::Closed);
        }

        let id = RequestId::Number(self.inner.next_id.fetch_add(1, Ordering::SeqCst));

        // When the caller wants progress, attach a token derived from the
        // request id (unique per outstanding request) and register the sink.
        let progress_token = match options.progress {
            Some(sink) => {
                let token = ProgressToken::from(&id);
                let obj = params.get_or_insert_with(|| serde_json::json!({}));
                if let Some(map) = obj.as_object_mut() {
                    let meta = map
                        .entry("_meta".to_string())
                        .or_insert_with(|| serde_json::json!({}));
                    if let Some(meta) = meta.as_object_mut() {
                        meta.insert(
                            "progressToken".to_string(),
                            serde_json::to_value(&token)?,
                        );
                    }
                }
                self.inner
                    .progress_sinks
                    .lock()
                    .unwrap()
                    .insert(token.clone(), sink);
                Some(token)
            }
            None => None,
        };

        // Install the slot before sending so the response can never arrive
        // before we are ready to receive it.
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().unwrap().insert(
            id.clone(),
            PendingSlot {
                tx,
                method: method.to_string(),
            },
        );

        let request = Message::Request(JsonRpcRequest::new(id.clone(), method, params));
        if let Err(e) = self.send_message(&request).await {
            self.inner.pending.lock().unwrap().remove(&id);
            self.clear_progress_sink(&progress_token);
            return Err(e);
        }

        let cancel = options.cancel.unwrap_or_default();
        let deadline = async {
            match options.timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                self.abandon_call(&id).await;
                Err(McpError::Cancelled { method: method.to_string() })
            }

            _ = &mut deadline => {
                self.abandon_call(&id).await;
                Err(McpError::Timeout { method: method.to_string() })
            }

            slot = rx => match slot {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(rpc)) => Err(McpError::Rpc(rpc)),
                // Slot dropped without completion: session shut down.
                Err(_) => Err(McpError::Closed),
            }
        };

        self.clear_progress_sink(&progress_token);
        outcome
    }

    /// Send a fire-and-forget notification.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Closed`] if the session is shutting down.
    pub async fn notify<P: serde::Serialize>(&self, method: &str, params: P) -> Result<()> {
        let value = serde_json::to_value(params)?;
        let params = if value.is_null() { None } else { Some(value) };
        self.send_message(&Message::Notification(JsonRpcNotification::new(
            method, params,
        )))
        .await
    }

    /// Remove the pending slot, remember the id so a late response stays
    /// silent, and tell the peer to stop work. Called exactly once per
    /// cancelled or timed-out call.
    async fn abandon_call(&self, id: &RequestId) {
        self.inner.pending.lock().unwrap().remove(id);
        {
            let mut cancelled = self.inner.cancelled_calls.lock().unwrap();
            if cancelled.len() >= CANCELLED_IDS_BOUND {
                cancelled.clear();
            }
            cancelled.insert(id.clone());
        }
        let params = CancelledNotificationParams {
            request_id: id.clone(),
            reason: None,
        };
        if let Err(e) = self.notify(NOTIF_CANCELLED, &params).await {
            tracing::debug!("could not deliver cancellation for {id}: {e}");
        }
    }

    fn clear_progress_sink(&self, token: &Option<ProgressToken>) {
        if let Some(token) = token {
            self.inner.progress_sinks.lock().unwrap().remove(token);
        }
    }

    async fn send_message(&self, message: &Message) -> Result<()> {
        let line = message.to_line()?;
        let tx = self.inner.outbound_tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(line).await.map_err(|_| McpError::Closed),
            None => Err(McpError::Closed),
        }
    }

    // -- inbound dispatch ------------------------------------------------

    async fn dispatch_line(&self, raw: &str) {
        let message = match Message::from_line(raw) {
            Ok(m) => m,
            Err(e) => {
                // Malformed envelope: log and continue; only broken framing
                // tears the session down.
                tracing::warn!("failed to parse inbound message: {e}");
                return;
            }
        };

        match message {
            Message::Response(response) => {
                self.complete_pending(&response.id, Ok(response.result));
            }
            Message::Error(error) => match error.id {
                Some(id) => self.complete_pending(&id, Err(error.error)),
                None => {
                    tracing::warn!(
                        "peer reported request-independent error {}: {}",
                        error.error.code,
                        error.error.message
                    );
                }
            },
            Message::Request(request) => self.dispatch_request(request).await,
            Message::Notification(notification) => {
                self.dispatch_notification(notification);
            }
        }
    }

    /// Complete the matching pending slot, or drop the value.
    fn complete_pending(
        &self,
        id: &RequestId,
        outcome: std::result::Result<serde_json::Value, JsonRpcError>,
    ) {
        let slot = self.inner.pending.lock().unwrap().remove(id);
        match slot {
            // A dropped receiver means the caller already gave up; that is
            // indistinguishable from a benign race and stays quiet.
            Some(slot) => {
                tracing::trace!("completing {} for request {id}", slot.method);
                let _ = slot.tx.send(outcome);
            }
            None => {
                let was_cancelled = self.inner.cancelled_calls.lock().unwrap().remove(id);
                if was_cancelled {
                    tracing::trace!("dropping late response for cancelled request {id}");
                } else {
                    tracing::warn!("dropping response for unknown request id {id}");
                }
            }
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;

        // Nothing but the handshake itself is dispatched before Ready.
        let state = self.state();
        if state != EndpointState::Ready && method != METHOD_INITIALIZE {
            let error = JsonRpcError {
                code: error_codes::INVALID_REQUEST,
                message: format!("session not initialized; cannot dispatch {method}"),
                data: None,
            };
            let reply = Message::Error(JsonRpcErrorResponse::new(Some(id), error));
            if let Err(e) = self.send_message(&reply).await {
                tracing::debug!("failed to reject early request: {e}");
            }
            return;
        }

        let handler = self
            .inner
            .request_handlers
            .lock()
            .unwrap()
            .get(&method)
            .cloned();

        let Some(handler) = handler else {
            let error = JsonRpcError {
                code: error_codes::METHOD_NOT_FOUND,
                message: format!("Method not found: {method}"),
                data: None,
            };
            let reply = Message::Error(JsonRpcErrorResponse::new(Some(id), error));
            if let Err(e) = self.send_message(&reply).await {
                tracing::debug!("failed to send method-not-found: {e}");
            }
            return;
        };

        let cancellation = self.inner.shutdown.child_token();
        self.inner
            .incoming
            .lock()
            .unwrap()
            .insert(id.clone(), cancellation.clone());

        let context = RequestContext {
            endpoint: self.clone(),
            request_id: id.clone(),
            progress_token: RequestMeta::progress_token_of(params.as_ref()),
            cancellation: cancellation.clone(),
        };

        // Fork: handler execution is concurrent; the reader moves on to the
        // next envelope immediately.
        let endpoint = self.clone();
        tokio::spawn(async move {
            // The handler runs on its own task so a panic is contained and
            // surfaces as a JoinError instead of killing the dispatcher.
            let mut run = tokio::spawn(handler(params, context));

            let finished = tokio::select! {
                biased;

                _ = cancellation.cancelled() => None,

                finished = &mut run => Some(finished),
            };

            let outcome = match finished {
                // The token is only triggered; the handler is expected to
                // observe it and unwind on its own. Whatever it returns,
                // the reply is suppressed.
                None => {
                    tracing::debug!("request {id} cancelled by peer; suppressing reply");
                    let _ = run.await;
                    None
                }
                Some(Ok(Ok(value))) => Some(Ok(value)),
                Some(Ok(Err(rpc))) => Some(Err(rpc)),
                Some(Err(join_error)) => {
                    tracing::error!("handler for {method} failed: {join_error}");
                    Some(Err(JsonRpcError {
                        code: error_codes::INTERNAL_ERROR,
                        message: "internal error".to_string(),
                        data: None,
                    }))
                }
            };

            endpoint.inner.incoming.lock().unwrap().remove(&id);

            // Exactly one Response or Error per request; a cancelled
            // request gets neither.
            if let Some(outcome) = outcome {
                let reply = match outcome {
                    Ok(value) => Message::Response(JsonRpcResponse::new(id, value)),
                    Err(rpc) => Message::Error(JsonRpcErrorResponse::new(Some(id), rpc)),
                };
                if let Err(e) = endpoint.send_message(&reply).await {
                    tracing::debug!("failed to send response: {e}");
                }
            }
        });
    }

    fn dispatch_notification(&self, notification: JsonRpcNotification) {
        let JsonRpcNotification { method, params, .. } = notification;

        match method.as_str() {
            NOTIF_CANCELLED => {
                let Some(parsed) = params
                    .and_then(|p| serde_json::from_value::<CancelledNotificationParams>(p).ok())
                else {
                    tracing::debug!("malformed cancellation notification; ignoring");
                    return;
                };
                let token = self
                    .inner
                    .incoming
                    .lock()
                    .unwrap()
                    .get(&parsed.request_id)
                    .cloned();
                match token {
                    Some(token) => token.cancel(),
                    None => tracing::debug!(
                        "cancellation for unknown request id {}; ignoring",
                        parsed.request_id
                    ),
                }
            }

            NOTIF_PROGRESS => {
                let Some(parsed) = params
                    .and_then(|p| serde_json::from_value::<ProgressNotificationParams>(p).ok())
                else {
                    tracing::debug!("malformed progress notification; ignoring");
                    return;
                };
                let sink = self
                    .inner
                    .progress_sinks
                    .lock()
                    .unwrap()
                    .get(&parsed.progress_token)
                    .cloned();
                match sink {
                    Some(sink) => sink(parsed),
                    None => tracing::debug!(
                        "progress for unknown token {}; ignoring",
                        parsed.progress_token
                    ),
                }
            }

            other => {
                // During handshake only the lifecycle and logging
                // notifications flow; everything else waits for Ready.
                let state = self.state();
                if state != EndpointState::Ready
                    && other != NOTIF_INITIALIZED
                    && other != NOTIF_MESSAGE
                {
                    tracing::debug!("dropping notification {other} before handshake completed");
                    return;
                }
                let handler = self
                    .inner
                    .notification_handlers
                    .lock()
                    .unwrap()
                    .get(other)
                    .cloned();
                match handler {
                    Some(handler) => handler(params),
                    None => tracing::debug!("no handler for notification {other}; ignoring"),
                }
            }
        }
    }

    // -- shutdown --------------------------------------------------------

    /// Transport reached end-of-stream: fail everything outstanding.
    fn on_transport_eof(&self) {
        tracing::debug!("transport closed by peer");
        *self.inner.state.lock().unwrap() = EndpointState::Closed;
        // Dropping the slots completes every waiting call with Closed.
        self.inner.pending.lock().unwrap().clear();
        self.inner.progress_sinks.lock().unwrap().clear();
        self.inner.outbound_tx.lock().unwrap().take();
        self.inner.shutdown.cancel();
    }

    /// Shut the session down.
    ///
    /// Marks the endpoint `Closing`, refuses new calls, drains the
    /// outbound queue, cancels in-flight incoming handlers and waits
    /// (bounded) for them to finish, then fails all remaining pending
    /// calls with [`McpError::Closed`]. Idempotent.
    pub async fn close(&self) {
        {
            let mut state = self.inner.state.lock().unwrap();
            if matches!(*state, EndpointState::Closing | EndpointState::Closed) {
                return;
            }
            *state = EndpointState::Closing;
        }

        // Drop the sender so the writer drains what was already submitted
        // and exits; then join it.
        self.inner.outbound_tx.lock().unwrap().take();
        let writer = self.inner.writer.lock().unwrap().take();
        if let Some(handle) = writer {
            let _ = handle.await;
        }

        // Cancel in-flight handlers (their tokens are children of the
        // shutdown token) and the reader loop.
        self.inner.shutdown.cancel();

        let grace = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while !self.inner.incoming.lock().unwrap().is_empty()
            && tokio::time::Instant::now() < grace
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let abandoned = self.inner.incoming.lock().unwrap().len();
        if abandoned > 0 {
            tracing::warn!("abandoning {abandoned} in-flight request(s) at shutdown");
        }

        self.inner.pending.lock().unwrap().clear();
        self.inner.progress_sinks.lock().unwrap().clear();

        let reader = self.inner.reader.lock().unwrap().take();
        if let Some(handle) = reader {
            let _ = handle.await;
        }

        *self.inner.state.lock().unwrap() = EndpointState::Closed;
    }

    /// Resolves once the session has begun shutting down, whether from a
    /// local [`Endpoint::close`] or a peer disconnect.
    pub async fn wait_closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    /// Fire-and-forget variant of [`Endpoint::close`] for non-async
    /// contexts (drop guards, connection reapers).
    pub fn close_nowait(&self) {
        let endpoint = self.clone();
        tokio::spawn(async move {
            endpoint.close().await;
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::fake::FakeTransport;
    use std::sync::atomic::AtomicUsize;

    fn ready_endpoint() -> (Endpoint, crate::transport::fake::FakeTransportHandle) {
        let (transport, handle) = FakeTransport::new();
        let endpoint = Endpoint::new(Arc::new(transport));
        endpoint.mark_ready();
        (endpoint, handle)
    }

    #[tokio::test]
    async fn test_call_resolves_with_matching_response() {
        let (endpoint, mut handle) = ready_endpoint();

        let caller = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint
                    .call::<_, serde_json::Value>(
                        "ping",
                        serde_json::json!({}),
                        CallOptions::default().with_timeout(Duration::from_secs(5)),
                    )
                    .await
            })
        };

        let sent = handle.next_outbound().await.unwrap();
        assert_eq!(sent["method"], "ping");
        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": sent["id"],
            "result": {"ok": true}
        }));

        let result = caller.await.unwrap().unwrap();
        assert_eq!(result["ok"], true);
    }

    #[tokio::test]
    async fn test_generated_ids_are_pairwise_distinct() {
        let (endpoint, mut handle) = ready_endpoint();

        for _ in 0..50 {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                let _: Result<serde_json::Value> = endpoint
                    .call(
                        "ping",
                        serde_json::json!({}),
                        CallOptions::default().with_timeout(Duration::from_millis(200)),
                    )
                    .await;
            });
        }

        let mut seen = HashSet::new();
        while seen.len() < 50 {
            let sent = tokio::time::timeout(Duration::from_secs(2), handle.next_outbound())
                .await
                .expect("timed out")
                .expect("channel closed");
            // Skip the cancellation notifications emitted by timed-out calls.
            if sent["method"] != "ping" {
                continue;
            }
            let id = sent["id"].as_i64().expect("integer id");
            assert!(seen.insert(id), "id {id} allocated twice");
        }
    }

    #[tokio::test]
    async fn test_error_envelope_surfaces_as_rpc_error() {
        let (endpoint, mut handle) = ready_endpoint();

        let caller = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint
                    .call::<_, serde_json::Value>(
                        "tools/call",
                        serde_json::json!({"name": "nope"}),
                        CallOptions::default().with_timeout(Duration::from_secs(5)),
                    )
                    .await
            })
        };

        let sent = handle.next_outbound().await.unwrap();
        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": sent["id"],
            "error": {"code": -32602, "message": "unknown tool: nope"}
        }));

        let err = caller.await.unwrap().unwrap_err();
        match err {
            McpError::Rpc(rpc) => {
                assert_eq!(rpc.code, error_codes::INVALID_PARAMS);
                assert!(rpc.message.contains("nope"));
            }
            other => panic!("expected Rpc error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_fires_and_late_response_dropped_silently() {
        let (endpoint, mut handle) = ready_endpoint();

        let result: Result<serde_json::Value> = endpoint
            .call(
                "tools/list",
                serde_json::json!({}),
                CallOptions::default().with_timeout(Duration::from_millis(50)),
            )
            .await;
        assert!(matches!(result, Err(McpError::Timeout { .. })));

        // The timed-out call must have told the peer to stop.
        let request = handle.next_outbound().await.unwrap();
        let cancelled = handle.next_outbound().await.unwrap();
        assert_eq!(cancelled["method"], NOTIF_CANCELLED);
        assert_eq!(cancelled["params"]["requestId"], request["id"]);

        // A late response for that id is swallowed without completing
        // anything (nothing to assert beyond not panicking; the pending
        // map no longer contains the id).
        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {}
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(endpoint.inner.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_cancel_emits_exactly_one_cancelled_notification() {
        let (endpoint, mut handle) = ready_endpoint();
        let cancel = CancellationToken::new();

        let caller = {
            let endpoint = endpoint.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                endpoint
                    .call::<_, serde_json::Value>(
                        "tools/call",
                        serde_json::json!({"name": "slow"}),
                        CallOptions::default().with_cancel(cancel),
                    )
                    .await
            })
        };

        let request = handle.next_outbound().await.unwrap();
        cancel.cancel();

        let result = caller.await.unwrap();
        assert!(matches!(result, Err(McpError::Cancelled { .. })));

        let cancelled = handle.next_outbound().await.unwrap();
        assert_eq!(cancelled["method"], NOTIF_CANCELLED);
        assert_eq!(cancelled["params"]["requestId"], request["id"]);

        // Exactly one: nothing further on the wire.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_incoming_request_dispatched_and_answered_once() {
        let (endpoint, mut handle) = ready_endpoint();

        endpoint.on_request("echo/upper", |params, _ctx| {
            Box::pin(async move {
                let text = params
                    .as_ref()
                    .and_then(|p| p.get("text"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_uppercase();
                Ok(serde_json::json!({"text": text}))
            })
        });

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 9,
            "method": "echo/upper",
            "params": {"text": "hi"}
        }));

        let reply = handle.next_outbound().await.unwrap();
        assert_eq!(reply["id"], 9);
        assert_eq!(reply["result"]["text"], "HI");

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(
            handle.outbound_rx.try_recv().is_err(),
            "exactly one reply per request"
        );
    }

    #[tokio::test]
    async fn test_unknown_method_gets_method_not_found() {
        let (_endpoint, mut handle) = ready_endpoint();

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "no/such/method"
        }));

        let reply = handle.next_outbound().await.unwrap();
        assert_eq!(reply["error"]["code"], error_codes::METHOD_NOT_FOUND);
        assert!(reply["error"]["message"]
            .as_str()
            .unwrap()
            .contains("no/such/method"));
    }

    #[tokio::test]
    async fn test_request_rejected_before_handshake() {
        let (transport, mut handle) = FakeTransport::new();
        let endpoint = Endpoint::new(Arc::new(transport));
        // State stays Created: no mark_ready.
        endpoint.on_request("ping", |_p, _c| Box::pin(async { Ok(serde_json::json!({})) }));

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "ping"
        }));

        let reply = handle.next_outbound().await.unwrap();
        assert_eq!(reply["error"]["code"], error_codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_never_produces_a_response() {
        let (endpoint, mut handle) = ready_endpoint();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);

        endpoint.on_notification("notifications/test", move |_params| {
            hits_clone.fetch_add(1, Ordering::SeqCst);
        });

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "notifications/test"
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(
            handle.outbound_rx.try_recv().is_err(),
            "notifications must not be answered"
        );
    }

    #[tokio::test]
    async fn test_peer_cancellation_fires_handler_token_and_suppresses_reply() {
        let (endpoint, mut handle) = ready_endpoint();
        let observed = Arc::new(AtomicUsize::new(0));
        let observed_clone = Arc::clone(&observed);

        endpoint.on_request("slow/op", move |_params, ctx| {
            let observed = Arc::clone(&observed_clone);
            Box::pin(async move {
                ctx.cancellation().cancelled().await;
                observed.fetch_add(1, Ordering::SeqCst);
                // Even though the handler noticed and returned, the reply
                // is suppressed because the request was cancelled.
                Ok(serde_json::json!({}))
            })
        });

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 11,
            "method": "slow/op"
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": NOTIF_CANCELLED,
            "params": {"requestId": 11}
        }));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            handle.outbound_rx.try_recv().is_err(),
            "cancelled request must not be answered"
        );
        assert!(endpoint.inner.incoming.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_for_unknown_id_dropped_silently() {
        let (_endpoint, mut handle) = ready_endpoint();
        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": NOTIF_CANCELLED,
            "params": {"requestId": 999}
        }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_progress_routed_to_registered_sink() {
        let (endpoint, mut handle) = ready_endpoint();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();

        let caller = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint
                    .call::<_, serde_json::Value>(
                        "tools/call",
                        serde_json::json!({"name": "longRunningOperation"}),
                        CallOptions::default().with_progress(move |p| {
                            let _ = progress_tx.send(p);
                        }),
                    )
                    .await
            })
        };

        let request = handle.next_outbound().await.unwrap();
        let token = request["params"]["_meta"]["progressToken"].clone();
        assert!(!token.is_null(), "progress token must be attached");

        for step in 1..=3 {
            handle.inject(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": NOTIF_PROGRESS,
                "params": {"progressToken": token, "progress": step, "total": 3}
            }));
        }

        for step in 1..=3 {
            let p = tokio::time::timeout(Duration::from_secs(1), progress_rx.recv())
                .await
                .expect("timed out")
                .expect("sink dropped");
            assert_eq!(p.progress, f64::from(step));
        }

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": request["id"],
            "result": {"content": [], "isError": false}
        }));
        caller.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_progress_for_unknown_token_dropped() {
        let (_endpoint, mut handle) = ready_endpoint();
        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": NOTIF_PROGRESS,
            "params": {"progressToken": "ghost", "progress": 1}
        }));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(handle.outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_close_fails_outstanding_calls_with_closed() {
        let (endpoint, mut handle) = ready_endpoint();

        let caller = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint
                    .call::<_, serde_json::Value>(
                        "tools/list",
                        serde_json::json!({}),
                        CallOptions::default(),
                    )
                    .await
            })
        };

        // Wait for the request to hit the wire, then close.
        let _ = handle.next_outbound().await.unwrap();
        endpoint.close().await;

        let result = caller.await.unwrap();
        assert!(matches!(result, Err(McpError::Closed)));
        assert_eq!(endpoint.state(), EndpointState::Closed);

        // New calls are refused immediately.
        let refused: Result<serde_json::Value> = endpoint
            .call("ping", serde_json::json!({}), CallOptions::default())
            .await;
        assert!(matches!(refused, Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_transport_eof_fails_pending_calls() {
        let (transport, handle) = FakeTransport::new();
        let endpoint = Endpoint::new(Arc::new(transport));
        endpoint.mark_ready();

        let caller = {
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                endpoint
                    .call::<_, serde_json::Value>(
                        "tools/list",
                        serde_json::json!({}),
                        CallOptions::default(),
                    )
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        // Dropping the handle closes the inbound channel: end-of-stream.
        drop(handle);

        let result = tokio::time::timeout(Duration::from_secs(2), caller)
            .await
            .expect("call should fail promptly after EOF")
            .unwrap();
        assert!(matches!(result, Err(McpError::Closed)));
    }

    #[tokio::test]
    async fn test_writer_preserves_submission_order() {
        let (endpoint, mut handle) = ready_endpoint();

        for i in 0..20 {
            endpoint
                .notify("notifications/test", serde_json::json!({"seq": i}))
                .await
                .unwrap();
        }

        for i in 0..20 {
            let sent = handle.next_outbound().await.unwrap();
            assert_eq!(sent["params"]["seq"], i);
        }
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_internal_error() {
        let (endpoint, mut handle) = ready_endpoint();
        endpoint.on_request("explode", |_p, _c| {
            Box::pin(async { panic!("boom") })
        });

        handle.inject(&serde_json::json!({
            "jsonrpc": "2.0",
            "id": 5,
            "method": "explode"
        }));

        let reply = handle.next_outbound().await.unwrap();
        assert_eq!(reply["error"]["code"], error_codes::INTERNAL_ERROR);
        // The panic message must not leak to the peer.
        assert_eq!(reply["error"]["message"], "internal error");
    }
}
