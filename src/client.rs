//! Typed MCP client façade over an [`Endpoint`]
//!
//! This module provides two types that represent the two phases of an MCP
//! client session:
//!
//! - [`Client`] -- an uninitialized client. Call [`Client::initialize`] to
//!   perform the `initialize` / `notifications/initialized` handshake and
//!   receive an [`InitializedClient`].
//! - [`InitializedClient`] -- a fully negotiated session. All MCP methods
//!   (`tools/list`, `tools/call`, `resources/*`, `prompts/*`, `ping`,
//!   `logging/setLevel`, `completion/complete`) are available as typed
//!   async methods. Handlers for server-initiated requests (sampling,
//!   roots, elicitation) are registered on either phase and serviced for
//!   the lifetime of the session.
//!
//! # Design
//!
//! All pagination is handled by the `list_*` helpers: they follow
//! `nextCursor` until the server stops returning one, accumulating results
//! before returning. The matching `*_page` methods expose one page at a
//! time for callers that want manual control.
//!
//! Neither type owns a transport directly; both wrap an [`Endpoint`], so a
//! client can be layered over stdio, an in-memory stream, or SSE without
//! changes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::endpoint::{BoxFuture, CallOptions, Endpoint, PeerInfo};
use crate::error::{McpError, Result};
use crate::transport::Transport;
use crate::types::{
    CallToolParams, CallToolResult, ClientCapabilities, CompleteParams, CompleteResult,
    Completion, CompletionArgument, CompletionReference, CreateMessageParams, CreateMessageResult,
    ElicitationCreateParams, ElicitationResult, GetPromptParams, GetPromptResult, Implementation,
    InitializeParams, InitializeResult, JsonRpcError, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListRootsResult, ListToolsResult,
    LoggingLevel, LoggingMessageParams, PaginatedParams, Prompt, ReadResourceParams,
    ReadResourceResult, Resource, ResourceContents, ResourceTemplate, ResourceUpdatedParams, Root,
    SetLevelParams, SubscribeParams, Tool, LATEST_PROTOCOL_VERSION, METHOD_COMPLETION_COMPLETE,
    METHOD_ELICITATION_CREATE, METHOD_INITIALIZE, METHOD_LOGGING_SET_LEVEL, METHOD_PING,
    METHOD_PROMPTS_GET, METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_RESOURCES_SUBSCRIBE, METHOD_RESOURCES_TEMPLATES_LIST, METHOD_RESOURCES_UNSUBSCRIBE,
    METHOD_ROOTS_LIST, METHOD_SAMPLING_CREATE_MESSAGE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    NOTIF_INITIALIZED, NOTIF_MESSAGE, NOTIF_PROMPTS_LIST_CHANGED, NOTIF_RESOURCES_LIST_CHANGED,
    NOTIF_RESOURCES_UPDATED, NOTIF_ROOTS_LIST_CHANGED, NOTIF_TOOLS_LIST_CHANGED,
    SUPPORTED_PROTOCOL_VERSIONS,
};

/// Mandatory timeout for the `initialize` round trip.
pub const INITIALIZE_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Capability flag enum
// ---------------------------------------------------------------------------

/// Identifies a capability the server may have advertised during the
/// handshake. Used with [`InitializedClient::capable`] before issuing
/// requests the server might not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerCapabilityFlag {
    /// Server exposes tools via `tools/list` and `tools/call`.
    Tools,
    /// Server exposes resources via `resources/list` and `resources/read`.
    Resources,
    /// Server supports `resources/subscribe`.
    ResourceSubscriptions,
    /// Server exposes prompts via `prompts/list` and `prompts/get`.
    Prompts,
    /// Server supports `logging/setLevel` and log notifications.
    Logging,
    /// Server supports `completion/complete`.
    Completions,
    /// Server advertises experimental capabilities.
    Experimental,
}

// ---------------------------------------------------------------------------
// Handler traits for server-initiated requests
// ---------------------------------------------------------------------------

/// Callback invoked when the server sends a `sampling/createMessage`
/// request.
///
/// Implementors should run the host LLM and return the completion. The
/// future must be `'static` because it is stored behind an `Arc` and
/// driven from a dispatch task.
pub trait SamplingHandler: Send + Sync {
    /// Generate a completion in response to a server-initiated sampling
    /// request.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying provider fails; an
    /// [`McpError::Rpc`] surfaces to the server verbatim, anything else as
    /// an internal error.
    fn create_message<'a>(
        &'a self,
        params: CreateMessageParams,
    ) -> BoxFuture<'a, Result<CreateMessageResult>>;
}

/// Callback invoked when the server sends an `elicitation/create` request.
///
/// Implementors should present the elicitation to the user (form, terminal
/// prompt, etc.) and return the user's response.
pub trait ElicitationHandler: Send + Sync {
    /// Collect structured user input for a server-initiated elicitation.
    ///
    /// # Errors
    ///
    /// Returns an error if the UI interaction fails.
    fn create_elicitation<'a>(
        &'a self,
        params: ElicitationCreateParams,
    ) -> BoxFuture<'a, Result<ElicitationResult>>;
}

type UpdateListener = Arc<dyn Fn(&str) + Send + Sync>;
type LogListener = Arc<dyn Fn(LoggingMessageParams) + Send + Sync>;

/// State shared between [`Client`], [`InitializedClient`], and the
/// endpoint-registered handlers.
struct ClientState {
    endpoint: Endpoint,
    roots: Mutex<Vec<Root>>,
    sampling: Mutex<Option<Arc<dyn SamplingHandler>>>,
    elicitation: Mutex<Option<Arc<dyn ElicitationHandler>>>,
    update_listeners: Mutex<HashMap<String, Vec<UpdateListener>>>,
    log_listener: Mutex<Option<LogListener>>,
}

// ---------------------------------------------------------------------------
// Client -- uninitialized
// ---------------------------------------------------------------------------

/// An uninitialized MCP client session.
///
/// Wraps an [`Endpoint`] and provides [`Client::initialize`], which
/// performs the handshake and returns an [`InitializedClient`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use mcpkit::client::Client;
/// use mcpkit::transport::stream::StreamTransport;
/// use mcpkit::types::{ClientCapabilities, Implementation};
///
/// # #[tokio::main]
/// # async fn main() -> mcpkit::error::Result<()> {
/// let (local, _remote) = StreamTransport::pair(4096);
/// let client = Client::over(Arc::new(local));
/// let session = client
///     .initialize(
///         Implementation { name: "host".into(), version: "1.0".into() },
///         ClientCapabilities::default(),
///     )
///     .await?;
/// let tools = session.list_tools().await?;
/// # let _ = tools;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    state: Arc<ClientState>,
}

impl Client {
    /// Wrap an existing endpoint.
    pub fn new(endpoint: Endpoint) -> Self {
        let state = Arc::new(ClientState {
            endpoint,
            roots: Mutex::new(Vec::new()),
            sampling: Mutex::new(None),
            elicitation: Mutex::new(None),
            update_listeners: Mutex::new(HashMap::new()),
            log_listener: Mutex::new(None),
        });
        install_handlers(&state);
        Self { state }
    }

    /// Build an endpoint over `transport` and wrap it.
    pub fn over(transport: Arc<dyn Transport>) -> Self {
        Self::new(Endpoint::new(transport))
    }

    /// Register the handler serviced for `sampling/createMessage`.
    pub fn register_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) {
        *self.state.sampling.lock().unwrap() = Some(handler);
    }

    /// Register the handler serviced for `elicitation/create`.
    pub fn register_elicitation_handler(&self, handler: Arc<dyn ElicitationHandler>) {
        *self.state.elicitation.lock().unwrap() = Some(handler);
    }

    /// Replace the root set served to `roots/list`.
    ///
    /// Before the handshake this only stores the roots; afterwards use
    /// [`InitializedClient::set_roots`], which also notifies the server.
    pub fn set_roots(&self, roots: Vec<Root>) {
        *self.state.roots.lock().unwrap() = roots;
    }

    /// Perform the `initialize` / `notifications/initialized` handshake.
    ///
    /// Sends `initialize` with the given identity and capabilities,
    /// verifies that the server's selected protocol version is supported,
    /// adopts it, sends `notifications/initialized`, and returns an
    /// [`InitializedClient`]. The round trip is bounded by
    /// [`INITIALIZE_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Returns [`McpError::ProtocolVersion`] (after closing the session)
    /// if the server picked a version outside
    /// [`SUPPORTED_PROTOCOL_VERSIONS`]; [`McpError::Timeout`] if the
    /// server does not answer in time; transport errors otherwise.
    pub async fn initialize(
        self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Result<InitializedClient> {
        let endpoint = self.state.endpoint.clone();
        endpoint.mark_initializing();

        let response: InitializeResult = endpoint
            .call(
                METHOD_INITIALIZE,
                InitializeParams {
                    protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
                    capabilities,
                    client_info,
                },
                CallOptions::default().with_timeout(INITIALIZE_TIMEOUT),
            )
            .await?;

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&response.protocol_version.as_str()) {
            endpoint.close().await;
            return Err(McpError::ProtocolVersion {
                supported: SUPPORTED_PROTOCOL_VERSIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                got: response.protocol_version,
            });
        }

        endpoint.set_peer(PeerInfo {
            protocol_version: response.protocol_version.clone(),
            info: response.server_info.clone(),
            capabilities: serde_json::to_value(&response.capabilities)?,
        });

        // Ready before the notification leaves, so a server that reacts to
        // `initialized` immediately is never rejected by the gate.
        endpoint.mark_ready();
        endpoint
            .notify(NOTIF_INITIALIZED, serde_json::json!({}))
            .await?;

        Ok(InitializedClient {
            state: self.state,
            init: response,
        })
    }
}

/// Wire the always-on handlers into the endpoint: ping service, sampling,
/// roots, elicitation, resource-update fan-in, and the log sink.
fn install_handlers(state: &Arc<ClientState>) {
    let endpoint = &state.endpoint;

    endpoint.on_request(METHOD_PING, |_params, _ctx| {
        Box::pin(async { Ok(serde_json::json!({})) })
    });

    let sampling_state = Arc::clone(state);
    endpoint.on_request(METHOD_SAMPLING_CREATE_MESSAGE, move |params, _ctx| {
        let state = Arc::clone(&sampling_state);
        Box::pin(async move {
            let handler = state.sampling.lock().unwrap().clone();
            let Some(handler) = handler else {
                return Err(method_unavailable(METHOD_SAMPLING_CREATE_MESSAGE));
            };
            let request: CreateMessageParams = decode_params(params)?;
            match handler.create_message(request).await {
                Ok(result) => Ok(serde_json::to_value(result)
                    .unwrap_or(serde_json::Value::Null)),
                Err(e) => Err(e.to_json_rpc()),
            }
        })
    });

    let elicitation_state = Arc::clone(state);
    endpoint.on_request(METHOD_ELICITATION_CREATE, move |params, _ctx| {
        let state = Arc::clone(&elicitation_state);
        Box::pin(async move {
            let handler = state.elicitation.lock().unwrap().clone();
            let Some(handler) = handler else {
                return Err(method_unavailable(METHOD_ELICITATION_CREATE));
            };
            let request: ElicitationCreateParams = decode_params(params)?;
            match handler.create_elicitation(request).await {
                Ok(result) => Ok(serde_json::to_value(result)
                    .unwrap_or(serde_json::Value::Null)),
                Err(e) => Err(e.to_json_rpc()),
            }
        })
    });

    let roots_state = Arc::clone(state);
    endpoint.on_request(METHOD_ROOTS_LIST, move |_params, _ctx| {
        let state = Arc::clone(&roots_state);
        Box::pin(async move {
            let roots = state.roots.lock().unwrap().clone();
            Ok(serde_json::to_value(ListRootsResult { roots })
                .unwrap_or(serde_json::Value::Null))
        })
    });

    let update_state = Arc::clone(state);
    endpoint.on_notification(NOTIF_RESOURCES_UPDATED, move |params| {
        let Some(parsed) = params
            .and_then(|p| serde_json::from_value::<ResourceUpdatedParams>(p).ok())
        else {
            tracing::debug!("malformed resources/updated notification; ignoring");
            return;
        };
        let listeners = update_state
            .update_listeners
            .lock()
            .unwrap()
            .get(&parsed.uri)
            .cloned()
            .unwrap_or_default();
        for listener in listeners {
            listener(&parsed.uri);
        }
    });

    let log_state = Arc::clone(state);
    endpoint.on_notification(NOTIF_MESSAGE, move |params| {
        let Some(parsed) =
            params.and_then(|p| serde_json::from_value::<LoggingMessageParams>(p).ok())
        else {
            tracing::debug!("malformed log notification; ignoring");
            return;
        };
        let listener = log_state.log_listener.lock().unwrap().clone();
        match listener {
            Some(listener) => listener(parsed),
            None => tracing::debug!(
                "server log [{:?}] {}",
                parsed.level,
                parsed.data
            ),
        }
    });
}

fn method_unavailable(method: &str) -> JsonRpcError {
    JsonRpcError {
        code: crate::types::error_codes::METHOD_NOT_FOUND,
        message: format!("no handler registered for {method}"),
        data: None,
    }
}

fn decode_params<T: serde::de::DeserializeOwned>(
    params: Option<serde_json::Value>,
) -> std::result::Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(serde_json::Value::Null)).map_err(|e| JsonRpcError {
        code: crate::types::error_codes::INVALID_PARAMS,
        message: format!("Invalid params: {e}"),
        data: None,
    })
}

// ---------------------------------------------------------------------------
// InitializedClient -- fully negotiated session
// ---------------------------------------------------------------------------

/// A fully negotiated MCP client session, created by [`Client::initialize`].
pub struct InitializedClient {
    state: Arc<ClientState>,
    init: InitializeResult,
}

impl InitializedClient {
    /// The underlying endpoint, for callers that need raw access.
    pub fn endpoint(&self) -> &Endpoint {
        &self.state.endpoint
    }

    /// The server's identity from the handshake.
    pub fn server_info(&self) -> &Implementation {
        &self.init.server_info
    }

    /// Optional usage instructions the server provided.
    pub fn instructions(&self) -> Option<&str> {
        self.init.instructions.as_deref()
    }

    /// The protocol revision this session speaks.
    pub fn protocol_version(&self) -> &str {
        &self.init.protocol_version
    }

    /// Check whether the server advertised a specific capability.
    pub fn capable(&self, capability: ServerCapabilityFlag) -> bool {
        let caps = &self.init.capabilities;
        match capability {
            ServerCapabilityFlag::Tools => caps.tools.is_some(),
            ServerCapabilityFlag::Resources => caps.resources.is_some(),
            ServerCapabilityFlag::ResourceSubscriptions => caps
                .resources
                .as_ref()
                .and_then(|r| r.subscribe)
                .unwrap_or(false),
            ServerCapabilityFlag::Prompts => caps.prompts.is_some(),
            ServerCapabilityFlag::Logging => caps.logging.is_some(),
            ServerCapabilityFlag::Completions => caps.completions.is_some(),
            ServerCapabilityFlag::Experimental => caps.experimental.is_some(),
        }
    }

    /// Send a `ping` and wait for the empty response.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self
            .state
            .endpoint
            .call(METHOD_PING, serde_json::json!({}), CallOptions::default())
            .await?;
        Ok(())
    }

    // -- tools -----------------------------------------------------------

    /// Fetch one page of tools.
    pub async fn list_tools_page(&self, cursor: Option<String>) -> Result<ListToolsResult> {
        self.state
            .endpoint
            .call(
                METHOD_TOOLS_LIST,
                PaginatedParams { cursor },
                CallOptions::default(),
            )
            .await
    }

    /// List all tools, following pagination automatically.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_tools_page(cursor).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Invoke a named tool.
    ///
    /// `options` carries the per-call deadline, cancellation handle, and
    /// progress sink; a progress sink implies a `progressToken` in the
    /// request's `_meta`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
        options: CallOptions,
    ) -> Result<CallToolResult> {
        self.state
            .endpoint
            .call(
                METHOD_TOOLS_CALL,
                CallToolParams {
                    name: name.to_string(),
                    arguments,
                    meta: None,
                },
                options,
            )
            .await
    }

    // -- resources -------------------------------------------------------

    /// Fetch one page of resources.
    pub async fn list_resources_page(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourcesResult> {
        self.state
            .endpoint
            .call(
                METHOD_RESOURCES_LIST,
                PaginatedParams { cursor },
                CallOptions::default(),
            )
            .await
    }

    /// List all resources, following pagination automatically.
    pub async fn list_resources(&self) -> Result<Vec<Resource>> {
        let mut resources = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_resources_page(cursor).await?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }
        Ok(resources)
    }

    /// Fetch one page of resource templates.
    pub async fn list_resource_templates_page(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourceTemplatesResult> {
        self.state
            .endpoint
            .call(
                METHOD_RESOURCES_TEMPLATES_LIST,
                PaginatedParams { cursor },
                CallOptions::default(),
            )
            .await
    }

    /// List all resource templates, following pagination automatically.
    pub async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        let mut templates = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_resource_templates_page(cursor).await?;
            templates.extend(page.resource_templates);
            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }
        Ok(templates)
    }

    /// Read the contents of a resource by URI.
    pub async fn read_resource(&self, uri: &str) -> Result<Vec<ResourceContents>> {
        let result: ReadResourceResult = self
            .state
            .endpoint
            .call(
                METHOD_RESOURCES_READ,
                ReadResourceParams {
                    uri: uri.to_string(),
                },
                CallOptions::default(),
            )
            .await?;
        Ok(result.contents)
    }

    /// Subscribe to update notifications for a resource URI.
    ///
    /// `listener` runs for every `notifications/resources/updated` whose
    /// URI matches, until [`InitializedClient::unsubscribe_resource`].
    pub async fn subscribe_resource(
        &self,
        uri: &str,
        listener: impl Fn(&str) + Send + Sync + 'static,
    ) -> Result<()> {
        self.state
            .update_listeners
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default()
            .push(Arc::new(listener));
        let _: serde_json::Value = self
            .state
            .endpoint
            .call(
                METHOD_RESOURCES_SUBSCRIBE,
                SubscribeParams {
                    uri: uri.to_string(),
                },
                CallOptions::default(),
            )
            .await?;
        Ok(())
    }

    /// Unsubscribe from a resource URI and drop its listeners.
    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<()> {
        self.state.update_listeners.lock().unwrap().remove(uri);
        let _: serde_json::Value = self
            .state
            .endpoint
            .call(
                METHOD_RESOURCES_UNSUBSCRIBE,
                SubscribeParams {
                    uri: uri.to_string(),
                },
                CallOptions::default(),
            )
            .await?;
        Ok(())
    }

    // -- prompts ---------------------------------------------------------

    /// Fetch one page of prompts.
    pub async fn list_prompts_page(&self, cursor: Option<String>) -> Result<ListPromptsResult> {
        self.state
            .endpoint
            .call(
                METHOD_PROMPTS_LIST,
                PaginatedParams { cursor },
                CallOptions::default(),
            )
            .await
    }

    /// List all prompts, following pagination automatically.
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        let mut prompts = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.list_prompts_page(cursor).await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }
        Ok(prompts)
    }

    /// Retrieve a rendered prompt by name.
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<HashMap<String, String>>,
    ) -> Result<GetPromptResult> {
        self.state
            .endpoint
            .call(
                METHOD_PROMPTS_GET,
                GetPromptParams {
                    name: name.to_string(),
                    arguments,
                    meta: None,
                },
                CallOptions::default(),
            )
            .await
    }

    // -- logging and completion ------------------------------------------

    /// Set the server's minimum logging level.
    pub async fn set_logging_level(&self, level: LoggingLevel) -> Result<()> {
        let _: serde_json::Value = self
            .state
            .endpoint
            .call(
                METHOD_LOGGING_SET_LEVEL,
                SetLevelParams { level },
                CallOptions::default(),
            )
            .await?;
        Ok(())
    }

    /// Install the sink that receives `notifications/message` records.
    pub fn on_log_message(&self, listener: impl Fn(LoggingMessageParams) + Send + Sync + 'static) {
        *self.state.log_listener.lock().unwrap() = Some(Arc::new(listener));
    }

    /// Request argument completions for a prompt or resource template.
    pub async fn complete(
        &self,
        reference: CompletionReference,
        argument: CompletionArgument,
    ) -> Result<Completion> {
        let result: CompleteResult = self
            .state
            .endpoint
            .call(
                METHOD_COMPLETION_COMPLETE,
                CompleteParams {
                    reference,
                    argument,
                },
                CallOptions::default(),
            )
            .await?;
        Ok(result.completion)
    }

    // -- server-initiated handlers and roots -----------------------------

    /// Register the handler serviced for `sampling/createMessage`.
    pub fn register_sampling_handler(&self, handler: Arc<dyn SamplingHandler>) {
        *self.state.sampling.lock().unwrap() = Some(handler);
    }

    /// Register the handler serviced for `elicitation/create`.
    pub fn register_elicitation_handler(&self, handler: Arc<dyn ElicitationHandler>) {
        *self.state.elicitation.lock().unwrap() = Some(handler);
    }

    /// Replace the root set and notify the server that it changed.
    pub async fn set_roots(&self, roots: Vec<Root>) -> Result<()> {
        *self.state.roots.lock().unwrap() = roots;
        self.state
            .endpoint
            .notify(NOTIF_ROOTS_LIST_CHANGED, serde_json::json!({}))
            .await
    }

    /// Run `f` whenever the server reports its tool list changed.
    pub fn on_tools_list_changed(&self, f: impl Fn() + Send + Sync + 'static) {
        self.state
            .endpoint
            .on_notification(NOTIF_TOOLS_LIST_CHANGED, move |_| f());
    }

    /// Run `f` whenever the server reports its resource list changed.
    pub fn on_resources_list_changed(&self, f: impl Fn() + Send + Sync + 'static) {
        self.state
            .endpoint
            .on_notification(NOTIF_RESOURCES_LIST_CHANGED, move |_| f());
    }

    /// Run `f` whenever the server reports its prompt list changed.
    pub fn on_prompts_list_changed(&self, f: impl Fn() + Send + Sync + 'static) {
        self.state
            .endpoint
            .on_notification(NOTIF_PROMPTS_LIST_CHANGED, move |_| f());
    }

    /// Shut the session down.
    pub async fn close(&self) {
        self.state.endpoint.close().await;
    }
}

impl std::fmt::Debug for InitializedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializedClient")
            .field("server_info", &self.init.server_info)
            .field("protocol_version", &self.init.protocol_version)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
