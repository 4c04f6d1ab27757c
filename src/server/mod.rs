//! MCP server façade: method dispatch, registries, and sessions
//!
//! A [`Server`] holds the tool/prompt/resource registries and the identity
//! advertised during the handshake. It is cheap to clone and can serve any
//! number of concurrent sessions: each call to [`Server::serve`] wires the
//! registries into a fresh [`Endpoint`] over the given transport and
//! returns a [`ServerSession`].
//!
//! # Dispatch
//!
//! Dispatch is method-name based: every protocol endpoint is a closure
//! registered on the session's endpoint, bound to a typed params decoder
//! and a typed result encoder. Adding a capability adds a table entry, not
//! a subclass.
//!
//! `tools/call` follows the two-plane error rule: an unknown tool name or a
//! typed protocol error ([`McpError::Rpc`]) surfaces as a JSON-RPC Error
//! envelope, while any other handler failure is folded into a successful
//! `CallToolResult` with `isError` set.
//!
//! # Registries
//!
//! Registries are read-mostly: mutation takes a write lock, and the
//! matching `notifications/*/list_changed` is emitted to every live session
//! after the lock is released, once per batch. Handlers registered after a
//! session reaches `Ready` take effect immediately.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};

use base64::Engine as _;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{CallOptions, Endpoint, EndpointState, PeerInfo, RequestContext};
use crate::error::{McpError, Result};
use crate::transport::Transport;
use crate::types::{
    error_codes, CallToolParams, CallToolResult, ClientCapabilities, CompleteParams,
    CompleteResult, Completion, CompletionReference, CompletionsCapability, CreateMessageParams,
    CreateMessageResult, ElicitationCreateParams, ElicitationResult, GetPromptParams,
    Implementation, InitializeParams, InitializeResult, JsonRpcError, ListPromptsResult,
    ListResourceTemplatesResult, ListResourcesResult, ListRootsResult, ListToolsResult,
    LoggingCapability, LoggingLevel, LoggingMessageParams, PaginatedParams, PromptsCapability,
    ReadResourceParams, ReadResourceResult, ResourceUpdatedParams, ResourcesCapability, Root,
    ServerCapabilities, SetLevelParams, SubscribeParams, ToolsCapability,
    LATEST_PROTOCOL_VERSION, METHOD_COMPLETION_COMPLETE, METHOD_ELICITATION_CREATE,
    METHOD_INITIALIZE, METHOD_LOGGING_SET_LEVEL, METHOD_PING, METHOD_PROMPTS_GET,
    METHOD_PROMPTS_LIST, METHOD_RESOURCES_LIST, METHOD_RESOURCES_READ,
    METHOD_RESOURCES_SUBSCRIBE, METHOD_RESOURCES_TEMPLATES_LIST, METHOD_RESOURCES_UNSUBSCRIBE,
    METHOD_ROOTS_LIST, METHOD_SAMPLING_CREATE_MESSAGE, METHOD_TOOLS_CALL, METHOD_TOOLS_LIST,
    NOTIF_INITIALIZED, NOTIF_MESSAGE, NOTIF_PROMPTS_LIST_CHANGED, NOTIF_RESOURCES_LIST_CHANGED,
    NOTIF_RESOURCES_UPDATED, NOTIF_TOOLS_LIST_CHANGED, SUPPORTED_PROTOCOL_VERSIONS,
};

pub mod prompts;
pub mod resources;
pub mod tools;

pub use prompts::{PromptBuilder, RegisteredPrompt};
pub use resources::{
    RegisteredResource, RegisteredTemplate, ResourceBuilder, ResourceTemplateBuilder, UriTemplate,
};
pub use tools::{ParamKind, RegisteredTool, ToolBuilder};

/// Items per page served by the `*/list` endpoints unless configured
/// otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard cap on `completion/complete` values per response.
pub const MAX_COMPLETION_VALUES: usize = 100;

/// A completion source: maps the partial value typed so far to candidate
/// values (prefix filtering is enforced by the dispatcher regardless).
pub type ArgumentCompleter = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

struct Registries {
    tools: RwLock<BTreeMap<String, Arc<RegisteredTool>>>,
    prompts: RwLock<BTreeMap<String, Arc<RegisteredPrompt>>>,
    resources: RwLock<BTreeMap<String, Arc<RegisteredResource>>>,
    /// Templates keep registration order; `resources/read` searches them
    /// in that order after exact matches fail.
    templates: RwLock<Vec<Arc<RegisteredTemplate>>>,
}

struct ServerInner {
    info: Implementation,
    instructions: Option<String>,
    page_size: usize,
    default_log_level: LoggingLevel,
    registries: Registries,
    sessions: Mutex<Vec<Weak<SessionShared>>>,
}

/// What the handshake established about a connected client.
#[derive(Debug, Clone)]
struct ClientHandshake {
    protocol_version: String,
    capabilities: ClientCapabilities,
    info: Implementation,
}

/// Per-session state shared between the dispatch closures and the
/// [`ServerSession`] handle.
struct SessionShared {
    endpoint: Endpoint,
    subscriptions: Mutex<HashSet<String>>,
    log_level: Mutex<LoggingLevel>,
    client: OnceLock<ClientHandshake>,
}

/// Builder for a [`Server`].
pub struct ServerBuilder {
    info: Implementation,
    instructions: Option<String>,
    page_size: usize,
    default_log_level: LoggingLevel,
    tools: Vec<RegisteredTool>,
    prompts: Vec<RegisteredPrompt>,
    resources: Vec<RegisteredResource>,
    templates: Vec<RegisteredTemplate>,
}

impl ServerBuilder {
    /// Optional usage instructions returned from `initialize`.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Page size for the `*/list` endpoints.
    #[must_use]
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Minimum level emitted before a client calls `logging/setLevel`.
    #[must_use]
    pub fn default_log_level(mut self, level: LoggingLevel) -> Self {
        self.default_log_level = level;
        self
    }

    /// Register a tool.
    #[must_use]
    pub fn tool(mut self, tool: RegisteredTool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Register a prompt.
    #[must_use]
    pub fn prompt(mut self, prompt: RegisteredPrompt) -> Self {
        self.prompts.push(prompt);
        self
    }

    /// Register a direct resource.
    #[must_use]
    pub fn resource(mut self, resource: RegisteredResource) -> Self {
        self.resources.push(resource);
        self
    }

    /// Register a template resource.
    #[must_use]
    pub fn resource_template(mut self, template: RegisteredTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Finish the declaration.
    pub fn build(self) -> Server {
        let registries = Registries {
            tools: RwLock::new(
                self.tools
                    .into_iter()
                    .map(|t| (t.descriptor.name.clone(), Arc::new(t)))
                    .collect(),
            ),
            prompts: RwLock::new(
                self.prompts
                    .into_iter()
                    .map(|p| (p.descriptor.name.clone(), Arc::new(p)))
                    .collect(),
            ),
            resources: RwLock::new(
                self.resources
                    .into_iter()
                    .map(|r| (r.descriptor.uri.clone(), Arc::new(r)))
                    .collect(),
            ),
            templates: RwLock::new(self.templates.into_iter().map(Arc::new).collect()),
        };
        Server {
            inner: Arc::new(ServerInner {
                info: self.info,
                instructions: self.instructions,
                page_size: self.page_size,
                default_log_level: self.default_log_level,
                registries,
                sessions: Mutex::new(Vec::new()),
            }),
        }
    }
}

/// An MCP server: registries plus identity, shared across sessions.
///
/// # Examples
///
/// ```
/// use mcpkit::server::{ParamKind, Server, ToolBuilder};
/// use mcpkit::types::CallToolResult;
///
/// let server = Server::builder("demo", "0.1.0")
///     .instructions("A demo server")
///     .tool(
///         ToolBuilder::new("echo")
///             .description("Echoes back the input message")
///             .required_param("message", ParamKind::String, "The text to echo")
///             .invoke(|args, _ctx| async move {
///                 let message = args
///                     .get("message")
///                     .and_then(|m| m.as_str())
///                     .unwrap_or_default();
///                 Ok(CallToolResult::text(format!("Echo: {message}")))
///             }),
///     )
///     .build();
/// # let _ = server;
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("info", &self.inner.info)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Start a server declaration.
    pub fn builder(name: impl Into<String>, version: impl Into<String>) -> ServerBuilder {
        ServerBuilder {
            info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            instructions: None,
            page_size: DEFAULT_PAGE_SIZE,
            default_log_level: LoggingLevel::Info,
            tools: Vec::new(),
            prompts: Vec::new(),
            resources: Vec::new(),
            templates: Vec::new(),
        }
    }

    /// The capability record advertised during the handshake.
    pub fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities {
            experimental: None,
            logging: Some(LoggingCapability {}),
            completions: Some(CompletionsCapability {}),
            prompts: Some(PromptsCapability {
                list_changed: Some(true),
            }),
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            tools: Some(ToolsCapability {
                list_changed: Some(true),
            }),
        }
    }

    // -- registry mutation -----------------------------------------------

    /// Register a tool; live sessions are told the list changed.
    pub fn add_tool(&self, tool: RegisteredTool) {
        self.add_tools(std::iter::once(tool));
    }

    /// Register several tools with a single `list_changed` notification.
    pub fn add_tools(&self, tools: impl IntoIterator<Item = RegisteredTool>) {
        {
            let mut registry = self.inner.registries.tools.write().unwrap();
            for tool in tools {
                registry.insert(tool.descriptor.name.clone(), Arc::new(tool));
            }
        }
        self.notify_list_changed(NOTIF_TOOLS_LIST_CHANGED);
    }

    /// Remove a tool by name. Returns whether it existed.
    pub fn remove_tool(&self, name: &str) -> bool {
        let removed = self
            .inner
            .registries
            .tools
            .write()
            .unwrap()
            .remove(name)
            .is_some();
        if removed {
            self.notify_list_changed(NOTIF_TOOLS_LIST_CHANGED);
        }
        removed
    }

    /// Register a prompt; live sessions are told the list changed.
    pub fn add_prompt(&self, prompt: RegisteredPrompt) {
        {
            let mut registry = self.inner.registries.prompts.write().unwrap();
            registry.insert(prompt.descriptor.name.clone(), Arc::new(prompt));
        }
        self.notify_list_changed(NOTIF_PROMPTS_LIST_CHANGED);
    }

    /// Remove a prompt by name. Returns whether it existed.
    pub fn remove_prompt(&self, name: &str) -> bool {
        let removed = self
            .inner
            .registries
            .prompts
            .write()
            .unwrap()
            .remove(name)
            .is_some();
        if removed {
            self.notify_list_changed(NOTIF_PROMPTS_LIST_CHANGED);
        }
        removed
    }

    /// Register a direct resource; live sessions are told the list changed.
    pub fn add_resource(&self, resource: RegisteredResource) {
        {
            let mut registry = self.inner.registries.resources.write().unwrap();
            registry.insert(resource.descriptor.uri.clone(), Arc::new(resource));
        }
        self.notify_list_changed(NOTIF_RESOURCES_LIST_CHANGED);
    }

    /// Remove a direct resource by URI. Returns whether it existed.
    pub fn remove_resource(&self, uri: &str) -> bool {
        let removed = self
            .inner
            .registries
            .resources
            .write()
            .unwrap()
            .remove(uri)
            .is_some();
        if removed {
            self.notify_list_changed(NOTIF_RESOURCES_LIST_CHANGED);
        }
        removed
    }

    /// Register a template resource at the end of the search order.
    pub fn add_resource_template(&self, template: RegisteredTemplate) {
        {
            let mut registry = self.inner.registries.templates.write().unwrap();
            registry.push(Arc::new(template));
        }
        self.notify_list_changed(NOTIF_RESOURCES_LIST_CHANGED);
    }

    /// Tell every session subscribed to `uri` that its contents changed.
    pub async fn resource_updated(&self, uri: &str) {
        for session in self.live_sessions() {
            let subscribed = session.subscriptions.lock().unwrap().contains(uri);
            if subscribed && session.endpoint.state() == EndpointState::Ready {
                let params = ResourceUpdatedParams {
                    uri: uri.to_string(),
                };
                if let Err(e) = session.endpoint.notify(NOTIF_RESOURCES_UPDATED, &params).await {
                    tracing::debug!("resource update fan-out failed: {e}");
                }
            }
        }
    }

    /// Upgrade live sessions, pruning dead entries as a side effect.
    fn live_sessions(&self) -> Vec<Arc<SessionShared>> {
        let mut sessions = self.inner.sessions.lock().unwrap();
        sessions.retain(|weak| weak.strong_count() > 0);
        sessions.iter().filter_map(Weak::upgrade).collect()
    }

    /// Emit one `list_changed` notification per Ready session, outside any
    /// registry lock.
    fn notify_list_changed(&self, method: &'static str) {
        for session in self.live_sessions() {
            if session.endpoint.state() == EndpointState::Ready {
                let endpoint = session.endpoint.clone();
                tokio::spawn(async move {
                    if let Err(e) = endpoint.notify(method, serde_json::json!({})).await {
                        tracing::debug!("{method} fan-out failed: {e}");
                    }
                });
            }
        }
    }

    // -- session wiring --------------------------------------------------

    /// Serve one session over `transport`.
    ///
    /// Builds an endpoint, registers every protocol handler on it, and
    /// returns the session handle. The session runs until the peer
    /// disconnects or [`ServerSession::close`] is called.
    pub fn serve(&self, transport: Arc<dyn Transport>) -> ServerSession {
        let endpoint = Endpoint::new(transport);
        let shared = Arc::new(SessionShared {
            endpoint: endpoint.clone(),
            subscriptions: Mutex::new(HashSet::new()),
            log_level: Mutex::new(self.inner.default_log_level),
            client: OnceLock::new(),
        });

        self.inner
            .sessions
            .lock()
            .unwrap()
            .push(Arc::downgrade(&shared));

        self.install_handlers(&endpoint, &shared);

        ServerSession { shared }
    }

    fn install_handlers(&self, endpoint: &Endpoint, shared: &Arc<SessionShared>) {
        // initialize: negotiate the version, record the client, advertise
        // capabilities.
        let server = self.clone();
        let init_shared = Arc::clone(shared);
        endpoint.on_request(METHOD_INITIALIZE, move |params, _ctx| {
            let server = server.clone();
            let shared = Arc::clone(&init_shared);
            Box::pin(async move {
                let params: InitializeParams = decode_params(params)?;
                shared.endpoint.mark_initializing();

                // Accept the client's version when supported; otherwise
                // counter with the latest we speak and let the client
                // decide whether to continue.
                let version =
                    if SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
                        params.protocol_version.clone()
                    } else {
                        LATEST_PROTOCOL_VERSION.to_string()
                    };

                let _ = shared.client.set(ClientHandshake {
                    protocol_version: version.clone(),
                    capabilities: params.capabilities.clone(),
                    info: params.client_info.clone(),
                });
                shared.endpoint.set_peer(PeerInfo {
                    protocol_version: version.clone(),
                    info: params.client_info,
                    capabilities: serde_json::to_value(&params.capabilities)
                        .unwrap_or(serde_json::Value::Null),
                });

                let result = InitializeResult {
                    protocol_version: version,
                    capabilities: server.capabilities(),
                    server_info: server.inner.info.clone(),
                    instructions: server.inner.instructions.clone(),
                };
                encode_result(&result)
            })
        });

        let ready_endpoint = endpoint.clone();
        endpoint.on_notification(NOTIF_INITIALIZED, move |_params| {
            ready_endpoint.mark_ready();
        });

        endpoint.on_request(METHOD_PING, |_params, _ctx| {
            Box::pin(async { Ok(serde_json::json!({})) })
        });

        // tools/list
        let server = self.clone();
        endpoint.on_request(METHOD_TOOLS_LIST, move |params, _ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: PaginatedParams = decode_params_or_default(params)?;
                let tools: Vec<_> = server
                    .inner
                    .registries
                    .tools
                    .read()
                    .unwrap()
                    .values()
                    .map(|t| t.descriptor.clone())
                    .collect();
                let (tools, next_cursor) =
                    paginate(tools, params.cursor.as_deref(), server.inner.page_size)?;
                encode_result(&ListToolsResult { tools, next_cursor })
            })
        });

        // tools/call
        let server = self.clone();
        let call_shared = Arc::clone(shared);
        endpoint.on_request(METHOD_TOOLS_CALL, move |params, ctx| {
            let server = server.clone();
            let shared = Arc::clone(&call_shared);
            Box::pin(async move {
                let params: CallToolParams = decode_params(params)?;
                let tool = server
                    .inner
                    .registries
                    .tools
                    .read()
                    .unwrap()
                    .get(&params.name)
                    .cloned();
                let Some(tool) = tool else {
                    return Err(JsonRpcError {
                        code: error_codes::INVALID_PARAMS,
                        message: format!("unknown tool: {}", params.name),
                        data: None,
                    });
                };

                let arguments = params.arguments.unwrap_or_default();
                let context = ToolContext {
                    request: ctx,
                    shared,
                };
                match (tool.invoker)(arguments, context).await {
                    Ok(result) => encode_result(&result),
                    // A typed protocol error crosses the wire as a JSON-RPC
                    // Error; anything else is a domain outcome.
                    Err(McpError::Rpc(rpc)) => Err(rpc),
                    Err(other) => encode_result(&CallToolResult::error_text(other.to_string())),
                }
            })
        });

        // prompts/list
        let server = self.clone();
        endpoint.on_request(METHOD_PROMPTS_LIST, move |params, _ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: PaginatedParams = decode_params_or_default(params)?;
                let prompts: Vec<_> = server
                    .inner
                    .registries
                    .prompts
                    .read()
                    .unwrap()
                    .values()
                    .map(|p| p.descriptor.clone())
                    .collect();
                let (prompts, next_cursor) =
                    paginate(prompts, params.cursor.as_deref(), server.inner.page_size)?;
                encode_result(&ListPromptsResult {
                    prompts,
                    next_cursor,
                })
            })
        });

        // prompts/get
        let server = self.clone();
        endpoint.on_request(METHOD_PROMPTS_GET, move |params, ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: GetPromptParams = decode_params(params)?;
                let prompt = server
                    .inner
                    .registries
                    .prompts
                    .read()
                    .unwrap()
                    .get(&params.name)
                    .cloned();
                let Some(prompt) = prompt else {
                    return Err(JsonRpcError {
                        code: error_codes::INVALID_PARAMS,
                        message: format!("unknown prompt: {}", params.name),
                        data: None,
                    });
                };

                // Required arguments must all be present.
                if let Some(declared) = &prompt.descriptor.arguments {
                    for arg in declared.iter().filter(|a| a.required == Some(true)) {
                        let supplied = params
                            .arguments
                            .as_ref()
                            .is_some_and(|args| args.contains_key(&arg.name));
                        if !supplied {
                            return Err(JsonRpcError {
                                code: error_codes::INVALID_PARAMS,
                                message: format!(
                                    "missing required argument '{}' for prompt '{}'",
                                    arg.name, params.name
                                ),
                                data: None,
                            });
                        }
                    }
                }

                match (prompt.renderer)(params.arguments, ctx).await {
                    Ok(result) => encode_result(&result),
                    Err(e) => Err(e.to_json_rpc()),
                }
            })
        });

        // resources/list
        let server = self.clone();
        endpoint.on_request(METHOD_RESOURCES_LIST, move |params, _ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: PaginatedParams = decode_params_or_default(params)?;
                let resources: Vec<_> = server
                    .inner
                    .registries
                    .resources
                    .read()
                    .unwrap()
                    .values()
                    .map(|r| r.descriptor.clone())
                    .collect();
                let (resources, next_cursor) =
                    paginate(resources, params.cursor.as_deref(), server.inner.page_size)?;
                encode_result(&ListResourcesResult {
                    resources,
                    next_cursor,
                })
            })
        });

        // resources/templates/list
        let server = self.clone();
        endpoint.on_request(METHOD_RESOURCES_TEMPLATES_LIST, move |params, _ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: PaginatedParams = decode_params_or_default(params)?;
                let templates: Vec<_> = server
                    .inner
                    .registries
                    .templates
                    .read()
                    .unwrap()
                    .iter()
                    .map(|t| t.descriptor.clone())
                    .collect();
                let (resource_templates, next_cursor) =
                    paginate(templates, params.cursor.as_deref(), server.inner.page_size)?;
                encode_result(&ListResourceTemplatesResult {
                    resource_templates,
                    next_cursor,
                })
            })
        });

        // resources/read: exact URI first, then templates in registration
        // order; the first template that binds wins.
        let server = self.clone();
        endpoint.on_request(METHOD_RESOURCES_READ, move |params, ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: ReadResourceParams = decode_params(params)?;

                let direct = server
                    .inner
                    .registries
                    .resources
                    .read()
                    .unwrap()
                    .get(&params.uri)
                    .cloned();
                if let Some(resource) = direct {
                    let contents = (resource.reader)(ctx)
                        .await
                        .map_err(|e| e.to_json_rpc())?;
                    return encode_result(&ReadResourceResult { contents });
                }

                let templates: Vec<_> = server
                    .inner
                    .registries
                    .templates
                    .read()
                    .unwrap()
                    .clone();
                for template in templates {
                    if let Some(vars) = template.template.matches(&params.uri) {
                        let contents = (template.reader)(vars, ctx)
                            .await
                            .map_err(|e| e.to_json_rpc())?;
                        return encode_result(&ReadResourceResult { contents });
                    }
                }

                Err(JsonRpcError {
                    code: error_codes::INVALID_PARAMS,
                    message: format!("unknown resource: {}", params.uri),
                    data: None,
                })
            })
        });

        // resources/subscribe and unsubscribe maintain the per-session set;
        // the set dies with the session.
        let sub_shared = Arc::clone(shared);
        endpoint.on_request(METHOD_RESOURCES_SUBSCRIBE, move |params, _ctx| {
            let shared = Arc::clone(&sub_shared);
            Box::pin(async move {
                let params: SubscribeParams = decode_params(params)?;
                shared.subscriptions.lock().unwrap().insert(params.uri);
                Ok(serde_json::json!({}))
            })
        });

        let unsub_shared = Arc::clone(shared);
        endpoint.on_request(METHOD_RESOURCES_UNSUBSCRIBE, move |params, _ctx| {
            let shared = Arc::clone(&unsub_shared);
            Box::pin(async move {
                let params: SubscribeParams = decode_params(params)?;
                shared.subscriptions.lock().unwrap().remove(&params.uri);
                Ok(serde_json::json!({}))
            })
        });

        // logging/setLevel
        let level_shared = Arc::clone(shared);
        endpoint.on_request(METHOD_LOGGING_SET_LEVEL, move |params, _ctx| {
            let shared = Arc::clone(&level_shared);
            Box::pin(async move {
                let params: SetLevelParams = decode_params(params)?;
                *shared.log_level.lock().unwrap() = params.level;
                Ok(serde_json::json!({}))
            })
        });

        // completion/complete
        let server = self.clone();
        endpoint.on_request(METHOD_COMPLETION_COMPLETE, move |params, _ctx| {
            let server = server.clone();
            Box::pin(async move {
                let params: CompleteParams = decode_params(params)?;

                let completer: Option<ArgumentCompleter> = match &params.reference {
                    CompletionReference::Prompt { name } => server
                        .inner
                        .registries
                        .prompts
                        .read()
                        .unwrap()
                        .get(name)
                        .and_then(|p| p.completers.get(&params.argument.name).cloned()),
                    CompletionReference::Resource { uri } => server
                        .inner
                        .registries
                        .templates
                        .read()
                        .unwrap()
                        .iter()
                        .find(|t| t.descriptor.uri_template == *uri)
                        .and_then(|t| t.completers.get(&params.argument.name).cloned()),
                };

                let prefix = params.argument.value;
                let mut values = completer.map(|f| f(&prefix)).unwrap_or_default();
                values.retain(|v| v.starts_with(&prefix));
                let total = values.len();
                values.truncate(MAX_COMPLETION_VALUES);

                encode_result(&CompleteResult {
                    completion: Completion {
                        values,
                        total: Some(total as u64),
                        has_more: Some(total > MAX_COMPLETION_VALUES),
                    },
                })
            })
        });
    }
}

// ---------------------------------------------------------------------------
// ServerSession and ToolContext
// ---------------------------------------------------------------------------

/// One connected client session.
///
/// Besides the dispatch the server wired in, the session offers the
/// server-initiated operations: sampling, roots, elicitation, pings, and
/// log records. Each is gated on the capability the client advertised
/// during the handshake.
#[derive(Clone)]
pub struct ServerSession {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("client", &self.client_info())
            .finish_non_exhaustive()
    }
}

impl ServerSession {
    /// The underlying endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.shared.endpoint
    }

    /// The connected client's identity, once the handshake completed.
    pub fn client_info(&self) -> Option<Implementation> {
        self.shared.client.get().map(|c| c.info.clone())
    }

    /// The capabilities the client advertised, once the handshake
    /// completed.
    pub fn client_capabilities(&self) -> Option<ClientCapabilities> {
        self.shared.client.get().map(|c| c.capabilities.clone())
    }

    /// The protocol revision negotiated with this client.
    pub fn protocol_version(&self) -> Option<String> {
        self.shared.client.get().map(|c| c.protocol_version.clone())
    }

    /// Adopt a pre-negotiated handshake.
    ///
    /// Used by transports that rehydrate sessions from an out-of-band
    /// identity (the stateless HTTP mode) instead of running `initialize`
    /// over the wire.
    pub fn adopt_ready(
        &self,
        protocol_version: &str,
        info: Implementation,
        capabilities: ClientCapabilities,
    ) {
        let _ = self.shared.client.set(ClientHandshake {
            protocol_version: protocol_version.to_string(),
            capabilities: capabilities.clone(),
            info: info.clone(),
        });
        self.shared.endpoint.set_peer(PeerInfo {
            protocol_version: protocol_version.to_string(),
            info,
            capabilities: serde_json::to_value(&capabilities)
                .unwrap_or(serde_json::Value::Null),
        });
        self.shared.endpoint.mark_ready();
    }

    fn require_client_capability(&self, feature: &str, advertised: bool) -> Result<()> {
        if advertised {
            Ok(())
        } else {
            Err(McpError::rpc(
                error_codes::INVALID_REQUEST,
                format!("client did not advertise the {feature} capability"),
            ))
        }
    }

    /// Send a `ping` to the client and wait for the empty response.
    pub async fn ping(&self) -> Result<()> {
        let _: serde_json::Value = self
            .shared
            .endpoint
            .call(METHOD_PING, serde_json::json!({}), CallOptions::default())
            .await?;
        Ok(())
    }

    /// Ask the client to run an LLM completion (`sampling/createMessage`).
    ///
    /// # Errors
    ///
    /// Refused with [`McpError::Rpc`] when the client did not advertise
    /// the sampling capability.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
        options: CallOptions,
    ) -> Result<CreateMessageResult> {
        let advertised = self
            .client_capabilities()
            .is_some_and(|c| c.sampling.is_some());
        self.require_client_capability("sampling", advertised)?;
        self.shared
            .endpoint
            .call(METHOD_SAMPLING_CREATE_MESSAGE, params, options)
            .await
    }

    /// Ask the client for its filesystem roots (`roots/list`).
    pub async fn list_roots(&self) -> Result<Vec<Root>> {
        let advertised = self
            .client_capabilities()
            .is_some_and(|c| c.roots.is_some());
        self.require_client_capability("roots", advertised)?;
        let result: ListRootsResult = self
            .shared
            .endpoint
            .call(METHOD_ROOTS_LIST, serde_json::json!({}), CallOptions::default())
            .await?;
        Ok(result.roots)
    }

    /// Ask the client to collect structured user input
    /// (`elicitation/create`).
    pub async fn elicit(&self, params: ElicitationCreateParams) -> Result<ElicitationResult> {
        let advertised = self
            .client_capabilities()
            .is_some_and(|c| c.elicitation.is_some());
        self.require_client_capability("elicitation", advertised)?;
        self.shared
            .endpoint
            .call(METHOD_ELICITATION_CREATE, params, CallOptions::default())
            .await
    }

    /// Emit a `notifications/message` record if `level` clears the
    /// session's threshold.
    pub async fn log(
        &self,
        level: LoggingLevel,
        logger: Option<String>,
        data: serde_json::Value,
    ) -> Result<()> {
        let threshold = *self.shared.log_level.lock().unwrap();
        if level < threshold {
            return Ok(());
        }
        self.shared
            .endpoint
            .notify(
                NOTIF_MESSAGE,
                &LoggingMessageParams {
                    level,
                    logger,
                    data,
                },
            )
            .await
    }

    /// Resolves when the session has shut down (peer disconnect or local
    /// close).
    pub async fn wait_closed(&self) {
        self.shared.endpoint.wait_closed().await;
    }

    /// Shut the session down.
    pub async fn close(&self) {
        self.shared.endpoint.close().await;
    }
}

/// Context handed to tool invokers: the request-scoped data plus the
/// originating session.
#[derive(Clone)]
pub struct ToolContext {
    request: RequestContext,
    shared: Arc<SessionShared>,
}

impl ToolContext {
    /// The raw request context (id, progress token, cancellation).
    pub fn request(&self) -> &RequestContext {
        &self.request
    }

    /// The session this call arrived on, for server-initiated requests
    /// from inside the tool body.
    pub fn session(&self) -> ServerSession {
        ServerSession {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Cancellation handle for this call; fires on the peer's
    /// `notifications/cancelled` and on shutdown.
    pub fn cancellation(&self) -> &CancellationToken {
        self.request.cancellation()
    }

    /// Whether cancellation has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.request.is_cancelled()
    }

    /// Emit `notifications/progress` against the caller's token; no-op
    /// without one.
    pub async fn report_progress(
        &self,
        progress: f64,
        total: Option<f64>,
        message: Option<String>,
    ) -> Result<()> {
        self.request.report_progress(progress, total, message).await
    }

    /// Ask the client to sample, propagating this call's cancellation.
    pub async fn sample(&self, params: CreateMessageParams) -> Result<CreateMessageResult> {
        self.session()
            .create_message(
                params,
                CallOptions::default().with_cancel(self.cancellation().clone()),
            )
            .await
    }
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Dispatch plumbing
// ---------------------------------------------------------------------------

fn decode_params<T: serde::de::DeserializeOwned>(
    params: Option<serde_json::Value>,
) -> std::result::Result<T, JsonRpcError> {
    serde_json::from_value(params.unwrap_or(serde_json::Value::Null)).map_err(|e| JsonRpcError {
        code: error_codes::INVALID_PARAMS,
        message: format!("Invalid params: {e}"),
        data: None,
    })
}

fn decode_params_or_default<T: serde::de::DeserializeOwned + Default>(
    params: Option<serde_json::Value>,
) -> std::result::Result<T, JsonRpcError> {
    match params {
        None => Ok(T::default()),
        Some(serde_json::Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| JsonRpcError {
            code: error_codes::INVALID_PARAMS,
            message: format!("Invalid params: {e}"),
            data: None,
        }),
    }
}

fn encode_result<T: serde::Serialize>(
    value: &T,
) -> std::result::Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError {
        code: error_codes::INTERNAL_ERROR,
        message: format!("failed to encode result: {e}"),
        data: None,
    })
}

/// Opaque pagination cursors: base64url over the next offset, so clients
/// cannot rely on (or tamper with) raw indices.
fn encode_cursor(offset: usize) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(format!("offset={offset}"))
}

fn decode_cursor(cursor: &str) -> Option<usize> {
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .ok()?;
    String::from_utf8(bytes)
        .ok()?
        .strip_prefix("offset=")?
        .parse()
        .ok()
}

/// Slice one page out of `items` and produce the follow-up cursor.
fn paginate<T>(
    items: Vec<T>,
    cursor: Option<&str>,
    page_size: usize,
) -> std::result::Result<(Vec<T>, Option<String>), JsonRpcError> {
    let offset = match cursor {
        None => 0,
        Some(cursor) => decode_cursor(cursor).ok_or_else(|| JsonRpcError {
            code: error_codes::INVALID_PARAMS,
            message: "invalid cursor".to_string(),
            data: None,
        })?,
    };

    let total = items.len();
    let start = offset.min(total);
    let end = (start + page_size).min(total);
    let page: Vec<T> = items.into_iter().skip(start).take(end - start).collect();
    let next_cursor = (end < total).then(|| encode_cursor(end));
    Ok((page, next_cursor))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
