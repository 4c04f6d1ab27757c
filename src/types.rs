//! MCP protocol types and JSON-RPC 2.0 primitives
//!
//! This module defines every wire type used by the runtime: the four
//! JSON-RPC envelope shapes, the request-id scalar, the standard error
//! codes, and the MCP data model (capabilities, tools, prompts, resources,
//! content blocks, sampling, logging, completion).
//!
//! All types derive `Debug`, `Clone`, `Serialize`, and `Deserialize` unless
//! noted otherwise. Struct fields are `camelCase` on the wire via
//! `#[serde(rename_all = "camelCase")]` unless the field is already
//! camelCase or a `_meta` override is required. All `Option<>` fields omit
//! their key from JSON when `None` via
//! `#[serde(skip_serializing_if = "Option::is_none")]`. Unknown fields are
//! ignored on read.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Protocol version constants
// ---------------------------------------------------------------------------

/// The most recent supported MCP protocol revision.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-03-26";

/// Earlier protocol revision retained for backwards compatibility.
pub const PROTOCOL_VERSION_2024_11_05: &str = "2024-11-05";

/// All protocol versions that this implementation accepts during negotiation.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] =
    &[LATEST_PROTOCOL_VERSION, PROTOCOL_VERSION_2024_11_05];

/// The `jsonrpc` discriminator carried by every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

fn default_jsonrpc() -> String {
    JSONRPC_VERSION.to_string()
}

// ---------------------------------------------------------------------------
// JSON-RPC method constants
// ---------------------------------------------------------------------------

/// Lifecycle: client sends `initialize` to open a session.
pub const METHOD_INITIALIZE: &str = "initialize";
/// Keepalive ping; serviced by both sides.
pub const METHOD_PING: &str = "ping";
/// Request a page of available tools.
pub const METHOD_TOOLS_LIST: &str = "tools/list";
/// Invoke a named tool.
pub const METHOD_TOOLS_CALL: &str = "tools/call";
/// Request a page of available resources.
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
/// List URI templates for parameterized resources.
pub const METHOD_RESOURCES_TEMPLATES_LIST: &str = "resources/templates/list";
/// Read the contents of a resource by URI.
pub const METHOD_RESOURCES_READ: &str = "resources/read";
/// Subscribe to live updates for a resource URI.
pub const METHOD_RESOURCES_SUBSCRIBE: &str = "resources/subscribe";
/// Unsubscribe from a resource URI.
pub const METHOD_RESOURCES_UNSUBSCRIBE: &str = "resources/unsubscribe";
/// Request a page of available prompts.
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
/// Retrieve a rendered prompt by name.
pub const METHOD_PROMPTS_GET: &str = "prompts/get";
/// Set the server-side logging verbosity level.
pub const METHOD_LOGGING_SET_LEVEL: &str = "logging/setLevel";
/// Request argument completions for a prompt or resource template.
pub const METHOD_COMPLETION_COMPLETE: &str = "completion/complete";
/// Server-initiated: ask the client to generate a completion sample.
pub const METHOD_SAMPLING_CREATE_MESSAGE: &str = "sampling/createMessage";
/// Server-initiated: list the client's filesystem roots.
pub const METHOD_ROOTS_LIST: &str = "roots/list";
/// Server-initiated: ask the client to collect structured user input.
pub const METHOD_ELICITATION_CREATE: &str = "elicitation/create";

// ---------------------------------------------------------------------------
// Notification constants
// ---------------------------------------------------------------------------

/// Client signals that the handshake is complete.
pub const NOTIF_INITIALIZED: &str = "notifications/initialized";
/// Either side signals that a prior request has been cancelled.
pub const NOTIF_CANCELLED: &str = "notifications/cancelled";
/// Either side reports progress on a long-running request.
pub const NOTIF_PROGRESS: &str = "notifications/progress";
/// Server emits a log record at or above the negotiated level.
pub const NOTIF_MESSAGE: &str = "notifications/message";
/// Server notifies that a subscribed resource's content has been updated.
pub const NOTIF_RESOURCES_UPDATED: &str = "notifications/resources/updated";
/// Server notifies that the resource list has changed.
pub const NOTIF_RESOURCES_LIST_CHANGED: &str = "notifications/resources/list_changed";
/// Server notifies that the tool list has changed.
pub const NOTIF_TOOLS_LIST_CHANGED: &str = "notifications/tools/list_changed";
/// Server notifies that the prompt list has changed.
pub const NOTIF_PROMPTS_LIST_CHANGED: &str = "notifications/prompts/list_changed";
/// Client notifies that its root list has changed.
pub const NOTIF_ROOTS_LIST_CHANGED: &str = "notifications/roots/list_changed";

// ---------------------------------------------------------------------------
// JSON-RPC error codes
// ---------------------------------------------------------------------------

/// The reserved JSON-RPC 2.0 error codes.
///
/// Server-defined codes must be `>= -32000`.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ---------------------------------------------------------------------------
// Request id and progress token scalars
// ---------------------------------------------------------------------------

/// A JSON-RPC request id: either a string or a 64-bit signed integer.
///
/// Equality and hashing respect the underlying kind, so `RequestId` from
/// the number `1` is distinct from the string `"1"`. Notifications carry no
/// id at all; the error envelope uses `Option<RequestId>` (serialized as
/// JSON `null`) when the offending request's id could not be recovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id, allocated monotonically by this implementation.
    Number(i64),
    /// String id, accepted from peers that use them.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

/// An opaque scalar a caller attaches to a request so the peer can stream
/// progress notifications for it.
///
/// Tokens must be unique per outstanding request on a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProgressToken {
    /// Integer token.
    Number(i64),
    /// String token.
    String(String),
}

impl fmt::Display for ProgressToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&RequestId> for ProgressToken {
    fn from(id: &RequestId) -> Self {
        match id {
            RequestId::Number(n) => Self::Number(*n),
            RequestId::String(s) => Self::String(s.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 envelopes
// ---------------------------------------------------------------------------

/// A JSON-RPC 2.0 request: has an id, expects exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol discriminator; always `"2.0"`.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// Correlation id, unique among this side's outstanding requests.
    pub id: RequestId,
    /// The method name, e.g. `tools/call`.
    pub method: String,
    /// Raw parameter value; higher layers decode it with the type they
    /// expect, so it is preserved verbatim here.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a request envelope.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC 2.0 notification: no id, never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Protocol discriminator; always `"2.0"`.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// The notification method name.
    pub method: String,
    /// Raw parameter value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    /// Build a notification envelope.
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            method: method.into(),
            params,
        }
    }
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol discriminator; always `"2.0"`.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// The id of the request being answered.
    pub id: RequestId,
    /// Raw result value, preserved for the caller's typed decoder. `null`
    /// results are represented as `Value::Null`, never omitted.
    pub result: serde_json::Value,
}

impl JsonRpcResponse {
    /// Build a response envelope.
    pub fn new(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            result,
        }
    }
}

/// The error object carried inside an error envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// One of the reserved codes in [`error_codes`], or a server-defined
    /// code `>= -32000`.
    pub code: i32,
    /// Short human-readable description.
    pub message: String,
    /// Optional structured detail, preserved verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorResponse {
    /// Protocol discriminator; always `"2.0"`.
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: String,
    /// The id of the request being answered. `None` serializes as JSON
    /// `null`, used when the request's id could not be parsed.
    pub id: Option<RequestId>,
    /// The error object.
    pub error: JsonRpcError,
}

impl JsonRpcErrorResponse {
    /// Build an error envelope.
    pub fn new(id: Option<RequestId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: default_jsonrpc(),
            id,
            error,
        }
    }
}

/// Any JSON-RPC 2.0 envelope, discriminated on read by the presence of
/// `id`, `method`, `result`, and `error`.
///
/// The untagged variant order matters: a request needs `id` + `method`, an
/// error response needs `error`, a response needs `result`, and anything
/// left with a `method` but no usable `id` is a notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Request envelope.
    Request(JsonRpcRequest),
    /// Error response envelope.
    Error(JsonRpcErrorResponse),
    /// Success response envelope.
    Response(JsonRpcResponse),
    /// Notification envelope.
    Notification(JsonRpcNotification),
}

impl Message {
    /// Serialize into the single-line compact encoding required by
    /// newline-delimited framing.
    pub fn to_line(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one framed line into an envelope.
    pub fn from_line(line: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

// ---------------------------------------------------------------------------
// Implementation info and capabilities
// ---------------------------------------------------------------------------

/// Name and version of an MCP implementation, exchanged during initialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Implementation name, e.g. `"mcpkit-server"`.
    pub name: String,
    /// Implementation version string.
    pub version: String,
}

/// Capability block advertised by a client that exposes filesystem roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootsCapability {
    /// Whether the client emits `notifications/roots/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capability block advertised by a client that can service sampling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SamplingCapability {}

/// Capability block advertised by a client that can service elicitation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElicitationCapability {}

/// Optional feature blocks a client declares during initialize.
///
/// A server must not issue a server-initiated request unless the client
/// advertised the matching block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCapabilities {
    /// Experimental, implementation-specific capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<serde_json::Value>,
    /// Present when the client exposes filesystem roots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roots: Option<RootsCapability>,
    /// Present when the client can answer `sampling/createMessage`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<SamplingCapability>,
    /// Present when the client can answer `elicitation/create`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elicitation: Option<ElicitationCapability>,
}

/// Capability block for a server's prompt registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptsCapability {
    /// Whether the server emits `notifications/prompts/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capability block for a server's resource registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesCapability {
    /// Whether `resources/subscribe` is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the server emits `notifications/resources/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capability block for a server's tool registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the server emits `notifications/tools/list_changed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Capability block advertised by a server that emits log notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingCapability {}

/// Capability block advertised by a server that answers
/// `completion/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionsCapability {}

/// Optional feature blocks a server declares during initialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerCapabilities {
    /// Experimental, implementation-specific capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<serde_json::Value>,
    /// Present when the server emits `notifications/message`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingCapability>,
    /// Present when the server answers `completion/complete`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<CompletionsCapability>,
    /// Present when the server exposes prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,
    /// Present when the server exposes resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,
    /// Present when the server exposes tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
}

/// Parameters of the `initialize` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// The protocol revision the client wants to speak.
    pub protocol_version: String,
    /// The client's capability blocks.
    #[serde(default)]
    pub capabilities: ClientCapabilities,
    /// The client's name and version.
    pub client_info: Implementation,
}

/// The server's answer to `initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// The protocol revision the session will use.
    pub protocol_version: String,
    /// The server's capability blocks.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// The server's name and version.
    pub server_info: Implementation,
    /// Optional usage instructions for the host LLM.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ---------------------------------------------------------------------------
// Request metadata and pagination
// ---------------------------------------------------------------------------

/// The reserved `_meta` block on request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMeta {
    /// Token the caller supplies so the peer can stream progress.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_token: Option<ProgressToken>,
}

impl RequestMeta {
    /// Extract the progress token from a raw params value, if any.
    pub fn progress_token_of(params: Option<&serde_json::Value>) -> Option<ProgressToken> {
        let meta = params?.get("_meta")?;
        serde_json::from_value::<RequestMeta>(meta.clone())
            .ok()?
            .progress_token
    }
}

/// Parameters shared by every paginated `*/list` request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedParams {
    /// Opaque cursor from a previous page; `None` requests the first page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

// ---------------------------------------------------------------------------
// Content blocks
// ---------------------------------------------------------------------------

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message from the human user.
    User,
    /// A message from the AI assistant.
    Assistant,
}

/// Optional display annotations on a content block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    /// Who this content is intended for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audience: Option<Vec<Role>>,
    /// Importance from 0.0 (least) to 1.0 (most).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

/// Inline plain-text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    /// The text body.
    pub text: String,
    /// Optional display annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Inline base64-encoded image content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    /// Base64-encoded image bytes.
    pub data: String,
    /// MIME type of the image.
    pub mime_type: String,
    /// Optional display annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Inline base64-encoded audio content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioContent {
    /// Base64-encoded audio bytes.
    pub data: String,
    /// MIME type of the audio.
    pub mime_type: String,
    /// Optional display annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// A reference to a server resource by URI, without inlined contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLink {
    /// The resource URI.
    pub uri: String,
    /// Optional human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Resource contents embedded directly into a content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedResource {
    /// The inlined contents.
    pub resource: ResourceContents,
    /// Optional display annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// A content block, discriminated by `"type"` on the wire.
///
/// Unknown discriminators deserialize into [`Content::Opaque`] so that
/// additions to the protocol do not break older peers.
#[derive(Debug, Clone)]
pub enum Content {
    /// Plain text (`"type": "text"`).
    Text(TextContent),
    /// Image data (`"type": "image"`).
    Image(ImageContent),
    /// Audio data (`"type": "audio"`).
    Audio(AudioContent),
    /// A resource reference (`"type": "resource_link"`).
    ResourceLink(ResourceLink),
    /// An embedded resource (`"type": "resource"`).
    Resource(EmbeddedResource),
    /// A content block with an unrecognized discriminator, preserved
    /// verbatim.
    Opaque(serde_json::Value),
}

impl Content {
    /// Build a plain-text content block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextContent {
            text: text.into(),
            annotations: None,
        })
    }
}

impl Serialize for Content {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Tagged<'a, T: Serialize> {
            #[serde(rename = "type")]
            kind: &'a str,
            #[serde(flatten)]
            inner: &'a T,
        }

        match self {
            Self::Text(c) => Tagged { kind: "text", inner: c }.serialize(serializer),
            Self::Image(c) => Tagged { kind: "image", inner: c }.serialize(serializer),
            Self::Audio(c) => Tagged { kind: "audio", inner: c }.serialize(serializer),
            Self::ResourceLink(c) => Tagged {
                kind: "resource_link",
                inner: c,
            }
            .serialize(serializer),
            Self::Resource(c) => Tagged {
                kind: "resource",
                inner: c,
            }
            .serialize(serializer),
            Self::Opaque(v) => v.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Content {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        let value = serde_json::Value::deserialize(deserializer)?;
        let tag = value.get("type").and_then(serde_json::Value::as_str);
        match tag {
            Some("text") => serde_json::from_value(value)
                .map(Self::Text)
                .map_err(D::Error::custom),
            Some("image") => serde_json::from_value(value)
                .map(Self::Image)
                .map_err(D::Error::custom),
            Some("audio") => serde_json::from_value(value)
                .map(Self::Audio)
                .map_err(D::Error::custom),
            Some("resource_link") => serde_json::from_value(value)
                .map(Self::ResourceLink)
                .map_err(D::Error::custom),
            Some("resource") => serde_json::from_value(value)
                .map(Self::Resource)
                .map_err(D::Error::custom),
            _ => Ok(Self::Opaque(value)),
        }
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Text contents of a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResourceContents {
    /// URI of the resource these contents belong to.
    pub uri: String,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// The text body.
    pub text: String,
}

/// Binary contents of a resource, base64-encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobResourceContents {
    /// URI of the resource these contents belong to.
    pub uri: String,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Base64-encoded bytes.
    pub blob: String,
}

/// Resource contents: either text or a binary blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResourceContents {
    /// UTF-8 text contents.
    Text(TextResourceContents),
    /// Base64-encoded binary contents.
    Blob(BlobResourceContents),
}

/// Metadata describing a fixed-URI resource exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Canonical URI of this resource.
    pub uri: String,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Optional display annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

/// Metadata describing a parameterized resource (URI template).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// RFC 6570-style template, e.g. `file:///logs/{name}`.
    pub uri_template: String,
    /// Human-readable name.
    pub name: String,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional MIME type for all matching resources.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Response to `resources/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResult {
    /// Resources in this page.
    pub resources: Vec<Resource>,
    /// Opaque cursor for the next page; `None` means this is the last page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Response to `resources/templates/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourceTemplatesResult {
    /// Templates in this page.
    pub resource_templates: Vec<ResourceTemplate>,
    /// Opaque cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceParams {
    /// The URI to read.
    pub uri: String,
}

/// Response to `resources/read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// One or more content items for the URI.
    pub contents: Vec<ResourceContents>,
}

/// Parameters for `resources/subscribe` and `resources/unsubscribe`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeParams {
    /// The URI to (un)subscribe.
    pub uri: String,
}

/// Parameters of `notifications/resources/updated`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceUpdatedParams {
    /// The URI whose contents changed.
    pub uri: String,
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Metadata describing a tool exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name, used as the `tools/call` key.
    pub name: String,
    /// Optional display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Human-readable description for the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the `arguments` object.
    pub input_schema: serde_json::Value,
    /// Optional JSON Schema describing `structuredContent` on results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<serde_json::Value>,
}

/// Response to `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Tools in this page.
    pub tools: Vec<Tool>,
    /// Opaque cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Name of the tool to invoke.
    pub name: String,
    /// Structured argument map matching the tool's input schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Map<String, serde_json::Value>>,
    /// Reserved metadata (progress token etc.).
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// The outcome of a tool invocation.
///
/// A failed tool run is reported here with `is_error = true` and content
/// describing the failure; it is a domain outcome, not a JSON-RPC error.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Content blocks produced by the tool.
    pub content: Vec<Content>,
    /// Structured counterpart of the content, when the tool declares an
    /// output schema.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
    /// Whether the tool run failed.
    #[serde(default)]
    pub is_error: bool,
}

impl CallToolResult {
    /// A successful result with a single text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: false,
        }
    }

    /// A failed result with a single text block describing the error.
    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: true,
        }
    }

    /// Wrap an arbitrary serializable value: the JSON encoding becomes a
    /// text block and the raw value is carried as `structuredContent`.
    pub fn from_serializable<T: Serialize>(value: &T) -> crate::error::Result<Self> {
        let raw = serde_json::to_value(value)?;
        Ok(Self {
            content: vec![Content::text(serde_json::to_string(&raw)?)],
            structured_content: Some(raw),
            is_error: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Prompts
// ---------------------------------------------------------------------------

/// Describes a single argument accepted by a prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptArgument {
    /// Argument name, used as a key when calling `prompts/get`.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When `true`, this argument must be supplied by the caller.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
}

/// Metadata describing a prompt template exposed by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    /// Unique name of this prompt.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Argument descriptors for this template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// A single message in a rendered prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    /// Who authored this message.
    pub role: Role,
    /// The message body.
    pub content: Content,
}

/// Response to `prompts/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPromptsResult {
    /// Prompts in this page.
    pub prompts: Vec<Prompt>,
    /// Opaque cursor for the next page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Parameters for `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPromptParams {
    /// Name of the prompt to render.
    pub name: String,
    /// Template argument substitutions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<HashMap<String, String>>,
    /// Reserved metadata.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<RequestMeta>,
}

/// Response to `prompts/get`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPromptResult {
    /// Human-readable description of the rendered prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The rendered messages, ready to send to an LLM.
    pub messages: Vec<PromptMessage>,
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Syslog-style severity levels, totally ordered from `Debug` up to
/// `Emergency`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    /// Verbose diagnostics.
    Debug,
    /// Normal operational messages.
    Info,
    /// Significant but normal events.
    Notice,
    /// Warning conditions.
    Warning,
    /// Error conditions.
    Error,
    /// Critical conditions.
    Critical,
    /// Action must be taken immediately.
    Alert,
    /// The system is unusable.
    Emergency,
}

/// Parameters for `logging/setLevel`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLevelParams {
    /// The minimum level the server should emit.
    pub level: LoggingLevel,
}

/// Parameters of `notifications/message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingMessageParams {
    /// Severity of this record.
    pub level: LoggingLevel,
    /// Optional logger name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary structured payload.
    pub data: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Progress and cancellation
// ---------------------------------------------------------------------------

/// Parameters of `notifications/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotificationParams {
    /// Token identifying the outstanding request this progress belongs to.
    pub progress_token: ProgressToken,
    /// Work completed so far. Must increase between notifications.
    pub progress: f64,
    /// Total work expected, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<f64>,
    /// Optional human-readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Parameters of `notifications/cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledNotificationParams {
    /// Id of the request being cancelled.
    pub request_id: RequestId,
    /// Optional reason for diagnostics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// A single message in a sampling conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    /// Who authored this message.
    pub role: Role,
    /// The message body.
    pub content: Content,
}

/// A hint suggesting which model to prefer for a sampling request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHint {
    /// Model name or prefix to prefer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Weighted preferences for model selection in a sampling request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPreferences {
    /// Ordered list of model hints from most to least preferred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints: Option<Vec<ModelHint>>,
    /// Priority weight for minimizing cost (0.0-1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_priority: Option<f64>,
    /// Priority weight for minimizing latency (0.0-1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_priority: Option<f64>,
    /// Priority weight for maximizing quality (0.0-1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intelligence_priority: Option<f64>,
}

/// What conversational context the client should include when sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IncludeContext {
    /// No additional context.
    None,
    /// Context from the requesting server only.
    ThisServer,
    /// Context from every connected server.
    AllServers,
}

/// Server-initiated request asking the client to generate a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    /// The conversation history to complete.
    pub messages: Vec<SamplingMessage>,
    /// Model selection preferences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<ModelPreferences>,
    /// Optional system prompt to prepend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// What conversational context to include.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_context: Option<IncludeContext>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Optional stop sequences.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    /// Provider-specific metadata, preserved verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// The client's response to `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    /// Role of the generated message; always [`Role::Assistant`].
    pub role: Role,
    /// The generated content.
    pub content: Content,
    /// The model that produced this result.
    pub model: String,
    /// Why generation stopped (e.g. `"endTurn"`, `"maxTokens"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------------

/// A filesystem root the client grants the server access to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    /// Root URI; must use the `file://` scheme.
    pub uri: String,
    /// Optional human-readable name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The client's response to `roots/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// All roots currently exposed by the client.
    pub roots: Vec<Root>,
}

// ---------------------------------------------------------------------------
// Elicitation
// ---------------------------------------------------------------------------

/// How the user responded to an elicitation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElicitationAction {
    /// User accepted and submitted the elicitation.
    Accept,
    /// User explicitly declined.
    Decline,
    /// User dismissed without completing.
    Cancel,
}

/// Server-initiated request asking the client to collect structured user
/// input mid-call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElicitationCreateParams {
    /// Human-readable message displayed to the user.
    pub message: String,
    /// JSON Schema describing the expected response structure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_schema: Option<serde_json::Value>,
}

/// The client's response to `elicitation/create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElicitationResult {
    /// How the user responded.
    pub action: ElicitationAction,
    /// The collected content, if the user accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// What a completion request refers to: a prompt or a resource template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CompletionReference {
    /// A prompt, by name.
    #[serde(rename = "ref/prompt")]
    Prompt {
        /// The prompt name.
        name: String,
    },
    /// A resource template, by URI template.
    #[serde(rename = "ref/resource")]
    Resource {
        /// The URI template.
        uri: String,
    },
}

/// The argument being completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionArgument {
    /// Argument (or template variable) name.
    pub name: String,
    /// The partial value typed so far; matches are by prefix.
    pub value: String,
}

/// Parameters for `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteParams {
    /// The prompt or template the argument belongs to.
    #[serde(rename = "ref")]
    pub reference: CompletionReference,
    /// The argument being completed.
    pub argument: CompletionArgument,
}

/// A page of completion values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    /// Up to 100 matching values.
    pub values: Vec<String>,
    /// Total number of matches, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Whether more matches exist beyond `values`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
}

/// Response to `completion/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteResult {
    /// The completion payload.
    pub completion: Completion,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn round_trip(line: &str) -> String {
        let msg = Message::from_line(line).expect("parse");
        msg.to_line().expect("encode")
    }

    #[test]
    fn test_request_round_trip_preserves_shape() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{"cursor":"abc"}}"#;
        let encoded = round_trip(line);
        let a: serde_json::Value = serde_json::from_str(line).unwrap();
        let b: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_notification_round_trip_has_no_id() {
        let line = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let msg = Message::from_line(line).unwrap();
        assert!(matches!(msg, Message::Notification(_)));
        let encoded = msg.to_line().unwrap();
        let v: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert!(v.get("id").is_none());
    }

    #[test]
    fn test_response_round_trip_keeps_null_result() {
        let line = r#"{"jsonrpc":"2.0","id":"abc","result":null}"#;
        let msg = Message::from_line(line).unwrap();
        match &msg {
            Message::Response(r) => {
                assert_eq!(r.id, RequestId::String("abc".to_string()));
                assert!(r.result.is_null());
            }
            other => panic!("expected response, got {other:?}"),
        }
        let v: serde_json::Value = serde_json::from_str(&msg.to_line().unwrap()).unwrap();
        assert!(v.get("result").is_some());
    }

    #[test]
    fn test_error_response_classified_and_null_id_written() {
        let line = r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32700,"message":"Parse error"}}"#;
        let msg = Message::from_line(line).unwrap();
        match &msg {
            Message::Error(e) => {
                assert!(e.id.is_none());
                assert_eq!(e.error.code, error_codes::PARSE_ERROR);
            }
            other => panic!("expected error, got {other:?}"),
        }
        let v: serde_json::Value = serde_json::from_str(&msg.to_line().unwrap()).unwrap();
        assert!(v["id"].is_null(), "null id must be written, not omitted");
    }

    #[test]
    fn test_unknown_fields_ignored_on_read() {
        let line = r#"{"jsonrpc":"2.0","id":7,"method":"ping","params":{},"futureField":true}"#;
        let msg = Message::from_line(line).unwrap();
        assert!(matches!(msg, Message::Request(_)));
    }

    #[test]
    fn test_request_id_kinds_are_distinct() {
        let a = RequestId::Number(1);
        let b = RequestId::String("1".to_string());
        assert_ne!(a, b);

        let mut set = HashSet::new();
        set.insert(a.clone());
        set.insert(b.clone());
        assert_eq!(set.len(), 2);

        // Serialized forms differ too.
        assert_eq!(serde_json::to_string(&a).unwrap(), "1");
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"1\"");
    }

    #[test]
    fn test_encoding_is_single_line() {
        let msg = Message::Request(JsonRpcRequest::new(
            RequestId::Number(3),
            "tools/call",
            Some(serde_json::json!({"name": "echo", "arguments": {"message": "a\nb"}})),
        ));
        let line = msg.to_line().unwrap();
        assert!(!line.contains('\n'), "framing requires one line per message");
    }

    #[test]
    fn test_content_tagged_serialization() {
        let c = Content::text("hi");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v["type"], "text");
        assert_eq!(v["text"], "hi");
    }

    #[test]
    fn test_content_unknown_tag_is_opaque_and_preserved() {
        let raw = serde_json::json!({"type": "video", "data": "...", "mimeType": "video/mp4"});
        let c: Content = serde_json::from_value(raw.clone()).unwrap();
        match &c {
            Content::Opaque(v) => assert_eq!(*v, raw),
            other => panic!("expected opaque, got {other:?}"),
        }
        // Round-trips unchanged.
        assert_eq!(serde_json::to_value(&c).unwrap(), raw);
    }

    #[test]
    fn test_embedded_resource_content_round_trip() {
        let raw = serde_json::json!({
            "type": "resource",
            "resource": {"uri": "test://r/1", "text": "body", "mimeType": "text/plain"}
        });
        let c: Content = serde_json::from_value(raw.clone()).unwrap();
        assert!(matches!(c, Content::Resource(_)));
        assert_eq!(serde_json::to_value(&c).unwrap(), raw);
    }

    #[test]
    fn test_logging_levels_are_totally_ordered() {
        use LoggingLevel::*;
        let order = [
            Debug, Info, Notice, Warning, Error, Critical, Alert, Emergency,
        ];
        for pair in order.windows(2) {
            assert!(pair[0] < pair[1], "{:?} should sort below {:?}", pair[0], pair[1]);
        }
        assert_eq!(serde_json::to_string(&Warning).unwrap(), "\"warning\"");
    }

    #[test]
    fn test_capabilities_use_camel_case_and_skip_none() {
        let caps = ServerCapabilities {
            resources: Some(ResourcesCapability {
                subscribe: Some(true),
                list_changed: Some(true),
            }),
            ..Default::default()
        };
        let v = serde_json::to_value(&caps).unwrap();
        assert_eq!(v["resources"]["listChanged"], true);
        assert!(v.get("tools").is_none(), "None blocks must be omitted");
    }

    #[test]
    fn test_progress_token_extracted_from_meta() {
        let params = serde_json::json!({
            "name": "longRunningOperation",
            "arguments": {},
            "_meta": {"progressToken": "p1"}
        });
        let token = RequestMeta::progress_token_of(Some(&params));
        assert_eq!(token, Some(ProgressToken::String("p1".to_string())));
        assert_eq!(RequestMeta::progress_token_of(None), None);
    }

    #[test]
    fn test_completion_reference_wire_tags() {
        let r = CompletionReference::Prompt {
            name: "greet".to_string(),
        };
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["type"], "ref/prompt");

        let r: CompletionReference =
            serde_json::from_value(serde_json::json!({"type": "ref/resource", "uri": "t://{x}"}))
                .unwrap();
        assert!(matches!(r, CompletionReference::Resource { .. }));
    }

    #[test]
    fn test_call_tool_result_from_serializable() {
        #[derive(Serialize)]
        struct Stats {
            count: u32,
        }
        let r = CallToolResult::from_serializable(&Stats { count: 3 }).unwrap();
        assert!(!r.is_error);
        assert_eq!(r.structured_content.unwrap()["count"], 3);
        match &r.content[0] {
            Content::Text(t) => assert!(t.text.contains("\"count\":3")),
            other => panic!("expected text content, got {other:?}"),
        }
    }

    #[test]
    fn test_initialize_params_wire_names() {
        let p = InitializeParams {
            protocol_version: PROTOCOL_VERSION_2024_11_05.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "t".to_string(),
                version: "1".to_string(),
            },
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["protocolVersion"], "2024-11-05");
        assert_eq!(v["clientInfo"]["name"], "t");
    }
}
