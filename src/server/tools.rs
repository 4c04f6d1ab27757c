//! Tool registration primitives
//!
//! A tool is declared with [`ToolBuilder`]: metadata (name, description,
//! optional title), a parameter list or an explicit JSON input schema, and
//! an async invoker. The registry derives the input schema from the
//! declared parameters when one is not supplied: primitive parameters map
//! to `{string|integer|number|boolean}`, collections to `array`, objects to
//! `object`, and `required` lists the parameters declared without defaults.
//!
//! The invoker receives the structured argument map and a
//! [`ToolContext`](super::ToolContext) carrying the progress token, the
//! cancellation handle, and the originating session.

use std::future::Future;
use std::sync::Arc;

use crate::endpoint::BoxFuture;
use crate::error::Result;
use crate::types::{CallToolResult, Tool};

use super::ToolContext;

/// The JSON Schema type a declared parameter maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// `{"type": "string"}`
    String,
    /// `{"type": "integer"}`
    Integer,
    /// `{"type": "number"}`
    Number,
    /// `{"type": "boolean"}`
    Boolean,
    /// `{"type": "array"}`
    Array,
    /// `{"type": "object"}`
    Object,
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }
}

/// The stored invoker: structured arguments in, [`CallToolResult`] out.
pub(crate) type ToolInvoker = Arc<
    dyn Fn(
            serde_json::Map<String, serde_json::Value>,
            ToolContext,
        ) -> BoxFuture<'static, Result<CallToolResult>>
        + Send
        + Sync,
>;

/// A tool ready for registration: wire metadata plus its invoker.
#[derive(Clone)]
pub struct RegisteredTool {
    pub(crate) descriptor: Tool,
    pub(crate) invoker: ToolInvoker,
}

impl RegisteredTool {
    /// The wire metadata served by `tools/list`.
    pub fn descriptor(&self) -> &Tool {
        &self.descriptor
    }
}

impl std::fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

struct ParamSpec {
    name: String,
    kind: ParamKind,
    description: Option<String>,
    required: bool,
}

/// Declarative builder for a [`RegisteredTool`].
///
/// # Examples
///
/// ```
/// use mcpkit::server::{ParamKind, ToolBuilder};
/// use mcpkit::types::CallToolResult;
///
/// let echo = ToolBuilder::new("echo")
///     .description("Echoes back the input message")
///     .required_param("message", ParamKind::String, "The text to echo")
///     .invoke(|args, _ctx| async move {
///         let message = args
///             .get("message")
///             .and_then(|m| m.as_str())
///             .unwrap_or_default();
///         Ok(CallToolResult::text(format!("Echo: {message}")))
///     });
/// assert_eq!(echo.descriptor().name, "echo");
/// ```
pub struct ToolBuilder {
    name: String,
    title: Option<String>,
    description: Option<String>,
    params: Vec<ParamSpec>,
    input_schema: Option<serde_json::Value>,
    output_schema: Option<serde_json::Value>,
}

impl ToolBuilder {
    /// Start a tool declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            params: Vec::new(),
            input_schema: None,
            output_schema: None,
        }
    }

    /// Human-readable description shown to the model.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Optional display title.
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Declare a parameter the caller must supply.
    #[must_use]
    pub fn required_param(
        mut self,
        name: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: Some(description.into()),
            required: true,
        });
        self
    }

    /// Declare a parameter with a default, i.e. one the caller may omit.
    #[must_use]
    pub fn optional_param(
        mut self,
        name: impl Into<String>,
        kind: ParamKind,
        description: impl Into<String>,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.into(),
            kind,
            description: Some(description.into()),
            required: false,
        });
        self
    }

    /// Supply the input schema verbatim instead of deriving it from the
    /// declared parameters.
    #[must_use]
    pub fn input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = Some(schema);
        self
    }

    /// Declare the schema of `structuredContent` on results.
    #[must_use]
    pub fn output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Attach the invoker and finish the declaration.
    pub fn invoke<F, Fut>(self, f: F) -> RegisteredTool
    where
        F: Fn(serde_json::Map<String, serde_json::Value>, ToolContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<CallToolResult>> + Send + 'static,
    {
        let input_schema = self
            .input_schema
            .unwrap_or_else(|| derive_schema(&self.params));
        RegisteredTool {
            descriptor: Tool {
                name: self.name,
                title: self.title,
                description: self.description,
                input_schema,
                output_schema: self.output_schema,
            },
            invoker: Arc::new(move |args, ctx| Box::pin(f(args, ctx))),
        }
    }

    /// Like [`ToolBuilder::invoke`] for handlers that return a plain
    /// serializable value: the JSON encoding becomes a single text content
    /// block and the raw value rides along as `structuredContent`.
    pub fn invoke_value<F, Fut, T>(self, f: F) -> RegisteredTool
    where
        F: Fn(serde_json::Map<String, serde_json::Value>, ToolContext) -> Fut
            + Send
            + Sync
            + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: serde::Serialize,
    {
        self.invoke(move |args, ctx| {
            let fut = f(args, ctx);
            async move {
                let value = fut.await?;
                CallToolResult::from_serializable(&value)
            }
        })
    }
}

/// Build `{"type": "object", "properties": ..., "required": ...}` from the
/// declared parameter list.
fn derive_schema(params: &[ParamSpec]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for param in params {
        let mut prop = serde_json::Map::new();
        prop.insert(
            "type".to_string(),
            serde_json::Value::String(param.kind.json_type().to_string()),
        );
        if let Some(description) = &param.description {
            prop.insert(
                "description".to_string(),
                serde_json::Value::String(description.clone()),
            );
        }
        properties.insert(param.name.clone(), serde_json::Value::Object(prop));
        if param.required {
            required.push(serde_json::Value::String(param.name.clone()));
        }
    }

    let mut schema = serde_json::Map::new();
    schema.insert(
        "type".to_string(),
        serde_json::Value::String("object".to_string()),
    );
    schema.insert("properties".to_string(), serde_json::Value::Object(properties));
    if !required.is_empty() {
        schema.insert("required".to_string(), serde_json::Value::Array(required));
    }
    serde_json::Value::Object(schema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_derivation_covers_all_kinds() {
        let tool = ToolBuilder::new("kitchen_sink")
            .required_param("s", ParamKind::String, "a string")
            .required_param("i", ParamKind::Integer, "an integer")
            .optional_param("n", ParamKind::Number, "a number")
            .optional_param("b", ParamKind::Boolean, "a flag")
            .optional_param("items", ParamKind::Array, "a list")
            .optional_param("extra", ParamKind::Object, "a bag")
            .invoke(|_args, _ctx| async { Ok(CallToolResult::text("ok")) });

        let schema = &tool.descriptor().input_schema;
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["s"]["type"], "string");
        assert_eq!(schema["properties"]["i"]["type"], "integer");
        assert_eq!(schema["properties"]["n"]["type"], "number");
        assert_eq!(schema["properties"]["b"]["type"], "boolean");
        assert_eq!(schema["properties"]["items"]["type"], "array");
        assert_eq!(schema["properties"]["extra"]["type"], "object");

        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["s", "i"], "only defaultless params are required");
    }

    #[test]
    fn test_required_omitted_when_everything_has_defaults() {
        let tool = ToolBuilder::new("lenient")
            .optional_param("x", ParamKind::String, "whatever")
            .invoke(|_args, _ctx| async { Ok(CallToolResult::text("ok")) });
        assert!(tool.descriptor().input_schema.get("required").is_none());
    }

    #[test]
    fn test_explicit_schema_wins_over_derivation() {
        let explicit = serde_json::json!({
            "type": "object",
            "properties": {"custom": {"type": "string", "pattern": "^x"}}
        });
        let tool = ToolBuilder::new("custom")
            .required_param("ignored", ParamKind::String, "not in schema")
            .input_schema(explicit.clone())
            .invoke(|_args, _ctx| async { Ok(CallToolResult::text("ok")) });
        assert_eq!(tool.descriptor().input_schema, explicit);
    }

    #[test]
    fn test_descriptor_carries_title_and_output_schema() {
        let tool = ToolBuilder::new("annotated")
            .title("Annotated Tool")
            .description("does things")
            .output_schema(serde_json::json!({"type": "object"}))
            .invoke(|_args, _ctx| async { Ok(CallToolResult::text("ok")) });
        assert_eq!(tool.descriptor().title.as_deref(), Some("Annotated Tool"));
        assert!(tool.descriptor().output_schema.is_some());
    }
}
