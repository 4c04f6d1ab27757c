//! Resource registration primitives
//!
//! Resources come in two forms. A *direct* resource has a fixed URI and a
//! reader that produces its contents. A *template* resource is declared
//! with an RFC 6570-style URI template (`scheme://path/{variable}`); on
//! `resources/read` the registry tries exact-URI matches first, then the
//! templates in registration order, and the first template that binds wins.
//! Captured variables are handed to the reader as a name/value map.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use regex::Regex;

use crate::endpoint::{BoxFuture, RequestContext};
use crate::error::{McpError, Result};
use crate::types::{Resource, ResourceContents, ResourceTemplate};

use super::ArgumentCompleter;

/// A compiled URI template: literal segments plus `{variable}` captures.
///
/// Variables match one path segment (`[^/]+`). Matching is anchored to the
/// full URI.
///
/// # Examples
///
/// ```
/// use mcpkit::server::UriTemplate;
///
/// let template = UriTemplate::parse("test://static/{id}").unwrap();
/// let vars = template.matches("test://static/42").unwrap();
/// assert_eq!(vars["id"], "42");
/// assert!(template.matches("test://static/a/b").is_none());
/// ```
#[derive(Debug, Clone)]
pub struct UriTemplate {
    raw: String,
    pattern: Regex,
    variables: Vec<String>,
}

impl UriTemplate {
    /// Compile a template string.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] for unbalanced braces, empty or
    /// non-identifier variable names, or duplicate variables.
    pub fn parse(template: &str) -> Result<Self> {
        let mut pattern = String::from("^");
        let mut variables = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            let (literal, tail) = rest.split_at(open);
            pattern.push_str(&regex::escape(literal));
            let close = tail.find('}').ok_or_else(|| {
                McpError::Config(format!("unbalanced '{{' in URI template: {template}"))
            })?;
            let name = &tail[1..close];
            if name.is_empty()
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Err(McpError::Config(format!(
                    "invalid variable name '{name}' in URI template: {template}"
                )));
            }
            if variables.iter().any(|v| v == name) {
                return Err(McpError::Config(format!(
                    "duplicate variable '{name}' in URI template: {template}"
                )));
            }
            pattern.push_str(&format!("(?P<{name}>[^/]+)"));
            variables.push(name.to_string());
            rest = &tail[close + 1..];
        }
        pattern.push_str(&regex::escape(rest));
        pattern.push('$');

        let pattern = Regex::new(&pattern)
            .map_err(|e| McpError::Config(format!("bad URI template {template}: {e}")))?;

        Ok(Self {
            raw: template.to_string(),
            pattern,
            variables,
        })
    }

    /// Try to bind `uri` against this template, returning the captured
    /// variables on success.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(uri)?;
        Some(
            self.variables
                .iter()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.clone(), m.as_str().to_string()))
                })
                .collect(),
        )
    }

    /// The original template string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Names of the template's variables, in order of appearance.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }
}

pub(crate) type ResourceReader =
    Arc<dyn Fn(RequestContext) -> BoxFuture<'static, Result<Vec<ResourceContents>>> + Send + Sync>;

pub(crate) type TemplateReader = Arc<
    dyn Fn(
            HashMap<String, String>,
            RequestContext,
        ) -> BoxFuture<'static, Result<Vec<ResourceContents>>>
        + Send
        + Sync,
>;

/// A direct (fixed-URI) resource ready for registration.
#[derive(Clone)]
pub struct RegisteredResource {
    pub(crate) descriptor: Resource,
    pub(crate) reader: ResourceReader,
}

impl RegisteredResource {
    /// The wire metadata served by `resources/list`.
    pub fn descriptor(&self) -> &Resource {
        &self.descriptor
    }
}

impl std::fmt::Debug for RegisteredResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredResource")
            .field("uri", &self.descriptor.uri)
            .finish_non_exhaustive()
    }
}

/// A template resource ready for registration.
#[derive(Clone)]
pub struct RegisteredTemplate {
    pub(crate) descriptor: ResourceTemplate,
    pub(crate) template: UriTemplate,
    pub(crate) reader: TemplateReader,
    pub(crate) completers: HashMap<String, ArgumentCompleter>,
}

impl RegisteredTemplate {
    /// The wire metadata served by `resources/templates/list`.
    pub fn descriptor(&self) -> &ResourceTemplate {
        &self.descriptor
    }
}

impl std::fmt::Debug for RegisteredTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTemplate")
            .field("uri_template", &self.descriptor.uri_template)
            .finish_non_exhaustive()
    }
}

/// Declarative builder for a direct resource.
///
/// # Examples
///
/// ```
/// use mcpkit::server::ResourceBuilder;
/// use mcpkit::types::{ResourceContents, TextResourceContents};
///
/// let readme = ResourceBuilder::new("doc://readme", "README")
///     .description("Top-level documentation")
///     .mime_type("text/markdown")
///     .reader(|_ctx| async {
///         Ok(vec![ResourceContents::Text(TextResourceContents {
///             uri: "doc://readme".into(),
///             mime_type: Some("text/markdown".into()),
///             text: "# hello".into(),
///         })])
///     });
/// assert_eq!(readme.descriptor().uri, "doc://readme");
/// ```
pub struct ResourceBuilder {
    uri: String,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
}

impl ResourceBuilder {
    /// Start a resource declaration.
    pub fn new(uri: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            description: None,
            mime_type: None,
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// MIME type of the contents.
    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Attach the reader and finish the declaration.
    pub fn reader<F, Fut>(self, f: F) -> RegisteredResource
    where
        F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResourceContents>>> + Send + 'static,
    {
        RegisteredResource {
            descriptor: Resource {
                uri: self.uri,
                name: self.name,
                description: self.description,
                mime_type: self.mime_type,
                annotations: None,
            },
            reader: Arc::new(move |ctx| Box::pin(f(ctx))),
        }
    }
}

/// Declarative builder for a template resource.
///
/// # Examples
///
/// ```
/// use mcpkit::server::ResourceTemplateBuilder;
/// use mcpkit::types::{ResourceContents, TextResourceContents};
///
/// let numbered = ResourceTemplateBuilder::new("test://static/{id}", "Numbered")
///     .unwrap()
///     .complete("id", |prefix| {
///         (1..=3)
///             .map(|n| n.to_string())
///             .filter(|v| v.starts_with(prefix))
///             .collect()
///     })
///     .reader(|vars, _ctx| async move {
///         let uri = format!("test://static/{}", vars["id"]);
///         Ok(vec![ResourceContents::Text(TextResourceContents {
///             uri,
///             mime_type: None,
///             text: format!("item {}", vars["id"]),
///         })])
///     });
/// assert_eq!(numbered.descriptor().uri_template, "test://static/{id}");
/// ```
pub struct ResourceTemplateBuilder {
    template: UriTemplate,
    name: String,
    description: Option<String>,
    mime_type: Option<String>,
    completers: HashMap<String, ArgumentCompleter>,
}

impl ResourceTemplateBuilder {
    /// Start a template declaration.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Config`] when the template fails to compile.
    pub fn new(template: &str, name: impl Into<String>) -> Result<Self> {
        Ok(Self {
            template: UriTemplate::parse(template)?,
            name: name.into(),
            description: None,
            mime_type: None,
            completers: HashMap::new(),
        })
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// MIME type shared by every resource the template produces.
    #[must_use]
    pub fn mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Attach a completion source for one template variable; the function
    /// maps the partial value the user typed to candidate values.
    #[must_use]
    pub fn complete(
        mut self,
        variable: impl Into<String>,
        f: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.completers.insert(variable.into(), Arc::new(f));
        self
    }

    /// Attach the reader and finish the declaration.
    pub fn reader<F, Fut>(self, f: F) -> RegisteredTemplate
    where
        F: Fn(HashMap<String, String>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<ResourceContents>>> + Send + 'static,
    {
        RegisteredTemplate {
            descriptor: ResourceTemplate {
                uri_template: self.template.as_str().to_string(),
                name: self.name,
                description: self.description,
                mime_type: self.mime_type,
            },
            template: self.template,
            reader: Arc::new(move |vars, ctx| Box::pin(f(vars, ctx))),
            completers: self.completers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_binds_single_variable() {
        let t = UriTemplate::parse("test://r/{id}").unwrap();
        let vars = t.matches("test://r/1").unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars["id"], "1");
    }

    #[test]
    fn test_template_binds_multiple_variables() {
        let t = UriTemplate::parse("repo://{owner}/{name}/readme").unwrap();
        let vars = t.matches("repo://octo/mcpkit/readme").unwrap();
        assert_eq!(vars["owner"], "octo");
        assert_eq!(vars["name"], "mcpkit");
    }

    #[test]
    fn test_template_rejects_non_matching_uris() {
        let t = UriTemplate::parse("test://r/{id}").unwrap();
        assert!(t.matches("test://r/").is_none());
        assert!(t.matches("test://r/1/2").is_none());
        assert!(t.matches("other://r/1").is_none());
    }

    #[test]
    fn test_template_literals_are_escaped() {
        // Dots in the literal part must not act as regex wildcards.
        let t = UriTemplate::parse("file:///logs/{name}.log").unwrap();
        assert!(t.matches("file:///logs/app.log").is_some());
        assert!(t.matches("file:///logs/appXlog").is_none());
    }

    #[test]
    fn test_template_parse_errors() {
        assert!(UriTemplate::parse("test://{unclosed").is_err());
        assert!(UriTemplate::parse("test://{}").is_err());
        assert!(UriTemplate::parse("test://{a-b}").is_err());
        assert!(UriTemplate::parse("test://{x}/{x}").is_err());
    }

    #[test]
    fn test_template_without_variables_is_exact_match() {
        let t = UriTemplate::parse("test://fixed").unwrap();
        assert!(t.matches("test://fixed").is_some());
        assert!(t.matches("test://fixed2").is_none());
        assert!(t.variables().is_empty());
    }
}
