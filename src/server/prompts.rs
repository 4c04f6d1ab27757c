//! Prompt registration primitives
//!
//! A prompt binds a named argument list to a renderer that produces the
//! `prompts/get` message list. Argument completion sources can be attached
//! per argument and are consulted by `completion/complete`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::endpoint::{BoxFuture, RequestContext};
use crate::error::Result;
use crate::types::{GetPromptResult, Prompt, PromptArgument};

use super::ArgumentCompleter;

pub(crate) type PromptRenderer = Arc<
    dyn Fn(
            Option<HashMap<String, String>>,
            RequestContext,
        ) -> BoxFuture<'static, Result<GetPromptResult>>
        + Send
        + Sync,
>;

/// A prompt ready for registration.
#[derive(Clone)]
pub struct RegisteredPrompt {
    pub(crate) descriptor: Prompt,
    pub(crate) renderer: PromptRenderer,
    pub(crate) completers: HashMap<String, ArgumentCompleter>,
}

impl RegisteredPrompt {
    /// The wire metadata served by `prompts/list`.
    pub fn descriptor(&self) -> &Prompt {
        &self.descriptor
    }
}

impl std::fmt::Debug for RegisteredPrompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredPrompt")
            .field("name", &self.descriptor.name)
            .finish_non_exhaustive()
    }
}

/// Declarative builder for a [`RegisteredPrompt`].
///
/// # Examples
///
/// ```
/// use mcpkit::server::PromptBuilder;
/// use mcpkit::types::{Content, GetPromptResult, PromptMessage, Role};
///
/// let greet = PromptBuilder::new("greet")
///     .description("Greets someone by name")
///     .argument("name", "Who to greet", true)
///     .render(|args, _ctx| async move {
///         let name = args
///             .and_then(|a| a.get("name").cloned())
///             .unwrap_or_else(|| "world".to_string());
///         Ok(GetPromptResult {
///             description: None,
///             messages: vec![PromptMessage {
///                 role: Role::User,
///                 content: Content::text(format!("Say hello to {name}.")),
///             }],
///         })
///     });
/// assert_eq!(greet.descriptor().name, "greet");
/// ```
pub struct PromptBuilder {
    name: String,
    description: Option<String>,
    arguments: Vec<PromptArgument>,
    completers: HashMap<String, ArgumentCompleter>,
}

impl PromptBuilder {
    /// Start a prompt declaration.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            arguments: Vec::new(),
            completers: HashMap::new(),
        }
    }

    /// Human-readable description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare an argument.
    #[must_use]
    pub fn argument(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        self.arguments.push(PromptArgument {
            name: name.into(),
            description: Some(description.into()),
            required: Some(required),
        });
        self
    }

    /// Attach a completion source for one argument.
    #[must_use]
    pub fn complete(
        mut self,
        argument: impl Into<String>,
        f: impl Fn(&str) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.completers.insert(argument.into(), Arc::new(f));
        self
    }

    /// Attach the renderer and finish the declaration.
    pub fn render<F, Fut>(self, f: F) -> RegisteredPrompt
    where
        F: Fn(Option<HashMap<String, String>>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<GetPromptResult>> + Send + 'static,
    {
        RegisteredPrompt {
            descriptor: Prompt {
                name: self.name,
                description: self.description,
                arguments: if self.arguments.is_empty() {
                    None
                } else {
                    Some(self.arguments)
                },
            },
            renderer: Arc::new(move |args, ctx| Box::pin(f(args, ctx))),
            completers: self.completers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Content, PromptMessage, Role};

    #[test]
    fn test_prompt_descriptor_lists_arguments() {
        let p = PromptBuilder::new("summarize")
            .description("Summarizes text")
            .argument("text", "What to summarize", true)
            .argument("style", "Summary style", false)
            .render(|_args, _ctx| async {
                Ok(GetPromptResult {
                    description: None,
                    messages: vec![PromptMessage {
                        role: Role::User,
                        content: Content::text("..."),
                    }],
                })
            });

        let args = p.descriptor().arguments.as_ref().unwrap();
        assert_eq!(args.len(), 2);
        assert_eq!(args[0].name, "text");
        assert_eq!(args[0].required, Some(true));
        assert_eq!(args[1].required, Some(false));
    }

    #[test]
    fn test_prompt_without_arguments_serializes_none() {
        let p = PromptBuilder::new("static").render(|_args, _ctx| async {
            Ok(GetPromptResult {
                description: None,
                messages: Vec::new(),
            })
        });
        assert!(p.descriptor().arguments.is_none());
    }
}
