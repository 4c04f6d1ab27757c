//! mcpkit reference server
//!
//! A demonstration MCP server exposing a small set of tools, prompts, and
//! resources over either the stdio or the SSE transport. Configuration
//! comes from an optional YAML file plus CLI/environment overrides; all
//! logging goes to stderr because stdout belongs to the transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcpkit::config::{ServerConfig, TransportKind};
use mcpkit::server::{
    ParamKind, PromptBuilder, ResourceBuilder, ResourceTemplateBuilder, Server, ToolBuilder,
};
use mcpkit::transport::sse_server::{self, SseServerOptions};
use mcpkit::transport::stream::StreamTransport;
use mcpkit::types::{
    CallToolResult, Content, CreateMessageParams, GetPromptResult, PromptMessage, ResourceContents,
    Role, SamplingMessage, TextResourceContents,
};

#[derive(Debug, Parser)]
#[command(name = "mcpkit-server", about = "MCP reference server", version)]
struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, env = "MCPKIT_CONFIG")]
    config: Option<PathBuf>,

    /// Transport override: "stdio" or "sse".
    #[arg(long, env = "MCPKIT_TRANSPORT")]
    transport: Option<String>,

    /// Listen address override for the SSE transport.
    #[arg(long, env = "MCPKIT_BIND")]
    bind: Option<String>,

    /// Accept stateless session-id blobs on the SSE POST resource.
    #[arg(long)]
    stateless: bool,
}

fn init_tracing() {
    // stdout is the transport; diagnostics must stay on stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    if let Some(transport) = &cli.transport {
        config.transport = transport.parse()?;
    }
    if let Some(bind) = cli.bind {
        config.sse.bind = bind;
    }
    if cli.stateless {
        config.sse.stateless = true;
    }
    config.validate()?;

    let server = build_demo_server(&config);

    match config.transport {
        TransportKind::Stdio => {
            tracing::info!("serving over stdio");
            let session = server.serve(Arc::new(StreamTransport::from_stdio()));
            session.wait_closed().await;
            tracing::info!("peer disconnected, shutting down");
        }
        TransportKind::Sse => {
            let addr = config.sse.bind.parse()?;
            let options = SseServerOptions {
                sse_path: config.sse.sse_path.clone(),
                message_path: config.sse.message_path.clone(),
                stateless: config.sse.stateless,
            };
            sse_server::serve(addr, server, options).await?;
        }
    }

    Ok(())
}

/// Assemble the demonstration server: echo and long-running tools, a
/// sampling bridge, numbered test resources, and two prompts.
fn build_demo_server(config: &ServerConfig) -> Server {
    let mut builder = Server::builder("mcpkit-server", env!("CARGO_PKG_VERSION"))
        .instructions("Demonstration server for the mcpkit runtime.")
        .page_size(config.page_size)
        .default_log_level(config.log_level);

    builder = builder.tool(
        ToolBuilder::new("echo")
            .description("Echoes back the input message")
            .required_param("message", ParamKind::String, "The text to echo")
            .invoke(|args, _ctx| async move {
                let message = args
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or_default();
                Ok(CallToolResult::text(format!("Echo: {message}")))
            }),
    );

    builder = builder.tool(
        ToolBuilder::new("longRunningOperation")
            .description("Runs for a while, reporting progress at each step")
            .optional_param("duration", ParamKind::Number, "Total seconds to run (default 10)")
            .optional_param("steps", ParamKind::Integer, "Number of progress steps (default 5)")
            .invoke(|args, ctx| async move {
                let duration = args
                    .get("duration")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(10.0);
                let steps = args.get("steps").and_then(|v| v.as_u64()).unwrap_or(5).max(1);
                let step_pause =
                    std::time::Duration::from_secs_f64(duration / steps as f64);

                for step in 1..=steps {
                    tokio::select! {
                        _ = ctx.cancellation().cancelled() => {
                            return Ok(CallToolResult::error_text(format!(
                                "operation cancelled after {} of {steps} steps",
                                step - 1
                            )));
                        }
                        _ = tokio::time::sleep(step_pause) => {}
                    }
                    ctx.report_progress(
                        step as f64,
                        Some(steps as f64),
                        Some(format!("step {step} of {steps}")),
                    )
                    .await?;
                }

                Ok(CallToolResult::text(format!(
                    "completed {steps} steps over {duration} seconds"
                )))
            }),
    );

    builder = builder.tool(
        ToolBuilder::new("sampleLLM")
            .description("Asks the connected client to run an LLM completion")
            .required_param("prompt", ParamKind::String, "The prompt to sample")
            .optional_param("maxTokens", ParamKind::Integer, "Token budget (default 100)")
            .invoke(|args, ctx| async move {
                let prompt = args
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let max_tokens = args
                    .get("maxTokens")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(100) as u32;

                let sampled = ctx
                    .sample(CreateMessageParams {
                        messages: vec![SamplingMessage {
                            role: Role::User,
                            content: Content::text(prompt),
                        }],
                        model_preferences: None,
                        system_prompt: None,
                        include_context: None,
                        temperature: None,
                        max_tokens,
                        stop_sequences: None,
                        metadata: None,
                    })
                    .await?;

                let text = match sampled.content {
                    Content::Text(t) => t.text,
                    other => format!("{other:?}"),
                };
                Ok(CallToolResult::text(format!("LLM sampling result: {text}")))
            }),
    );

    for n in 1..=5u32 {
        let uri = format!("test://r/{n}");
        let body_uri = uri.clone();
        builder = builder.resource(
            ResourceBuilder::new(uri.clone(), format!("Test resource {n}"))
                .description("Fixed demonstration resource")
                .mime_type("text/plain")
                .reader(move |_ctx| {
                    let uri = body_uri.clone();
                    async move {
                        Ok(vec![ResourceContents::Text(TextResourceContents {
                            text: format!("contents of {uri}"),
                            mime_type: Some("text/plain".to_string()),
                            uri,
                        })])
                    }
                }),
        );
    }

    builder = builder.resource_template(
        ResourceTemplateBuilder::new("test://r/{id}", "Numbered test resource")
            .expect("static template compiles")
            .description("Any numbered resource, generated on demand")
            .mime_type("text/plain")
            .complete("id", |prefix| {
                (1..=100)
                    .map(|n| n.to_string())
                    .filter(|v| v.starts_with(prefix))
                    .collect()
            })
            .reader(|vars, _ctx| async move {
                let id = vars.get("id").cloned().unwrap_or_default();
                let uri = format!("test://r/{id}");
                Ok(vec![ResourceContents::Text(TextResourceContents {
                    text: format!("generated contents of {uri}"),
                    mime_type: Some("text/plain".to_string()),
                    uri,
                })])
            }),
    );

    builder = builder.prompt(
        PromptBuilder::new("simple_prompt")
            .description("A prompt without arguments")
            .render(|_args, _ctx| async {
                Ok(GetPromptResult {
                    description: Some("A simple prompt".to_string()),
                    messages: vec![PromptMessage {
                        role: Role::User,
                        content: Content::text("This is a simple prompt without arguments."),
                    }],
                })
            }),
    );

    builder = builder.prompt(
        PromptBuilder::new("complex_prompt")
            .description("A prompt with required and optional arguments")
            .argument("temperature", "Sampling temperature to discuss", true)
            .argument("style", "Output style", false)
            .complete("style", |prefix| {
                ["casual", "formal", "technical"]
                    .into_iter()
                    .map(str::to_string)
                    .filter(|v| v.starts_with(prefix))
                    .collect()
            })
            .render(|args, _ctx| async move {
                let args = args.unwrap_or_default();
                let temperature = args.get("temperature").cloned().unwrap_or_default();
                let style = args
                    .get("style")
                    .cloned()
                    .unwrap_or_else(|| "casual".to_string());
                Ok(GetPromptResult {
                    description: Some("A complex prompt".to_string()),
                    messages: vec![PromptMessage {
                        role: Role::User,
                        content: Content::text(format!(
                            "Discuss temperature {temperature} in a {style} register."
                        )),
                    }],
                })
            }),
    );

    builder.build()
}
