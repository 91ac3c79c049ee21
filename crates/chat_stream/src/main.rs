use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures_util::StreamExt;
use inference_api::{
    BackendConfig, Conversation, EventAccumulator, ImageWireFormat, InferenceClient, StreamEvent,
};
use serde_json::Value;
use tokio::io::{AsyncWriteExt, Stdout};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Stream a chat completion for a saved conversation", long_about = None)]
struct Cli {
    /// Conversation JSON: an array of messages or an object with a `messages` array
    conversation: PathBuf,

    /// Base URL of an OpenAI-compatible backend
    #[arg(long, env = "INFERENCE_BASE_URL")]
    base_url: Option<String>,

    /// Model name sent with the request
    #[arg(short, long, env = "INFERENCE_MODEL")]
    model: Option<String>,

    /// Identity reported in the metadata event
    #[arg(long, env = "INFERENCE_BACKEND_ID")]
    backend_id: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    /// Image part rendering (openai or qwen-vl)
    #[arg(long, value_enum)]
    image_format: Option<ImageFormatArg>,

    /// System prompt prepended to the conversation
    #[arg(long)]
    system: Option<String>,

    /// Print every event as one JSON line instead of plain text
    #[arg(long)]
    json: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ImageFormatArg {
    Openai,
    QwenVl,
}

impl From<ImageFormatArg> for ImageWireFormat {
    fn from(value: ImageFormatArg) -> Self {
        match value {
            ImageFormatArg::Openai => ImageWireFormat::OpenAi,
            ImageFormatArg::QwenVl => ImageWireFormat::QwenVl,
        }
    }
}

impl Cli {
    fn backend_config(&self) -> Result<BackendConfig> {
        let mut config = BackendConfig::from_env().context("invalid INFERENCE_* environment")?;
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(backend_id) = &self.backend_id {
            config = config.with_backend_id(backend_id);
        }
        if let Some(max_tokens) = self.max_tokens {
            config = config.with_max_tokens(max_tokens);
        }
        if let Some(image_format) = self.image_format {
            config = config.with_image_format(image_format.into());
        }
        if let Some(system) = &self.system {
            config = config.with_system_prompt(system);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the stream ended with `Finish`.
async fn run(cli: Cli) -> Result<bool> {
    let config = cli.backend_config()?;
    let conversation = read_conversation(&cli.conversation).await?;
    debug!(messages = conversation.len(), "loaded conversation");

    let client = InferenceClient::new(config).context("failed to build HTTP client")?;

    let cancellation = Arc::new(AtomicBool::new(false));
    tokio::spawn({
        let cancellation = Arc::clone(&cancellation);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling request");
                cancellation.store(true, Ordering::Release);
            }
        }
    });

    let mut events = client
        .stream_conversation(&conversation, Some(cancellation))
        .await?;

    let mut stdout = tokio::io::stdout();
    let mut accumulator = EventAccumulator::default();
    while let Some(event) = events.next().await {
        accumulator.push(&event);
        if cli.json {
            write_json_line(&mut stdout, &event).await?;
        } else {
            write_plain(&mut stdout, &event).await?;
        }
    }
    stdout.flush().await?;

    if let Some(message) = accumulator.error {
        eprintln!("error: {message}");
        return Ok(false);
    }
    if let Some((reason, usage)) = accumulator.finish {
        info!(
            reason = reason.as_str(),
            prompt_tokens = ?usage.and_then(|usage| usage.prompt_tokens),
            completion_tokens = ?usage.and_then(|usage| usage.completion_tokens),
            "completion finished"
        );
    }
    Ok(true)
}

async fn read_conversation(path: &Path) -> Result<Conversation> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_conversation(&raw).with_context(|| format!("invalid conversation in {}", path.display()))
}

fn parse_conversation(raw: &str) -> Result<Conversation> {
    let value: Value = serde_json::from_str(raw)?;
    let messages = match value {
        Value::Object(mut object) => object
            .remove("messages")
            .context("expected a `messages` array")?,
        other => other,
    };
    Ok(serde_json::from_value(messages)?)
}

async fn write_plain(stdout: &mut Stdout, event: &StreamEvent) -> Result<()> {
    match event {
        StreamEvent::TextDelta { text } => {
            stdout.write_all(text.as_bytes()).await?;
            stdout.flush().await?;
        }
        StreamEvent::Finish { .. } => stdout.write_all(b"\n").await?,
        StreamEvent::Metadata { .. } | StreamEvent::ToolCall(_) | StreamEvent::Error { .. } => {}
    }
    Ok(())
}

async fn write_json_line(stdout: &mut Stdout, event: &StreamEvent) -> Result<()> {
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    Ok(())
}
