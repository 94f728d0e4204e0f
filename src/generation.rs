//! Chat-model providers used by the synthesis stage.
//!
//! A [`Generator`] produces text for a single prompt, either whole
//! ([`Generator::generate`]) or as ordered fragments pushed into a bounded
//! channel ([`Generator::stream`]). Streaming implementations stop reading
//! the provider response as soon as the receiving side of the channel is
//! dropped, so a cancelled request does not keep the upstream call alive.
//!
//! | Config Value | Generator | Stream framing |
//! |-------------|-----------|----------------|
//! | `"openai"` | [`OpenAIGenerator`] | SSE `data:` lines, `[DONE]` terminator |
//! | `"ollama"` | [`OllamaGenerator`] | NDJSON objects, `"done": true` terminator |

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::GenerationConfig;

/// A text-generation model.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate the full response text for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate `prompt`, sending each text fragment to `fragments` in
    /// production order.
    ///
    /// Returns `Ok(())` once the provider signals completion, or early if
    /// the receiver has been dropped. A response that ends without the
    /// provider's completion marker is an error.
    async fn stream(&self, prompt: &str, fragments: mpsc::Sender<String>) -> Result<()>;
}

/// Splits a byte stream into newline-terminated lines.
#[derive(Default)]
struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Whatever is left once the body has ended without a trailing newline.
    fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// One decoded line of a provider stream.
#[derive(Debug, PartialEq)]
enum StreamLine {
    Fragment(String),
    Skip,
    /// Completion marker, possibly carrying the last fragment.
    Done(Option<String>),
}

/// What to do after a line has been handled.
#[derive(Debug)]
enum Flow {
    Continue,
    Finished,
    Cancelled,
}

async fn forward(text: String, fragments: &mpsc::Sender<String>, then: Flow) -> Flow {
    if fragments.send(text).await.is_err() {
        tracing::debug!("fragment receiver dropped, stopping generation stream");
        return Flow::Cancelled;
    }
    then
}

async fn dispatch(line: StreamLine, fragments: &mpsc::Sender<String>) -> Flow {
    match line {
        StreamLine::Fragment(text) => forward(text, fragments, Flow::Continue).await,
        StreamLine::Skip => Flow::Continue,
        StreamLine::Done(Some(text)) => forward(text, fragments, Flow::Finished).await,
        StreamLine::Done(None) => Flow::Finished,
    }
}

/// Drive a streaming HTTP response through `parse`, forwarding fragments.
async fn pump_response(
    response: reqwest::Response,
    fragments: &mpsc::Sender<String>,
    parse: fn(&str) -> Result<StreamLine>,
) -> Result<()> {
    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let bytes = chunk.map_err(|e| anyhow!("generation stream read error: {}", e))?;
        lines.push(&bytes);

        while let Some(line) = lines.next_line() {
            match dispatch(parse(&line)?, fragments).await {
                Flow::Continue => {}
                Flow::Finished | Flow::Cancelled => return Ok(()),
            }
        }
    }

    if let Some(line) = lines.finish() {
        match dispatch(parse(&line)?, fragments).await {
            Flow::Continue => {}
            Flow::Finished | Flow::Cancelled => return Ok(()),
        }
    }

    if fragments.is_closed() {
        return Ok(());
    }
    bail!("generation stream ended before completion")
}

/// HTTP client for a chat provider.
///
/// Only the connect phase and the gap between reads are bounded, so a
/// long streamed answer is not cut off while tokens keep arriving.
/// Whole responses get a total deadline per request in `send`.
fn chat_client(timeout: Duration) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?)
}

async fn ensure_success(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{} API error {}: {}", provider, status, body)
}

// ============ OpenAI ============

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1";

/// Generator using the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAIGenerator {
    client: reqwest::Client,
    timeout: Duration,
    api_key: String,
    url: String,
    model: String,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: chat_client(timeout)?,
            timeout,
            api_key: api_key.into(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_DEFAULT_URL.to_string()),
            model: config.model.clone(),
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body);
        if !stream {
            request = request.timeout(self.timeout);
        }

        let response = request.send().await?;

        ensure_success(response, "OpenAI").await
    }
}

#[derive(Deserialize)]
struct OpenAIChatResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    #[serde(default)]
    message: Option<OpenAIContent>,
    #[serde(default)]
    delta: Option<OpenAIContent>,
}

#[derive(Deserialize)]
struct OpenAIContent {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;
        let parsed: OpenAIChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| anyhow!("OpenAI response missing message content"))
    }

    async fn stream(&self, prompt: &str, fragments: mpsc::Sender<String>) -> Result<()> {
        let response = self.send(prompt, true).await?;
        pump_response(response, &fragments, parse_openai_line).await
    }
}

fn parse_openai_line(line: &str) -> Result<StreamLine> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(StreamLine::Skip);
    }
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => return Ok(StreamLine::Skip),
    };
    if data == "[DONE]" {
        return Ok(StreamLine::Done(None));
    }

    let chunk: OpenAIChatResponse = serde_json::from_str(data)
        .map_err(|e| anyhow!("OpenAI stream payload invalid: {}", e))?;
    let text = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
        .unwrap_or_default();

    if text.is_empty() {
        Ok(StreamLine::Skip)
    } else {
        Ok(StreamLine::Fragment(text))
    }
}

// ============ Ollama ============

const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Generator using a local Ollama instance's `/api/chat` endpoint.
pub struct OllamaGenerator {
    client: reqwest::Client,
    timeout: Duration,
    url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        Ok(Self {
            client: chat_client(timeout)?,
            timeout,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string()),
            model: config.model.clone(),
        })
    }

    async fn send(&self, prompt: &str, stream: bool) -> Result<reqwest::Response> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": stream,
        });

        let mut request = self
            .client
            .post(format!("{}/api/chat", self.url.trim_end_matches('/')))
            .json(&body);
        if !stream {
            request = request.timeout(self.timeout);
        }

        let response = request
            .send()
            .await
            .map_err(|e| {
                anyhow!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url,
                    e
                )
            })?;

        ensure_success(response, "Ollama").await
    }
}

#[derive(Deserialize)]
struct OllamaChatChunk {
    #[serde(default)]
    message: Option<OpenAIContent>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let response = self.send(prompt, false).await?;
        let parsed: OllamaChatChunk = response.json().await?;
        if let Some(err) = parsed.error {
            bail!("Ollama error: {}", err);
        }
        parsed
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| anyhow!("Ollama response missing message content"))
    }

    async fn stream(&self, prompt: &str, fragments: mpsc::Sender<String>) -> Result<()> {
        let response = self.send(prompt, true).await?;
        pump_response(response, &fragments, parse_ollama_line).await
    }
}

fn parse_ollama_line(line: &str) -> Result<StreamLine> {
    if line.is_empty() {
        return Ok(StreamLine::Skip);
    }

    let chunk: OllamaChatChunk =
        serde_json::from_str(line).map_err(|e| anyhow!("Ollama stream payload invalid: {}", e))?;
    if let Some(err) = chunk.error {
        bail!("Ollama error: {}", err);
    }

    let text = chunk
        .message
        .and_then(|m| m.content)
        .filter(|t| !t.is_empty());
    match (text, chunk.done) {
        (text, true) => Ok(StreamLine::Done(text)),
        (Some(text), false) => Ok(StreamLine::Fragment(text)),
        (None, false) => Ok(StreamLine::Skip),
    }
}

/// Create the configured [`Generator`].
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
