//! Ollama HTTP client: embeddings, streaming chat/generate, model listing.
//!
//! All request and response bodies are explicit serde structs; the streaming
//! endpoints speak newline-delimited JSON, one chunk per line.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{ModelSettings, OllamaConfig};
use crate::document::Role;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::model::{ChunkStream, GenerateOptions, GenerativeModel, ModelInfo, PromptMessage, StreamChunk};

/// Default dimensionality for the `all-minilm` embedding family.
const DEFAULT_DIMENSIONS: usize = 384;

/// Client for a locally hosted Ollama server.
///
/// Implements [`EmbeddingProvider`] via `POST /api/embeddings` and
/// [`GenerativeModel`] via the streaming `POST /api/chat` and
/// `POST /api/generate` endpoints. The embedding model name is read from the
/// shared [`ModelSettings`] at each call, so runtime model changes apply to
/// subsequent requests without touching in-flight ones.
pub struct OllamaClient {
    client: reqwest::Client,
    host: String,
    settings: Arc<ModelSettings>,
    probe_timeout: std::time::Duration,
    dimensions: usize,
}

impl OllamaClient {
    /// Create a client from connection settings and a shared model selection.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new(config: &OllamaConfig, settings: Arc<ModelSettings>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| RagError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            settings,
            probe_timeout: config.probe_timeout,
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Override the expected embedding dimensionality (model-dependent).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self
    }

    /// The shared model selection handle.
    pub fn settings(&self) -> &Arc<ModelSettings> {
        &self.settings
    }

    /// Probe `GET /api/tags` to check whether the server is reachable.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).timeout(self.probe_timeout).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(host = %self.host, error = %e, "availability probe failed");
                false
            }
        }
    }

    /// List the models available on the server via `GET /api/tags`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ProviderUnavailable`] on network failure or a
    /// non-success status, [`RagError::MalformedResponse`] on an unparseable
    /// body.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.host);
        let response = self.client.get(&url).send().await.map_err(|e| {
            error!(host = %self.host, error = %e, "model listing failed");
            RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("request failed: {e}"),
            }
        })?;

        if !response.status().is_success() {
            return Err(RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("API returned {}", response.status()),
            });
        }

        let tags: TagsResponse = response.json().await.map_err(|e| RagError::MalformedResponse {
            provider: "Ollama".into(),
            message: format!("failed to parse /api/tags response: {e}"),
        })?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| ModelInfo { name: m.name, size: m.size, modified: m.modified_at })
            .collect())
    }

    async fn post_stream(&self, path: &str, body: &impl Serialize) -> Result<reqwest::Response> {
        let url = format!("{}{path}", self.host);
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            error!(%url, error = %e, "streaming request failed");
            RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("request failed: {e}"),
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%url, %status, "API error");
            return Err(RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("API returned {status}"),
            });
        }

        Ok(response)
    }
}

// ── Ollama wire types ──────────────────────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [WireMessage<'a>],
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChatDelta>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: WireOptions,
}

#[derive(Serialize)]
struct WireOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    modified_at: String,
}

// ── NDJSON line parsing ────────────────────────────────────────────

/// Parse one line of an `/api/chat` stream. Empty lines yield `None`.
fn parse_chat_line(line: &str) -> Result<Option<StreamChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: ChatChunk = serde_json::from_str(line).map_err(|e| RagError::MalformedResponse {
        provider: "Ollama".into(),
        message: format!("unparseable chat chunk: {e}"),
    })?;
    let content = chunk.message.map(|m| m.content).unwrap_or_default();
    Ok(Some(StreamChunk { content, done: chunk.done }))
}

/// Parse one line of an `/api/generate` stream. Empty lines yield `None`.
fn parse_generate_line(line: &str) -> Result<Option<StreamChunk>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let chunk: GenerateChunk =
        serde_json::from_str(line).map_err(|e| RagError::MalformedResponse {
            provider: "Ollama".into(),
            message: format!("unparseable generate chunk: {e}"),
        })?;
    Ok(Some(StreamChunk { content: chunk.response.unwrap_or_default(), done: chunk.done }))
}

/// Turn a streaming HTTP response into a [`ChunkStream`], splitting the body
/// on newlines and applying `parse` to each complete line.
fn ndjson_stream(
    response: reqwest::Response,
    parse: fn(&str) -> Result<Option<StreamChunk>>,
) -> ChunkStream {
    let stream = async_stream::try_stream! {
        let mut bytes = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(piece) = bytes.next().await {
            let piece = piece.map_err(|e| RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("stream read failed: {e}"),
            })?;
            buffer.extend_from_slice(&piece);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                if let Some(chunk) = parse(&line)? {
                    yield chunk;
                }
            }
        }

        // Trailing data without a final newline.
        if !buffer.is_empty() {
            let line = String::from_utf8_lossy(&buffer).into_owned();
            if let Some(chunk) = parse(&line)? {
                yield chunk;
            }
        }
    };
    Box::pin(stream)
}

// ── Trait implementations ──────────────────────────────────────────

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.settings.embedding_model();
        debug!(%model, text_len = text.len(), "requesting embedding");

        let url = format!("{}/api/embeddings", self.host);
        let body = EmbeddingRequest { model: &model, prompt: text };
        let response = self.client.post(&url).json(&body).send().await.map_err(|e| {
            error!(%model, error = %e, "embedding request failed");
            RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("request failed: {e}"),
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%model, %status, "embedding API error");
            return Err(RagError::ProviderUnavailable {
                provider: "Ollama".into(),
                message: format!("API returned {status}"),
            });
        }

        let parsed: EmbeddingResponse =
            response.json().await.map_err(|e| RagError::MalformedResponse {
                provider: "Ollama".into(),
                message: format!("failed to parse embedding response: {e}"),
            })?;

        Ok(parsed.embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl GenerativeModel for OllamaClient {
    async fn chat_stream(&self, model: &str, messages: &[PromptMessage]) -> Result<ChunkStream> {
        debug!(%model, message_count = messages.len(), "starting chat stream");
        let wire: Vec<WireMessage<'_>> =
            messages.iter().map(|m| WireMessage { role: m.role, content: &m.content }).collect();
        let body = ChatRequest { model, messages: &wire, stream: true };
        let response = self.post_stream("/api/chat", &body).await?;
        Ok(ndjson_stream(response, parse_chat_line))
    }

    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<ChunkStream> {
        debug!(%model, prompt_len = prompt.len(), "starting generate stream");
        let body = GenerateRequest {
            model,
            prompt,
            stream: true,
            options: WireOptions { temperature: options.temperature, top_p: options.top_p },
        };
        let response = self.post_stream("/api/generate", &body).await?;
        Ok(ndjson_stream(response, parse_generate_line))
    }
}
