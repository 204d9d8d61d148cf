//! Generative model trait producing incremental chunk streams.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::document::{ChatMessage, Role};
use crate::error::Result;

/// One discrete unit of streamed model output.
///
/// Chunks arrive in upstream emission order; the final chunk of a stream has
/// `done == true` and carries no further content.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamChunk {
    /// Incremental content delta, possibly empty.
    pub content: String,
    /// Set on the terminal chunk.
    pub done: bool,
}

/// A pinned, boxed stream of model output chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// A chat turn as sent to the model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromptMessage {
    /// The speaker role (`user`, `assistant`, or `system`).
    pub role: Role,
    /// The message text.
    pub content: String,
}

impl PromptMessage {
    /// Create a prompt message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }
}

impl From<&ChatMessage> for PromptMessage {
    fn from(message: &ChatMessage) -> Self {
        Self { role: message.role, content: message.content.clone() }
    }
}

/// Sampling options for prompt-style generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerateOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self { temperature: 0.1, top_p: 0.9 }
    }
}

/// An available model as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelInfo {
    /// Model name, e.g. `llama3.2:latest`.
    pub name: String,
    /// On-disk size in bytes.
    pub size: u64,
    /// Last-modified timestamp as reported by the backend.
    pub modified: String,
}

/// A model backend that streams generated output chunk-by-chunk.
///
/// Both entry points return a [`ChunkStream`]; the engine layer drives the
/// stream, polls cancellation at each chunk boundary, and accumulates the
/// full response.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Start a chat-style generation over an ordered message history.
    async fn chat_stream(&self, model: &str, messages: &[PromptMessage]) -> Result<ChunkStream>;

    /// Start a single-prompt generation.
    async fn generate_stream(
        &self,
        model: &str,
        prompt: &str,
        options: GenerateOptions,
    ) -> Result<ChunkStream>;
}
