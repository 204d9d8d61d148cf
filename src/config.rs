//! Configuration for retrieval, deduplication, and model selection.

use std::sync::RwLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// The prompt template applied when retrieved context is substituted into a
/// query. `{context}` and `{query}` are replaced before the prompt is sent.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "\
Use the following context to answer the question. Answer from the provided \
context first; if the context does not contain the answer, say so and fall \
back to your own knowledge.

Context:
{context}

Question: {query}

Answer:";

/// Configuration parameters for retrieval and ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Number of top results to return from similarity search.
    pub top_k: usize,
    /// Minimum similarity score for retrieved results (results below this
    /// are filtered out).
    pub similarity_threshold: f32,
    /// Highest-similarity percentage at or above which an ingested document
    /// is treated as a semantic duplicate and skipped.
    pub semantic_duplicate_percent: f32,
    /// Prompt template with `{context}` and `{query}` placeholders.
    pub prompt_template: String,
    /// Maximum number of prior messages included when a chat prompt is
    /// assembled from session history.
    pub history_window: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            similarity_threshold: 0.6,
            semantic_duplicate_percent: 99.0,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            history_window: 10,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the number of top results to return from similarity search.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for retrieved results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    /// Set the semantic-duplicate cutoff as a percentage in `[0, 100]`.
    pub fn semantic_duplicate_percent(mut self, percent: f32) -> Self {
        self.config.semantic_duplicate_percent = percent;
        self
    }

    /// Set the prompt template.
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.config.prompt_template = template.into();
        self
    }

    /// Set how many prior messages a chat prompt may carry.
    pub fn history_window(mut self, window: usize) -> Self {
        self.config.history_window = window;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `top_k == 0`
    /// - `similarity_threshold` is outside `[-1, 1]`
    /// - `semantic_duplicate_percent` is outside `[0, 100]`
    /// - `history_window == 0`
    pub fn build(self) -> Result<RagConfig> {
        if self.config.top_k == 0 {
            return Err(RagError::ConfigError("top_k must be greater than zero".to_string()));
        }
        if self.config.history_window == 0 {
            return Err(RagError::ConfigError(
                "history_window must be greater than zero".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.config.similarity_threshold) {
            return Err(RagError::ConfigError(format!(
                "similarity_threshold ({}) must be within [-1, 1]",
                self.config.similarity_threshold
            )));
        }
        if !(0.0..=100.0).contains(&self.config.semantic_duplicate_percent) {
            return Err(RagError::ConfigError(format!(
                "semantic_duplicate_percent ({}) must be within [0, 100]",
                self.config.semantic_duplicate_percent
            )));
        }
        Ok(self.config)
    }
}

/// Connection settings for a local Ollama server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OllamaConfig {
    /// Base URL of the Ollama server, e.g. `http://localhost:11434`.
    pub host: String,
    /// Initial chat/generation model name.
    pub chat_model: String,
    /// Initial embedding model name.
    pub embedding_model: String,
    /// Connect timeout for requests against the server.
    pub connect_timeout: Duration,
    /// Timeout for the availability probe against `/api/tags`.
    pub probe_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost:11434".to_string(),
            chat_model: "llama3.2".to_string(),
            embedding_model: "all-minilm".to_string(),
            connect_timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Runtime-mutable model selection, shared across the process.
///
/// The chat and embedding model names can be changed while the service runs;
/// in-flight requests keep the name they read at start, and changing the
/// embedding model does not re-embed documents already stored.
#[derive(Debug)]
pub struct ModelSettings {
    chat_model: RwLock<String>,
    embedding_model: RwLock<String>,
}

impl ModelSettings {
    /// Create settings seeded from an [`OllamaConfig`].
    pub fn new(config: &OllamaConfig) -> Self {
        Self {
            chat_model: RwLock::new(config.chat_model.clone()),
            embedding_model: RwLock::new(config.embedding_model.clone()),
        }
    }

    /// The currently selected chat/generation model.
    pub fn chat_model(&self) -> String {
        self.chat_model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Select a new chat/generation model.
    pub fn set_chat_model(&self, model: impl Into<String>) {
        *self.chat_model.write().unwrap_or_else(|e| e.into_inner()) = model.into();
    }

    /// The currently selected embedding model.
    pub fn embedding_model(&self) -> String {
        self.embedding_model.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Select a new embedding model. Existing documents keep the embeddings
    /// they were ingested with.
    pub fn set_embedding_model(&self, model: impl Into<String>) {
        *self.embedding_model.write().unwrap_or_else(|e| e.into_inner()) = model.into();
    }
}
