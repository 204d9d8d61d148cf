//! Retrieval-augmented generation engine for locally hosted Ollama models.
//!
//! `ollama-rag` sits between a chat client and an Ollama server: it embeds
//! and deduplicates ingested documents, retrieves similarity-ranked context
//! for each query, streams model output chunk-by-chunk with cooperative
//! per-session cancellation, and fans generation events out to per-client
//! channels.
//!
//! # Architecture
//!
//! - [`EmbeddingProvider`] / [`GenerativeModel`] — seams over the external
//!   model server; [`OllamaClient`] implements both.
//! - [`DocumentStore`] — document and embedding persistence with linear
//!   cosine-similarity search; [`InMemoryDocumentStore`] is the provided
//!   backend.
//! - [`DedupEngine`] — exact-then-semantic duplicate gating on ingestion.
//! - [`ContextBuilder`] — bounded context assembly and prompt templating.
//! - [`ConversationStore`] — append-only per-session message logs.
//! - [`GenerationEngine`] — streaming orchestration with cancellation via
//!   [`CancellationRegistry`] and delivery via [`EventBus`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ollama_rag::*;
//!
//! let ollama_config = OllamaConfig::default();
//! let settings = Arc::new(ModelSettings::new(&ollama_config));
//! let client = Arc::new(OllamaClient::new(&ollama_config, settings.clone())?);
//! let store = Arc::new(InMemoryDocumentStore::new());
//! let config = RagConfig::default();
//!
//! let engine = GenerationEngine::builder()
//!     .model(client.clone())
//!     .settings(settings)
//!     .context(ContextBuilder::new(client.clone(), store.clone(), config.clone()))
//!     .history(Arc::new(InMemoryConversationStore::new()))
//!     .build()?;
//!
//! let mut events = engine.events().register("session-1");
//! let outcome = engine.chat("session-1", "What does the handbook say?").await?;
//! ```

pub mod cancel;
pub mod config;
pub mod context;
pub mod dedup;
pub mod document;
pub mod embedding;
pub mod error;
pub mod events;
pub mod generation;
pub mod history;
pub mod inmemory;
pub mod model;
pub mod ollama;
pub mod store;
pub mod vector;

pub use cancel::{CancellationRegistry, CancellationToken};
pub use config::{ModelSettings, OllamaConfig, RagConfig, RagConfigBuilder, DEFAULT_PROMPT_TEMPLATE};
pub use context::ContextBuilder;
pub use dedup::DedupEngine;
pub use document::{ChatMessage, Document, IngestOutcome, Role, SimilarityResult, StoreStats};
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use events::{EventBus, GenerationEvent};
pub use generation::{
    GenerationEngine, GenerationEngineBuilder, GenerationOutcome, CANCELLED_SENTINEL,
};
pub use history::{ConversationStore, InMemoryConversationStore};
pub use inmemory::InMemoryDocumentStore;
pub use model::{
    ChunkStream, GenerateOptions, GenerativeModel, ModelInfo, PromptMessage, StreamChunk,
};
pub use ollama::OllamaClient;
pub use store::DocumentStore;
