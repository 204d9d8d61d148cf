//! Data types for documents, conversation messages, and search results.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document with text content and metadata.
///
/// Immutable once its embedding is attached, except for metadata updates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier for the document.
    pub id: String,
    /// The text content of the document.
    pub content: String,
    /// Key-value metadata associated with the document.
    pub metadata: HashMap<String, String>,
    /// When the document was created.
    pub created_at: DateTime<Utc>,
}

/// The speaker role of a conversation message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A message authored by the end user.
    User,
    /// A message produced by the model.
    Assistant,
    /// A system instruction (context prompt).
    System,
}

/// A single message in a session's conversation log.
///
/// Messages are append-only; ordering within a session is creation order and
/// reconstructs the exact multi-turn prompt sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// The session this message belongs to.
    pub session_id: String,
    /// The speaker role.
    pub role: Role,
    /// The message text.
    pub content: String,
    /// Key-value metadata (model name, source, etc).
    pub metadata: HashMap<String, String>,
    /// When the message was appended.
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    /// Create a message for `session_id` with empty metadata, timestamped now.
    pub fn new(session_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            role,
            content: content.into(),
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }
}

/// A retrieved [`Document`] paired with its cosine similarity to the query.
///
/// Transient query output; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    /// The retrieved document.
    pub document: Document,
    /// Cosine similarity score in `[-1, 1]` (higher is more similar).
    pub score: f32,
}

/// Terminal outcome of a single ingestion attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The document was stored with its embedding attached.
    Ingested(Document),
    /// A byte-for-byte identical document already exists; no embedding was
    /// computed.
    SkippedExactDuplicate,
    /// An existing document's embedding is near-identical to the new
    /// content's embedding.
    SkippedSemanticDuplicate {
        /// The highest similarity found, as a percentage in `[0, 100]`.
        similarity_percent: f32,
    },
}

/// Summary statistics over the document store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreStats {
    /// Number of stored documents.
    pub total_documents: usize,
    /// Number of stored embeddings.
    pub total_embeddings: usize,
    /// Mean Euclidean norm across stored embeddings, `0.0` when empty.
    pub average_embedding_norm: f32,
}
