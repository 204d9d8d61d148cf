//! Document store trait: persistence, duplicate lookup, similarity search.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::document::{Document, SimilarityResult, StoreStats};
use crate::error::Result;

/// A storage backend for documents and their embeddings.
///
/// A document becomes visible to similarity search only once its embedding
/// is attached; `insert` followed by a failed
/// [`attach_embedding`](DocumentStore::attach_embedding) leaves the document
/// out of every similarity-based operation. Similarity search is a linear
/// scan in the
/// provided implementation; an indexed backend can replace it behind this
/// trait without changing callers.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write a new document with no embedding attached yet.
    async fn insert(&self, content: &str, metadata: HashMap<String, String>) -> Result<Document>;

    /// Attach an embedding to a document. Idempotent upsert: an existing
    /// embedding for the document is replaced, never duplicated.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`](crate::RagError::NotFound) if the
    /// document does not exist.
    async fn attach_embedding(&self, document_id: &str, vector: Vec<f32>, norm: f32) -> Result<()>;

    /// Check for a byte-for-byte identical `content` value among stored
    /// documents. Used as the exact-match short-circuit before any embedding
    /// is computed.
    async fn exists_exact(&self, content: &str) -> Result<bool>;

    /// Return up to `top_k` embedded documents with cosine similarity to
    /// `query` at or above `threshold`, ordered descending by score; ties
    /// order by ascending document id.
    async fn find_similar(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityResult>>;

    /// The single highest similarity between `query` and any stored
    /// embedding, as a percentage in `[0, 100]`. `0.0` when nothing is
    /// embedded. Independent of any threshold filter.
    async fn max_similarity_percent(&self, query: &[f32]) -> Result<f32>;

    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`](crate::RagError::NotFound) if absent.
    async fn get(&self, document_id: &str) -> Result<Document>;

    /// Delete a document and its embedding. Deleting an absent id is a no-op.
    async fn delete(&self, document_id: &str) -> Result<()>;

    /// Number of stored documents, embedded or not.
    async fn count(&self) -> Result<usize>;

    /// Summary statistics over documents and embeddings.
    async fn stats(&self) -> Result<StoreStats>;
}
