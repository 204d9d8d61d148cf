//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap an external embedding backend behind a unified async
/// interface. No retry is performed internally; callers decide retry policy.
///
/// # Example
///
/// ```rust,ignore
/// use ollama_rag::EmbeddingProvider;
///
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ProviderUnavailable`](crate::RagError::ProviderUnavailable)
    /// when the backend cannot be reached or returns a non-success status,
    /// and [`RagError::MalformedResponse`](crate::RagError::MalformedResponse)
    /// when the response cannot be parsed into a numeric vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}
