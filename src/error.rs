//! Error types for the `ollama-rag` crate.

use thiserror::Error;

/// Errors that can occur in retrieval and generation operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The embedding or model endpoint could not be reached, or returned a
    /// non-success status.
    #[error("Provider unavailable ({provider}): {message}")]
    ProviderUnavailable {
        /// The provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An upstream payload could not be parsed into the expected shape.
    #[error("Malformed response ({provider}): {message}")]
    MalformedResponse {
        /// The provider whose response was unparseable.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The backing document or conversation store failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Vector math was attempted on vectors of incompatible dimensionality.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Length of the left-hand vector.
        expected: usize,
        /// Length of the right-hand vector.
        actual: usize,
    },

    /// A referenced document or session does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The generation was cancelled cooperatively mid-stream. A terminal
    /// state rather than a true failure.
    #[error("Generation cancelled")]
    Cancelled,

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
