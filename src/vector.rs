//! Vector math over embeddings: Euclidean norm and cosine similarity.

use crate::error::{RagError, Result};

/// Compute the Euclidean norm `sqrt(Σ vᵢ²)` of a vector.
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity `(a·b) / (‖a‖·‖b‖)` between two vectors.
///
/// Returns `0.0` when either vector has zero magnitude.
///
/// # Errors
///
/// Returns [`RagError::DimensionMismatch`] when the vectors have different
/// lengths; mismatched input is never silently truncated.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok(dot / (norm_a * norm_b))
}

/// Express a cosine similarity score as a percentage in `[0, 100]`.
///
/// Negative similarities clamp to `0.0`; only non-negative similarity is
/// meaningful for duplicate detection.
pub fn similarity_percent(score: f32) -> f32 {
    (score * 100.0).clamp(0.0, 100.0)
}
