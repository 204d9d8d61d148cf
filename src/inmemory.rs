//! In-memory document store using a linear cosine-similarity scan.
//!
//! Backed by a `HashMap` behind a `tokio::sync::RwLock`. Suitable for
//! development, testing, and the small corpus sizes a linear scan handles
//! comfortably.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::document::{Document, SimilarityResult, StoreStats};
use crate::error::{RagError, Result};
use crate::store::DocumentStore;
use crate::vector;

#[derive(Debug, Clone)]
struct StoredEmbedding {
    vector: Vec<f32>,
    norm: f32,
}

#[derive(Debug, Clone)]
struct Row {
    document: Document,
    embedding: Option<StoredEmbedding>,
}

/// An in-memory [`DocumentStore`].
///
/// Documents without an attached embedding are stored but excluded from
/// similarity search and from `max_similarity_percent`.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    rows: RwLock<HashMap<String, Row>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, content: &str, metadata: HashMap<String, String>) -> Result<Document> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        let mut rows = self.rows.write().await;
        rows.insert(document.id.clone(), Row { document: document.clone(), embedding: None });
        Ok(document)
    }

    async fn attach_embedding(&self, document_id: &str, vector: Vec<f32>, norm: f32) -> Result<()> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(document_id)
            .ok_or_else(|| RagError::NotFound(format!("document '{document_id}'")))?;
        row.embedding = Some(StoredEmbedding { vector, norm });
        Ok(())
    }

    async fn exists_exact(&self, content: &str) -> Result<bool> {
        let rows = self.rows.read().await;
        Ok(rows.values().any(|row| row.document.content == content))
    }

    async fn find_similar(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityResult>> {
        let rows = self.rows.read().await;
        let mut scored = Vec::new();
        for row in rows.values() {
            let Some(embedding) = &row.embedding else { continue };
            let score = vector::cosine_similarity(&embedding.vector, query)?;
            if score >= threshold {
                scored.push(SimilarityResult { document: row.document.clone(), score });
            }
        }

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document.id.cmp(&b.document.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn max_similarity_percent(&self, query: &[f32]) -> Result<f32> {
        let rows = self.rows.read().await;
        let mut max_score = 0.0f32;
        for row in rows.values() {
            let Some(embedding) = &row.embedding else { continue };
            let score = vector::cosine_similarity(&embedding.vector, query)?;
            max_score = max_score.max(score);
        }
        Ok(vector::similarity_percent(max_score))
    }

    async fn get(&self, document_id: &str) -> Result<Document> {
        let rows = self.rows.read().await;
        rows.get(document_id)
            .map(|row| row.document.clone())
            .ok_or_else(|| RagError::NotFound(format!("document '{document_id}'")))
    }

    async fn delete(&self, document_id: &str) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.remove(document_id);
        Ok(())
    }

    async fn count(&self) -> Result<usize> {
        let rows = self.rows.read().await;
        Ok(rows.len())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let rows = self.rows.read().await;
        let total_documents = rows.len();
        let norms: Vec<f32> =
            rows.values().filter_map(|row| row.embedding.as_ref().map(|e| e.norm)).collect();
        let total_embeddings = norms.len();
        let average_embedding_norm = if norms.is_empty() {
            0.0
        } else {
            norms.iter().sum::<f32>() / norms.len() as f32
        };
        Ok(StoreStats { total_documents, total_embeddings, average_embedding_norm })
    }
}
