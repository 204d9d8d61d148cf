//! Duplicate-aware document ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::config::RagConfig;
use crate::document::IngestOutcome;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::store::DocumentStore;
use crate::vector;

/// Decides whether incoming content should be ingested.
///
/// Each ingestion runs a two-stage duplicate check: a byte-for-byte content
/// lookup first (so true duplicates never cost an embedding call), then a
/// semantic check against the highest stored similarity. Only content that
/// passes both is stored, with its embedding attached in the same call.
///
/// The check-then-insert sequence is not atomic across the embedding call:
/// two concurrent ingestions of near-duplicate content can both commit. This
/// matches the source system's behavior and is accepted here.
pub struct DedupEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    config: RagConfig,
}

impl DedupEngine {
    /// Create an engine over an embedding provider and a document store.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn DocumentStore>,
        config: RagConfig,
    ) -> Self {
        Self { provider, store, config }
    }

    /// Ingest `content`, skipping exact and semantic duplicates.
    ///
    /// # Errors
    ///
    /// Provider or store failures abort the ingestion and surface to the
    /// caller. A failed embedding attach rolls the document write back, so
    /// the same content can be retried; nothing is ever visible to
    /// similarity search without its embedding.
    pub async fn ingest(
        &self,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> Result<IngestOutcome> {
        if self.store.exists_exact(content).await? {
            debug!("skipping exact duplicate");
            return Ok(IngestOutcome::SkippedExactDuplicate);
        }

        let embedding = self.provider.embed(content).await?;

        let similarity_percent = self.store.max_similarity_percent(&embedding).await?;
        if similarity_percent >= self.config.semantic_duplicate_percent {
            debug!(similarity_percent = %similarity_percent, "skipping semantic duplicate");
            return Ok(IngestOutcome::SkippedSemanticDuplicate { similarity_percent });
        }

        let norm = vector::norm(&embedding);
        let document = self.store.insert(content, metadata).await?;
        if let Err(e) = self.store.attach_embedding(&document.id, embedding, norm).await {
            // Roll the document back so the content stays re-ingestable; an
            // orphaned row would answer every retry as an exact duplicate.
            if let Err(rollback) = self.store.delete(&document.id).await {
                error!(document.id = %document.id, error = %rollback, "rollback delete failed");
            }
            return Err(e);
        }

        info!(document.id = %document.id, similarity_percent = %similarity_percent, "ingested document");
        Ok(IngestOutcome::Ingested(document))
    }
}
