//! Retrieval context assembly and prompt templating.

use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::store::DocumentStore;

/// Assembles a bounded, prompt-ready context block from retrieved documents.
pub struct ContextBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn DocumentStore>,
    config: RagConfig,
}

impl ContextBuilder {
    /// Create a builder over an embedding provider and a document store.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn DocumentStore>,
        config: RagConfig,
    ) -> Self {
        Self { provider, store, config }
    }

    /// The retrieval configuration in effect.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Retrieve context for `query`.
    ///
    /// Embeds the query, searches the store with the configured `top_k` and
    /// similarity threshold, and concatenates the retrieved documents in
    /// descending-similarity order as labeled blocks. Returns `None` when
    /// nothing relevant is stored; an empty result is a normal outcome, not
    /// an error.
    pub async fn build_context(&self, query: &str) -> Result<Option<String>> {
        let embedding = self.provider.embed(query).await?;
        let results = self
            .store
            .find_similar(&embedding, self.config.top_k, self.config.similarity_threshold)
            .await?;

        if results.is_empty() {
            debug!("no context found for query");
            return Ok(None);
        }

        let mut context = String::from("Context from the knowledge base:\n\n");
        for result in &results {
            let _ = writeln!(
                context,
                "Document {} (similarity: {:.3})",
                result.document.id, result.score
            );
            let _ = writeln!(context, "{}", result.document.content);
            if !result.document.metadata.is_empty() {
                let mut pairs: Vec<String> = result
                    .document
                    .metadata
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                pairs.sort();
                let _ = writeln!(context, "Metadata: {}", pairs.join(", "));
            }
            context.push_str("---\n\n");
        }

        info!(result_count = results.len(), "built retrieval context");
        Ok(Some(context))
    }

    /// Substitute `context` and `query` into the configured prompt template.
    ///
    /// If the template contains neither `{context}` nor `{query}`, both are
    /// appended as a suffix so the retrieved context is never discarded.
    pub fn render_prompt(&self, context: &str, query: &str) -> String {
        let template = &self.config.prompt_template;
        if template.contains("{context}") || template.contains("{query}") {
            template.replace("{context}", context).replace("{query}", query)
        } else {
            format!("{template}\n\nContext:\n{context}\n\nQuestion: {query}")
        }
    }

    /// The un-augmented prompt used when
    /// [`build_context`](ContextBuilder::build_context) finds nothing.
    pub fn fallback_prompt(&self, query: &str) -> String {
        format!("Question: {query}\n\nAnswer (no stored context was found):")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::inmemory::InMemoryDocumentStore;
    use async_trait::async_trait;

    /// Embeds every text to a fixed vector; enough for template tests.
    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }

        fn dimensions(&self) -> usize {
            self.0.len()
        }
    }

    fn builder_with_template(template: &str) -> ContextBuilder {
        let config = RagConfig::builder().prompt_template(template).build().unwrap();
        ContextBuilder::new(
            Arc::new(FixedEmbedder(vec![1.0, 0.0])),
            Arc::new(InMemoryDocumentStore::new()),
            config,
        )
    }

    #[test]
    fn render_substitutes_both_placeholders() {
        let builder = builder_with_template("C: {context} Q: {query}");
        assert_eq!(builder.render_prompt("ctx", "why?"), "C: ctx Q: why?");
    }

    #[test]
    fn render_appends_when_template_has_no_placeholders() {
        let builder = builder_with_template("You are a helpful assistant.");
        let prompt = builder.render_prompt("ctx", "why?");
        assert!(prompt.starts_with("You are a helpful assistant."));
        assert!(prompt.contains("Context:\nctx"));
        assert!(prompt.contains("Question: why?"));
    }

    #[tokio::test]
    async fn empty_store_yields_no_context() {
        let builder = builder_with_template("{context} {query}");
        assert!(builder.build_context("anything").await.unwrap().is_none());
    }
}
