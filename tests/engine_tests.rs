//! End-to-end tests for ingestion, retrieval, and streaming generation,
//! driven by scripted in-process provider and model implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ollama_rag::{
    CancellationRegistry, ChunkStream, ContextBuilder, ConversationStore, DedupEngine, Document,
    DocumentStore, EmbeddingProvider, EventBus, GenerateOptions, GenerationEngine,
    GenerationEvent, GenerationOutcome, GenerativeModel, InMemoryConversationStore,
    InMemoryDocumentStore, IngestOutcome, ModelSettings, OllamaConfig, PromptMessage, RagConfig,
    RagError, Result, Role, SimilarityResult, StoreStats, StreamChunk, CANCELLED_SENTINEL,
};

/// Maps exact texts to fixed vectors; unknown texts embed to `fallback`.
struct ScriptedEmbedder {
    map: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
}

impl ScriptedEmbedder {
    fn new(fallback: Vec<f32>) -> Self {
        Self { map: HashMap::new(), fallback }
    }

    fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.map.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.map.get(text).cloned().unwrap_or_else(|| self.fallback.clone()))
    }

    fn dimensions(&self) -> usize {
        self.fallback.len()
    }
}

/// Streams a fixed chunk script with a configurable delay before each chunk,
/// optionally failing partway through. Records every prompt it receives.
struct ScriptedModel {
    chunks: Vec<StreamChunk>,
    fail_after: Option<usize>,
    delay: Duration,
    seen: Mutex<Vec<Vec<PromptMessage>>>,
}

impl ScriptedModel {
    fn completing(text_chunks: &[&str]) -> Self {
        let mut chunks: Vec<StreamChunk> = text_chunks
            .iter()
            .map(|c| StreamChunk { content: (*c).to_string(), done: false })
            .collect();
        chunks.push(StreamChunk { content: String::new(), done: true });
        Self { chunks, fail_after: None, delay: Duration::from_millis(0), seen: Mutex::new(Vec::new()) }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn failing_after(mut self, emitted: usize) -> Self {
        self.fail_after = Some(emitted);
        self
    }

    fn seen_prompts(&self) -> Vec<Vec<PromptMessage>> {
        self.seen.lock().unwrap().clone()
    }

    fn script_stream(&self) -> ChunkStream {
        let chunks = self.chunks.clone();
        let fail_after = self.fail_after;
        let delay = self.delay;
        Box::pin(async_stream::stream! {
            for (i, chunk) in chunks.into_iter().enumerate() {
                tokio::time::sleep(delay).await;
                if fail_after == Some(i) {
                    yield Err(RagError::ProviderUnavailable {
                        provider: "scripted".into(),
                        message: "connection reset".into(),
                    });
                    return;
                }
                yield Ok(chunk);
            }
        })
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn chat_stream(&self, _model: &str, messages: &[PromptMessage]) -> Result<ChunkStream> {
        self.seen.lock().unwrap().push(messages.to_vec());
        Ok(self.script_stream())
    }

    async fn generate_stream(
        &self,
        _model: &str,
        prompt: &str,
        _options: GenerateOptions,
    ) -> Result<ChunkStream> {
        self.seen.lock().unwrap().push(vec![PromptMessage::new(Role::User, prompt)]);
        Ok(self.script_stream())
    }
}

/// Delegates to an in-memory store but fails a set number of
/// `attach_embedding` calls first.
struct FlakyAttachStore {
    inner: InMemoryDocumentStore,
    attach_failures: AtomicUsize,
}

impl FlakyAttachStore {
    fn failing_once() -> Self {
        Self { inner: InMemoryDocumentStore::new(), attach_failures: AtomicUsize::new(1) }
    }
}

#[async_trait]
impl DocumentStore for FlakyAttachStore {
    async fn insert(&self, content: &str, metadata: HashMap<String, String>) -> Result<Document> {
        self.inner.insert(content, metadata).await
    }

    async fn attach_embedding(&self, document_id: &str, vector: Vec<f32>, norm: f32) -> Result<()> {
        if self
            .attach_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RagError::StoreUnavailable("attach rejected".to_string()));
        }
        self.inner.attach_embedding(document_id, vector, norm).await
    }

    async fn exists_exact(&self, content: &str) -> Result<bool> {
        self.inner.exists_exact(content).await
    }

    async fn find_similar(
        &self,
        query: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<SimilarityResult>> {
        self.inner.find_similar(query, top_k, threshold).await
    }

    async fn max_similarity_percent(&self, query: &[f32]) -> Result<f32> {
        self.inner.max_similarity_percent(query).await
    }

    async fn get(&self, document_id: &str) -> Result<Document> {
        self.inner.get(document_id).await
    }

    async fn delete(&self, document_id: &str) -> Result<()> {
        self.inner.delete(document_id).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.inner.stats().await
    }
}

fn settings() -> Arc<ModelSettings> {
    Arc::new(ModelSettings::new(&OllamaConfig::default()))
}

fn engine_with(
    model: Arc<ScriptedModel>,
    embedder: Arc<ScriptedEmbedder>,
    store: Arc<InMemoryDocumentStore>,
    history: Arc<InMemoryConversationStore>,
) -> GenerationEngine {
    GenerationEngine::builder()
        .model(model)
        .settings(settings())
        .context(ContextBuilder::new(embedder, store, RagConfig::default()))
        .history(history)
        .events(Arc::new(EventBus::new()))
        .registry(Arc::new(CancellationRegistry::new()))
        .build()
        .unwrap()
}

async fn drain_terminal(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<GenerationEvent>,
) -> (Vec<String>, GenerationEvent) {
    let mut messages = Vec::new();
    loop {
        let event = rx.recv().await.expect("event stream ended without a terminal event");
        match event {
            GenerationEvent::Start => {}
            GenerationEvent::Message { content } => messages.push(content),
            terminal => return (messages, terminal),
        }
    }
}

// ── Deduplication ──────────────────────────────────────────────────

#[tokio::test]
async fn second_identical_ingest_is_an_exact_duplicate() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0, 0.0, 0.0]));
    let dedup = DedupEngine::new(embedder, store.clone(), RagConfig::default());

    let first = dedup.ingest("the handbook", HashMap::new()).await.unwrap();
    assert!(matches!(first, IngestOutcome::Ingested(_)));
    assert_eq!(store.count().await.unwrap(), 1);

    let second = dedup.ingest("the handbook", HashMap::new()).await.unwrap();
    assert_eq!(second, IngestOutcome::SkippedExactDuplicate);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn near_identical_embedding_is_a_semantic_duplicate() {
    // Dimensionality 4: document A and the new content embed identically,
    // so max similarity is 100% and the new text is skipped.
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(
        ScriptedEmbedder::new(vec![0.0, 0.0, 0.0, 1.0])
            .with("document a", vec![1.0, 0.0, 0.0, 0.0])
            .with("document a, reworded", vec![1.0, 0.0, 0.0, 0.0]),
    );
    let dedup = DedupEngine::new(embedder, store.clone(), RagConfig::default());

    dedup.ingest("document a", HashMap::new()).await.unwrap();
    let outcome = dedup.ingest("document a, reworded", HashMap::new()).await.unwrap();

    match outcome {
        IngestOutcome::SkippedSemanticDuplicate { similarity_percent } => {
            assert!((similarity_percent - 100.0).abs() < 1e-3);
        }
        other => panic!("expected semantic duplicate, got {other:?}"),
    }
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn dissimilar_content_is_ingested() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(
        ScriptedEmbedder::new(vec![0.0, 1.0])
            .with("apples", vec![1.0, 0.0])
            .with("bicycles", vec![0.0, 1.0]),
    );
    let dedup = DedupEngine::new(embedder, store.clone(), RagConfig::default());

    dedup.ingest("apples", HashMap::new()).await.unwrap();
    let outcome = dedup.ingest("bicycles", HashMap::new()).await.unwrap();
    assert!(matches!(outcome, IngestOutcome::Ingested(_)));
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn failed_embedding_aborts_ingestion_without_a_partial_document() {
    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::ProviderUnavailable {
                provider: "scripted".into(),
                message: "down".into(),
            })
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    let store = Arc::new(InMemoryDocumentStore::new());
    let dedup = DedupEngine::new(Arc::new(FailingEmbedder), store.clone(), RagConfig::default());

    let result = dedup.ingest("content", HashMap::new()).await;
    assert!(matches!(result, Err(RagError::ProviderUnavailable { .. })));
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_embedding_attach_rolls_back_so_a_retry_can_ingest() {
    let store = Arc::new(FlakyAttachStore::failing_once());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let dedup = DedupEngine::new(embedder, store.clone(), RagConfig::default());

    let first = dedup.ingest("the handbook", HashMap::new()).await;
    assert!(matches!(first, Err(RagError::StoreUnavailable(_))));
    assert_eq!(store.count().await.unwrap(), 0);

    // The content is not orphaned as an unembedded document; the retry
    // ingests rather than reporting an exact duplicate.
    let retry = dedup.ingest("the handbook", HashMap::new()).await.unwrap();
    assert!(matches!(retry, IngestOutcome::Ingested(_)));
    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.stats().await.unwrap().total_embeddings, 1);
}

// ── Retrieval ──────────────────────────────────────────────────────

#[tokio::test]
async fn find_similar_ranks_exact_match_above_orthogonal() {
    let store = InMemoryDocumentStore::new();
    let a = store.insert("on the x axis", HashMap::new()).await.unwrap();
    store.attach_embedding(&a.id, vec![1.0, 0.0], 1.0).await.unwrap();
    let b = store.insert("on the y axis", HashMap::new()).await.unwrap();
    store.attach_embedding(&b.id, vec![0.0, 1.0], 1.0).await.unwrap();

    let results = store.find_similar(&[1.0, 0.0], 2, 0.0).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].document.id, a.id);
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert_eq!(results[1].document.id, b.id);
    assert!(results[1].score.abs() < 1e-6);
}

#[tokio::test]
async fn context_feeds_the_system_prompt() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let doc = store.insert("the office opens at nine", HashMap::new()).await.unwrap();
    store.attach_embedding(&doc.id, vec![1.0, 0.0], 1.0).await.unwrap();

    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["Nine.", ""]));
    let history = Arc::new(InMemoryConversationStore::new());
    let engine = engine_with(model.clone(), embedder, store, history);

    engine.chat("s1", "when does the office open?").await.unwrap();

    let prompts = model.seen_prompts();
    assert_eq!(prompts.len(), 1);
    let first = &prompts[0][0];
    assert_eq!(first.role, Role::System);
    assert!(first.content.contains("the office opens at nine"));
    assert!(first.content.contains("when does the office open?"));
}

#[tokio::test]
async fn empty_store_falls_back_to_unaugmented_prompt() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["ok"]));
    let engine =
        engine_with(model.clone(), embedder, store, Arc::new(InMemoryConversationStore::new()));

    engine.chat("s1", "anything stored?").await.unwrap();

    let prompts = model.seen_prompts();
    let messages = &prompts[0];
    assert!(messages.iter().all(|m| m.role != Role::System));
    let last = messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert!(last.content.contains("anything stored?"));
    assert!(last.content.contains("no stored context"));
}

// ── Streaming generation ───────────────────────────────────────────

#[tokio::test]
async fn completed_chat_streams_deltas_and_persists_the_turn() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["Hel", "lo"]));
    let history = Arc::new(InMemoryConversationStore::new());
    let engine = engine_with(model, embedder, store, history.clone());

    let mut rx = engine.events().register("s1");
    let outcome = engine.chat("s1", "greet me").await.unwrap();
    assert_eq!(outcome, GenerationOutcome::Completed("Hello".to_string()));

    let (messages, terminal) = drain_terminal(&mut rx).await;
    assert_eq!(messages, vec!["Hel".to_string(), "lo".to_string()]);
    assert_eq!(terminal, GenerationEvent::Complete { final_content: "Hello".to_string() });

    let log = history.load("s1").await.unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].role, Role::User);
    assert_eq!(log[0].content, "greet me");
    assert_eq!(log[1].role, Role::Assistant);
    assert_eq!(log[1].content, "Hello");
    assert!(log[1].metadata.contains_key("model"));
}

#[tokio::test]
async fn chat_sends_prior_history_to_the_model() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["sure"]));
    let history = Arc::new(InMemoryConversationStore::new());
    history.append("s1", Role::User, "hi", HashMap::new()).await.unwrap();
    history.append("s1", Role::Assistant, "hello", HashMap::new()).await.unwrap();
    let engine = engine_with(model.clone(), embedder, store, history.clone());

    engine.chat("s1", "bye").await.unwrap();

    let prompts = model.seen_prompts();
    let contents: Vec<&str> = prompts[0].iter().map(|m| m.content.as_str()).collect();
    let hi = contents.iter().position(|c| *c == "hi").unwrap();
    let hello = contents.iter().position(|c| *c == "hello").unwrap();
    assert!(hi < hello);
    assert!(prompts[0].last().unwrap().content.contains("bye"));

    let log = history.load("s1").await.unwrap();
    assert_eq!(log.len(), 4);
    assert_eq!(log[2].content, "bye");
}

#[tokio::test]
async fn chat_bounds_the_prompt_to_the_recent_history_window() {
    let config = RagConfig::builder().history_window(2).build().unwrap();
    let model = Arc::new(ScriptedModel::completing(&["ok"]));
    let history = Arc::new(InMemoryConversationStore::new());
    for content in ["first", "second", "third", "fourth"] {
        history.append("s1", Role::User, content, HashMap::new()).await.unwrap();
    }
    let engine = GenerationEngine::builder()
        .model(model.clone())
        .settings(settings())
        .context(ContextBuilder::new(
            Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0])),
            Arc::new(InMemoryDocumentStore::new()),
            config,
        ))
        .history(history)
        .build()
        .unwrap();

    engine.chat("s1", "now").await.unwrap();

    let prompts = model.seen_prompts();
    let contents: Vec<&str> = prompts[0].iter().map(|m| m.content.as_str()).collect();
    assert!(!contents.contains(&"first"));
    assert!(!contents.contains(&"second"));
    let third = contents.iter().position(|c| *c == "third").unwrap();
    let fourth = contents.iter().position(|c| *c == "fourth").unwrap();
    assert!(third < fourth);
    assert!(prompts[0].last().unwrap().content.contains("now"));
}

#[tokio::test]
async fn cancel_before_first_chunk_yields_the_sentinel_and_no_assistant_turn() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(
        ScriptedModel::completing(&["never seen"]).with_delay(Duration::from_millis(300)),
    );
    let history = Arc::new(InMemoryConversationStore::new());
    let engine = Arc::new(engine_with(model, embedder, store, history.clone()));

    let mut rx = engine.events().register("s1");
    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.chat("s1", "slow question").await })
    };

    // The start event means the stream is open and the token is registered;
    // the first chunk is still 300ms away.
    assert_eq!(rx.recv().await.unwrap(), GenerationEvent::Start);
    engine.cancel("s1");

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, GenerationOutcome::Cancelled);
    assert_eq!(outcome.text(), CANCELLED_SENTINEL);
    assert_eq!(rx.recv().await.unwrap(), GenerationEvent::Cancelled);

    let log = history.load("s1").await.unwrap();
    assert!(log.iter().all(|m| m.role != Role::Assistant));
}

#[tokio::test]
async fn cancel_mid_stream_stops_at_the_next_chunk_boundary() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(
        ScriptedModel::completing(&["one", "two", "three"])
            .with_delay(Duration::from_millis(100)),
    );
    let history = Arc::new(InMemoryConversationStore::new());
    let engine = Arc::new(engine_with(model, embedder, store, history.clone()));

    let mut rx = engine.events().register("s1");
    let task = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.chat("s1", "count").await })
    };

    assert_eq!(rx.recv().await.unwrap(), GenerationEvent::Start);
    assert_eq!(
        rx.recv().await.unwrap(),
        GenerationEvent::Message { content: "one".to_string() }
    );
    engine.cancel("s1");

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, GenerationOutcome::Cancelled);

    let (_, terminal) = drain_terminal(&mut rx).await;
    assert_eq!(terminal, GenerationEvent::Cancelled);
    assert!(history.load("s1").await.unwrap().iter().all(|m| m.role != Role::Assistant));
}

#[tokio::test]
async fn mid_stream_failure_surfaces_an_error_event_and_keeps_history_intact() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["partial", "rest"]).failing_after(1));
    let history = Arc::new(InMemoryConversationStore::new());
    let engine = engine_with(model, embedder, store, history.clone());

    let mut rx = engine.events().register("s1");
    let result = engine.chat("s1", "question").await;
    assert!(matches!(result, Err(RagError::ProviderUnavailable { .. })));

    let (messages, terminal) = drain_terminal(&mut rx).await;
    assert_eq!(messages, vec!["partial".to_string()]);
    assert!(matches!(terminal, GenerationEvent::Error { .. }));

    // The user turn survives; the partial response is discarded.
    let log = history.load("s1").await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].role, Role::User);
}

#[tokio::test]
async fn generate_streams_without_touching_history() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["gen", "erated"]));
    let history = Arc::new(InMemoryConversationStore::new());
    let engine = engine_with(model, embedder, store, history.clone());

    let mut rx = engine.events().register("s1");
    let outcome = engine.generate("s1", "prompt", GenerateOptions::default()).await.unwrap();
    assert_eq!(outcome, GenerationOutcome::Completed("generated".to_string()));

    let (_, terminal) = drain_terminal(&mut rx).await;
    assert_eq!(
        terminal,
        GenerationEvent::Complete { final_content: "generated".to_string() }
    );
    assert_eq!(history.count("s1").await.unwrap(), 0);
}

#[tokio::test]
async fn registry_entry_is_removed_after_completion() {
    let store = Arc::new(InMemoryDocumentStore::new());
    let embedder = Arc::new(ScriptedEmbedder::new(vec![1.0, 0.0]));
    let model = Arc::new(ScriptedModel::completing(&["done"]));
    let engine =
        engine_with(model, embedder, store, Arc::new(InMemoryConversationStore::new()));

    engine.chat("s1", "hello").await.unwrap();
    assert!(engine.registry().is_empty());

    // Cancelling a finished request is a no-op.
    engine.cancel("s1");
    engine.cancel_all();
}
