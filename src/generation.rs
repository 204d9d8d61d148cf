//! Streaming generation orchestration.
//!
//! The [`GenerationEngine`] drives one generation request end to end:
//! load the session history, retrieve context, stream the model's output
//! chunk-by-chunk while polling cancellation, fan events out to the
//! subscribed client, and persist the completed turn.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tracing::{error, info};
use uuid::Uuid;

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::config::ModelSettings;
use crate::context::ContextBuilder;
use crate::document::Role;
use crate::error::{RagError, Result};
use crate::events::{EventBus, GenerationEvent};
use crate::history::ConversationStore;
use crate::model::{ChunkStream, GenerateOptions, GenerativeModel, PromptMessage};

/// Sentinel emitted in place of further content when a request is cancelled.
pub const CANCELLED_SENTINEL: &str = "[CANCELLED]";

/// Terminal result of a generation request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The stream ran to its `done` marker; carries the full accumulated
    /// response.
    Completed(String),
    /// Cancellation was observed at a chunk boundary.
    Cancelled,
}

impl GenerationOutcome {
    /// The response text: the accumulated content, or the cancellation
    /// sentinel.
    pub fn text(&self) -> &str {
        match self {
            Self::Completed(content) => content,
            Self::Cancelled => CANCELLED_SENTINEL,
        }
    }

    /// Convert into a `Result`, mapping cancellation to
    /// [`RagError::Cancelled`].
    pub fn into_result(self) -> Result<String> {
        match self {
            Self::Completed(content) => Ok(content),
            Self::Cancelled => Err(RagError::Cancelled),
        }
    }
}

enum StreamEnd {
    Done(String),
    Cancelled,
}

/// Orchestrates retrieval-augmented streaming generation per session.
///
/// One engine serves all sessions concurrently; each call runs
/// independently. One active generation per session is the expected usage;
/// overlapping calls for the same session are not prevented, and a later
/// call's registry entry replaces the earlier one's, so callers wanting
/// strict serialization must enforce it above this layer.
pub struct GenerationEngine {
    model: Arc<dyn GenerativeModel>,
    settings: Arc<ModelSettings>,
    context: ContextBuilder,
    history: Arc<dyn ConversationStore>,
    events: Arc<EventBus>,
    registry: Arc<CancellationRegistry>,
}

impl GenerationEngine {
    /// Create a new [`GenerationEngineBuilder`].
    pub fn builder() -> GenerationEngineBuilder {
        GenerationEngineBuilder::default()
    }

    /// The event bus clients subscribe to.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// The shared cancellation registry.
    pub fn registry(&self) -> &Arc<CancellationRegistry> {
        &self.registry
    }

    /// The conversation store backing session history.
    pub fn history(&self) -> &Arc<dyn ConversationStore> {
        &self.history
    }

    /// Request cancellation of the session's in-flight generation.
    /// Best-effort: takes effect at the next chunk boundary; a no-op when
    /// nothing is in flight.
    pub fn cancel(&self, session_id: &str) {
        self.registry.cancel(session_id);
    }

    /// Cancel every in-flight generation.
    pub fn cancel_all(&self) {
        self.registry.cancel_all();
    }

    /// Run a chat-style generation turn for `session_id`.
    ///
    /// Assembles the recent prior conversation (bounded by the configured
    /// history window) plus a context-augmented system prompt, streams the
    /// model response while emitting events to the session's channel, and on
    /// completion persists both sides of the turn.
    /// A cancelled or failed turn persists the user message but never an
    /// assistant message.
    ///
    /// # Errors
    ///
    /// Provider, store, and mid-stream failures surface to the caller after
    /// an `error` event is emitted; the partial response is discarded.
    pub async fn chat(&self, session_id: &str, query: &str) -> Result<GenerationOutcome> {
        let request_id = Uuid::new_v4();
        let token = self.registry.register(session_id);
        info!(session_id, %request_id, "chat generation started");

        let result = self.run_chat(session_id, query, &token).await;
        self.registry.remove(session_id);

        if let Err(e) = &result {
            error!(session_id, %request_id, error = %e, "chat generation failed");
            self.events.send(session_id, GenerationEvent::Error { message: e.to_string() });
        }
        result
    }

    async fn run_chat(
        &self,
        session_id: &str,
        query: &str,
        token: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let window = self.context.config().history_window;
        let prior = self.history.recent(session_id, window).await?;
        let context = self.context.build_context(query).await?;

        let mut messages = Vec::with_capacity(prior.len() + 2);
        let user_content = match &context {
            Some(ctx) => {
                messages.push(PromptMessage::new(
                    Role::System,
                    self.context.render_prompt(ctx, query),
                ));
                query.to_string()
            }
            None => self.context.fallback_prompt(query),
        };
        messages.extend(prior.iter().map(PromptMessage::from));
        messages.push(PromptMessage::new(Role::User, user_content));

        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "chat".to_string());
        self.history.append(session_id, Role::User, query, metadata).await?;

        if token.is_cancelled() {
            self.events.send(session_id, GenerationEvent::Cancelled);
            return Ok(GenerationOutcome::Cancelled);
        }

        let model = self.settings.chat_model();
        let stream = self.model.chat_stream(&model, &messages).await?;

        match self.pump(session_id, stream, token).await? {
            StreamEnd::Cancelled => Ok(GenerationOutcome::Cancelled),
            StreamEnd::Done(full) => {
                let mut metadata = HashMap::new();
                metadata.insert("model".to_string(), model);
                self.history.append(session_id, Role::Assistant, &full, metadata).await?;
                info!(session_id, response_len = full.len(), "chat generation completed");
                Ok(GenerationOutcome::Completed(full))
            }
        }
    }

    /// Run a single-prompt generation for `session_id`.
    ///
    /// Retrieves context for `query` like [`chat`](Self::chat) but sends one
    /// rendered prompt to the generate endpoint and persists nothing.
    pub async fn generate(
        &self,
        session_id: &str,
        query: &str,
        options: GenerateOptions,
    ) -> Result<GenerationOutcome> {
        let request_id = Uuid::new_v4();
        let token = self.registry.register(session_id);
        info!(session_id, %request_id, "prompt generation started");

        let result = self.run_generate(session_id, query, options, &token).await;
        self.registry.remove(session_id);

        if let Err(e) = &result {
            error!(session_id, %request_id, error = %e, "prompt generation failed");
            self.events.send(session_id, GenerationEvent::Error { message: e.to_string() });
        }
        result
    }

    async fn run_generate(
        &self,
        session_id: &str,
        query: &str,
        options: GenerateOptions,
        token: &CancellationToken,
    ) -> Result<GenerationOutcome> {
        let context = self.context.build_context(query).await?;
        let prompt = match &context {
            Some(ctx) => self.context.render_prompt(ctx, query),
            None => self.context.fallback_prompt(query),
        };

        if token.is_cancelled() {
            self.events.send(session_id, GenerationEvent::Cancelled);
            return Ok(GenerationOutcome::Cancelled);
        }

        let model = self.settings.chat_model();
        let stream = self.model.generate_stream(&model, &prompt, options).await?;

        match self.pump(session_id, stream, token).await? {
            StreamEnd::Cancelled => Ok(GenerationOutcome::Cancelled),
            StreamEnd::Done(full) => {
                info!(session_id, response_len = full.len(), "prompt generation completed");
                Ok(GenerationOutcome::Completed(full))
            }
        }
    }

    /// Drive the chunk stream: emit `start`, forward each content delta as a
    /// `message` event, poll cancellation before processing every chunk, and
    /// finish with the matching terminal event. Dropping the stream on
    /// cancellation disconnects the underlying connection.
    async fn pump(
        &self,
        session_id: &str,
        mut stream: ChunkStream,
        token: &CancellationToken,
    ) -> Result<StreamEnd> {
        self.events.send(session_id, GenerationEvent::Start);
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            if token.is_cancelled() {
                drop(stream);
                info!(session_id, "generation cancelled at chunk boundary");
                self.events.send(session_id, GenerationEvent::Cancelled);
                return Ok(StreamEnd::Cancelled);
            }

            let chunk = chunk?;
            if !chunk.content.is_empty() {
                full.push_str(&chunk.content);
                self.events
                    .send(session_id, GenerationEvent::Message { content: chunk.content });
            }
            if chunk.done {
                break;
            }
        }

        if token.is_cancelled() {
            self.events.send(session_id, GenerationEvent::Cancelled);
            return Ok(StreamEnd::Cancelled);
        }

        self.events.send(session_id, GenerationEvent::Complete { final_content: full.clone() });
        Ok(StreamEnd::Done(full))
    }
}

/// Builder for constructing a [`GenerationEngine`].
#[derive(Default)]
pub struct GenerationEngineBuilder {
    model: Option<Arc<dyn GenerativeModel>>,
    settings: Option<Arc<ModelSettings>>,
    context: Option<ContextBuilder>,
    history: Option<Arc<dyn ConversationStore>>,
    events: Option<Arc<EventBus>>,
    registry: Option<Arc<CancellationRegistry>>,
}

impl GenerationEngineBuilder {
    /// Set the generative model backend.
    pub fn model(mut self, model: Arc<dyn GenerativeModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Set the shared model selection.
    pub fn settings(mut self, settings: Arc<ModelSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the retrieval context builder.
    pub fn context(mut self, context: ContextBuilder) -> Self {
        self.context = Some(context);
        self
    }

    /// Set the conversation store.
    pub fn history(mut self, history: Arc<dyn ConversationStore>) -> Self {
        self.history = Some(history);
        self
    }

    /// Set the event bus. Defaults to a fresh bus.
    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the cancellation registry. Defaults to a fresh registry.
    pub fn registry(mut self, registry: Arc<CancellationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Build the [`GenerationEngine`], validating that required parts are
    /// set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the model, settings, context
    /// builder, or history store is missing.
    pub fn build(self) -> Result<GenerationEngine> {
        let model =
            self.model.ok_or_else(|| RagError::ConfigError("model is required".to_string()))?;
        let settings = self
            .settings
            .ok_or_else(|| RagError::ConfigError("settings are required".to_string()))?;
        let context = self
            .context
            .ok_or_else(|| RagError::ConfigError("context builder is required".to_string()))?;
        let history =
            self.history.ok_or_else(|| RagError::ConfigError("history is required".to_string()))?;

        Ok(GenerationEngine {
            model,
            settings,
            context,
            history,
            events: self.events.unwrap_or_default(),
            registry: self.registry.unwrap_or_default(),
        })
    }
}
