//! Append-only, session-keyed conversation history.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::document::{ChatMessage, Role};
use crate::error::Result;

/// Persistence for ordered per-session conversation logs.
///
/// All operations are keyed by session id; sessions never see each other's
/// messages. Message order within a session is append order and is relied
/// on to reconstruct the multi-turn prompt sent to the model.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Append a message to the session's log.
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Load the session's full log in append order. An unknown session
    /// yields an empty log.
    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>>;

    /// The most recent `limit` messages, re-ordered ascending for prompt
    /// assembly.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    /// Destructively drop the session's entire log.
    async fn clear(&self, session_id: &str) -> Result<()>;

    /// Number of messages in the session's log.
    async fn count(&self, session_id: &str) -> Result<usize>;
}

/// An in-memory [`ConversationStore`].
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    sessions: RwLock<HashMap<String, Vec<ChatMessage>>>,
}

impl InMemoryConversationStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let message = ChatMessage {
            session_id: session_id.to_string(),
            role,
            content: content.to_string(),
            metadata,
            created_at: Utc::now(),
        };
        let mut sessions = self.sessions.write().await;
        sessions.entry(session_id.to_string()).or_default().push(message);
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ChatMessage>> {
        let sessions = self.sessions.read().await;
        let log = sessions.get(session_id).map(Vec::as_slice).unwrap_or_default();
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn clear(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn count(&self, session_id: &str) -> Result<usize> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map_or(0, Vec::len))
    }
}
