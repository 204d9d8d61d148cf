//! Cooperative cancellation tokens and the shared request registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A per-request cancellation token.
///
/// Cancellation is cooperative: the generation loop polls the token at each
/// chunk boundary and stops at the next checkpoint after it is set. Clones
/// share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create an unset token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Shared registry of in-flight generation requests.
///
/// Maps request ids to their cancellation tokens. Registration and lookup
/// take a short lock; the tokens themselves are lock-free, so cancelling one
/// request never serializes unrelated sessions.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: RwLock<HashMap<String, CancellationToken>>,
}

impl CancellationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint and register a token for `request_id`, replacing any prior entry
    /// for the same id.
    pub fn register(&self, request_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.insert(request_id.to_string(), token.clone());
        token
    }

    /// Cancel the request with the given id. Unknown or already-finished ids
    /// are a no-op.
    pub fn cancel(&self, request_id: &str) {
        let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        if let Some(token) = tokens.get(request_id) {
            token.cancel();
        }
    }

    /// Cancel every registered request and clear the registry.
    pub fn cancel_all(&self) {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        for token in tokens.values() {
            token.cancel();
        }
        tokens.clear();
    }

    /// Drop the registry entry for a finished request. The token itself
    /// stays valid for any holder still polling it.
    pub fn remove(&self, request_id: &str) {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.remove(request_id);
    }

    /// Number of in-flight requests.
    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
