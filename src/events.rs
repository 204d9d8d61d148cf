//! Per-client delivery of generation events.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// An event emitted during a generation request, delivered to the
/// subscribed client channel.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// The model stream has opened.
    Start,
    /// An incremental content delta.
    Message {
        /// The content delta.
        content: String,
    },
    /// The stream finished normally.
    Complete {
        /// The full accumulated response.
        final_content: String,
    },
    /// The stream failed mid-flight.
    Error {
        /// A description of the failure.
        message: String,
    },
    /// The request was cancelled cooperatively.
    Cancelled,
}

impl GenerationEvent {
    /// The event's wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Message { .. } => "message",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Fans generation events out to per-client channels.
///
/// One live channel per client id; registering again replaces the previous
/// channel. Sending to an unregistered client is a no-op (no buffering, no
/// error), and a send to a client whose receiver is gone tears the channel
/// down. Events enqueue without blocking the generation loop, and per-client
/// order is preserved; no ordering holds across clients.
#[derive(Debug, Default)]
pub struct EventBus {
    channels: Mutex<HashMap<String, mpsc::UnboundedSender<GenerationEvent>>>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a delivery channel for `client_id`, replacing any prior channel
    /// for that id (the old receiver sees its stream close).
    pub fn register(&self, client_id: &str) -> mpsc::UnboundedReceiver<GenerationEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.insert(client_id.to_string(), tx);
        rx
    }

    /// Close and remove the channel for `client_id`, if any.
    pub fn unregister(&self, client_id: &str) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.remove(client_id);
    }

    /// Deliver an event to `client_id`'s channel. No-op when the client is
    /// not connected; a failed delivery removes the channel and is not
    /// retried.
    pub fn send(&self, client_id: &str, event: GenerationEvent) {
        let sender = {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.get(client_id).cloned()
        };
        let Some(sender) = sender else { return };

        if sender.send(event).is_err() {
            debug!(client_id, "delivery channel closed, removing");
            self.remove_stale(client_id, &sender);
        }
    }

    /// Remove the entry for `client_id` only while it still belongs to
    /// `sender`'s channel; a client that re-registered since the failed send
    /// keeps its fresh channel.
    fn remove_stale(&self, client_id: &str, sender: &mpsc::UnboundedSender<GenerationEvent>) {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        if channels.get(client_id).is_some_and(|current| current.same_channel(sender)) {
            channels.remove(client_id);
        }
    }

    /// Deliver an event to every registered channel independently, removing
    /// any channel whose receiver is gone.
    pub fn broadcast(&self, event: GenerationEvent) {
        let senders: Vec<(String, mpsc::UnboundedSender<GenerationEvent>)> = {
            let channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
            channels.iter().map(|(id, tx)| (id.clone(), tx.clone())).collect()
        };

        for (client_id, sender) in senders {
            if sender.send(event.clone()).is_err() {
                self.remove_stale(&client_id, &sender);
            }
        }
    }

    /// Number of connected clients.
    pub fn client_count(&self) -> usize {
        self.channels.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
