//! Domain event system: decoupled communication between components.
//!
//! The orchestrator and the session store publish events as turns are
//! processed. The gateway and CLI subscribe to log or count them without
//! being coupled to the turn pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A user turn was accepted for a session
    MessageReceived {
        session_id: String,
        content_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The orchestrator produced a reply
    ResponseGenerated {
        session_id: String,
        model: String,
        tools_used: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// An operation was dispatched to the tool service
    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The argument corrector changed a proposed call
    ArgumentsCorrected {
        tool_name: String,
        fields: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    /// An idle session was dropped from the in-memory cache
    SessionEvicted {
        session_id: String,
        timestamp: DateTime<Utc>,
    },

    /// A turn failed and the apology reply was returned
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
