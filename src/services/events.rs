//! Event system for matching operations
//!
//! Services emit an event after each committed mutation. Useful for:
//! - Audit logging
//! - Notifying students and supervisors
//! - Refreshing cached recommendations

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::model::RequestState;

/// Events emitted by services
#[derive(Debug, Clone, PartialEq)]
pub enum MatchEvent {
    // Tag graph events
    TagGraphReplaced {
        tag_count: usize,
        similarity_count: usize,
    },
    TagRenamed {
        tag_id: i64,
        name: String,
    },

    // Profile events
    PrioritiesUpdated {
        user_id: String,
        tag_count: usize,
    },

    // Capacity events
    CapacityChanged {
        supervisor_id: String,
        available_spots: u32,
        total_spots: u32,
        delta: i64,
    },

    // Request events
    RequestCreated {
        id: String,
        student_id: String,
        supervisor_id: String,
    },
    RequestAccepted {
        id: String,
        supervisor_id: String,
    },
    RequestRejected {
        id: String,
    },
    RequestWithdrawn {
        id: String,
        previous: RequestState,
        released: bool,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &MatchEvent);
}

/// Event bus for broadcasting match events
pub struct EventBus {
    sender: broadcast::Sender<MatchEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: MatchEvent) {
        trace!(event = ?event, "Emitting match event");
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MatchEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logging event listener for audit trails
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &MatchEvent) {
        match event {
            MatchEvent::RequestAccepted { id, supervisor_id } => {
                info!(request_id = %id, supervisor_id = %supervisor_id, "Request accepted");
            }
            MatchEvent::RequestWithdrawn { id, previous, released } => {
                info!(request_id = %id, previous = %previous, released, "Request withdrawn");
            }
            MatchEvent::CapacityChanged {
                supervisor_id,
                available_spots,
                total_spots,
                delta,
            } => {
                debug!(
                    supervisor_id = %supervisor_id,
                    available = available_spots,
                    total = total_spots,
                    delta,
                    "Capacity changed"
                );
            }
            MatchEvent::TagGraphReplaced { tag_count, similarity_count } => {
                info!(tags = tag_count, similarities = similarity_count, "Tag graph replaced");
            }
            _ => {
                trace!(event = ?event, "Match event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
