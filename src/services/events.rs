//! Event system for store operations
//!
//! Provides an event bus for notifying listeners about store operations.
//! Useful for:
//! - Audit logging
//! - Cache invalidation
//! - Real-time notifications

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Store events emitted by services
#[derive(Debug, Clone)]
pub enum StoreEvent {
    // Collection events
    CollectionCreated {
        id: String,
        mnemonic: String,
        owner_id: String,
    },
    CollectionUpdated {
        id: String,
    },
    ReferenceAdded {
        collection_id: String,
        expression: String,
        concept_count: usize,
        mapping_count: usize,
    },
    CollectionSoftDeleted {
        id: String,
    },
    CollectionUndeleted {
        id: String,
    },

    // Version events
    VersionCreated {
        id: String,
        collection_id: String,
        label: String,
        released: bool,
    },

    // Owner events
    OwnerSaved {
        id: String,
        kind: String,
        created: bool,
    },
    OwnershipPropagated {
        owner_id: String,
        affected: usize,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &StoreEvent);
}

/// Event bus for broadcasting store events
pub struct EventBus {
    sender: broadcast::Sender<StoreEvent>,
    enabled: bool,
}

impl EventBus {
    /// Create a new event bus with default capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a new event bus with specified capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, enabled: true }
    }

    /// Create a bus that silently drops all events
    pub fn disabled() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender, enabled: false }
    }

    /// Whether emitted events reach subscribers
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: StoreEvent) {
        if !self.enabled {
            return;
        }
        trace!(event = ?event, "Emitting store event");
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
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
    fn on_event(&self, event: &StoreEvent) {
        match event {
            StoreEvent::CollectionCreated { id, mnemonic, .. } => {
                debug!(id = %id, mnemonic = %mnemonic, "Collection created");
            }
            StoreEvent::ReferenceAdded { collection_id, expression, .. } => {
                debug!(collection = %collection_id, expression = %expression, "Reference added");
            }
            StoreEvent::VersionCreated { collection_id, label, released, .. } => {
                debug!(
                    collection = %collection_id,
                    label = %label,
                    released = released,
                    "Version created"
                );
            }
            StoreEvent::OwnershipPropagated { owner_id, affected } => {
                debug!(owner = %owner_id, affected = affected, "Ownership propagated");
            }
            _ => {
                trace!(event = ?event, "Store event");
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

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.emit(StoreEvent::ReferenceAdded {
            collection_id: "col-1".into(),
            expression: "/concepts/123/".into(),
            concept_count: 1,
            mapping_count: 0,
        });

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("receive error");

        match event {
            StoreEvent::ReferenceAdded { collection_id, expression, concept_count, .. } => {
                assert_eq!(collection_id, "col-1");
                assert_eq!(expression, "/concepts/123/");
                assert_eq!(concept_count, 1);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_bus_no_subscribers() {
        let bus = EventBus::new();
        // Should not panic even with no subscribers
        bus.emit(StoreEvent::CollectionUpdated {
            id: "test".into(),
        });
    }

    #[test]
    fn test_disabled_bus_drops_events() {
        let bus = EventBus::disabled();
        assert!(!bus.is_enabled());

        let mut receiver = bus.subscribe();
        bus.emit(StoreEvent::CollectionUpdated { id: "test".into() });
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_logging_listener_stops_when_bus_drops() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("glossa_storage=trace")
            .try_init();

        let bus = Arc::new(EventBus::new());
        let handle = spawn_logging_listener(bus.clone());

        bus.emit(StoreEvent::CollectionUpdated { id: "c1".into() });

        // Dropping the bus closes the channel and the listener exits
        drop(bus);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener did not stop")
            .expect("listener task panicked");
    }
}
