//! Service layer for glossa-storage
//!
//! Services encapsulate business logic between library consumers and
//! repositories. Each service wraps database operations with:
//! - Input validation
//! - Cross-entity orchestration
//! - Event emission for audit/notifications
//! - Transaction boundaries
//!
//! ## Architecture
//!
//! ```text
//! Library Consumers (API layer, importers)
//!     ↓
//! Service Layer (business logic)
//!     ↓
//! Repository Layer (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod collection_service;
pub mod ownership;

// Re-exports
pub use events::{EventBus, StoreEvent, EventListener};
pub use collection_service::{CollectionService, CollectionStats};
pub use ownership::{EntitySaved, OwnerService, OwnershipPropagation};

use std::sync::Arc;

use crate::config::Config;
use crate::db::VocabDb;
use crate::error::StoreError;

/// Service container for dependency injection
///
/// Holds all services with shared database connection.
pub struct Services {
    pub collections: Arc<CollectionService>,
    pub owners: Arc<OwnerService>,
    pub events: Arc<EventBus>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(vocab_db: Arc<VocabDb>) -> Self {
        Self::with_event_capacity(vocab_db, 1024)
    }

    /// Create all services with a bounded event channel
    pub fn with_event_capacity(vocab_db: Arc<VocabDb>, capacity: usize) -> Self {
        Self::with_events(vocab_db, Arc::new(EventBus::with_capacity(capacity)))
    }

    /// Create all services around an existing event bus
    pub fn with_events(vocab_db: Arc<VocabDb>, events: Arc<EventBus>) -> Self {
        Self {
            collections: Arc::new(CollectionService::new(vocab_db.clone(), events.clone())),
            owners: Arc::new(OwnerService::new(vocab_db.clone(), events.clone())),
            events,
        }
    }

    /// Open the configured database and create all services around it
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        let vocab_db = Arc::new(VocabDb::open(&config.db_path())?);
        let events = if config.enable_events {
            Arc::new(EventBus::with_capacity(config.event_channel_capacity))
        } else {
            Arc::new(EventBus::disabled())
        };
        Ok(Self::with_events(vocab_db, events))
    }
}
