//! Glossa Storage - versioned collection storage for terminology services
//!
//! Stores Collections (curated groupings of concept and mapping
//! references) together with an immutable version history. Each accepted
//! reference amends the collection's mutable HEAD version; labeled
//! versions are cut from HEAD and never change afterward.
//!
//! ## Architecture
//!
//! - **Registries**: concepts, mappings and owners, plain uri-addressable tables
//! - **Resolver**: classifies a reference expression against the registries
//!   (concepts first, mappings only when no concept matched)
//! - **Version chain**: one mutable HEAD per collection plus immutable
//!   labeled snapshots carrying cumulative concept/mapping id lists
//! - **Services**: validation, transaction boundaries, ownership
//!   propagation and event emission
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/glossa-storage/
//! ├── vocab.db               # SQLite database (WAL mode)
//! └── config.toml            # Configuration
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod services;

// Re-exports
pub use config::Config;
pub use db::{
    CollectionReference, CollectionRow, CollectionVersionRow, ConceptRow, MappingRow, OwnerRow,
    VocabDb,
};
pub use error::StoreError;
pub use services::{
    CollectionService, EntitySaved, EventBus, EventListener, OwnerService, Services, StoreEvent,
};
