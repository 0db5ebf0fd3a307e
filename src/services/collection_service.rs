//! Collection service - business logic for collection operations
//!
//! Wraps the collection and version repositories with validation,
//! transaction boundaries, and event emission. Mutations are
//! all-or-nothing: a failure at any step rolls the whole change back,
//! and events fire only after a successful commit.

use std::sync::Arc;

use tracing::info;

use crate::db::collections::{self, CollectionRow, CreateCollectionInput};
use crate::db::owners;
use crate::db::references::{self, CollectionReference};
use crate::db::versions::{self, CollectionVersionRow, VersionChanges, HEAD, INITIAL};
use crate::db::VocabDb;
use crate::error::StoreError;

use super::events::{EventBus, StoreEvent};

/// Collection service for business logic
pub struct CollectionService {
    vocab_db: Arc<VocabDb>,
    events: Arc<EventBus>,
}

impl CollectionService {
    /// Create a new collection service
    pub fn new(vocab_db: Arc<VocabDb>, events: Arc<EventBus>) -> Self {
        Self { vocab_db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get collection by ID
    pub fn get(&self, id: &str) -> Result<Option<CollectionRow>, StoreError> {
        self.vocab_db.with_conn(|conn| collections::get_collection(conn, id))
    }

    /// List collections with pagination
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<CollectionRow>, StoreError> {
        self.vocab_db.with_conn(|conn| collections::list_collections(conn, limit, offset))
    }

    /// List collections belonging to an owner
    pub fn list_by_owner(&self, owner_kind: &str, owner_id: &str) -> Result<Vec<CollectionRow>, StoreError> {
        self.vocab_db.with_conn(|conn| collections::list_by_owner(conn, owner_kind, owner_id))
    }

    /// Get the HEAD version of a collection
    pub fn get_head(&self, collection_id: &str) -> Result<CollectionVersionRow, StoreError> {
        self.vocab_db.with_conn(|conn| versions::get_head(conn, collection_id))
    }

    /// Get a collection's version by label
    pub fn get_version(&self, collection_id: &str, label: &str) -> Result<Option<CollectionVersionRow>, StoreError> {
        self.vocab_db.with_conn(|conn| versions::get_version_by_label(conn, collection_id, label))
    }

    /// List a collection's versions, newest first
    pub fn list_versions(&self, collection_id: &str) -> Result<Vec<CollectionVersionRow>, StoreError> {
        self.vocab_db.with_conn(|conn| versions::list_versions(conn, collection_id))
    }

    /// Get the HEAD version sharing a version's collection, for
    /// comparing a historical snapshot against the current state
    pub fn head_sibling(&self, version: &CollectionVersionRow) -> Result<CollectionVersionRow, StoreError> {
        self.vocab_db.with_conn(|conn| versions::head_sibling(conn, version))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a collection together with its first version.
    ///
    /// The first version carries the INITIAL label, which is stored as
    /// HEAD. Collection row and version land in one transaction.
    pub fn create(&self, input: CreateCollectionInput) -> Result<CollectionRow, StoreError> {
        self.validate_collection(&input)?;

        let owner_kind = input.owner_kind.clone();
        let owner_id = input.owner_id.clone();

        let (collection, head) = self.vocab_db.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| StoreError::Internal(format!("Transaction failed: {}", e)))?;

            let owner = owners::get_owner(&tx, &owner_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Owner not found: {}", owner_id)))?;
            if owner.kind != owner_kind {
                return Err(StoreError::NotFound(format!(
                    "Owner not found: {} of kind {}", owner_id, owner_kind
                )));
            }

            let collection = collections::create_collection(&tx, input)?;
            let initial = CollectionVersionRow::for_collection(&collection, INITIAL, None, None, false)?;
            let head = versions::create_version(&tx, &initial)?;

            tx.commit()
                .map_err(|e| StoreError::Internal(format!("Commit failed: {}", e)))?;

            Ok((collection, head))
        })?;

        info!(id = %collection.id, mnemonic = %collection.mnemonic, "Collection created");
        self.events.emit(StoreEvent::CollectionCreated {
            id: collection.id.clone(),
            mnemonic: collection.mnemonic.clone(),
            owner_id: collection.owner_id.clone(),
        });
        self.events.emit(StoreEvent::VersionCreated {
            id: head.id,
            collection_id: collection.id.clone(),
            label: head.mnemonic,
            released: head.released,
        });

        Ok(collection)
    }

    /// Add a reference expression to a collection.
    ///
    /// Resolves the expression, rejects duplicates, appends the
    /// resolved reference to the collection and folds it into the HEAD
    /// version. Runs as one transaction; nothing changes on failure.
    pub fn add_reference(
        &self,
        collection_id: &str,
        expression: &str,
        updated_by: Option<&str>,
    ) -> Result<CollectionReference, StoreError> {
        if expression.is_empty() {
            return Err(StoreError::InvalidExpression {
                expression: String::new(),
            });
        }

        let updated_by_owned = updated_by.map(|s| s.to_string());

        let reference = self.vocab_db.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| StoreError::Internal(format!("Transaction failed: {}", e)))?;

            let collection = collections::get_collection(&tx, collection_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Collection not found: {}", collection_id)))?;

            // Resolution comes before the duplicate check
            let reference = references::resolve_expression(&tx, expression)?;

            if collection.has_reference(expression)? {
                return Err(StoreError::DuplicateReference {
                    expression: expression.to_string(),
                });
            }

            let mut collection_refs = collection.references()?;
            collection_refs.push(reference.clone());
            collections::set_references(&tx, &collection.id, &collection_refs, updated_by_owned.as_deref())?;

            let mut head = versions::get_head(&tx, &collection.id)?;
            versions::persist_changes(&tx, &mut head, VersionChanges {
                updated_by: updated_by_owned.clone(),
                reference: Some(reference.clone()),
                ..Default::default()
            })?;

            tx.commit()
                .map_err(|e| StoreError::Internal(format!("Commit failed: {}", e)))?;

            Ok(reference)
        })?;

        info!(
            collection = %collection_id,
            expression = %expression,
            concepts = reference.concept_ids.len(),
            mappings = reference.mapping_ids.len(),
            "Reference added"
        );
        self.events.emit(StoreEvent::ReferenceAdded {
            collection_id: collection_id.to_string(),
            expression: expression.to_string(),
            concept_count: reference.concept_ids.len(),
            mapping_count: reference.mapping_ids.len(),
        });
        self.events.emit(StoreEvent::CollectionUpdated {
            id: collection_id.to_string(),
        });

        Ok(reference)
    }

    /// Cut a new labeled version seeded from the current HEAD.
    ///
    /// The cumulative concept and mapping id lists are copied from
    /// HEAD; the accumulated reference list starts empty in the new
    /// version. Labels are unique per collection.
    pub fn create_version(
        &self,
        collection_id: &str,
        label: &str,
        released: bool,
    ) -> Result<CollectionVersionRow, StoreError> {
        if label.is_empty() {
            return Err(StoreError::InvalidArgument("version label is required".to_string()));
        }

        let label_owned = label.to_string();

        let version = self.vocab_db.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| StoreError::Internal(format!("Transaction failed: {}", e)))?;

            let collection = collections::get_collection(&tx, collection_id)?
                .ok_or_else(|| StoreError::NotFound(format!("Collection not found: {}", collection_id)))?;

            let normalized = if label_owned == INITIAL { HEAD } else { label_owned.as_str() };
            if versions::get_version_by_label(&tx, &collection.id, normalized)?.is_some() {
                return Err(StoreError::InvalidArgument("Version label already exists.".to_string()));
            }

            let head = versions::get_head(&tx, &collection.id)?;

            let mut version = CollectionVersionRow::for_collection(
                &collection,
                &label_owned,
                Some(head.id.clone()),
                None,
                released,
            )?;
            version.seed_concepts(Some(&head));
            version.seed_mappings(Some(&head));

            let created = versions::create_version(&tx, &version)?;

            tx.commit()
                .map_err(|e| StoreError::Internal(format!("Commit failed: {}", e)))?;

            Ok(created)
        })?;

        info!(
            collection = %collection_id,
            label = %version.mnemonic,
            released = version.released,
            "Version created"
        );
        self.events.emit(StoreEvent::VersionCreated {
            id: version.id.clone(),
            collection_id: collection_id.to_string(),
            label: version.mnemonic.clone(),
            released: version.released,
        });

        Ok(version)
    }

    /// Soft delete a collection. Returns true if the flag changed.
    pub fn soft_delete(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self.vocab_db.with_conn_mut(|conn| {
            collections::set_active(conn, id, false)
        })?;

        if changed {
            self.events.emit(StoreEvent::CollectionSoftDeleted { id: id.to_string() });
        }

        Ok(changed)
    }

    /// Reactivate a soft deleted collection. Returns true if the flag changed.
    pub fn undelete(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self.vocab_db.with_conn_mut(|conn| {
            collections::set_active(conn, id, true)
        })?;

        if changed {
            self.events.emit(StoreEvent::CollectionUndeleted { id: id.to_string() });
        }

        Ok(changed)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate collection input
    fn validate_collection(&self, input: &CreateCollectionInput) -> Result<(), StoreError> {
        if input.mnemonic.is_empty() {
            return Err(StoreError::InvalidArgument("mnemonic is required".into()));
        }

        if input.mnemonic.len() > 255 {
            return Err(StoreError::InvalidArgument("mnemonic must be <= 255 characters".into()));
        }

        if input.name.is_empty() {
            return Err(StoreError::InvalidArgument("name is required".into()));
        }

        let valid_owner_kinds = [owners::OWNER_KIND_ORGANIZATION, owners::OWNER_KIND_USER];
        if !valid_owner_kinds.contains(&input.owner_kind.as_str()) {
            return Err(StoreError::InvalidArgument(format!(
                "owner_kind '{}' is not valid. Valid kinds: {:?}",
                input.owner_kind, valid_owner_kinds
            )));
        }

        if input.owner_id.is_empty() {
            return Err(StoreError::InvalidArgument("owner_id is required".into()));
        }

        Ok(())
    }

    // =========================================================================
    // Stats
    // =========================================================================

    /// Get collection statistics
    pub fn get_stats(&self) -> Result<CollectionStats, StoreError> {
        self.vocab_db.with_conn(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            let total_versions: i64 = conn
                .query_row("SELECT COUNT(*) FROM collection_versions", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            let released_versions: i64 = conn
                .query_row("SELECT COUNT(*) FROM collection_versions WHERE released = 1", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            Ok(CollectionStats {
                total_collections: total as u64,
                total_versions: total_versions as u64,
                released_versions: released_versions as u64,
            })
        })
    }
}

/// Collection statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct CollectionStats {
    pub total_collections: u64,
    pub total_versions: u64,
    pub released_versions: u64,
}
