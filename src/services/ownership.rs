//! Owner service and ownership propagation
//!
//! Owners (organizations and users) carry an active flag that cascades
//! to the collections they own. Every successful owner save hands an
//! [`EntitySaved`] value to the propagation handler, which flips
//! mismatched dependents to the owner's status. Creates are skipped;
//! a new owner has no dependents yet.

use std::sync::Arc;

use dashmap::DashMap;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::collections;
use crate::db::owners::{self, CreateOwnerInput, OwnerRow, OWNER_KIND_ORGANIZATION, OWNER_KIND_USER};
use crate::db::VocabDb;
use crate::error::StoreError;

use super::events::{EventBus, StoreEvent};

/// A completed owner save, handed to ownership propagation
#[derive(Debug, Clone)]
pub struct EntitySaved {
    pub kind: String,
    pub id: String,
    pub is_active: bool,
    pub created: bool,
}

/// Cascades an owner's active flag to its collections
pub struct OwnershipPropagation {
    vocab_db: Arc<VocabDb>,

    /// Owner ids currently being propagated, to break save cycles
    in_flight: DashMap<String, ()>,
}

impl OwnershipPropagation {
    pub fn new(vocab_db: Arc<VocabDb>) -> Self {
        Self {
            vocab_db,
            in_flight: DashMap::new(),
        }
    }

    /// Handle a completed owner save in its own transaction.
    ///
    /// Creates take no action. For updates, every owned collection whose
    /// active flag differs from the owner's is flipped to match; matching
    /// collections are left alone, so re-running is a no-op. Returns the
    /// number of collections that changed.
    pub fn propagate(&self, saved: &EntitySaved) -> Result<usize, StoreError> {
        if saved.created {
            return Ok(0);
        }

        if self.in_flight.insert(saved.id.clone(), ()).is_some() {
            debug!(owner = %saved.id, "Propagation already in flight, skipping");
            return Ok(0);
        }

        let result = self.vocab_db.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| StoreError::Internal(format!("Transaction failed: {}", e)))?;

            let affected = apply_status(&tx, saved)?;

            tx.commit()
                .map_err(|e| StoreError::Internal(format!("Commit failed: {}", e)))?;

            Ok(affected)
        });
        self.in_flight.remove(&saved.id);

        if let Ok(affected) = &result {
            log_propagated(saved, *affected);
        }

        result
    }

    /// Handle a completed owner save on the caller's open transaction,
    /// so the cascade commits or rolls back together with the save
    /// that triggered it.
    pub fn propagate_within(&self, conn: &Connection, saved: &EntitySaved) -> Result<usize, StoreError> {
        if saved.created {
            return Ok(0);
        }

        if self.in_flight.insert(saved.id.clone(), ()).is_some() {
            debug!(owner = %saved.id, "Propagation already in flight, skipping");
            return Ok(0);
        }

        let result = apply_status(conn, saved);
        self.in_flight.remove(&saved.id);

        if let Ok(affected) = &result {
            log_propagated(saved, *affected);
        }

        result
    }
}

fn apply_status(conn: &Connection, saved: &EntitySaved) -> Result<usize, StoreError> {
    let dependents = collections::list_by_owner(conn, &saved.kind, &saved.id)?;

    let mut affected = 0;
    for collection in dependents {
        if collection.is_active != saved.is_active {
            collections::set_active(conn, &collection.id, saved.is_active)?;
            affected += 1;
        }
    }

    Ok(affected)
}

fn log_propagated(saved: &EntitySaved, affected: usize) {
    if affected > 0 {
        info!(
            owner = %saved.id,
            active = saved.is_active,
            affected = affected,
            "Owner status propagated to collections"
        );
    }
}

/// Owner service for business logic
pub struct OwnerService {
    vocab_db: Arc<VocabDb>,
    events: Arc<EventBus>,
    propagation: OwnershipPropagation,
}

impl OwnerService {
    /// Create a new owner service
    pub fn new(vocab_db: Arc<VocabDb>, events: Arc<EventBus>) -> Self {
        let propagation = OwnershipPropagation::new(vocab_db.clone());
        Self { vocab_db, events, propagation }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get owner by ID
    pub fn get(&self, id: &str) -> Result<Option<OwnerRow>, StoreError> {
        self.vocab_db.with_conn(|conn| owners::get_owner(conn, id))
    }

    /// List owners with pagination
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<OwnerRow>, StoreError> {
        self.vocab_db.with_conn(|conn| owners::list_owners(conn, limit, offset))
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create an owner
    pub fn create(&self, input: CreateOwnerInput) -> Result<OwnerRow, StoreError> {
        self.validate_owner(&input)?;

        let owner = self.vocab_db.with_conn_mut(|conn| owners::create_owner(conn, input))?;

        // Every save is handed to propagation; creates are a no-op there
        self.propagation.propagate(&EntitySaved {
            kind: owner.kind.clone(),
            id: owner.id.clone(),
            is_active: owner.is_active,
            created: true,
        })?;

        info!(id = %owner.id, kind = %owner.kind, mnemonic = %owner.mnemonic, "Owner created");
        self.events.emit(StoreEvent::OwnerSaved {
            id: owner.id.clone(),
            kind: owner.kind.clone(),
            created: true,
        });

        Ok(owner)
    }

    /// Soft delete an owner, cascading to its collections.
    /// Returns the number of collections that changed.
    pub fn soft_delete(&self, id: &str) -> Result<usize, StoreError> {
        self.save_active(id, false)
    }

    /// Reactivate an owner, cascading to its collections.
    /// Returns the number of collections that changed.
    pub fn undelete(&self, id: &str) -> Result<usize, StoreError> {
        self.save_active(id, true)
    }

    /// Flip the owner's active flag and cascade to its collections.
    /// The flag change and the cascade share one transaction, so a
    /// failure rolls back both.
    fn save_active(&self, id: &str, active: bool) -> Result<usize, StoreError> {
        let (owner, changed, affected) = self.vocab_db.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| StoreError::Internal(format!("Transaction failed: {}", e)))?;

            let owner = owners::get_owner(&tx, id)?
                .ok_or_else(|| StoreError::NotFound(format!("Owner not found: {}", id)))?;
            let changed = owners::set_active(&tx, id, active)?;

            let affected = if changed {
                self.propagation.propagate_within(&tx, &EntitySaved {
                    kind: owner.kind.clone(),
                    id: owner.id.clone(),
                    is_active: active,
                    created: false,
                })?
            } else {
                0
            };

            tx.commit()
                .map_err(|e| StoreError::Internal(format!("Commit failed: {}", e)))?;

            Ok((owner, changed, affected))
        })?;

        if !changed {
            return Ok(0);
        }

        self.events.emit(StoreEvent::OwnerSaved {
            id: owner.id.clone(),
            kind: owner.kind,
            created: false,
        });
        self.events.emit(StoreEvent::OwnershipPropagated {
            owner_id: owner.id,
            affected,
        });

        Ok(affected)
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate owner input
    fn validate_owner(&self, input: &CreateOwnerInput) -> Result<(), StoreError> {
        if input.mnemonic.is_empty() {
            return Err(StoreError::InvalidArgument("mnemonic is required".into()));
        }

        let valid_kinds = [OWNER_KIND_ORGANIZATION, OWNER_KIND_USER];
        if !valid_kinds.contains(&input.kind.as_str()) {
            return Err(StoreError::InvalidArgument(format!(
                "owner kind '{}' is not valid. Valid kinds: {:?}",
                input.kind, valid_kinds
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::collections::CreateCollectionInput;

    fn setup() -> (OwnerService, Arc<VocabDb>, Arc<EventBus>) {
        let db = Arc::new(VocabDb::open_in_memory().expect("Failed to open db"));
        let events = Arc::new(EventBus::new());
        let service = OwnerService::new(db.clone(), events.clone());
        (service, db, events)
    }

    fn seed_collection(db: &VocabDb, owner_id: &str, mnemonic: &str) -> String {
        db.with_conn(|conn| {
            collections::create_collection(conn, CreateCollectionInput {
                id: None,
                mnemonic: mnemonic.to_string(),
                name: format!("{} collection", mnemonic),
                full_name: None,
                collection_type: None,
                public_access: "View".to_string(),
                default_locale: "en".to_string(),
                supported_locales: vec![],
                website: None,
                description: None,
                external_id: None,
                owner_kind: "organization".to_string(),
                owner_id: owner_id.to_string(),
                created_by: None,
            })
        }).unwrap().id
    }

    fn org_input(mnemonic: &str) -> CreateOwnerInput {
        CreateOwnerInput {
            id: None,
            kind: "organization".to_string(),
            mnemonic: mnemonic.to_string(),
            name: None,
        }
    }

    #[test]
    fn test_create_owner_emits_event() {
        let (service, _db, events) = setup();
        let mut receiver = events.subscribe();

        let owner = service.create(org_input("who")).unwrap();
        assert!(owner.is_active);

        match receiver.try_recv().unwrap() {
            StoreEvent::OwnerSaved { id, kind, created } => {
                assert_eq!(id, owner.id);
                assert_eq!(kind, "organization");
                assert!(created);
            }
            other => panic!("Expected OwnerSaved, got {:?}", other),
        }
    }

    #[test]
    fn test_create_owner_validates_input() {
        let (service, _db, _events) = setup();

        let empty = service.create(org_input(""));
        assert!(matches!(empty, Err(StoreError::InvalidArgument(_))));

        let mut input = org_input("who");
        input.kind = "team".to_string();
        assert!(matches!(service.create(input), Err(StoreError::InvalidArgument(_))));
    }

    #[test]
    fn test_soft_delete_cascades_to_mismatched_collections() {
        let (service, db, _events) = setup();
        let owner = service.create(org_input("who")).unwrap();
        let active_col = seed_collection(&db, &owner.id, "a");
        let inactive_col = seed_collection(&db, &owner.id, "b");

        // One dependent already carries the target status
        db.with_conn(|conn| collections::set_active(conn, &inactive_col, false).map(|_| ()))
            .unwrap();

        let affected = service.soft_delete(&owner.id).unwrap();
        assert_eq!(affected, 1);

        // Both dependents end at the owner's status
        db.with_conn(|conn| {
            assert!(!collections::get_collection(conn, &active_col)?.unwrap().is_active);
            assert!(!collections::get_collection(conn, &inactive_col)?.unwrap().is_active);
            Ok(())
        }).unwrap();
        assert!(!service.get(&owner.id).unwrap().unwrap().is_active);
    }

    #[test]
    fn test_second_identical_save_is_noop() {
        let (service, db, events) = setup();
        let owner = service.create(org_input("who")).unwrap();
        seed_collection(&db, &owner.id, "a");

        assert_eq!(service.soft_delete(&owner.id).unwrap(), 1);

        let mut receiver = events.subscribe();
        assert_eq!(service.soft_delete(&owner.id).unwrap(), 0);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_undelete_restores_collections() {
        let (service, db, events) = setup();
        let owner = service.create(org_input("who")).unwrap();
        let col = seed_collection(&db, &owner.id, "a");

        service.soft_delete(&owner.id).unwrap();

        let mut receiver = events.subscribe();
        assert_eq!(service.undelete(&owner.id).unwrap(), 1);

        db.with_conn(|conn| {
            assert!(collections::get_collection(conn, &col)?.unwrap().is_active);
            Ok(())
        }).unwrap();

        match receiver.try_recv().unwrap() {
            StoreEvent::OwnerSaved { created, .. } => assert!(!created),
            other => panic!("Expected OwnerSaved, got {:?}", other),
        }
        match receiver.try_recv().unwrap() {
            StoreEvent::OwnershipPropagated { owner_id, affected } => {
                assert_eq!(owner_id, owner.id);
                assert_eq!(affected, 1);
            }
            other => panic!("Expected OwnershipPropagated, got {:?}", other),
        }
    }

    #[test]
    fn test_propagation_skips_creates() {
        let (service, db, _events) = setup();
        let owner = service.create(org_input("who")).unwrap();
        let col = seed_collection(&db, &owner.id, "a");

        // Mark the owner inactive behind the service's back so the
        // dependent is mismatched
        db.with_conn(|conn| owners::set_active(conn, &owner.id, false).map(|_| ()))
            .unwrap();

        let propagation = OwnershipPropagation::new(db.clone());
        let saved = EntitySaved {
            kind: owner.kind.clone(),
            id: owner.id.clone(),
            is_active: false,
            created: true,
        };
        assert_eq!(propagation.propagate(&saved).unwrap(), 0);
        db.with_conn(|conn| {
            assert!(collections::get_collection(conn, &col)?.unwrap().is_active);
            Ok(())
        }).unwrap();

        // The same save as an update does cascade
        let update = EntitySaved { created: false, ..saved };
        assert_eq!(propagation.propagate(&update).unwrap(), 1);
    }

    #[test]
    fn test_cascade_rolls_back_with_the_save() {
        let (service, db, _events) = setup();
        let owner = service.create(org_input("who")).unwrap();
        let col = seed_collection(&db, &owner.id, "a");

        let propagation = OwnershipPropagation::new(db.clone());

        // Flip the owner and cascade on one transaction, then roll back
        db.with_conn_mut(|conn| {
            let tx = conn.transaction()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            owners::set_active(&tx, &owner.id, false)?;
            let saved = EntitySaved {
                kind: owner.kind.clone(),
                id: owner.id.clone(),
                is_active: false,
                created: false,
            };
            assert_eq!(propagation.propagate_within(&tx, &saved)?, 1);
            tx.rollback()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            Ok(())
        }).unwrap();

        // Neither the owner flip nor the cascade survived; the caller
        // never sees the owner flipped with its collections left behind
        db.with_conn(|conn| {
            assert!(owners::get_owner(conn, &owner.id)?.unwrap().is_active);
            assert!(collections::get_collection(conn, &col)?.unwrap().is_active);
            Ok(())
        }).unwrap();

        // The committed path lands both together
        assert_eq!(service.soft_delete(&owner.id).unwrap(), 1);
        db.with_conn(|conn| {
            assert!(!owners::get_owner(conn, &owner.id)?.unwrap().is_active);
            assert!(!collections::get_collection(conn, &col)?.unwrap().is_active);
            Ok(())
        }).unwrap();
    }

    #[test]
    fn test_propagation_skips_in_flight_owner() {
        let (service, db, _events) = setup();
        let owner = service.create(org_input("who")).unwrap();
        seed_collection(&db, &owner.id, "a");

        let propagation = OwnershipPropagation::new(db.clone());
        let saved = EntitySaved {
            kind: owner.kind.clone(),
            id: owner.id.clone(),
            is_active: false,
            created: false,
        };

        propagation.in_flight.insert(owner.id.clone(), ());
        assert_eq!(propagation.propagate(&saved).unwrap(), 0);

        propagation.in_flight.remove(&owner.id);
        assert_eq!(propagation.propagate(&saved).unwrap(), 1);
    }
}
