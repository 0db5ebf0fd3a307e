//! Integration tests for the collection lifecycle
//!
//! These tests drive the public service API end-to-end: owners,
//! vocabulary registries, reference resolution, the HEAD version chain
//! and ownership propagation, against a real SQLite database.

use glossa_storage::db::collections::CreateCollectionInput;
use glossa_storage::db::concepts::{self, CreateConceptInput};
use glossa_storage::db::mappings::{self, CreateMappingInput};
use glossa_storage::db::owners::CreateOwnerInput;
use glossa_storage::{Services, StoreError, VocabDb};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to create services over an on-disk database
fn create_services() -> (Services, Arc<VocabDb>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let db = Arc::new(VocabDb::open(&temp_dir.path().join("vocab.db")).unwrap());
    (Services::new(db.clone()), db, temp_dir)
}

fn seed_owner(services: &Services, mnemonic: &str) -> String {
    services
        .owners
        .create(CreateOwnerInput {
            id: None,
            kind: "organization".to_string(),
            mnemonic: mnemonic.to_string(),
            name: None,
        })
        .unwrap()
        .id
}

fn seed_collection(services: &Services, owner_id: &str, mnemonic: &str) -> String {
    services
        .collections
        .create(CreateCollectionInput {
            id: None,
            mnemonic: mnemonic.to_string(),
            name: format!("{} collection", mnemonic),
            full_name: None,
            collection_type: Some("Dictionary".to_string()),
            public_access: "View".to_string(),
            default_locale: "en".to_string(),
            supported_locales: vec!["en".to_string()],
            website: None,
            description: None,
            external_id: None,
            owner_kind: "organization".to_string(),
            owner_id: owner_id.to_string(),
            created_by: Some("admin".to_string()),
        })
        .unwrap()
        .id
}

fn seed_concept(db: &VocabDb, uri: &str) -> String {
    db.with_conn(|conn| {
        concepts::create_concept(
            conn,
            CreateConceptInput {
                id: None,
                uri: uri.to_string(),
                mnemonic: uri.trim_matches('/').to_string(),
                concept_class: "Diagnosis".to_string(),
                datatype: None,
                display_name: None,
                display_locale: None,
            },
        )
    })
    .unwrap()
    .id
}

/// Test the full reference/version scenario: duplicates rejected,
/// valid expressions fold into HEAD one at a time
#[test]
fn test_reference_scenario() {
    let (services, db, _temp) = create_services();

    let owner_id = seed_owner(&services, "who");
    let collection_id = seed_collection(&services, &owner_id, "demo");
    let concept_a = seed_concept(&db, "/concepts/123/");
    let concept_b = seed_concept(&db, "/concepts/456/");

    services
        .collections
        .add_reference(&collection_id, "/concepts/123/", None)
        .unwrap();

    // Re-adding the same expression is rejected and changes nothing
    let duplicate = services
        .collections
        .add_reference(&collection_id, "/concepts/123/", None);
    match duplicate {
        Err(StoreError::DuplicateReference { expression }) => {
            assert_eq!(expression, "/concepts/123/");
        }
        other => panic!("Expected DuplicateReference, got {:?}", other),
    }

    // A fresh expression gains exactly one concept id and one reference
    services
        .collections
        .add_reference(&collection_id, "/concepts/456/", None)
        .unwrap();

    let head = services.collections.get_head(&collection_id).unwrap();
    assert_eq!(head.concept_ids().unwrap(), vec![concept_a, concept_b]);
    assert_eq!(head.references().unwrap().len(), 2);

    let collection = services.collections.get(&collection_id).unwrap().unwrap();
    assert_eq!(collection.references().unwrap().len(), 2);
}

/// Test that a released version is a frozen snapshot while HEAD moves on
#[test]
fn test_released_version_is_immutable_snapshot() {
    let (services, db, _temp) = create_services();

    let owner_id = seed_owner(&services, "who");
    let collection_id = seed_collection(&services, &owner_id, "demo");
    let concept_a = seed_concept(&db, "/concepts/123/");
    seed_concept(&db, "/concepts/456/");

    services
        .collections
        .add_reference(&collection_id, "/concepts/123/", Some("editor"))
        .unwrap();

    let release = services
        .collections
        .create_version(&collection_id, "v1.0", true)
        .unwrap();
    assert!(release.released);
    assert_eq!(release.concept_ids().unwrap(), vec![concept_a.clone()]);
    assert!(release.references().unwrap().is_empty());

    services
        .collections
        .add_reference(&collection_id, "/concepts/456/", Some("editor"))
        .unwrap();

    let frozen = services
        .collections
        .get_version(&collection_id, "v1.0")
        .unwrap()
        .unwrap();
    assert_eq!(frozen.concept_ids().unwrap(), vec![concept_a]);

    let head = services.collections.head_sibling(&frozen).unwrap();
    assert_eq!(head.concept_ids().unwrap().len(), 2);
    assert_eq!(services.collections.list_versions(&collection_id).unwrap().len(), 2);
}

/// Test mapping resolution through the public API
#[test]
fn test_mapping_expressions_resolve_when_no_concept_matches() {
    let (services, db, _temp) = create_services();

    let owner_id = seed_owner(&services, "who");
    let collection_id = seed_collection(&services, &owner_id, "demo");

    let mapping_id = db
        .with_conn(|conn| {
            mappings::create_mapping(
                conn,
                CreateMappingInput {
                    id: None,
                    uri: "/mappings/m1/".to_string(),
                    map_type: "SAME-AS".to_string(),
                    from_concept_uri: "/concepts/123/".to_string(),
                    to_concept_uri: Some("/concepts/456/".to_string()),
                    to_concept_code: None,
                },
            )
        })
        .unwrap()
        .id;

    let reference = services
        .collections
        .add_reference(&collection_id, "/mappings/m1/", None)
        .unwrap();
    assert!(reference.concept_ids.is_empty());
    assert_eq!(reference.mapping_ids, vec![mapping_id.clone()]);

    let head = services.collections.get_head(&collection_id).unwrap();
    assert_eq!(head.mapping_ids().unwrap(), vec![mapping_id]);

    // An unresolvable expression surfaces as a field-level error
    let err = services
        .collections
        .add_reference(&collection_id, "/nothing/here/", None)
        .unwrap_err();
    assert_eq!(err.field(), Some("detail"));
    assert_eq!(err.to_string(), "Expression specified is not valid.");
}

/// Test that soft deleting an owner cascades to its collections and
/// that an identical repeat save touches nothing
#[test]
fn test_owner_status_cascades_to_collections() {
    let (services, _db, _temp) = create_services();

    let owner_id = seed_owner(&services, "who");
    let matching = seed_collection(&services, &owner_id, "a");
    let mismatched = seed_collection(&services, &owner_id, "b");

    // One collection is already inactive before the owner flips
    services.collections.soft_delete(&matching).unwrap();

    assert_eq!(services.owners.soft_delete(&owner_id).unwrap(), 1);

    for id in [&matching, &mismatched] {
        assert!(!services.collections.get(id).unwrap().unwrap().is_active);
    }

    // Second identical save is a no-op
    assert_eq!(services.owners.soft_delete(&owner_id).unwrap(), 0);

    // Reactivating the owner restores both collections
    assert_eq!(services.owners.undelete(&owner_id).unwrap(), 2);
    for id in [&matching, &mismatched] {
        assert!(services.collections.get(id).unwrap().unwrap().is_active);
    }
}
