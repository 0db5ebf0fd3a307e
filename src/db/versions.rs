//! Collection version chain operations
//!
//! Each collection has a chain of version snapshots: one mutable HEAD
//! plus immutable labeled versions. A new version seeds its cumulative
//! concept/mapping id lists from its predecessor, then extends them by
//! folding in resolved references. Id lists are append-only and are
//! never de-duplicated.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::collections::CollectionRow;
use crate::db::references::CollectionReference;
use crate::error::StoreError;

/// Version label of the mutable head snapshot
pub const HEAD: &str = "HEAD";

/// Label that normalizes to HEAD when the first version is created
pub const INITIAL: &str = "INITIAL";

/// Resource kind label for collection versions
pub const COLLECTION_VERSION_TYPE: &str = "Collection Version";

// =============================================================================
// Types
// =============================================================================

/// Collection version row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionVersionRow {
    pub id: String,
    pub mnemonic: String,
    pub versioned_object_id: String,
    pub previous_version_id: Option<String>,
    pub parent_version_id: Option<String>,
    pub released: bool,

    // Snapshot of collection metadata taken at creation, not kept in sync
    pub name: String,
    pub full_name: Option<String>,
    pub collection_type: Option<String>,
    pub public_access: String,
    pub default_locale: String,
    pub supported_locales_json: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub external_id: Option<String>,

    // Cumulative id lists and accumulated references, JSON arrays
    pub concepts_json: String,
    pub mappings_json: String,
    pub references_json: String,

    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Pending changes to apply to a version snapshot.
///
/// Container-level field updates and the reference fold-in are applied
/// as two explicit phases by [`persist_changes`].
#[derive(Debug, Clone, Default)]
pub struct VersionChanges {
    pub description: Option<String>,
    pub released: Option<bool>,
    pub updated_by: Option<String>,
    pub reference: Option<CollectionReference>,
}

impl CollectionVersionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            mnemonic: row.get("mnemonic")?,
            versioned_object_id: row.get("versioned_object_id")?,
            previous_version_id: row.get("previous_version_id")?,
            parent_version_id: row.get("parent_version_id")?,
            released: row.get("released")?,
            name: row.get("name")?,
            full_name: row.get("full_name")?,
            collection_type: row.get("collection_type")?,
            public_access: row.get("public_access")?,
            default_locale: row.get("default_locale")?,
            supported_locales_json: row.get("supported_locales_json")?,
            website: row.get("website")?,
            description: row.get("description")?,
            external_id: row.get("external_id")?,
            concepts_json: row.get("concepts_json")?,
            mappings_json: row.get("mappings_json")?,
            references_json: row.get("references_json")?,
            created_by: row.get("created_by")?,
            updated_by: row.get("updated_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Build a version snapshot for a collection. Copies the
    /// collection's identity and display metadata into the new version;
    /// the copy is taken once and never synced afterward. The label
    /// INITIAL is stored as HEAD.
    pub fn for_collection(
        collection: &CollectionRow,
        label: &str,
        previous_version_id: Option<String>,
        parent_version_id: Option<String>,
        released: bool,
    ) -> Result<Self, StoreError> {
        if collection.id.is_empty() {
            return Err(StoreError::InvalidArgument(
                "collection must have an object id".to_string(),
            ));
        }

        let mnemonic = if label == INITIAL { HEAD } else { label };
        let now = Utc::now().to_rfc3339();

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            mnemonic: mnemonic.to_string(),
            versioned_object_id: collection.id.clone(),
            previous_version_id,
            parent_version_id,
            released,
            name: collection.name.clone(),
            full_name: collection.full_name.clone(),
            collection_type: collection.collection_type.clone(),
            public_access: collection.public_access.clone(),
            default_locale: collection.default_locale.clone(),
            supported_locales_json: collection.supported_locales_json.clone(),
            website: collection.website.clone(),
            description: collection.description.clone(),
            external_id: collection.external_id.clone(),
            concepts_json: "[]".to_string(),
            mappings_json: "[]".to_string(),
            references_json: "[]".to_string(),
            created_by: collection.created_by.clone(),
            updated_by: collection.updated_by.clone(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    /// Copy the predecessor's cumulative concept id list verbatim
    pub fn seed_concepts(&mut self, previous: Option<&CollectionVersionRow>) {
        if let Some(previous) = previous {
            self.concepts_json = previous.concepts_json.clone();
        }
    }

    /// Copy the predecessor's cumulative mapping id list verbatim
    pub fn seed_mappings(&mut self, previous: Option<&CollectionVersionRow>) {
        if let Some(previous) = previous {
            self.mappings_json = previous.mappings_json.clone();
        }
    }

    /// Fold a resolved reference into this snapshot: append its concept
    /// ids and mapping ids to the cumulative lists and record the
    /// reference itself. Appends do not de-duplicate.
    pub fn fold_reference(&mut self, reference: &CollectionReference) -> Result<(), StoreError> {
        if !reference.concept_ids.is_empty() {
            let mut concept_ids = self.concept_ids()?;
            concept_ids.extend(reference.concept_ids.iter().cloned());
            self.concepts_json = serde_json::to_string(&concept_ids)?;
        }

        if !reference.mapping_ids.is_empty() {
            let mut mapping_ids = self.mapping_ids()?;
            mapping_ids.extend(reference.mapping_ids.iter().cloned());
            self.mappings_json = serde_json::to_string(&mapping_ids)?;
        }

        let mut references = self.references()?;
        references.push(reference.clone());
        self.references_json = serde_json::to_string(&references)?;

        Ok(())
    }

    /// Decode the cumulative concept id list
    pub fn concept_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(serde_json::from_str(&self.concepts_json)?)
    }

    /// Decode the cumulative mapping id list
    pub fn mapping_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(serde_json::from_str(&self.mappings_json)?)
    }

    /// Decode the accumulated reference list
    pub fn references(&self) -> Result<Vec<CollectionReference>, StoreError> {
        Ok(serde_json::from_str(&self.references_json)?)
    }

    pub fn resource_type(&self) -> &'static str {
        COLLECTION_VERSION_TYPE
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// Insert a version snapshot built by [`CollectionVersionRow::for_collection`]
pub fn create_version(conn: &Connection, version: &CollectionVersionRow) -> Result<CollectionVersionRow, StoreError> {
    conn.execute(
        r#"
        INSERT INTO collection_versions (
            id, mnemonic, versioned_object_id, previous_version_id, parent_version_id,
            released, name, full_name, collection_type, public_access, default_locale,
            supported_locales_json, website, description, external_id,
            concepts_json, mappings_json, references_json,
            created_by, updated_by, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            version.id,
            version.mnemonic,
            version.versioned_object_id,
            version.previous_version_id,
            version.parent_version_id,
            version.released,
            version.name,
            version.full_name,
            version.collection_type,
            version.public_access,
            version.default_locale,
            version.supported_locales_json,
            version.website,
            version.description,
            version.external_id,
            version.concepts_json,
            version.mappings_json,
            version.references_json,
            version.created_by,
            version.updated_by,
            version.created_at,
            version.updated_at,
        ],
    ).map_err(|e| StoreError::Internal(format!("Failed to create version: {}", e)))?;

    get_version(conn, &version.id)?
        .ok_or_else(|| StoreError::Internal("Version not found after insert".to_string()))
}

/// Apply a change set to a version snapshot and write it back.
///
/// Phase one applies container-level field updates; phase two folds in
/// a validated reference when the change set carries one. Both phases
/// land in a single UPDATE.
pub fn persist_changes(
    conn: &Connection,
    version: &mut CollectionVersionRow,
    changes: VersionChanges,
) -> Result<(), StoreError> {
    if let Some(description) = changes.description {
        version.description = Some(description);
    }
    if let Some(released) = changes.released {
        version.released = released;
    }
    if let Some(updated_by) = changes.updated_by {
        version.updated_by = Some(updated_by);
    }

    if let Some(reference) = changes.reference {
        version.fold_reference(&reference)?;
    }

    version.updated_at = Utc::now().to_rfc3339();

    let rows = conn.execute(
        r#"
        UPDATE collection_versions SET
            description = ?, released = ?, updated_by = ?,
            concepts_json = ?, mappings_json = ?, references_json = ?,
            updated_at = ?
        WHERE id = ?
        "#,
        params![
            version.description,
            version.released,
            version.updated_by,
            version.concepts_json,
            version.mappings_json,
            version.references_json,
            version.updated_at,
            version.id,
        ],
    ).map_err(|e| StoreError::Internal(format!("Failed to persist version changes: {}", e)))?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("Version not found: {}", version.id)));
    }

    Ok(())
}

// =============================================================================
// Queries
// =============================================================================

/// Get version by ID
pub fn get_version(conn: &Connection, id: &str) -> Result<Option<CollectionVersionRow>, StoreError> {
    conn.query_row(
        "SELECT * FROM collection_versions WHERE id = ?",
        params![id],
        |row| CollectionVersionRow::from_row(row),
    )
    .optional()
    .map_err(|e| StoreError::Internal(format!("Failed to get version: {}", e)))
}

/// Get a collection's version by label
pub fn get_version_by_label(
    conn: &Connection,
    collection_id: &str,
    label: &str,
) -> Result<Option<CollectionVersionRow>, StoreError> {
    conn.query_row(
        "SELECT * FROM collection_versions WHERE versioned_object_id = ? AND mnemonic = ?",
        params![collection_id, label],
        |row| CollectionVersionRow::from_row(row),
    )
    .optional()
    .map_err(|e| StoreError::Internal(format!("Failed to get version by label: {}", e)))
}

/// Get the HEAD version of a collection
pub fn get_head(conn: &Connection, collection_id: &str) -> Result<CollectionVersionRow, StoreError> {
    get_version_by_label(conn, collection_id, HEAD)?
        .ok_or_else(|| StoreError::NotFound(format!("No HEAD version for collection: {}", collection_id)))
}

/// Get the HEAD version sharing this version's collection
pub fn head_sibling(conn: &Connection, version: &CollectionVersionRow) -> Result<CollectionVersionRow, StoreError> {
    get_head(conn, &version.versioned_object_id)
}

/// List a collection's versions, newest first
pub fn list_versions(conn: &Connection, collection_id: &str) -> Result<Vec<CollectionVersionRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM collection_versions WHERE versioned_object_id = ? ORDER BY created_at DESC")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let versions: Vec<CollectionVersionRow> = stmt
        .query_map(params![collection_id], |row| CollectionVersionRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(versions)
}
