//! Collection CRUD operations
//!
//! The collection row is the mutable "current" record. Its references
//! live in the `references_json` column as an embedded JSON array of
//! [`CollectionReference`] values.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::references::CollectionReference;
use crate::error::StoreError;

/// Resource kind label for collections
pub const COLLECTION_TYPE: &str = "Collection";

/// Collection row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRow {
    pub id: String,
    pub mnemonic: String,
    pub name: String,
    pub full_name: Option<String>,
    pub collection_type: Option<String>,
    pub public_access: String,
    pub default_locale: String,
    pub supported_locales_json: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub external_id: Option<String>,
    pub references_json: String,
    pub owner_kind: String,
    pub owner_id: String,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CollectionRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            mnemonic: row.get("mnemonic")?,
            name: row.get("name")?,
            full_name: row.get("full_name")?,
            collection_type: row.get("collection_type")?,
            public_access: row.get("public_access")?,
            default_locale: row.get("default_locale")?,
            supported_locales_json: row.get("supported_locales_json")?,
            website: row.get("website")?,
            description: row.get("description")?,
            external_id: row.get("external_id")?,
            references_json: row.get("references_json")?,
            owner_kind: row.get("owner_kind")?,
            owner_id: row.get("owner_id")?,
            is_active: row.get("is_active")?,
            created_by: row.get("created_by")?,
            updated_by: row.get("updated_by")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Decode the embedded reference list
    pub fn references(&self) -> Result<Vec<CollectionReference>, StoreError> {
        Ok(serde_json::from_str(&self.references_json)?)
    }

    /// Whether an expression already appears among the references
    pub fn has_reference(&self, expression: &str) -> Result<bool, StoreError> {
        Ok(self.references()?.iter().any(|r| r.expression == expression))
    }

    /// Decode the supported locales list
    pub fn supported_locales(&self) -> Result<Vec<String>, StoreError> {
        match &self.supported_locales_json {
            Some(json) => Ok(serde_json::from_str(json)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn resource_type(&self) -> &'static str {
        COLLECTION_TYPE
    }
}

/// Input for creating a collection
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCollectionInput {
    #[serde(default)]
    pub id: Option<String>,
    pub mnemonic: String,
    pub name: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub collection_type: Option<String>,
    #[serde(default = "default_public_access")]
    pub public_access: String,
    #[serde(default = "default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub supported_locales: Vec<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    pub owner_kind: String,
    pub owner_id: String,
    #[serde(default)]
    pub created_by: Option<String>,
}

fn default_public_access() -> String { "View".to_string() }
fn default_locale() -> String { "en".to_string() }

/// Get collection by ID
pub fn get_collection(conn: &Connection, id: &str) -> Result<Option<CollectionRow>, StoreError> {
    conn.query_row("SELECT * FROM collections WHERE id = ?", params![id], |row| CollectionRow::from_row(row))
        .optional()
        .map_err(|e| StoreError::Internal(format!("Failed to get collection: {}", e)))
}

/// List collections
pub fn list_collections(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<CollectionRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM collections ORDER BY created_at DESC LIMIT ? OFFSET ?")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let collections: Vec<CollectionRow> = stmt
        .query_map(params![limit as i64, offset as i64], |row| CollectionRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(collections)
}

/// List collections belonging to an owner
pub fn list_by_owner(conn: &Connection, owner_kind: &str, owner_id: &str) -> Result<Vec<CollectionRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM collections WHERE owner_kind = ? AND owner_id = ? ORDER BY mnemonic")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let collections: Vec<CollectionRow> = stmt
        .query_map(params![owner_kind, owner_id], |row| CollectionRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(collections)
}

/// Create a collection row. References start empty; version bookkeeping
/// is the caller's responsibility.
pub fn create_collection(conn: &Connection, input: CreateCollectionInput) -> Result<CollectionRow, StoreError> {
    let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let supported_locales_json = serde_json::to_string(&input.supported_locales)?;

    conn.execute(
        r#"
        INSERT INTO collections (
            id, mnemonic, name, full_name, collection_type, public_access,
            default_locale, supported_locales_json, website, description,
            external_id, owner_kind, owner_id, created_by, updated_by
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.mnemonic,
            input.name,
            input.full_name,
            input.collection_type,
            input.public_access,
            input.default_locale,
            supported_locales_json,
            input.website,
            input.description,
            input.external_id,
            input.owner_kind,
            input.owner_id,
            input.created_by,
            input.created_by,
        ],
    ).map_err(|e| StoreError::Internal(format!("Failed to create collection: {}", e)))?;

    get_collection(conn, &id)?
        .ok_or_else(|| StoreError::Internal("Collection not found after insert".to_string()))
}

/// Replace the embedded reference list
pub fn set_references(
    conn: &Connection,
    id: &str,
    references: &[CollectionReference],
    updated_by: Option<&str>,
) -> Result<(), StoreError> {
    let references_json = serde_json::to_string(references)?;

    let rows = conn.execute(
        "UPDATE collections SET references_json = ?, updated_by = COALESCE(?, updated_by),
         updated_at = datetime('now') WHERE id = ?",
        params![references_json, updated_by, id],
    ).map_err(|e| StoreError::Internal(format!("Failed to update references: {}", e)))?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("Collection not found: {}", id)));
    }

    Ok(())
}

/// Set the collection's active flag. Returns true if the flag changed.
pub fn set_active(conn: &Connection, id: &str, active: bool) -> Result<bool, StoreError> {
    let collection = get_collection(conn, id)?
        .ok_or_else(|| StoreError::NotFound(format!("Collection not found: {}", id)))?;

    if collection.is_active == active {
        return Ok(false);
    }

    conn.execute(
        "UPDATE collections SET is_active = ?, updated_at = datetime('now') WHERE id = ?",
        params![active, id],
    ).map_err(|e| StoreError::Internal(format!("Failed to update collection: {}", e)))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema;
    use crate::db::owners::{self, CreateOwnerInput};

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().expect("Failed to open in-memory db");
        schema::init_schema(&conn).expect("Failed to init schema");
        conn
    }

    fn seed_owner(conn: &Connection) -> String {
        owners::create_owner(conn, CreateOwnerInput {
            id: None,
            kind: "organization".to_string(),
            mnemonic: "org".to_string(),
            name: None,
        }).unwrap().id
    }

    fn collection_input(owner_id: &str, mnemonic: &str) -> CreateCollectionInput {
        CreateCollectionInput {
            id: None,
            mnemonic: mnemonic.to_string(),
            name: format!("{} collection", mnemonic),
            full_name: None,
            collection_type: Some("Dictionary".to_string()),
            public_access: "View".to_string(),
            default_locale: "en".to_string(),
            supported_locales: vec!["en".to_string(), "fr".to_string()],
            website: None,
            description: None,
            external_id: None,
            owner_kind: "organization".to_string(),
            owner_id: owner_id.to_string(),
            created_by: Some("admin".to_string()),
        }
    }

    #[test]
    fn test_create_and_get_collection() {
        let conn = setup_test_db();
        let owner_id = seed_owner(&conn);

        let created = create_collection(&conn, collection_input(&owner_id, "icd")).unwrap();
        assert_eq!(created.mnemonic, "icd");
        assert!(created.is_active);
        assert!(created.references().unwrap().is_empty());
        assert_eq!(created.supported_locales().unwrap(), vec!["en", "fr"]);
        assert_eq!(created.resource_type(), "Collection");

        let fetched = get_collection(&conn, &created.id).unwrap().unwrap();
        assert_eq!(fetched.created_by.as_deref(), Some("admin"));
        assert_eq!(fetched.updated_by.as_deref(), Some("admin"));
    }

    #[test]
    fn test_set_references_round_trip() {
        let conn = setup_test_db();
        let owner_id = seed_owner(&conn);
        let collection = create_collection(&conn, collection_input(&owner_id, "icd")).unwrap();

        let reference = CollectionReference {
            expression: "/concepts/123/".to_string(),
            concept_ids: vec!["c1".to_string()],
            mapping_ids: vec![],
        };
        set_references(&conn, &collection.id, &[reference.clone()], Some("editor")).unwrap();

        let fetched = get_collection(&conn, &collection.id).unwrap().unwrap();
        assert_eq!(fetched.references().unwrap(), vec![reference]);
        assert!(fetched.has_reference("/concepts/123/").unwrap());
        assert!(!fetched.has_reference("/concepts/456/").unwrap());
        assert_eq!(fetched.updated_by.as_deref(), Some("editor"));

        let missing = set_references(&conn, "nope", &[], None);
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_set_active_and_list_by_owner() {
        let conn = setup_test_db();
        let owner_id = seed_owner(&conn);

        let a = create_collection(&conn, collection_input(&owner_id, "a")).unwrap();
        create_collection(&conn, collection_input(&owner_id, "b")).unwrap();

        let owned = list_by_owner(&conn, "organization", &owner_id).unwrap();
        assert_eq!(owned.len(), 2);

        assert!(set_active(&conn, &a.id, false).unwrap());
        assert!(!set_active(&conn, &a.id, false).unwrap());

        let fetched = get_collection(&conn, &a.id).unwrap().unwrap();
        assert!(!fetched.is_active);
    }

    #[test]
    fn test_duplicate_mnemonic_per_owner_rejected() {
        let conn = setup_test_db();
        let owner_id = seed_owner(&conn);

        create_collection(&conn, collection_input(&owner_id, "icd")).unwrap();
        assert!(create_collection(&conn, collection_input(&owner_id, "icd")).is_err());
    }
}
