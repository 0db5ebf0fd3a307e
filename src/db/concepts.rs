//! Concept registry CRUD operations
//!
//! Concepts are the vocabulary entries that collection references
//! resolve against, addressed by canonical uri. Several concept rows
//! may share one uri (concept versions), so uri lookups return all
//! matches.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Concept row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRow {
    pub id: String,
    pub uri: String,
    pub mnemonic: String,
    pub concept_class: String,
    pub datatype: Option<String>,
    pub display_name: Option<String>,
    pub display_locale: Option<String>,
    pub retired: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ConceptRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            uri: row.get("uri")?,
            mnemonic: row.get("mnemonic")?,
            concept_class: row.get("concept_class")?,
            datatype: row.get("datatype")?,
            display_name: row.get("display_name")?,
            display_locale: row.get("display_locale")?,
            retired: row.get("retired")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Input for creating a concept
#[derive(Debug, Clone, Deserialize)]
pub struct CreateConceptInput {
    #[serde(default)]
    pub id: Option<String>,
    pub uri: String,
    pub mnemonic: String,
    #[serde(default = "default_concept_class")]
    pub concept_class: String,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub display_locale: Option<String>,
}

fn default_concept_class() -> String { "Misc".to_string() }

/// Get concept by ID
pub fn get_concept(conn: &Connection, id: &str) -> Result<Option<ConceptRow>, StoreError> {
    conn.query_row("SELECT * FROM concepts WHERE id = ?", params![id], |row| ConceptRow::from_row(row))
        .optional()
        .map_err(|e| StoreError::Internal(format!("Failed to get concept: {}", e)))
}

/// Find all concepts sharing a canonical uri
pub fn find_by_uri(conn: &Connection, uri: &str) -> Result<Vec<ConceptRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM concepts WHERE uri = ? ORDER BY created_at")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let concepts: Vec<ConceptRow> = stmt
        .query_map(params![uri], |row| ConceptRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(concepts)
}

/// List concepts
pub fn list_concepts(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<ConceptRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM concepts ORDER BY created_at DESC LIMIT ? OFFSET ?")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let concepts: Vec<ConceptRow> = stmt
        .query_map(params![limit as i64, offset as i64], |row| ConceptRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(concepts)
}

/// Create a concept
pub fn create_concept(conn: &Connection, input: CreateConceptInput) -> Result<ConceptRow, StoreError> {
    let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        r#"
        INSERT INTO concepts (id, uri, mnemonic, concept_class, datatype, display_name, display_locale)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.uri,
            input.mnemonic,
            input.concept_class,
            input.datatype,
            input.display_name,
            input.display_locale,
        ],
    ).map_err(|e| StoreError::Internal(format!("Failed to create concept: {}", e)))?;

    get_concept(conn, &id)?
        .ok_or_else(|| StoreError::Internal("Concept not found after insert".to_string()))
}

/// Mark a concept retired
pub fn retire_concept(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let rows = conn
        .execute(
            "UPDATE concepts SET retired = 1, updated_at = datetime('now') WHERE id = ?",
            params![id],
        )
        .map_err(|e| StoreError::Internal(format!("Failed to retire concept: {}", e)))?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("Concept not found: {}", id)));
    }

    Ok(())
}
