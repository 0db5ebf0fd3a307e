//! Mapping registry CRUD operations

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Mapping row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingRow {
    pub id: String,
    pub uri: String,
    pub map_type: String,
    pub from_concept_uri: String,
    pub to_concept_uri: Option<String>,
    pub to_concept_code: Option<String>,
    pub retired: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl MappingRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            uri: row.get("uri")?,
            map_type: row.get("map_type")?,
            from_concept_uri: row.get("from_concept_uri")?,
            to_concept_uri: row.get("to_concept_uri")?,
            to_concept_code: row.get("to_concept_code")?,
            retired: row.get("retired")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Input for creating a mapping
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMappingInput {
    #[serde(default)]
    pub id: Option<String>,
    pub uri: String,
    #[serde(default = "default_map_type")]
    pub map_type: String,
    pub from_concept_uri: String,
    #[serde(default)]
    pub to_concept_uri: Option<String>,
    #[serde(default)]
    pub to_concept_code: Option<String>,
}

fn default_map_type() -> String { "SAME-AS".to_string() }

/// Get mapping by ID
pub fn get_mapping(conn: &Connection, id: &str) -> Result<Option<MappingRow>, StoreError> {
    conn.query_row("SELECT * FROM mappings WHERE id = ?", params![id], |row| MappingRow::from_row(row))
        .optional()
        .map_err(|e| StoreError::Internal(format!("Failed to get mapping: {}", e)))
}

/// Find all mappings sharing a canonical uri
pub fn find_by_uri(conn: &Connection, uri: &str) -> Result<Vec<MappingRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM mappings WHERE uri = ? ORDER BY created_at")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let mappings: Vec<MappingRow> = stmt
        .query_map(params![uri], |row| MappingRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(mappings)
}

/// List mappings
pub fn list_mappings(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<MappingRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM mappings ORDER BY created_at DESC LIMIT ? OFFSET ?")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let mappings: Vec<MappingRow> = stmt
        .query_map(params![limit as i64, offset as i64], |row| MappingRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(mappings)
}

/// Create a mapping
pub fn create_mapping(conn: &Connection, input: CreateMappingInput) -> Result<MappingRow, StoreError> {
    let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        r#"
        INSERT INTO mappings (id, uri, map_type, from_concept_uri, to_concept_uri, to_concept_code)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            id,
            input.uri,
            input.map_type,
            input.from_concept_uri,
            input.to_concept_uri,
            input.to_concept_code,
        ],
    ).map_err(|e| StoreError::Internal(format!("Failed to create mapping: {}", e)))?;

    get_mapping(conn, &id)?
        .ok_or_else(|| StoreError::Internal("Mapping not found after insert".to_string()))
}

/// Mark a mapping retired
pub fn retire_mapping(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let rows = conn
        .execute(
            "UPDATE mappings SET retired = 1, updated_at = datetime('now') WHERE id = ?",
            params![id],
        )
        .map_err(|e| StoreError::Internal(format!("Failed to retire mapping: {}", e)))?;

    if rows == 0 {
        return Err(StoreError::NotFound(format!("Mapping not found: {}", id)));
    }

    Ok(())
}
