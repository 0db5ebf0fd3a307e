//! Owner CRUD operations
//!
//! Owners are the parent entities (organizations and users) that
//! collections belong to. Their `is_active` flag cascades to owned
//! collections via ownership propagation.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

/// Owner kinds
pub const OWNER_KIND_ORGANIZATION: &str = "organization";
pub const OWNER_KIND_USER: &str = "user";

/// Owner row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerRow {
    pub id: String,
    pub kind: String,
    pub mnemonic: String,
    pub name: Option<String>,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl OwnerRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get("kind")?,
            mnemonic: row.get("mnemonic")?,
            name: row.get("name")?,
            is_active: row.get("is_active")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Input for creating an owner
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOwnerInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub mnemonic: String,
    #[serde(default)]
    pub name: Option<String>,
}

fn default_kind() -> String { OWNER_KIND_ORGANIZATION.to_string() }

/// Get owner by ID
pub fn get_owner(conn: &Connection, id: &str) -> Result<Option<OwnerRow>, StoreError> {
    conn.query_row("SELECT * FROM owners WHERE id = ?", params![id], |row| OwnerRow::from_row(row))
        .optional()
        .map_err(|e| StoreError::Internal(format!("Failed to get owner: {}", e)))
}

/// List owners
pub fn list_owners(conn: &Connection, limit: u32, offset: u32) -> Result<Vec<OwnerRow>, StoreError> {
    let mut stmt = conn
        .prepare("SELECT * FROM owners ORDER BY created_at DESC LIMIT ? OFFSET ?")
        .map_err(|e| StoreError::Internal(format!("Prepare failed: {}", e)))?;

    let owners: Vec<OwnerRow> = stmt
        .query_map(params![limit as i64, offset as i64], |row| OwnerRow::from_row(row))
        .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(owners)
}

/// Create an owner
pub fn create_owner(conn: &Connection, input: CreateOwnerInput) -> Result<OwnerRow, StoreError> {
    let id = input.id.unwrap_or_else(|| Uuid::new_v4().to_string());

    conn.execute(
        "INSERT INTO owners (id, kind, mnemonic, name) VALUES (?, ?, ?, ?)",
        params![id, input.kind, input.mnemonic, input.name],
    ).map_err(|e| StoreError::Internal(format!("Failed to create owner: {}", e)))?;

    get_owner(conn, &id)?
        .ok_or_else(|| StoreError::Internal("Owner not found after insert".to_string()))
}

/// Set the owner's active flag. Returns true if the flag changed.
pub fn set_active(conn: &Connection, id: &str, active: bool) -> Result<bool, StoreError> {
    let owner = get_owner(conn, id)?
        .ok_or_else(|| StoreError::NotFound(format!("Owner not found: {}", id)))?;

    if owner.is_active == active {
        return Ok(false);
    }

    conn.execute(
        "UPDATE owners SET is_active = ?, updated_at = datetime('now') WHERE id = ?",
        params![active, id],
    ).map_err(|e| StoreError::Internal(format!("Failed to update owner: {}", e)))?;

    Ok(true)
}
