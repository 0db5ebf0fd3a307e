//! SQLite database module for collection and vocabulary storage
//!
//! This module provides local storage for collections, their version
//! chains, and the concept/mapping registries that reference
//! expressions resolve against.
//!
//! ## Tables
//!
//! - `owners` - Organizations and users that collections belong to
//! - `concepts` - Concept registry (uri-addressable)
//! - `mappings` - Mapping registry (uri-addressable)
//! - `collections` - Collection metadata plus embedded references JSON
//! - `collection_versions` - Version snapshots with cumulative id lists

pub mod schema;
pub mod concepts;
pub mod mappings;
pub mod owners;
pub mod collections;
pub mod references;
pub mod versions;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{info, debug};

use crate::error::StoreError;

/// SQLite database for collections and vocabulary
pub struct VocabDb {
    conn: Mutex<Connection>,
}

impl VocabDb {
    /// Open or create the vocabulary database
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        info!("Opening SQLite database at {:?}", db_path);

        let conn = Connection::open(db_path)
            .map_err(|e| StoreError::Internal(format!("Failed to open SQLite: {}", e)))?;

        // Enable WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError::Internal(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        // Initialize schema
        db.init_schema()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        debug!("Opening in-memory SQLite database");

        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Internal(format!("Failed to open in-memory SQLite: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read operation against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Execute a write operation with exclusive access (for transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock()
            .map_err(|e| StoreError::Internal(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, StoreError> {
        self.with_conn(|conn| {
            let collection_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM collections", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            let version_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM collection_versions", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            let concept_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM concepts", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            let mapping_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM mappings", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            let owner_count: i64 = conn
                .query_row("SELECT COUNT(*) FROM owners", [], |row| row.get(0))
                .map_err(|e| StoreError::Internal(format!("Query failed: {}", e)))?;

            Ok(DbStats {
                collection_count: collection_count as u64,
                version_count: version_count as u64,
                concept_count: concept_count as u64,
                mapping_count: mapping_count as u64,
                owner_count: owner_count as u64,
            })
        })
    }
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub collection_count: u64,
    pub version_count: u64,
    pub concept_count: u64,
    pub mapping_count: u64,
    pub owner_count: u64,
}

// Re-exports
pub use concepts::{ConceptRow, CreateConceptInput};
pub use mappings::{MappingRow, CreateMappingInput};
pub use owners::{OwnerRow, CreateOwnerInput};
pub use collections::{CollectionRow, CreateCollectionInput};
pub use references::{CollectionReference, resolve_expression};
pub use versions::{CollectionVersionRow, VersionChanges, HEAD};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_initializes_schema() {
        let db = VocabDb::open_in_memory().expect("Failed to open db");

        let stats = db.stats().expect("Failed to get stats");
        assert_eq!(stats.collection_count, 0);
        assert_eq!(stats.version_count, 0);
        assert_eq!(stats.concept_count, 0);
        assert_eq!(stats.mapping_count, 0);
        assert_eq!(stats.owner_count, 0);
    }

    #[test]
    fn test_open_on_disk_creates_parent_dir() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("vocab.db");

        let db = VocabDb::open(&db_path).expect("Failed to open db");
        assert!(db_path.exists());

        let stats = db.stats().expect("Failed to get stats");
        assert_eq!(stats.collection_count, 0);
    }

    #[test]
    fn test_head_index_rejects_second_head() {
        let db = VocabDb::open_in_memory().expect("Failed to open db");

        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO owners (id, kind, mnemonic) VALUES ('o1', 'organization', 'org')",
                [],
            ).map_err(|e| StoreError::Internal(e.to_string()))?;
            conn.execute(
                "INSERT INTO collections (id, mnemonic, name, owner_kind, owner_id)
                 VALUES ('c1', 'col', 'Col', 'organization', 'o1')",
                [],
            ).map_err(|e| StoreError::Internal(e.to_string()))?;
            conn.execute(
                "INSERT INTO collection_versions (id, mnemonic, versioned_object_id, name)
                 VALUES ('v1', 'HEAD', 'c1', 'Col')",
                [],
            ).map_err(|e| StoreError::Internal(e.to_string()))?;

            let second = conn.execute(
                "INSERT INTO collection_versions (id, mnemonic, versioned_object_id, name)
                 VALUES ('v2', 'HEAD', 'c1', 'Col')",
                [],
            );
            assert!(second.is_err());
            Ok(())
        }).expect("with_conn failed");
    }
}
