//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::error::StoreError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    // Check current schema version
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32, StoreError> {
    // Create schema_version table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    ).map_err(|e| StoreError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

/// Set schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<(), StoreError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| StoreError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| StoreError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Create all tables
fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(OWNERS_SCHEMA)
        .map_err(|e| StoreError::Internal(format!("Failed to create owners table: {}", e)))?;

    conn.execute_batch(VOCABULARY_SCHEMA)
        .map_err(|e| StoreError::Internal(format!("Failed to create vocabulary tables: {}", e)))?;

    conn.execute_batch(COLLECTIONS_SCHEMA)
        .map_err(|e| StoreError::Internal(format!("Failed to create collection tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| StoreError::Internal(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), StoreError> {
    // Add migration steps here as schema evolves
    match from_version {
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Owners schema (organizations and users that collections belong to)
const OWNERS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS owners (
    id TEXT PRIMARY KEY NOT NULL,
    kind TEXT NOT NULL DEFAULT 'organization',
    mnemonic TEXT NOT NULL,
    name TEXT,

    -- Soft delete flag, cascaded to owned collections on change
    is_active INTEGER NOT NULL DEFAULT 1,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (kind, mnemonic)
);
"#;

/// Concept and mapping registries (the lookup universe for expressions)
const VOCABULARY_SCHEMA: &str = r#"
-- Concepts, addressable by canonical uri
-- Multiple concept rows may share one uri (concept versions)
CREATE TABLE IF NOT EXISTS concepts (
    id TEXT PRIMARY KEY NOT NULL,
    uri TEXT NOT NULL,
    mnemonic TEXT NOT NULL,
    concept_class TEXT NOT NULL DEFAULT 'Misc',
    datatype TEXT,
    display_name TEXT,
    display_locale TEXT,
    retired INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Mappings between concepts, addressable by canonical uri
CREATE TABLE IF NOT EXISTS mappings (
    id TEXT PRIMARY KEY NOT NULL,
    uri TEXT NOT NULL,
    map_type TEXT NOT NULL DEFAULT 'SAME-AS',
    from_concept_uri TEXT NOT NULL,
    to_concept_uri TEXT,
    to_concept_code TEXT,
    retired INTEGER NOT NULL DEFAULT 0,

    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// Collections and their version chain
const COLLECTIONS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS collections (
    id TEXT PRIMARY KEY NOT NULL,
    mnemonic TEXT NOT NULL,
    name TEXT NOT NULL,
    full_name TEXT,
    collection_type TEXT,
    public_access TEXT NOT NULL DEFAULT 'View',
    default_locale TEXT NOT NULL DEFAULT 'en',
    supported_locales_json TEXT,
    website TEXT,
    description TEXT,
    external_id TEXT,

    -- References embedded as a JSON array of owned value objects
    references_json TEXT NOT NULL DEFAULT '[]',

    -- Owning organization or user
    owner_kind TEXT NOT NULL,
    owner_id TEXT NOT NULL,

    is_active INTEGER NOT NULL DEFAULT 1,

    created_by TEXT,
    updated_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (owner_kind, owner_id, mnemonic),
    FOREIGN KEY (owner_id) REFERENCES owners(id)
);

-- Version snapshots; exactly one HEAD per collection, non-HEAD rows
-- are never mutated after creation
CREATE TABLE IF NOT EXISTS collection_versions (
    id TEXT PRIMARY KEY NOT NULL,
    mnemonic TEXT NOT NULL,
    versioned_object_id TEXT NOT NULL,
    previous_version_id TEXT,
    parent_version_id TEXT,
    released INTEGER NOT NULL DEFAULT 0,

    -- Snapshot of collection metadata, copied once at creation
    name TEXT NOT NULL,
    full_name TEXT,
    collection_type TEXT,
    public_access TEXT NOT NULL DEFAULT 'View',
    default_locale TEXT NOT NULL DEFAULT 'en',
    supported_locales_json TEXT,
    website TEXT,
    description TEXT,
    external_id TEXT,

    -- Cumulative resolved ids and accumulated references as JSON arrays
    concepts_json TEXT NOT NULL DEFAULT '[]',
    mappings_json TEXT NOT NULL DEFAULT '[]',
    references_json TEXT NOT NULL DEFAULT '[]',

    created_by TEXT,
    updated_by TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),

    UNIQUE (versioned_object_id, mnemonic),
    FOREIGN KEY (versioned_object_id) REFERENCES collections(id) ON DELETE CASCADE
);
"#;

/// Index definitions for fast queries
const INDEXES_SCHEMA: &str = r#"
-- Expression resolution looks up by uri; uri is not unique
CREATE INDEX IF NOT EXISTS idx_concepts_uri ON concepts(uri);
CREATE INDEX IF NOT EXISTS idx_mappings_uri ON mappings(uri);

-- Collection lookups
CREATE INDEX IF NOT EXISTS idx_collections_owner ON collections(owner_kind, owner_id);
CREATE INDEX IF NOT EXISTS idx_collections_active ON collections(is_active);

-- Version chain lookups
CREATE INDEX IF NOT EXISTS idx_collection_versions_object ON collection_versions(versioned_object_id);
CREATE INDEX IF NOT EXISTS idx_collection_versions_released ON collection_versions(versioned_object_id, released);

-- At most one HEAD version per collection
CREATE UNIQUE INDEX IF NOT EXISTS ux_collection_versions_head
    ON collection_versions(versioned_object_id) WHERE mnemonic = 'HEAD';
"#;
