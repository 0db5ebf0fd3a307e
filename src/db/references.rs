//! Collection references and expression resolution
//!
//! A reference is an owned value object recording an expression and the
//! concept or mapping ids it resolved to. References are embedded as
//! JSON inside collections and version snapshots, not stored as rows.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::{concepts, mappings};
use crate::error::StoreError;

/// A validated reference held by a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionReference {
    pub expression: String,
    #[serde(default)]
    pub concept_ids: Vec<String>,
    #[serde(default)]
    pub mapping_ids: Vec<String>,
}

impl CollectionReference {
    /// A reference is valid when it resolved to at least one concept or
    /// at least one mapping, never both.
    pub fn is_resolved(&self) -> bool {
        !self.concept_ids.is_empty() || !self.mapping_ids.is_empty()
    }
}

/// Resolve an expression against the concept and mapping registries.
///
/// Concepts are checked first; mappings are consulted only when no
/// concept matched. An expression matching neither is invalid.
pub fn resolve_expression(conn: &Connection, expression: &str) -> Result<CollectionReference, StoreError> {
    let concept_rows = concepts::find_by_uri(conn, expression)?;
    if !concept_rows.is_empty() {
        return Ok(CollectionReference {
            expression: expression.to_string(),
            concept_ids: concept_rows.into_iter().map(|c| c.id).collect(),
            mapping_ids: Vec::new(),
        });
    }

    let mapping_rows = mappings::find_by_uri(conn, expression)?;
    if !mapping_rows.is_empty() {
        return Ok(CollectionReference {
            expression: expression.to_string(),
            concept_ids: Vec::new(),
            mapping_ids: mapping_rows.into_iter().map(|m| m.id).collect(),
        });
    }

    Err(StoreError::InvalidExpression {
        expression: expression.to_string(),
    })
}
