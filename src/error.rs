//! Error types for glossa-storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Expression specified is not valid.")]
    InvalidExpression { expression: String },

    #[error("Reference Already Exists!")]
    DuplicateReference { expression: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Logical field key for validation failures, so an API layer can
    /// render field-level errors. Infrastructure errors have no field.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            StoreError::InvalidExpression { .. } => Some("detail"),
            StoreError::DuplicateReference { .. } => Some("detail"),
            StoreError::InvalidArgument(_) => Some("detail"),
            _ => None,
        }
    }
}
