//! Storage error types.

use thiserror::Error;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("duplicate service: {0}")]
    DuplicateService(String),

    #[error("duplicate collection: {0}")]
    DuplicateCollection(String),

    #[error("invalid definition: {0}")]
    InvalidDefinition(String),
}
