//! Server error types.

use crate::auth::AuthError;
use taxii_protocol::{ProtocolError, StatusType};
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("storage error: {0}")]
    Storage(#[from] taxii_storage::StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("access denied: {0}")]
    Denied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ServerError {
    /// Converts to the status reported to the client.
    pub fn status_type(&self) -> StatusType {
        match self {
            ServerError::Io(_) => StatusType::Failure,
            ServerError::Protocol(e) => match e {
                ProtocolError::BadMessage { .. } => StatusType::BadMessage,
                ProtocolError::UnsupportedContentType(_)
                | ProtocolError::UnsupportedVersion(_)
                | ProtocolError::NotRepresentable { .. } => StatusType::UnsupportedMessage,
                ProtocolError::Encode(_) => StatusType::Failure,
            },
            ServerError::Storage(_) => StatusType::Failure,
            ServerError::Json(_) => StatusType::Failure,
            ServerError::Auth(_) => StatusType::Unauthorized,
            ServerError::Denied(_) => StatusType::Denied,
            ServerError::NotFound(_) => StatusType::NotFound,
            ServerError::Metrics(_) => StatusType::Failure,
            ServerError::Config(_) => StatusType::Failure,
        }
    }

    /// Returns whether the error text may be shown to the client.
    ///
    /// Internal faults are only logged.
    pub fn is_client_facing(&self) -> bool {
        !matches!(self.status_type(), StatusType::Failure)
    }
}
