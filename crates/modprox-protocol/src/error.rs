//! Protocol error types.

use modprox_storage::{ErrorKind, StorageError};

use crate::response::Status;

/// Errors surfaced at the protocol boundary.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The request does not name any proxy endpoint.
    #[error("no route for {method} {path}")]
    NoRoute { method: String, path: String },

    /// An upload part is larger than its configured limit.
    #[error("upload part '{part}' exceeds the limit of {limit} bytes")]
    PayloadTooLarge { part: String, limit: u64 },

    /// Error reported by the storage backend or by identifier validation.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProtocolError {
    /// The response status this error maps to.
    pub fn status(&self) -> Status {
        match self {
            ProtocolError::NoRoute { .. } => Status::NotFound,
            ProtocolError::PayloadTooLarge { .. } => Status::PayloadTooLarge,
            ProtocolError::Storage(e) => match e.kind() {
                ErrorKind::NotFound => Status::NotFound,
                ErrorKind::Invalid => Status::BadRequest,
                ErrorKind::AlreadyExists => Status::Conflict,
                ErrorKind::BackendUnavailable => Status::ServiceUnavailable,
            },
        }
    }
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
