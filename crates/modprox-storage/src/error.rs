//! Storage error types.

use std::fmt;

/// Boxed source error carried by [`StorageError::BackendUnavailable`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The coordinate, or the version under it, has never been published.
    #[error("{}", not_found_message(.coordinate, .version))]
    NotFound {
        coordinate: String,
        version: Option<String>,
    },

    /// The version already has committed artifacts.
    #[error("module '{coordinate}@{version}' already published")]
    AlreadyExists { coordinate: String, version: String },

    /// Malformed identifier or incomplete payload.
    #[error("invalid input: {detail}")]
    Invalid { detail: String },

    /// The storage medium could not be read or written.
    #[error("storage backend unavailable ({context}): {source}")]
    BackendUnavailable {
        context: String,
        #[source]
        source: BoxError,
    },
}

/// The four-way classification callers map to protocol responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Invalid,
    BackendUnavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Invalid => "invalid",
            ErrorKind::BackendUnavailable => "backend unavailable",
        };
        f.write_str(label)
    }
}

impl StorageError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound { .. } => ErrorKind::NotFound,
            StorageError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            StorageError::Invalid { .. } => ErrorKind::Invalid,
            StorageError::BackendUnavailable { .. } => ErrorKind::BackendUnavailable,
        }
    }

    /// Build an [`StorageError::Invalid`] from a detail message.
    pub fn invalid(detail: impl Into<String>) -> Self {
        StorageError::Invalid {
            detail: detail.into(),
        }
    }

    /// Wrap a medium failure with the operation that hit it.
    pub fn unavailable(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        StorageError::BackendUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    /// The coordinate itself is unknown.
    pub fn module_not_found(coordinate: impl fmt::Display) -> Self {
        StorageError::NotFound {
            coordinate: coordinate.to_string(),
            version: None,
        }
    }

    /// The coordinate is known but the version is not.
    pub fn version_not_found(
        coordinate: impl fmt::Display,
        version: impl fmt::Display,
    ) -> Self {
        StorageError::NotFound {
            coordinate: coordinate.to_string(),
            version: Some(version.to_string()),
        }
    }
}

fn not_found_message(coordinate: &str, version: &Option<String>) -> String {
    match version {
        Some(version) => format!("version {version} not found for module '{coordinate}'"),
        None => format!("module not found: {coordinate}"),
    }
}

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
