use std::io;
use thiserror::Error;

/// Main error type for vfswitch operations
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Mount already exists: {0}")]
    MountAlreadyExists(String),

    #[error("No mount for: {0}")]
    MountNotFound(String),

    #[error("Malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("Unknown wrapper: {0}")]
    UnknownWrapper(String),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("User required in call context")]
    ContextUserRequired,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// External status codes consumed by transport layers.
///
/// Transports must use [`StorageError::status`] verbatim instead of
/// deriving their own mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    StorageNotFound,
    StorageAlreadyExists,
    StorageNotSupported,
    StoragePermissionDenied,
    PathInvalid,
    ContextUserRequired,
    InvalidConfig,
    Cancelled,
    Unknown,
}

impl StorageError {
    /// Map the error kind to its external status code
    pub fn status(&self) -> StatusCode {
        match self {
            StorageError::MountAlreadyExists(_) => StatusCode::StorageAlreadyExists,
            StorageError::MountNotFound(_) => StatusCode::StorageNotFound,
            StorageError::MalformedIdentifier(_) => StatusCode::PathInvalid,
            StorageError::UnknownWrapper(_) => StatusCode::StorageNotSupported,
            StorageError::UnsupportedDriver(_) => StatusCode::StorageNotSupported,
            StorageError::NotFound(_) => StatusCode::StorageNotFound,
            StorageError::AlreadyExists(_) => StatusCode::StorageAlreadyExists,
            StorageError::PermissionDenied(_) => StatusCode::StoragePermissionDenied,
            StorageError::Cancelled => StatusCode::Cancelled,
            StorageError::InvalidPath(_) => StatusCode::PathInvalid,
            StorageError::NotSupported(_) => StatusCode::StorageNotSupported,
            StorageError::QuotaExceeded(_) => StatusCode::StoragePermissionDenied,
            StorageError::ContextUserRequired => StatusCode::ContextUserRequired,
            StorageError::Config(_) => StatusCode::InvalidConfig,
            StorageError::Io(e) if e.kind() == io::ErrorKind::NotFound => {
                StatusCode::StorageNotFound
            }
            StorageError::Io(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                StatusCode::StoragePermissionDenied
            }
            StorageError::Io(_) => StatusCode::Unknown,
            StorageError::Backend(_) => StatusCode::Unknown,
        }
    }

    /// Whether this error is raised by mount configuration rather than a call
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            StorageError::MountAlreadyExists(_)
                | StorageError::UnknownWrapper(_)
                | StorageError::UnsupportedDriver(_)
                | StorageError::Config(_)
        )
    }
}

/// Status code for a call outcome, `Ok` on success
pub fn status_of<T>(result: &Result<T>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::Ok,
        Err(e) => e.status(),
    }
}

/// Result type alias for vfswitch operations
pub type Result<T> = std::result::Result<T, StorageError>;
