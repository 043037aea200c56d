//! Error types for blob storage operations.

use thiserror::Error;

use crate::retry::RetryError;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while talking to the blob store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No object at the key.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// Access denied to the storage backend.
    #[error("access denied: {message}")]
    AccessDenied { message: String },

    /// Invalid store specification (URL parsing failed).
    #[error("invalid store spec '{spec}': {reason}")]
    InvalidSpec { spec: String, reason: String },

    /// Storage backend is not configured.
    #[error("store not configured: {message}")]
    NotConfigured { message: String },

    /// Network or I/O error.
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Generic error from the underlying object store.
    #[error("object store error: {0}")]
    ObjectStore(object_store::Error),

    /// Retries exhausted; carries the final error.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Returns true if this error indicates the object was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Exhausted { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// Returns true if this is an access/permission error.
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Whether retrying the same call can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NotFound { .. }
                | Self::AccessDenied { .. }
                | Self::InvalidSpec { .. }
                | Self::NotConfigured { .. }
                | Self::Exhausted { .. }
        )
    }

    /// Create from object_store error with context about the key.
    pub fn from_object_store(err: object_store::Error, key: &str) -> Self {
        match &err {
            object_store::Error::NotFound { .. } => StoreError::NotFound {
                key: key.to_string(),
            },
            object_store::Error::PermissionDenied { .. }
            | object_store::Error::Unauthenticated { .. } => StoreError::AccessDenied {
                message: err.to_string(),
            },
            _ => StoreError::ObjectStore(err),
        }
    }

    pub(crate) fn exhausted(operation: &'static str, err: RetryError<StoreError>) -> Self {
        if err.attempts <= 1 {
            return err.error;
        }
        StoreError::Exhausted {
            operation,
            attempts: err.attempts,
            source: Box::new(err.error),
        }
    }
}

impl From<object_store::Error> for StoreError {
    fn from(err: object_store::Error) -> Self {
        StoreError::from_object_store(err, "unknown")
    }
}
