//! VFS and object store error types.

use std::io;
use thiserror::Error;

/// Error reported by an [`ObjectStore`](crate::store::ObjectStore) backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// No object under this key.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Transport, auth, or quota failure talking to the store.
    #[error("{op} {key}: {message}")]
    Backend {
        op: &'static str,
        key: String,
        message: String,
    },
}

impl StoreError {
    /// Create a NotFound error.
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    /// Create a Backend error.
    pub fn backend(op: &'static str, key: impl Into<String>, message: impl ToString) -> Self {
        Self::Backend {
            op,
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if the store reported the key as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Store result type.
pub type StoreResult<T> = Result<T, StoreError>;

/// VFS error type.
#[derive(Debug, Error)]
pub enum VfsError {
    /// No object or directory marker at the path.
    #[error("no such file: {0}")]
    NotFound(String),

    /// The store could not complete the call. The operation was aborted.
    #[error("storage unavailable at {path}: {source}")]
    StorageUnavailable {
        path: String,
        #[source]
        source: StoreError,
    },

    /// Operation intentionally not implemented.
    #[error("{0} is not supported")]
    Unsupported(String),

    /// The caller broke the handle contract (write after close, double close).
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Write would grow the object past the configured maximum size.
    #[error("{path} would exceed the maximum object size of {limit} bytes")]
    TooLarge { path: String, limit: u64 },

    /// The session was torn down while the call was in flight.
    #[error("operation on {0} cancelled")]
    Cancelled(String),
}

impl VfsError {
    /// Create a NotFound error.
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(what: impl Into<String>) -> Self {
        Self::Unsupported(what.into())
    }

    /// Create a PreconditionViolation error.
    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionViolation(msg.into())
    }

    /// Classify a store error against the path the caller asked for.
    ///
    /// A store-level not-found becomes [`VfsError::NotFound`]; every other
    /// failure is wrapped as storage-unavailable with the path attached.
    pub fn from_store(path: impl Into<String>, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound(path.into()),
            other => Self::StorageUnavailable {
                path: path.into(),
                source: other,
            },
        }
    }

    /// Wrap a store error as storage-unavailable, even a not-found.
    ///
    /// Used where an absent key means the store misbehaved rather than the
    /// caller naming a missing file.
    pub fn storage(path: impl Into<String>, err: StoreError) -> Self {
        Self::StorageUnavailable {
            path: path.into(),
            source: err,
        }
    }

    /// Returns true if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VfsError::NotFound(_))
    }
}

/// Convert VfsError to std::io::Error for compatibility.
impl From<VfsError> for io::Error {
    fn from(e: VfsError) -> Self {
        match e {
            VfsError::NotFound(msg) => io::Error::new(io::ErrorKind::NotFound, msg),
            VfsError::Unsupported(msg) => io::Error::new(io::ErrorKind::Unsupported, msg),
            VfsError::PreconditionViolation(msg) => {
                io::Error::new(io::ErrorKind::InvalidInput, msg)
            }
            VfsError::TooLarge { .. } => io::Error::new(io::ErrorKind::FileTooLarge, e.to_string()),
            VfsError::Cancelled(_) => io::Error::new(io::ErrorKind::Interrupted, e.to_string()),
            VfsError::StorageUnavailable { .. } => io::Error::other(e),
        }
    }
}

/// VFS result type.
pub type VfsResult<T> = Result<T, VfsError>;
