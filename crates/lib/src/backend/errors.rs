//! Storage backend specific errors
//!
//! Domain-level failures (unknown elements, version mismatches, illegal
//! transitions) are reported through the owning module's error types; the
//! variants here cover the storage layer itself.

use thiserror::Error;

/// Errors raised by backend storage implementations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Reading a persisted state file failed
    #[error("Failed to read state file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },

    /// Writing a persisted state file failed
    #[error("Failed to write state file '{path}': {source}")]
    FileWrite {
        path: String,
        source: std::io::Error,
    },

    /// A persisted state file could not be decoded
    #[error("State file '{path}' is corrupt: {source}")]
    CorruptState {
        path: String,
        source: serde_json::Error,
    },
}

impl BackendError {
    /// Check if this error indicates a missing state file
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::FileRead { source, .. }
                if source.kind() == std::io::ErrorKind::NotFound
        )
    }

    /// Check if this error is I/O related
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileRead { .. } | BackendError::FileWrite { .. }
        )
    }
}

// Conversion from BackendError to the main Error type
impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
