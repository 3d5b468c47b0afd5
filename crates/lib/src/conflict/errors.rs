//! Conflict record specific errors

use thiserror::Error;

use super::ConflictId;

/// Errors raised around conflict and resolution records.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The referenced conflict does not exist
    #[error("Conflict not found: {id}")]
    NotFound { id: ConflictId },

    /// The referenced resolution does not exist
    #[error("Resolution not found: {id}")]
    ResolutionNotFound { id: String },

    /// A resolution is already attached to this conflict
    #[error("Conflict '{id}' already has a resolution attached")]
    AlreadyResolved { id: ConflictId },

    /// A conflict must reference at least two competing edits
    #[error("Conflict on element '{element_id}' references fewer than two edits")]
    TooFewCompetitors { element_id: String },
}

impl ConflictError {
    /// Check if this error indicates a missing conflict or resolution
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ConflictError::NotFound { .. } | ConflictError::ResolutionNotFound { .. }
        )
    }

    /// Check if this error indicates an illegal second resolution
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, ConflictError::AlreadyResolved { .. })
    }
}

// Conversion from ConflictError to the main Error type
impl From<ConflictError> for crate::Error {
    fn from(err: ConflictError) -> Self {
        crate::Error::Conflict(err)
    }
}
