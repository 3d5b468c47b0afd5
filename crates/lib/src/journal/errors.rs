//! Change log specific errors

use thiserror::Error;

use super::{EditId, EditStatus};

/// Errors raised by the append-only change log.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum JournalError {
    /// The referenced edit does not exist
    #[error("Edit not found: {id}")]
    EditNotFound { id: EditId },

    /// An edit with this ID has already been recorded
    #[error("Edit already recorded: {id}")]
    DuplicateEdit { id: EditId },

    /// Attempted an illegal status transition on an edit
    #[error("Invalid edit status transition on '{id}': {from:?} -> {to:?}")]
    InvalidTransition {
        id: EditId,
        from: EditStatus,
        to: EditStatus,
    },
}

impl JournalError {
    /// Check if this error indicates the edit was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, JournalError::EditNotFound { .. })
    }

    /// Check if this error indicates an illegal status transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, JournalError::InvalidTransition { .. })
    }
}

// Conversion from JournalError to the main Error type
impl From<JournalError> for crate::Error {
    fn from(err: JournalError) -> Self {
        crate::Error::Journal(err)
    }
}
