//! Coordinator specific errors
//!
//! These cover integration mistakes on the coordinator's inbound surface:
//! bad causality claims, decisions referencing edits outside a conflict, and
//! manual-path misuse. Degradable strategy failures never surface here; the
//! coordinator converts those into awaiting-manual-resolution outcomes.

use thiserror::Error;

use crate::conflict::ConflictId;
use crate::element::{ElementId, Version};
use crate::journal::{AuthorId, EditId};

/// Errors raised by the resolution session coordinator.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// A submission claimed a base version newer than the element itself
    #[error(
        "Base version {base_version} is ahead of element '{element_id}' at version {current_version}"
    )]
    BaseVersionAhead {
        element_id: ElementId,
        base_version: Version,
        current_version: Version,
    },

    /// Only the submitting author may withdraw an edit
    #[error("Edit '{edit_id}' belongs to '{owner}', not '{author}'")]
    NotEditAuthor {
        edit_id: EditId,
        author: AuthorId,
        owner: AuthorId,
    },

    /// A conflicted edit can only terminate through its conflict's resolution
    #[error(
        "Edit '{edit_id}' is referenced by open conflict '{conflict_id}'; \
         withdraw it through a manual decision on the conflict"
    )]
    EditInConflict {
        edit_id: EditId,
        conflict_id: ConflictId,
    },

    /// A manual decision chose an edit that is not competing in the conflict
    #[error("Edit '{edit_id}' is not competing in conflict '{conflict_id}'")]
    OutcomeNotCompeting {
        conflict_id: ConflictId,
        edit_id: EditId,
    },

    /// A consensus vote arrived from an author outside the approver set
    #[error("Author '{author}' is not a designated approver for conflict '{conflict_id}'")]
    NotAnApprover {
        conflict_id: ConflictId,
        author: AuthorId,
    },
}

impl SessionError {
    /// Check if this error indicates a missing referent
    pub fn is_not_found(&self) -> bool {
        false
    }

    /// Check if this error indicates an illegal state change
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, SessionError::EditInConflict { .. })
    }

    /// Check if this error is validation-related
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            SessionError::BaseVersionAhead { .. }
                | SessionError::OutcomeNotCompeting { .. }
                | SessionError::NotAnApprover { .. }
                | SessionError::NotEditAuthor { .. }
        )
    }
}

// Conversion from SessionError to the main Error type
impl From<SessionError> for crate::Error {
    fn from(err: SessionError) -> Self {
        crate::Error::Session(err)
    }
}
