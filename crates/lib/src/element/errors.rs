//! Element model specific errors
//!
//! Errors raised by the versioned element store: unknown elements and
//! optimistic commits that lost a race.

use thiserror::Error;

use super::{ElementId, Version};

/// Errors that can occur while reading or committing element state.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ElementError {
    /// The referenced element does not exist
    #[error("Element not found: {id}")]
    NotFound { id: ElementId },

    /// An optimistic commit observed a different stored version
    #[error("Version mismatch on element '{id}': expected {expected}, found {actual}")]
    VersionMismatch {
        id: ElementId,
        expected: Version,
        actual: Version,
    },

    /// The element has been deleted and cannot accept new content
    #[error("Element '{id}' is deleted")]
    Deleted { id: ElementId },
}

impl ElementError {
    /// Check if this error indicates the element was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, ElementError::NotFound { .. })
    }

    /// Check if this error indicates an optimistic commit lost a race
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, ElementError::VersionMismatch { .. })
    }

    /// Check if this error indicates the element is tombstoned
    pub fn is_deleted(&self) -> bool {
        matches!(self, ElementError::Deleted { .. })
    }
}

// Conversion from ElementError to the main Error type
impl From<ElementError> for crate::Error {
    fn from(err: ElementError) -> Self {
        crate::Error::Element(err)
    }
}
