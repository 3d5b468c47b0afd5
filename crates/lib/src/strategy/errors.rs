//! Resolution strategy specific errors

use thiserror::Error;

use crate::conflict::ConflictId;
use crate::policy::PolicyError;

/// Errors raised by strategy evaluation.
///
/// These never crash the coordinator: it degrades the conflict to awaiting
/// manual resolution with the error recorded as context.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The strategy cannot produce an automated outcome for this conflict
    #[error("Conflict '{conflict_id}' cannot be resolved automatically: {reason}")]
    Unresolvable {
        conflict_id: ConflictId,
        reason: String,
    },

    /// The competing edit set was empty or inconsistent with the conflict
    #[error("Conflict '{conflict_id}' has no competing edits to evaluate")]
    NoCompetitors { conflict_id: ConflictId },

    /// Policy configuration failure surfaced during evaluation
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl StrategyError {
    /// Check if this error indicates an automatically unresolvable conflict
    pub fn is_unresolvable(&self) -> bool {
        matches!(self, StrategyError::Unresolvable { .. })
    }

    /// Check if this error is a policy configuration failure
    pub fn is_invalid_policy(&self) -> bool {
        matches!(self, StrategyError::Policy(_))
    }
}

// Conversion from StrategyError to the main Error type
impl From<StrategyError> for crate::Error {
    fn from(err: StrategyError) -> Self {
        crate::Error::Strategy(err)
    }
}
