//! Policy configuration specific errors

use thiserror::Error;

/// Errors raised while validating or interpreting policy configuration.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A strategy name did not match any known strategy
    #[error("Unknown strategy name: '{name}'")]
    UnknownStrategy { name: String },

    /// Consensus strategies need a quorum size
    #[error("Strategy '{strategy}' requires a configured quorum")]
    QuorumRequired { strategy: String },

    /// A quorum of zero approvers can never be reached meaningfully
    #[error("Quorum must be at least 1")]
    ZeroQuorum,

    /// The fallback chain loops back into auto-merge
    #[error("Auto-merge cannot be its own fallback strategy")]
    RecursiveFallback,
}

impl PolicyError {
    /// Check if this error is a policy configuration failure
    pub fn is_invalid_policy(&self) -> bool {
        // Every variant is a configuration failure
        true
    }
}

// Conversion from PolicyError to the main Error type
impl From<PolicyError> for crate::Error {
    fn from(err: PolicyError) -> Self {
        crate::Error::Policy(err)
    }
}
