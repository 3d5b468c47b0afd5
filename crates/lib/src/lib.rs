//!
//! Concord: a conflict detection and resolution engine for collaboratively
//! edited documents. This library provides the core components for tracking
//! versioned document elements, detecting conflicts between concurrent edits,
//! and resolving them under configurable policies.
//!
//! ## Core Concepts
//!
//! Concord is built around several key concepts:
//!
//! * **Elements (`element::Element`)**: The smallest addressable unit of document content
//!   tracked for conflict purposes (a paragraph, a cell, an embedded object). Each carries
//!   a monotonically increasing version.
//! * **Edits (`journal::Edit`)**: Proposed changes to an element, submitted against the
//!   version the author observed (the base version). Every edit ends in exactly one
//!   terminal status.
//! * **Conflicts (`conflict::Conflict`)**: Detected incompatibilities between two or more
//!   competing edits to the same element, classified as compatible, mergeable, or
//!   contradictory.
//! * **Strategies (`strategy`)**: Policy-selected resolution algorithms (last-write-wins,
//!   auto-merge, hierarchical precedence, manual merge, consensus).
//! * **Coordinator (`session::Coordinator`)**: The orchestrator that owns all state
//!   transitions: intake, detection, resolution, commit, and event notification.
//! * **Backends (`backend::Backend`)**: A pluggable storage layer for elements, edits,
//!   conflicts, and resolutions.

pub mod backend;
pub mod clock;
pub mod conflict;
pub mod constants;
pub mod element;
pub mod events;
pub mod journal;
pub mod policy;
pub mod session;
pub mod strategy;

pub use clock::{Clock, SystemClock};
pub use session::Coordinator;

#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;

/// Result type used throughout the Concord library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Concord library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured element errors from the element module
    #[error(transparent)]
    Element(element::ElementError),

    /// Structured change log errors from the journal module
    #[error(transparent)]
    Journal(journal::JournalError),

    /// Structured detection errors from the conflict module
    #[error(transparent)]
    Conflict(conflict::ConflictError),

    /// Structured configuration errors from the policy module
    #[error(transparent)]
    Policy(policy::PolicyError),

    /// Structured resolution errors from the strategy module
    #[error(transparent)]
    Strategy(strategy::StrategyError),

    /// Structured coordinator errors from the session module
    #[error(transparent)]
    Session(session::SessionError),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Element(_) => "element",
            Error::Journal(_) => "journal",
            Error::Conflict(_) => "conflict",
            Error::Policy(_) => "policy",
            Error::Strategy(_) => "strategy",
            Error::Session(_) => "session",
            Error::Backend(_) => "backend",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a referenced element, edit, conflict,
    /// or resolution does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Element(element_err) => element_err.is_not_found(),
            Error::Journal(journal_err) => journal_err.is_not_found(),
            Error::Conflict(conflict_err) => conflict_err.is_not_found(),
            Error::Backend(backend_err) => backend_err.is_not_found(),
            Error::Session(session_err) => session_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates an optimistic commit lost a race.
    pub fn is_version_mismatch(&self) -> bool {
        match self {
            Error::Element(element_err) => element_err.is_version_mismatch(),
            _ => false,
        }
    }

    /// Check if this error indicates an illegal state transition on an edit
    /// or conflict.
    pub fn is_invalid_transition(&self) -> bool {
        match self {
            Error::Journal(journal_err) => journal_err.is_invalid_transition(),
            Error::Conflict(conflict_err) => conflict_err.is_invalid_transition(),
            Error::Session(session_err) => session_err.is_invalid_transition(),
            _ => false,
        }
    }

    /// Check if this error is a policy configuration failure.
    pub fn is_invalid_policy(&self) -> bool {
        match self {
            Error::Policy(policy_err) => policy_err.is_invalid_policy(),
            Error::Strategy(strategy_err) => strategy_err.is_invalid_policy(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict the configured strategy
    /// could not resolve automatically.
    pub fn is_unresolvable(&self) -> bool {
        match self {
            Error::Strategy(strategy_err) => strategy_err.is_unresolvable(),
            _ => false,
        }
    }

    /// Check if this error is validation-related.
    pub fn is_validation_error(&self) -> bool {
        match self {
            Error::Journal(journal_err) => journal_err.is_invalid_transition(),
            Error::Policy(policy_err) => policy_err.is_invalid_policy(),
            Error::Session(session_err) => session_err.is_validation_error(),
            _ => false,
        }
    }

    /// Check if this error is storage-related.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }
}
