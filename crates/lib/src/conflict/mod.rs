//! Conflict and resolution records.
//!
//! A conflict is the detected incompatibility between two or more edits that
//! targeted the same element from an overlapping base-version range. Conflict
//! records are created at detection time and become immutable audit records
//! once a resolution is attached; exactly one resolution is ever attached to
//! a conflict.

mod detect;
mod errors;

use serde::{Deserialize, Serialize};

use crate::element::ElementId;
use crate::journal::{AuthorId, EditId};
use crate::policy::Strategy;

pub use detect::{Detection, DetectionInput, classify};
pub use errors::ConflictError;

/// Unique identifier of a detected conflict.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ConflictId(String);

impl ConflictId {
    /// Creates an ID from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generates a fresh random ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConflictId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConflictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// Unique identifier of a resolution record.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct ResolutionId(String);

impl ResolutionId {
    /// Creates an ID from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Generates a fresh random ID.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ResolutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// How a set of competing edits relates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// No real conflict: the edit can commit directly. Never produces a
    /// conflict record.
    Compatible,
    /// The edits touch disjoint named regions and can be combined
    /// structurally.
    Mergeable,
    /// The edits contradict each other; a strategy decision or manual input
    /// is required.
    Contradictory,
}

/// A detected incompatibility between competing edits to one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Unique identifier of this conflict.
    pub conflict_id: ConflictId,

    /// The element the competing edits target.
    pub element_id: ElementId,

    /// The competing edits, in canonical submission order. Always at least
    /// two references: the incoming edit plus the pending or committed edits
    /// it collided with.
    pub competing_edit_ids: Vec<EditId>,

    /// Detection timestamp in milliseconds since the Unix epoch.
    pub detected_at: u64,

    /// How the competing edits relate.
    pub classification: Classification,

    /// The resolution that settled this conflict, once decided. A conflict
    /// is immutable after this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionId>,

    /// Context recorded when automated resolution degraded to manual input
    /// (strategy failure, retry exhaustion). Gives a human or downstream UI
    /// enough to act on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl Conflict {
    /// Whether a resolution has been attached.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Who made a resolution decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecidedBy {
    /// An automated strategy decided.
    System,
    /// A specific author decided through the manual path.
    Author(AuthorId),
}

/// What a resolution did to the element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionOutcome {
    /// One competing edit won and was committed (or was already committed).
    ChoseEdit { edit_id: EditId },
    /// A synthesized edit combining the competitors was committed.
    Merged { synthesized_edit_id: EditId },
    /// All competing edits were rejected; the element was left untouched.
    RejectedAll,
}

/// The recorded, terminal decision that settled a conflict.
///
/// Written atomically with the edit status updates and the element commit;
/// immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    /// Unique identifier of this resolution.
    pub resolution_id: ResolutionId,

    /// The conflict this resolution settles.
    pub conflict_id: ConflictId,

    /// The strategy that produced the decision.
    pub strategy_used: Strategy,

    /// What happened to the element.
    pub outcome: ResolutionOutcome,

    /// Who decided.
    pub decided_by: DecidedBy,

    /// Decision timestamp in milliseconds since the Unix epoch.
    pub decided_at: u64,
}
