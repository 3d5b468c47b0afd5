//! Change log / timeline of edits.
//!
//! The journal is the append-only record of every edit ever submitted against
//! an element, with causality metadata: who submitted it, when, and which
//! element version the author had observed (the base version). Recording an
//! edit never rejects on conflict grounds; conflict detection is a separate
//! concern layered on top of the journal's ordered pending view.
//!
//! Edits move through a small state machine:
//!
//! ```text
//! Pending -> { Committed | Superseded | Rejected }
//!    |                         ^
//!    v                         |
//! AwaitingManualResolution ----+
//! ```
//!
//! Terminal statuses are sticky: re-marking an edit to the same terminal
//! status is a no-op, while any other transition out of a terminal status is
//! an [`JournalError::InvalidTransition`].

mod errors;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::element::{Content, ElementId, Version};

pub use errors::JournalError;

/// Unique identifier assigned to an edit at submission time.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct EditId(String);

impl EditId {
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

impl From<&str> for EditId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EditId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EditId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EditId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// Identity of the user or session that submitted an edit.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct AuthorId(String);

impl AuthorId {
    /// Creates an author identity from any string-like input.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// The engine's own identity, recorded on synthesized merge edits.
    pub fn system() -> Self {
        Self(crate::constants::SYSTEM_AUTHOR.to_string())
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AuthorId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for AuthorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for AuthorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

/// The proposed content change an edit carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditPayload {
    /// Full replacement of the element content. Touches the whole element.
    Replace(Content),

    /// Structured diff: replacement bytes for named regions. Regions not
    /// named are left untouched, which is what makes concurrent patches
    /// to disjoint regions mergeable.
    Patch { regions: BTreeMap<String, Vec<u8>> },

    /// Removal of the element from the document. Touches the whole element
    /// and leaves a tombstone on commit.
    Delete,
}

/// Result of applying a payload to committed content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedContent {
    /// New committed content.
    Content(Content),
    /// The element is tombstoned.
    Deleted,
}

impl EditPayload {
    /// The named regions this payload touches, or `None` when it touches the
    /// whole element (replacements and deletions).
    pub fn touched_regions(&self) -> Option<BTreeSet<&str>> {
        match self {
            EditPayload::Patch { regions } => {
                Some(regions.keys().map(String::as_str).collect())
            }
            EditPayload::Replace(_) | EditPayload::Delete => None,
        }
    }

    /// Whether two payloads touch an overlapping part of the element.
    ///
    /// Overlap is defined on named regions: payload region-name sets that
    /// intersect overlap, and whole-element payloads overlap everything.
    pub fn overlaps(&self, other: &EditPayload) -> bool {
        match (self.touched_regions(), other.touched_regions()) {
            (Some(mine), Some(theirs)) => mine.intersection(&theirs).next().is_some(),
            // Whole-element payloads conflict with anything
            _ => true,
        }
    }

    /// Applies this payload on top of the given committed content.
    pub fn apply_to(&self, prior: &Content) -> AppliedContent {
        match self {
            EditPayload::Replace(content) => AppliedContent::Content(content.clone()),
            EditPayload::Patch { regions } => {
                AppliedContent::Content(prior.with_regions_replaced(regions))
            }
            EditPayload::Delete => AppliedContent::Deleted,
        }
    }
}

/// Lifecycle status of an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EditStatus {
    /// Recorded, not yet decided.
    Pending,
    /// Waiting for an explicit human decision before it can terminate.
    AwaitingManualResolution,
    /// The edit's content is (part of) the element's committed state.
    Committed,
    /// A competing edit or synthesized merge won; this edit did not land.
    Superseded,
    /// Withdrawn or explicitly declined; never applied.
    Rejected,
}

impl EditStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EditStatus::Committed | EditStatus::Superseded | EditStatus::Rejected
        )
    }
}

/// Outcome of validating a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The transition is legal and changes the status.
    Apply,
    /// Re-marking to the identical status: legal, nothing to do.
    Noop,
}

/// Validates an edit status transition per the lifecycle state machine.
///
/// Idempotence rule: re-marking to the identical status is a no-op;
/// any other move out of a terminal status is illegal. `Pending` can be
/// re-entered from nowhere.
pub fn validate_transition(
    id: &EditId,
    from: EditStatus,
    to: EditStatus,
) -> crate::Result<Transition> {
    if from == to {
        return Ok(Transition::Noop);
    }
    let legal = match (from, to) {
        (EditStatus::Pending, EditStatus::AwaitingManualResolution) => true,
        (EditStatus::Pending, target) if target.is_terminal() => true,
        (EditStatus::AwaitingManualResolution, target) if target.is_terminal() => true,
        _ => false,
    };
    if legal {
        Ok(Transition::Apply)
    } else {
        Err(JournalError::InvalidTransition {
            id: id.clone(),
            from,
            to,
        }
        .into())
    }
}

/// A proposed change to an element, with its causality metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    /// Unique identifier assigned at submission time.
    pub edit_id: EditId,

    /// Target element.
    pub element_id: ElementId,

    /// Identity of the submitting user or session.
    pub author_id: AuthorId,

    /// The element version the author observed when starting the edit
    /// (its causal parent). Strictly less than the element's current version
    /// at commit time means a conflict exists by definition.
    pub base_version: Version,

    /// The proposed content change.
    pub payload: EditPayload,

    /// Submission timestamp in milliseconds since the Unix epoch, stamped by
    /// the coordinator's clock.
    pub submitted_at: u64,

    /// Lifecycle status.
    pub status: EditStatus,

    /// The element version this edit produced, set when it commits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_version: Option<Version>,
}

impl Edit {
    /// Deterministic ordering key: submission time, then edit ID.
    ///
    /// The tie-break keeps detection and resolution reproducible across
    /// retries even when two edits share a timestamp.
    pub fn order_key(&self) -> (u64, &EditId) {
        (self.submitted_at, &self.edit_id)
    }
}

/// Sorts edits into the journal's canonical submission order.
pub fn sort_by_submission(edits: &mut [Edit]) {
    edits.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
}
