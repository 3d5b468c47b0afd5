//! Storage backends for Concord engine state.
//!
//! The [`Backend`] trait abstracts the persistence of elements, edits,
//! conflicts, resolutions, and consensus votes, so the coordinator logic is
//! independent of the specific storage mechanism. Two contracts matter more
//! than anything else here:
//!
//! * `commit_edit` is the optimistic-concurrency primitive: it applies an
//!   edit's payload if and only if the caller's expected version matches the
//!   stored element version, failing with a version mismatch otherwise.
//! * `apply_resolution` is the single-writer transaction boundary: the edit
//!   status updates, the element commit, and the immutable resolution record
//!   become durable together or not at all.

mod errors;
mod in_memory;

use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::conflict::{Conflict, ConflictId, DecidedBy, Resolution, ResolutionId};
use crate::element::{Element, ElementId, Version};
use crate::journal::{AuthorId, Edit, EditId, EditPayload, EditStatus};
use crate::policy::Strategy;

pub use errors::BackendError;
pub use in_memory::InMemory;

/// The transactional apply instruction the coordinator hands to the backend
/// once a resolution decision has been made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// The conflict being settled. Must not already carry a resolution.
    pub conflict_id: ConflictId,
    /// Identifier for the resolution record to write.
    pub resolution_id: ResolutionId,
    /// The strategy that produced the decision.
    pub strategy_used: Strategy,
    /// Who decided.
    pub decided_by: DecidedBy,
    /// Decision timestamp in milliseconds since the Unix epoch.
    pub decided_at: u64,
    /// What to do to the element and the competing edits.
    pub action: PlannedApply,
}

/// The concrete state change a resolution performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedApply {
    /// Commit the chosen competing edit (a no-op element-wise when the chosen
    /// edit is already committed history); the remaining non-terminal
    /// competitors become superseded.
    CommitEdit { edit_id: EditId },
    /// Store and commit a synthesized edit carrying the merged payload; all
    /// non-terminal competitors become superseded.
    CommitMerged {
        synthesized_edit_id: EditId,
        payload: EditPayload,
    },
    /// Reject every non-terminal competitor and leave the element untouched.
    RejectAll,
}

/// What a resolution apply actually did, for event emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    /// The stored resolution record.
    pub resolution: Resolution,
    /// The element version produced, when content was committed.
    pub new_version: Option<Version>,
    /// The edit whose payload landed (chosen or synthesized), when content
    /// was committed.
    pub committed_edit: Option<EditId>,
}

/// Record counts, for diagnostics and the CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub elements: usize,
    pub edits: usize,
    pub open_conflicts: usize,
    pub resolutions: usize,
}

/// Storage abstraction for engine state.
///
/// All implementations must be `Send` and `Sync` to allow sharing across
/// tasks, and implement `Any` to allow for downcasting if needed. Methods
/// returning collections order them deterministically (submission order for
/// edits) so detection and resolution stay reproducible.
#[async_trait]
pub trait Backend: Send + Sync + Any {
    /// Retrieves an element's committed state, or `None` when the element
    /// has not been introduced yet.
    async fn element(&self, id: &ElementId) -> Result<Option<Element>>;

    /// The element's current committed version. Fails with a not-found error
    /// for unknown elements.
    async fn element_version(&self, id: &ElementId) -> Result<Version>;

    /// Registers document/class labels for an element, creating the element
    /// at version 0 if it does not exist yet. Labels drive policy lookup.
    async fn tag_element(
        &self,
        id: &ElementId,
        doc: Option<String>,
        class: Option<String>,
    ) -> Result<()>;

    /// Atomically applies a pending edit's payload if and only if
    /// `expected_version` equals the stored current version, returning the
    /// new version. Fails with a version mismatch otherwise. Commits against
    /// an absent element succeed when `expected_version` is 0, introducing
    /// the element.
    async fn commit_edit(&self, edit_id: &EditId, expected_version: Version) -> Result<Version>;

    /// Appends an edit to the journal in `Pending` status. Never rejects on
    /// conflict grounds.
    async fn record_edit(&self, edit: Edit) -> Result<()>;

    /// Retrieves an edit by ID.
    async fn edit(&self, id: &EditId) -> Result<Edit>;

    /// Retrieves several edits by ID, preserving the requested order.
    async fn edits(&self, ids: &[EditId]) -> Result<Vec<Edit>>;

    /// All non-terminal edits targeting an element, in canonical submission
    /// order (submission time, then edit ID).
    async fn pending_for(&self, element_id: &ElementId) -> Result<Vec<Edit>>;

    /// Committed edits on an element whose resulting version is greater than
    /// `base`, ordered by the version they produced.
    async fn committed_after(&self, element_id: &ElementId, base: Version) -> Result<Vec<Edit>>;

    /// Transitions an edit's status per the journal state machine.
    /// Idempotent for the identical status; an illegal transition fails.
    async fn mark_edit(&self, edit_id: &EditId, status: EditStatus) -> Result<()>;

    /// Stores a newly detected conflict record.
    async fn put_conflict(&self, conflict: Conflict) -> Result<()>;

    /// Retrieves a conflict by ID.
    async fn conflict(&self, id: &ConflictId) -> Result<Conflict>;

    /// All conflicts with no resolution attached, ordered by detection time
    /// then conflict ID.
    async fn open_conflicts(&self) -> Result<Vec<Conflict>>;

    /// The open conflict referencing an edit, if any.
    async fn open_conflict_for_edit(&self, edit_id: &EditId) -> Result<Option<Conflict>>;

    /// Records degradation context on an open conflict (strategy failure,
    /// retry exhaustion).
    async fn set_conflict_context(&self, id: &ConflictId, context: String) -> Result<()>;

    /// Records an approver's vote for an outcome on an open conflict,
    /// replacing the author's previous vote. Returns how many votes that
    /// outcome now holds.
    async fn record_vote(
        &self,
        conflict_id: &ConflictId,
        author: AuthorId,
        outcome_key: String,
    ) -> Result<u32>;

    /// Applies a resolution as one transaction: validates the conflict has
    /// no resolution yet, performs the planned element/edit changes, writes
    /// the resolution record, and attaches it to the conflict. Partial
    /// application is never observable.
    async fn apply_resolution(&self, plan: ResolutionPlan) -> Result<Applied>;

    /// Retrieves a resolution record by ID.
    async fn resolution(&self, id: &ResolutionId) -> Result<Resolution>;

    /// Record counts for diagnostics.
    async fn counts(&self) -> Result<StoreCounts>;

    /// Returns a reference to the backend instance as a dynamic `Any` type,
    /// allowing downcasting to a concrete implementation.
    fn as_any(&self) -> &dyn Any;
}
