//! Bounded retry behavior when optimistic commits keep losing races.
//!
//! The racing backend decorator fails every commit with a version mismatch,
//! simulating a pathologically contended element, while delegating all other
//! operations to a real in-memory store.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use concord::backend::{
    Applied, Backend, InMemory, ResolutionPlan, StoreCounts,
};
use concord::conflict::{Conflict, ConflictId, Resolution, ResolutionId};
use concord::element::{Element, ElementError, ElementId, Version};
use concord::journal::{AuthorId, Edit, EditId, EditStatus};
use concord::session::SubmitOutcome;
use concord::{Coordinator, FixedClock, Result};

use crate::helpers::*;

/// Wraps an [`InMemory`] backend and makes every `commit_edit` lose its
/// optimistic race.
struct RacingBackend {
    inner: InMemory,
    commit_attempts: AtomicU32,
}

impl RacingBackend {
    fn new() -> Self {
        Self {
            inner: InMemory::new(),
            commit_attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Backend for RacingBackend {
    async fn element(&self, id: &ElementId) -> Result<Option<Element>> {
        self.inner.element(id).await
    }

    async fn element_version(&self, id: &ElementId) -> Result<Version> {
        self.inner.element_version(id).await
    }

    async fn tag_element(
        &self,
        id: &ElementId,
        doc: Option<String>,
        class: Option<String>,
    ) -> Result<()> {
        self.inner.tag_element(id, doc, class).await
    }

    async fn commit_edit(&self, edit_id: &EditId, expected_version: Version) -> Result<Version> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        let edit = self.inner.edit(edit_id).await?;
        Err(ElementError::VersionMismatch {
            id: edit.element_id,
            expected: expected_version,
            actual: expected_version + 1,
        }
        .into())
    }

    async fn record_edit(&self, edit: Edit) -> Result<()> {
        self.inner.record_edit(edit).await
    }

    async fn edit(&self, id: &EditId) -> Result<Edit> {
        self.inner.edit(id).await
    }

    async fn edits(&self, ids: &[EditId]) -> Result<Vec<Edit>> {
        self.inner.edits(ids).await
    }

    async fn pending_for(&self, element_id: &ElementId) -> Result<Vec<Edit>> {
        self.inner.pending_for(element_id).await
    }

    async fn committed_after(&self, element_id: &ElementId, base: Version) -> Result<Vec<Edit>> {
        self.inner.committed_after(element_id, base).await
    }

    async fn mark_edit(&self, edit_id: &EditId, status: EditStatus) -> Result<()> {
        self.inner.mark_edit(edit_id, status).await
    }

    async fn put_conflict(&self, conflict: Conflict) -> Result<()> {
        self.inner.put_conflict(conflict).await
    }

    async fn conflict(&self, id: &ConflictId) -> Result<Conflict> {
        self.inner.conflict(id).await
    }

    async fn open_conflicts(&self) -> Result<Vec<Conflict>> {
        self.inner.open_conflicts().await
    }

    async fn open_conflict_for_edit(&self, edit_id: &EditId) -> Result<Option<Conflict>> {
        self.inner.open_conflict_for_edit(edit_id).await
    }

    async fn set_conflict_context(&self, id: &ConflictId, context: String) -> Result<()> {
        self.inner.set_conflict_context(id, context).await
    }

    async fn record_vote(
        &self,
        conflict_id: &ConflictId,
        author: AuthorId,
        outcome_key: String,
    ) -> Result<u32> {
        self.inner.record_vote(conflict_id, author, outcome_key).await
    }

    async fn apply_resolution(&self, plan: ResolutionPlan) -> Result<Applied> {
        self.inner.apply_resolution(plan).await
    }

    async fn resolution(&self, id: &ResolutionId) -> Result<Resolution> {
        self.inner.resolution(id).await
    }

    async fn counts(&self) -> Result<StoreCounts> {
        self.inner.counts().await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn retry_exhaustion_surfaces_awaiting_manual_resolution() {
    let backend = Arc::new(RacingBackend::new());
    let clock = Arc::new(FixedClock::default());
    let coordinator = Coordinator::open_with_clock(backend.clone(), clock);

    let handle = coordinator
        .submit_edit("para-1", "alice", 0, replace("contended"))
        .await
        .unwrap();

    // The retry budget bounds the loop; the call neither errors nor spins
    assert_eq!(
        backend.commit_attempts.load(Ordering::SeqCst),
        concord::constants::MAX_COMMIT_RETRIES
    );

    let SubmitOutcome::Conflicted {
        conflict_id,
        edit_status,
    } = handle.outcome
    else {
        panic!("expected escalation, got a commit");
    };
    assert_eq!(edit_status, EditStatus::AwaitingManualResolution);

    let conflict = coordinator.backend().conflict(&conflict_id).await.unwrap();
    assert!(!conflict.is_resolved());
    let context = conflict.context.expect("exhaustion context must be recorded");
    assert!(context.contains("retry budget exhausted"));
}
