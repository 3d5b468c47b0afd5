//! In-memory backend implementation
//!
//! This module provides an in-memory implementation of the [`Backend`] trait,
//! suitable for testing, development, or scenarios where persistence is
//! handled externally. All engine state lives behind one `RwLock`, which is
//! what makes `apply_resolution` a true single-writer transaction: every
//! multi-record change happens inside one write-lock scope and is never
//! observable half-done.
//!
//! Basic persistence is available via `save_to_file`/`load_from_file`,
//! serializing the whole state to JSON.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::Result;
use crate::conflict::{
    Conflict, ConflictError, ConflictId, Resolution, ResolutionId, ResolutionOutcome,
};
use crate::element::{Element, ElementError, ElementId, Version};
use crate::journal::{
    AppliedContent, AuthorId, Edit, EditId, EditPayload, EditStatus, JournalError, Transition,
    sort_by_submission, validate_transition,
};

use super::{Applied, Backend, BackendError, PlannedApply, ResolutionPlan, StoreCounts};

/// Full engine state held by the in-memory backend.
#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    elements: HashMap<ElementId, Element>,
    edits: HashMap<EditId, Edit>,
    conflicts: HashMap<ConflictId, Conflict>,
    resolutions: HashMap<ResolutionId, Resolution>,
    /// Consensus votes per open conflict: author -> canonical outcome key.
    votes: HashMap<ConflictId, BTreeMap<AuthorId, String>>,
}

/// A simple in-memory backend keeping all records in `HashMap`s behind a
/// single read-write lock.
#[derive(Debug, Default)]
pub struct InMemory {
    state: RwLock<State>,
}

impl InMemory {
    /// Creates a new, empty `InMemory` backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves the entire engine state to a file as JSON.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_str = path.as_ref().display().to_string();
        let state = self.state.read().await;
        let json = serde_json::to_string_pretty(&*state)?;
        std::fs::write(path.as_ref(), json).map_err(|source| BackendError::FileWrite {
            path: path_str,
            source,
        })?;
        Ok(())
    }

    /// Loads engine state from a JSON file previously written by
    /// `save_to_file`.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().display().to_string();
        let json =
            std::fs::read_to_string(path.as_ref()).map_err(|source| BackendError::FileRead {
                path: path_str.clone(),
                source,
            })?;
        let state: State =
            serde_json::from_str(&json).map_err(|source| BackendError::CorruptState {
                path: path_str,
                source,
            })?;
        Ok(Self {
            state: RwLock::new(state),
        })
    }
}

/// Applies a payload to an element under the state lock, bumping its version.
///
/// Infallible by construction: the callers have already done the version and
/// tombstone checks that can fail. Committing content onto a tombstoned
/// element revives it, which is how a resolution can decide an edit outranks
/// a deletion.
fn apply_payload_locked(state: &mut State, element_id: &ElementId, payload: &EditPayload) -> Version {
    let element = state
        .elements
        .entry(element_id.clone())
        .or_insert_with(|| Element::new(element_id.clone()));
    match payload.apply_to(&element.content) {
        AppliedContent::Content(content) => {
            element.content = content;
            element.deleted = false;
        }
        AppliedContent::Deleted => {
            element.deleted = true;
        }
    }
    element.current_version += 1;
    element.current_version
}

/// Marks an edit committed at the given version under the state lock.
fn mark_committed_locked(state: &mut State, edit_id: &EditId, version: Version) {
    if let Some(edit) = state.edits.get_mut(edit_id) {
        edit.status = EditStatus::Committed;
        edit.committed_version = Some(version);
    }
}

#[async_trait]
impl Backend for InMemory {
    async fn element(&self, id: &ElementId) -> Result<Option<Element>> {
        let state = self.state.read().await;
        Ok(state.elements.get(id).cloned())
    }

    async fn element_version(&self, id: &ElementId) -> Result<Version> {
        let state = self.state.read().await;
        state
            .elements
            .get(id)
            .map(|e| e.current_version)
            .ok_or_else(|| ElementError::NotFound { id: id.clone() }.into())
    }

    async fn tag_element(
        &self,
        id: &ElementId,
        doc: Option<String>,
        class: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let element = state
            .elements
            .entry(id.clone())
            .or_insert_with(|| Element::new(id.clone()));
        if doc.is_some() {
            element.doc = doc;
        }
        if class.is_some() {
            element.class = class;
        }
        Ok(())
    }

    async fn commit_edit(&self, edit_id: &EditId, expected_version: Version) -> Result<Version> {
        let mut state = self.state.write().await;
        let edit = state
            .edits
            .get(edit_id)
            .cloned()
            .ok_or_else(|| JournalError::EditNotFound { id: edit_id.clone() })?;

        // Re-committing an already committed edit is idempotent.
        if let Transition::Noop =
            validate_transition(edit_id, edit.status, EditStatus::Committed)?
            && let Some(version) = edit.committed_version
        {
            return Ok(version);
        }

        let current = state
            .elements
            .get(&edit.element_id)
            .map(|e| (e.current_version, e.deleted))
            .unwrap_or((0, false));
        if current.1 {
            return Err(ElementError::Deleted {
                id: edit.element_id.clone(),
            }
            .into());
        }
        if current.0 != expected_version {
            return Err(ElementError::VersionMismatch {
                id: edit.element_id.clone(),
                expected: expected_version,
                actual: current.0,
            }
            .into());
        }

        let new_version = apply_payload_locked(&mut state, &edit.element_id, &edit.payload);
        mark_committed_locked(&mut state, edit_id, new_version);
        tracing::debug!(
            edit = %edit_id,
            element = %edit.element_id,
            version = new_version,
            "edit committed"
        );
        Ok(new_version)
    }

    async fn record_edit(&self, edit: Edit) -> Result<()> {
        let mut state = self.state.write().await;
        if state.edits.contains_key(&edit.edit_id) {
            return Err(JournalError::DuplicateEdit {
                id: edit.edit_id.clone(),
            }
            .into());
        }
        state.edits.insert(edit.edit_id.clone(), edit);
        Ok(())
    }

    async fn edit(&self, id: &EditId) -> Result<Edit> {
        let state = self.state.read().await;
        state
            .edits
            .get(id)
            .cloned()
            .ok_or_else(|| JournalError::EditNotFound { id: id.clone() }.into())
    }

    async fn edits(&self, ids: &[EditId]) -> Result<Vec<Edit>> {
        let state = self.state.read().await;
        ids.iter()
            .map(|id| {
                state
                    .edits
                    .get(id)
                    .cloned()
                    .ok_or_else(|| JournalError::EditNotFound { id: id.clone() }.into())
            })
            .collect()
    }

    async fn pending_for(&self, element_id: &ElementId) -> Result<Vec<Edit>> {
        let state = self.state.read().await;
        let mut pending: Vec<Edit> = state
            .edits
            .values()
            .filter(|e| e.element_id == *element_id && !e.status.is_terminal())
            .cloned()
            .collect();
        sort_by_submission(&mut pending);
        Ok(pending)
    }

    async fn committed_after(&self, element_id: &ElementId, base: Version) -> Result<Vec<Edit>> {
        let state = self.state.read().await;
        let mut committed: Vec<Edit> = state
            .edits
            .values()
            .filter(|e| {
                e.element_id == *element_id
                    && e.status == EditStatus::Committed
                    && e.committed_version.is_some_and(|v| v > base)
            })
            .cloned()
            .collect();
        committed.sort_by_key(|e| e.committed_version);
        Ok(committed)
    }

    async fn mark_edit(&self, edit_id: &EditId, status: EditStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let edit = state
            .edits
            .get_mut(edit_id)
            .ok_or_else(|| JournalError::EditNotFound { id: edit_id.clone() })?;
        match validate_transition(edit_id, edit.status, status)? {
            Transition::Noop => Ok(()),
            Transition::Apply => {
                edit.status = status;
                Ok(())
            }
        }
    }

    async fn put_conflict(&self, conflict: Conflict) -> Result<()> {
        let mut state = self.state.write().await;
        state.conflicts.insert(conflict.conflict_id.clone(), conflict);
        Ok(())
    }

    async fn conflict(&self, id: &ConflictId) -> Result<Conflict> {
        let state = self.state.read().await;
        state
            .conflicts
            .get(id)
            .cloned()
            .ok_or_else(|| ConflictError::NotFound { id: id.clone() }.into())
    }

    async fn open_conflicts(&self) -> Result<Vec<Conflict>> {
        let state = self.state.read().await;
        let mut open: Vec<Conflict> = state
            .conflicts
            .values()
            .filter(|c| !c.is_resolved())
            .cloned()
            .collect();
        open.sort_by(|a, b| {
            (a.detected_at, &a.conflict_id).cmp(&(b.detected_at, &b.conflict_id))
        });
        Ok(open)
    }

    async fn open_conflict_for_edit(&self, edit_id: &EditId) -> Result<Option<Conflict>> {
        let open = self.open_conflicts().await?;
        Ok(open
            .into_iter()
            .find(|c| c.competing_edit_ids.contains(edit_id)))
    }

    async fn set_conflict_context(&self, id: &ConflictId, context: String) -> Result<()> {
        let mut state = self.state.write().await;
        let conflict = state
            .conflicts
            .get_mut(id)
            .ok_or_else(|| ConflictError::NotFound { id: id.clone() })?;
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved { id: id.clone() }.into());
        }
        conflict.context = Some(context);
        Ok(())
    }

    async fn record_vote(
        &self,
        conflict_id: &ConflictId,
        author: AuthorId,
        outcome_key: String,
    ) -> Result<u32> {
        let mut state = self.state.write().await;
        let conflict = state
            .conflicts
            .get(conflict_id)
            .ok_or_else(|| ConflictError::NotFound {
                id: conflict_id.clone(),
            })?;
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved {
                id: conflict_id.clone(),
            }
            .into());
        }
        let votes = state.votes.entry(conflict_id.clone()).or_default();
        votes.insert(author, outcome_key.clone());
        Ok(votes.values().filter(|key| **key == outcome_key).count() as u32)
    }

    async fn apply_resolution(&self, plan: ResolutionPlan) -> Result<Applied> {
        let mut state = self.state.write().await;
        let conflict = state
            .conflicts
            .get(&plan.conflict_id)
            .cloned()
            .ok_or_else(|| ConflictError::NotFound {
                id: plan.conflict_id.clone(),
            })?;
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved {
                id: plan.conflict_id.clone(),
            }
            .into());
        }

        let competitors: Vec<Edit> = conflict
            .competing_edit_ids
            .iter()
            .map(|id| {
                state
                    .edits
                    .get(id)
                    .cloned()
                    .ok_or_else(|| JournalError::EditNotFound { id: id.clone() })
            })
            .collect::<std::result::Result<_, _>>()?;

        let (outcome, new_version, committed_edit, losers) = match &plan.action {
            PlannedApply::CommitEdit { edit_id } => {
                let winner = competitors
                    .iter()
                    .find(|e| e.edit_id == *edit_id)
                    .cloned()
                    .ok_or_else(|| JournalError::EditNotFound { id: edit_id.clone() })?;
                let (new_version, committed_edit) = if winner.status == EditStatus::Committed {
                    // Committed history won over a stale submission; the
                    // element already holds the winning state.
                    (None, None)
                } else {
                    validate_transition(edit_id, winner.status, EditStatus::Committed)?;
                    let v = apply_payload_locked(&mut state, &winner.element_id, &winner.payload);
                    mark_committed_locked(&mut state, edit_id, v);
                    (Some(v), Some(edit_id.clone()))
                };
                let losers: Vec<EditId> = competitors
                    .iter()
                    .filter(|e| !e.status.is_terminal() && e.edit_id != *edit_id)
                    .map(|e| e.edit_id.clone())
                    .collect();
                (
                    ResolutionOutcome::ChoseEdit {
                        edit_id: edit_id.clone(),
                    },
                    new_version,
                    committed_edit,
                    losers,
                )
            }
            PlannedApply::CommitMerged {
                synthesized_edit_id,
                payload,
            } => {
                let current = state
                    .elements
                    .get(&conflict.element_id)
                    .map(|e| e.current_version)
                    .unwrap_or(0);
                let synthesized = Edit {
                    edit_id: synthesized_edit_id.clone(),
                    element_id: conflict.element_id.clone(),
                    author_id: AuthorId::system(),
                    base_version: current,
                    payload: payload.clone(),
                    submitted_at: plan.decided_at,
                    status: EditStatus::Pending,
                    committed_version: None,
                };
                state
                    .edits
                    .insert(synthesized_edit_id.clone(), synthesized);
                let v = apply_payload_locked(&mut state, &conflict.element_id, payload);
                mark_committed_locked(&mut state, synthesized_edit_id, v);
                let losers: Vec<EditId> = competitors
                    .iter()
                    .filter(|e| !e.status.is_terminal())
                    .map(|e| e.edit_id.clone())
                    .collect();
                (
                    ResolutionOutcome::Merged {
                        synthesized_edit_id: synthesized_edit_id.clone(),
                    },
                    Some(v),
                    Some(synthesized_edit_id.clone()),
                    losers,
                )
            }
            PlannedApply::RejectAll => {
                let rejected: Vec<EditId> = competitors
                    .iter()
                    .filter(|e| !e.status.is_terminal())
                    .map(|e| e.edit_id.clone())
                    .collect();
                for id in &rejected {
                    if let Some(edit) = state.edits.get_mut(id) {
                        edit.status = EditStatus::Rejected;
                    }
                }
                (ResolutionOutcome::RejectedAll, None, None, Vec::new())
            }
        };

        for loser in &losers {
            if let Some(edit) = state.edits.get_mut(loser) {
                edit.status = EditStatus::Superseded;
            }
        }

        let resolution = Resolution {
            resolution_id: plan.resolution_id.clone(),
            conflict_id: plan.conflict_id.clone(),
            strategy_used: plan.strategy_used,
            outcome,
            decided_by: plan.decided_by.clone(),
            decided_at: plan.decided_at,
        };
        state
            .resolutions
            .insert(plan.resolution_id.clone(), resolution.clone());
        if let Some(conflict) = state.conflicts.get_mut(&plan.conflict_id) {
            conflict.resolution = Some(plan.resolution_id.clone());
        }
        state.votes.remove(&plan.conflict_id);

        tracing::debug!(
            conflict = %plan.conflict_id,
            resolution = %plan.resolution_id,
            strategy = %plan.strategy_used,
            "resolution applied"
        );
        Ok(Applied {
            resolution,
            new_version,
            committed_edit,
        })
    }

    async fn resolution(&self, id: &ResolutionId) -> Result<Resolution> {
        let state = self.state.read().await;
        state
            .resolutions
            .get(id)
            .cloned()
            .ok_or_else(|| {
                ConflictError::ResolutionNotFound {
                    id: id.as_str().to_string(),
                }
                .into()
            })
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let state = self.state.read().await;
        Ok(StoreCounts {
            elements: state.elements.len(),
            edits: state.edits.len(),
            open_conflicts: state.conflicts.values().filter(|c| !c.is_resolved()).count(),
            resolutions: state.resolutions.len(),
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
