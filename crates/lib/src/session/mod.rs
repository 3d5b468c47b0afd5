//! Resolution session coordinator.
//!
//! The [`Coordinator`] orchestrates the end-to-end flow: intake an edit,
//! record it in the journal, run conflict detection, apply the configured
//! resolution strategy, commit or escalate, and notify subscribers. It is the
//! only component that transitions Edit/Conflict/Resolution state or mutates
//! elements; detection and strategy evaluation stay pure and merely advise it.
//!
//! Concurrency control is scoped per element: submissions against disjoint
//! elements never contend, and a submission that loses the optimistic commit
//! race re-runs detection against fresh state a bounded number of times
//! before surfacing the edit as awaiting manual resolution.
//!
//! Manual-resolution timeouts are checked **on access**: when an expired
//! conflict is touched (resolution attempt, manual decision, or an explicit
//! [`Coordinator::check_timeouts`] sweep), the coordinator escalates it by
//! applying last-write-wins. There is no background timer.

mod errors;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::backend::{Backend, PlannedApply, ResolutionPlan};
use crate::clock::{Clock, SystemClock};
use crate::conflict::{
    Classification, Conflict, ConflictError, ConflictId, DecidedBy, Detection, DetectionInput,
    Resolution, ResolutionId, classify,
};
use crate::constants::MAX_COMMIT_RETRIES;
use crate::element::{Content, ElementId, Version};
use crate::events::{EngineEvent, EventHook, EventHookCollection};
use crate::journal::{AuthorId, Edit, EditId, EditPayload, EditStatus};
use crate::policy::{Policy, PolicyBook, Strategy};
use crate::strategy::{Decision, PlannedAction, StrategyError};

pub use errors::SessionError;

/// What happened to a submitted edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The edit committed directly; the element is at the returned version.
    Committed { new_version: Version },
    /// The edit collided with concurrent or committed state. The conflict
    /// may already have been resolved automatically; `edit_status` reports
    /// where this edit ended up.
    Conflicted {
        conflict_id: ConflictId,
        edit_status: EditStatus,
    },
}

/// Handle returned from a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditHandle {
    /// The identifier assigned to the submitted edit.
    pub edit_id: EditId,
    /// The element the edit targeted.
    pub element_id: ElementId,
    /// What happened.
    pub outcome: SubmitOutcome,
}

/// Outcome of a resolution attempt on a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// A resolution was applied and the conflict is settled.
    Resolved {
        resolution: Resolution,
        new_version: Option<Version>,
    },
    /// The conflict needs explicit human input before it can settle.
    AwaitingManual {
        conflict_id: ConflictId,
        reason: String,
    },
    /// A consensus vote was recorded but the quorum is not yet reached.
    QuorumPending {
        conflict_id: ConflictId,
        votes: u32,
        quorum: u32,
    },
}

/// A human decision completing the manual resolution path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManualOutcome {
    /// Settle the conflict by committing one of the competing edits.
    ChooseEdit(EditId),
    /// Settle the conflict with a hand-authored merged content.
    Merge(Content),
    /// Reject every competing edit and leave the element untouched.
    RejectAll,
}

/// The resolution session coordinator.
///
/// Owns the backend, the policy configuration, the clock, and the outbound
/// event hooks. Cheap to share behind an `Arc`; all methods take `&self`.
pub struct Coordinator {
    backend: Arc<dyn Backend>,
    policies: PolicyBook,
    clock: Arc<dyn Clock>,
    hooks: EventHookCollection,
}

impl Coordinator {
    /// Opens a coordinator over the given backend with default policies and
    /// the system clock.
    pub fn open(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            policies: PolicyBook::default(),
            clock: Arc::new(SystemClock),
            hooks: EventHookCollection::new(),
        }
    }

    /// Opens a coordinator with a caller-supplied clock.
    ///
    /// Intended for tests that need deterministic timestamps.
    #[cfg(any(test, feature = "testing"))]
    pub fn open_with_clock(backend: Arc<dyn Backend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            policies: PolicyBook::default(),
            clock,
            hooks: EventHookCollection::new(),
        }
    }

    /// Replaces the policy configuration.
    pub fn with_policies(mut self, policies: PolicyBook) -> Self {
        self.policies = policies;
        self
    }

    /// Registers an outbound event hook.
    pub fn add_hook(&mut self, hook: Arc<dyn EventHook>) {
        self.hooks.add_hook(hook);
    }

    /// The policy configuration in use.
    pub fn policies(&self) -> &PolicyBook {
        &self.policies
    }

    /// The underlying storage backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Registers document/class labels for an element so policy overrides
    /// apply to it. Creates the element at version 0 if it does not exist.
    pub async fn tag_element(
        &self,
        element_id: impl Into<ElementId>,
        doc: Option<String>,
        class: Option<String>,
    ) -> Result<()> {
        self.backend.tag_element(&element_id.into(), doc, class).await
    }

    /// Submits an edit against a known base version of an element.
    ///
    /// Records the edit, runs conflict detection, and commits directly when
    /// the edit is compatible. A commit that loses a race against a
    /// concurrent submission re-runs detection against fresh state, up to
    /// [`MAX_COMMIT_RETRIES`] attempts; exhausting the budget surfaces the
    /// edit as awaiting manual resolution instead of failing the call.
    /// Detected conflicts are immediately run through the configured
    /// strategy; the handle reports where the edit ended up.
    pub async fn submit_edit(
        &self,
        element_id: impl Into<ElementId>,
        author_id: impl Into<AuthorId>,
        base_version: Version,
        payload: EditPayload,
    ) -> Result<EditHandle> {
        let element_id = element_id.into();
        let author_id = author_id.into();

        let current = self
            .backend
            .element(&element_id)
            .await?
            .map(|e| e.current_version)
            .unwrap_or(0);
        if base_version > current {
            return Err(SessionError::BaseVersionAhead {
                element_id,
                base_version,
                current_version: current,
            }
            .into());
        }

        let edit = Edit {
            edit_id: EditId::generate(),
            element_id: element_id.clone(),
            author_id,
            base_version,
            payload,
            submitted_at: self.clock.now_millis(),
            status: EditStatus::Pending,
            committed_version: None,
        };
        let edit_id = edit.edit_id.clone();
        self.backend.record_edit(edit.clone()).await?;
        tracing::debug!(edit = %edit_id, element = %element_id, base_version, "edit submitted");

        let mut attempts = 0;
        loop {
            let element = self.backend.element(&element_id).await?;
            let pending = self.backend.pending_for(&element_id).await?;
            let concurrent: Vec<Edit> = pending
                .into_iter()
                .filter(|e| e.edit_id != edit_id)
                .collect();
            let trail = self
                .backend
                .committed_after(&element_id, base_version)
                .await?;

            let detection = classify(&DetectionInput {
                element: element.as_ref(),
                edit: &edit,
                concurrent_pending: &concurrent,
                committed_trail: &trail,
            });

            match detection {
                Detection::Compatible => {
                    match self.backend.commit_edit(&edit_id, base_version).await {
                        Ok(new_version) => {
                            self.publish(EngineEvent::EditCommitted {
                                edit_id: edit_id.clone(),
                                element_id: element_id.clone(),
                                new_version,
                            });
                            return Ok(EditHandle {
                                edit_id,
                                element_id,
                                outcome: SubmitOutcome::Committed { new_version },
                            });
                        }
                        Err(err) if err.is_version_mismatch() => {
                            attempts += 1;
                            tracing::debug!(
                                edit = %edit_id,
                                attempts,
                                "commit lost an optimistic race, re-running detection"
                            );
                            if attempts >= MAX_COMMIT_RETRIES {
                                return self
                                    .escalate_retry_exhaustion(&edit, attempts)
                                    .await;
                            }
                        }
                        Err(err) => return Err(err),
                    }
                }
                Detection::Conflicting {
                    classification,
                    competitors,
                } => {
                    let conflict = self
                        .open_conflict(&edit, classification, competitors, &concurrent, &trail)
                        .await?;
                    let conflict_id = conflict.conflict_id.clone();

                    // Immediately attempt automated resolution under the
                    // effective policy; manual strategies leave the conflict
                    // open for the human path.
                    self.run_resolution(conflict, DecidedBy::System, None).await?;

                    let edit_status = self.backend.edit(&edit_id).await?.status;
                    return Ok(EditHandle {
                        edit_id,
                        element_id,
                        outcome: SubmitOutcome::Conflicted {
                            conflict_id,
                            edit_status,
                        },
                    });
                }
            }
        }
    }

    /// Attempts to resolve an open conflict under the effective policy.
    ///
    /// An expired manual-resolution timeout escalates the conflict with
    /// last-write-wins instead of evaluating the configured strategy.
    pub async fn resolve_conflict(&self, conflict_id: &ConflictId) -> Result<ResolveOutcome> {
        let conflict = self.backend.conflict(conflict_id).await?;
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved {
                id: conflict_id.clone(),
            }
            .into());
        }
        let policy = self.effective_policy(&conflict).await?;
        let escalate = self.is_expired(&conflict, &policy);
        if escalate {
            tracing::info!(conflict = %conflict_id, "manual resolution timeout expired, escalating");
        }
        self.run_resolution(
            conflict,
            DecidedBy::System,
            escalate.then_some(Strategy::LastWriteWins),
        )
        .await
    }

    /// Applies a human decision to a conflict awaiting manual resolution.
    ///
    /// Under a consensus policy the decision is recorded as a vote and the
    /// conflict only settles once the quorum agrees on one outcome. The
    /// commit contract is otherwise identical to the automated path.
    pub async fn apply_manual_decision(
        &self,
        conflict_id: &ConflictId,
        outcome: ManualOutcome,
        decided_by: impl Into<AuthorId>,
    ) -> Result<ResolveOutcome> {
        let decided_by = decided_by.into();
        let conflict = self.backend.conflict(conflict_id).await?;
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved {
                id: conflict_id.clone(),
            }
            .into());
        }
        let policy = self.effective_policy(&conflict).await?;

        // A decision arriving after the timeout is too late: the access
        // itself escalates the conflict.
        if self.is_expired(&conflict, &policy) {
            tracing::info!(conflict = %conflict_id, "manual resolution timeout expired, escalating");
            return self
                .run_resolution(conflict, DecidedBy::System, Some(Strategy::LastWriteWins))
                .await;
        }

        if let ManualOutcome::ChooseEdit(chosen) = &outcome
            && !conflict.competing_edit_ids.contains(chosen)
        {
            return Err(SessionError::OutcomeNotCompeting {
                conflict_id: conflict_id.clone(),
                edit_id: chosen.clone(),
            }
            .into());
        }

        if policy.strategy == Strategy::ConsensusRequired {
            if !policy.is_approver(&decided_by) {
                return Err(SessionError::NotAnApprover {
                    conflict_id: conflict_id.clone(),
                    author: decided_by,
                }
                .into());
            }
            let outcome_key = serde_json::to_string(&outcome)?;
            let votes = self
                .backend
                .record_vote(conflict_id, decided_by.clone(), outcome_key)
                .await?;
            let quorum = policy.quorum.unwrap_or(1);
            if votes < quorum {
                tracing::debug!(conflict = %conflict_id, votes, quorum, "consensus vote recorded");
                return Ok(ResolveOutcome::QuorumPending {
                    conflict_id: conflict_id.clone(),
                    votes,
                    quorum,
                });
            }
        }

        let rejected_ids = match &outcome {
            ManualOutcome::RejectAll => {
                let edits = self.backend.edits(&conflict.competing_edit_ids).await?;
                edits
                    .into_iter()
                    .filter(|e| !e.status.is_terminal())
                    .map(|e| e.edit_id)
                    .collect()
            }
            _ => Vec::new(),
        };

        let action = match outcome {
            ManualOutcome::ChooseEdit(edit_id) => PlannedApply::CommitEdit { edit_id },
            ManualOutcome::Merge(content) => PlannedApply::CommitMerged {
                synthesized_edit_id: EditId::generate(),
                payload: EditPayload::Replace(content),
            },
            ManualOutcome::RejectAll => PlannedApply::RejectAll,
        };

        let plan = ResolutionPlan {
            conflict_id: conflict_id.clone(),
            resolution_id: ResolutionId::generate(),
            strategy_used: policy.strategy,
            decided_by: DecidedBy::Author(decided_by),
            decided_at: self.clock.now_millis(),
            action,
        };
        let element_id = conflict.element_id.clone();
        let applied = self.backend.apply_resolution(plan).await?;

        for edit_id in rejected_ids {
            self.publish(EngineEvent::EditRejected {
                edit_id,
                element_id: element_id.clone(),
                reason: "rejected by manual decision".to_string(),
            });
        }
        self.publish_applied(&element_id, &applied);
        Ok(ResolveOutcome::Resolved {
            resolution: applied.resolution,
            new_version: applied.new_version,
        })
    }

    /// Withdraws a pending edit.
    ///
    /// Only the submitting author may withdraw, and only while the edit is
    /// not referenced by an open conflict; a conflicted edit must terminate
    /// through its conflict's resolution so the conflict never references a
    /// phantom edit.
    pub async fn withdraw_edit(
        &self,
        edit_id: &EditId,
        author_id: impl Into<AuthorId>,
    ) -> Result<()> {
        let author_id = author_id.into();
        let edit = self.backend.edit(edit_id).await?;
        if edit.author_id != author_id {
            return Err(SessionError::NotEditAuthor {
                edit_id: edit_id.clone(),
                author: author_id,
                owner: edit.author_id,
            }
            .into());
        }
        if let Some(conflict) = self.backend.open_conflict_for_edit(edit_id).await? {
            return Err(SessionError::EditInConflict {
                edit_id: edit_id.clone(),
                conflict_id: conflict.conflict_id,
            }
            .into());
        }
        self.backend.mark_edit(edit_id, EditStatus::Rejected).await?;
        self.publish(EngineEvent::EditRejected {
            edit_id: edit_id.clone(),
            element_id: edit.element_id,
            reason: "withdrawn by author".to_string(),
        });
        Ok(())
    }

    /// Sweeps open conflicts and escalates every one whose manual-resolution
    /// timeout has expired. Returns the outcomes of the escalations.
    pub async fn check_timeouts(&self) -> Result<Vec<ResolveOutcome>> {
        let mut outcomes = Vec::new();
        for conflict in self.backend.open_conflicts().await? {
            let policy = self.effective_policy(&conflict).await?;
            if self.is_expired(&conflict, &policy) {
                tracing::info!(
                    conflict = %conflict.conflict_id,
                    "manual resolution timeout expired, escalating"
                );
                let outcome = self
                    .run_resolution(conflict, DecidedBy::System, Some(Strategy::LastWriteWins))
                    .await?;
                outcomes.push(outcome);
            }
        }
        Ok(outcomes)
    }

    // === internal ===

    /// Creates and stores the conflict record for a detected collision, in
    /// canonical submission order, and announces it.
    async fn open_conflict(
        &self,
        edit: &Edit,
        classification: Classification,
        competitor_ids: Vec<EditId>,
        concurrent: &[Edit],
        trail: &[Edit],
    ) -> Result<Conflict> {
        // Canonical ordering over the whole competing set, incoming edit
        // included.
        let mut competing: Vec<&Edit> = concurrent
            .iter()
            .chain(trail.iter())
            .filter(|e| competitor_ids.contains(&e.edit_id))
            .collect();
        competing.push(edit);
        competing.sort_by(|a, b| a.order_key().cmp(&b.order_key()));

        let conflict = Conflict {
            conflict_id: ConflictId::generate(),
            element_id: edit.element_id.clone(),
            competing_edit_ids: competing.iter().map(|e| e.edit_id.clone()).collect(),
            detected_at: self.clock.now_millis(),
            classification,
            resolution: None,
            context: None,
        };
        self.backend.put_conflict(conflict.clone()).await?;
        tracing::info!(
            conflict = %conflict.conflict_id,
            element = %conflict.element_id,
            ?classification,
            competitors = conflict.competing_edit_ids.len(),
            "conflict detected"
        );
        self.publish(EngineEvent::ConflictDetected {
            conflict_id: conflict.conflict_id.clone(),
            element_id: conflict.element_id.clone(),
            competing_edit_ids: conflict.competing_edit_ids.clone(),
            classification,
        });
        Ok(conflict)
    }

    /// Surfaces a submission whose optimistic commits kept losing races.
    ///
    /// The edit moves to awaiting manual resolution under a contradictory
    /// conflict against the committed history, with the exhaustion recorded
    /// as context. Never an error and never a loop.
    async fn escalate_retry_exhaustion(&self, edit: &Edit, attempts: u32) -> Result<EditHandle> {
        tracing::warn!(
            edit = %edit.edit_id,
            element = %edit.element_id,
            attempts,
            "optimistic commit retry budget exhausted"
        );
        let trail = self
            .backend
            .committed_after(&edit.element_id, edit.base_version)
            .await?;
        let conflict = self
            .open_conflict(
                edit,
                Classification::Contradictory,
                trail.iter().map(|e| e.edit_id.clone()).collect(),
                &[],
                &trail,
            )
            .await?;
        self.backend
            .set_conflict_context(
                &conflict.conflict_id,
                format!("optimistic commit retry budget exhausted after {attempts} attempts"),
            )
            .await?;
        self.backend
            .mark_edit(&edit.edit_id, EditStatus::AwaitingManualResolution)
            .await?;
        Ok(EditHandle {
            edit_id: edit.edit_id.clone(),
            element_id: edit.element_id.clone(),
            outcome: SubmitOutcome::Conflicted {
                conflict_id: conflict.conflict_id,
                edit_status: EditStatus::AwaitingManualResolution,
            },
        })
    }

    /// Runs strategy evaluation for a conflict and applies the outcome.
    ///
    /// Strategy failures (unresolvable conflicts, invalid policies) never
    /// propagate: the conflict degrades to awaiting manual resolution with
    /// the failure recorded as context.
    async fn run_resolution(
        &self,
        conflict: Conflict,
        decided_by: DecidedBy,
        strategy_override: Option<Strategy>,
    ) -> Result<ResolveOutcome> {
        let mut policy = self.effective_policy(&conflict).await?;
        if let Some(strategy) = strategy_override {
            policy.strategy = strategy;
            policy.fallback_strategy = None;
        }
        let edits = self.backend.edits(&conflict.competing_edit_ids).await?;

        match crate::strategy::resolve(&conflict, &edits, &policy) {
            Ok(Decision::Resolved {
                strategy_used,
                action,
            }) => {
                let action = match action {
                    PlannedAction::CommitEdit { edit_id } => PlannedApply::CommitEdit { edit_id },
                    PlannedAction::CommitMerged { payload } => PlannedApply::CommitMerged {
                        synthesized_edit_id: EditId::generate(),
                        payload,
                    },
                };
                let plan = ResolutionPlan {
                    conflict_id: conflict.conflict_id.clone(),
                    resolution_id: ResolutionId::generate(),
                    strategy_used,
                    decided_by,
                    decided_at: self.clock.now_millis(),
                    action,
                };
                let applied = self.backend.apply_resolution(plan).await?;
                self.publish_applied(&conflict.element_id, &applied);
                Ok(ResolveOutcome::Resolved {
                    resolution: applied.resolution,
                    new_version: applied.new_version,
                })
            }
            Ok(Decision::NeedsManualInput { reason, .. }) => {
                self.park_for_manual_input(&conflict, &edits, reason).await
            }
            Err(err @ (StrategyError::Unresolvable { .. } | StrategyError::Policy(_))) => {
                tracing::warn!(
                    conflict = %conflict.conflict_id,
                    error = %err,
                    "strategy failed, degrading to manual resolution"
                );
                self.park_for_manual_input(&conflict, &edits, err.to_string())
                    .await
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Moves a conflict's live competitors to awaiting manual resolution and
    /// records the reason on the conflict.
    async fn park_for_manual_input(
        &self,
        conflict: &Conflict,
        edits: &[Edit],
        reason: String,
    ) -> Result<ResolveOutcome> {
        for edit in edits.iter().filter(|e| !e.status.is_terminal()) {
            self.backend
                .mark_edit(&edit.edit_id, EditStatus::AwaitingManualResolution)
                .await?;
        }
        self.backend
            .set_conflict_context(&conflict.conflict_id, reason.clone())
            .await?;
        Ok(ResolveOutcome::AwaitingManual {
            conflict_id: conflict.conflict_id.clone(),
            reason,
        })
    }

    /// The policy in effect for a conflict's element.
    async fn effective_policy(&self, conflict: &Conflict) -> Result<Policy> {
        let element = self.backend.element(&conflict.element_id).await?;
        let (doc, class) = element
            .map(|e| (e.doc, e.class))
            .unwrap_or((None, None));
        Ok(self
            .policies
            .effective(doc.as_deref(), class.as_deref())
            .clone())
    }

    /// Whether a conflict's manual-resolution timeout has expired.
    fn is_expired(&self, conflict: &Conflict, policy: &Policy) -> bool {
        policy
            .manual_resolution_timeout_ms
            .is_some_and(|timeout| {
                self.clock.now_millis().saturating_sub(conflict.detected_at) > timeout
            })
    }

    /// Publishes the events following an applied resolution.
    fn publish_applied(&self, element_id: &ElementId, applied: &crate::backend::Applied) {
        self.publish(EngineEvent::ConflictResolved {
            conflict_id: applied.resolution.conflict_id.clone(),
            resolution: applied.resolution.clone(),
        });
        if let (Some(edit_id), Some(new_version)) =
            (applied.committed_edit.clone(), applied.new_version)
        {
            self.publish(EngineEvent::EditCommitted {
                edit_id,
                element_id: element_id.clone(),
                new_version,
            });
        }
    }

    /// Fans an event out to the registered hooks. Hook failures are logged
    /// and never fail the operation that triggered the event.
    fn publish(&self, event: EngineEvent) {
        if let Err(err) = self.hooks.execute_hooks(&event) {
            tracing::warn!("event hook reported failure: {err}");
        }
    }
}
