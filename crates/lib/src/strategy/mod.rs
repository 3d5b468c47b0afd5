//! Resolution strategy engine.
//!
//! Given a detected conflict, the records of its competing edits, and the
//! applicable policy, [`resolve`] produces exactly one decision: an intended
//! outcome for the coordinator to apply transactionally, or a deferral to
//! manual input. The function is pure: it never mutates element, edit, or
//! conflict state, which keeps the decision logic independently testable
//! without a live store, and it is deterministic given identical ordered
//! input.

mod errors;

use std::collections::BTreeMap;

use crate::conflict::{Classification, Conflict};
use crate::journal::{Edit, EditId, EditPayload};
use crate::policy::{Policy, Strategy};

pub use errors::StrategyError;

/// An automated outcome the coordinator should apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Commit the chosen edit's payload; the remaining non-terminal
    /// competitors become superseded.
    CommitEdit { edit_id: EditId },
    /// Commit a synthesized payload combining the competitors; all
    /// non-terminal competitors become superseded.
    CommitMerged { payload: EditPayload },
}

/// The decision produced by strategy evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The strategy decided an outcome.
    Resolved {
        strategy_used: Strategy,
        action: PlannedAction,
    },
    /// The strategy defers to explicit human input; the conflict must move
    /// to awaiting manual resolution.
    NeedsManualInput {
        strategy_used: Strategy,
        reason: String,
    },
}

/// Produces the single decision for a conflict under the given policy.
///
/// `edits` must hold the record of every competing edit referenced by the
/// conflict, in the journal's canonical submission order. Committed
/// competitors (the unseen history behind a stale edit) participate in the
/// comparison; choosing one of them simply supersedes the stale pending side
/// without touching the element again.
pub fn resolve(
    conflict: &Conflict,
    edits: &[Edit],
    policy: &Policy,
) -> Result<Decision, StrategyError> {
    policy.validate()?;
    if edits.is_empty() {
        return Err(StrategyError::NoCompetitors {
            conflict_id: conflict.conflict_id.clone(),
        });
    }
    evaluate(policy.strategy, conflict, edits, policy, true)
}

fn evaluate(
    strategy: Strategy,
    conflict: &Conflict,
    edits: &[Edit],
    policy: &Policy,
    allow_fallback: bool,
) -> Result<Decision, StrategyError> {
    let no_competitors = || StrategyError::NoCompetitors {
        conflict_id: conflict.conflict_id.clone(),
    };

    match strategy {
        Strategy::LastWriteWins => Ok(Decision::Resolved {
            strategy_used: Strategy::LastWriteWins,
            action: PlannedAction::CommitEdit {
                edit_id: last_writer(edits).ok_or_else(no_competitors)?.edit_id.clone(),
            },
        }),

        Strategy::ManualMerge => Ok(Decision::NeedsManualInput {
            strategy_used: Strategy::ManualMerge,
            reason: "policy requires manual merge".to_string(),
        }),

        Strategy::AutoMerge => {
            if conflict.classification == Classification::Mergeable {
                let payload = synthesize_merge(conflict, edits)?;
                return Ok(Decision::Resolved {
                    strategy_used: Strategy::AutoMerge,
                    action: PlannedAction::CommitMerged { payload },
                });
            }
            // A contradictory conflict cannot be merged; degrading to the
            // configured fallback is the only legal move. Silently picking
            // one side is not.
            match policy.fallback_strategy {
                Some(fallback) if allow_fallback && fallback != Strategy::AutoMerge => {
                    evaluate(fallback, conflict, edits, policy, false)
                }
                _ => Err(StrategyError::Unresolvable {
                    conflict_id: conflict.conflict_id.clone(),
                    reason: format!(
                        "auto_merge cannot combine a {:?} conflict and no usable fallback is configured",
                        conflict.classification
                    ),
                }),
            }
        }

        Strategy::Hierarchical => {
            let top_rank = edits
                .iter()
                .map(|e| policy.rank_of(&e.author_id))
                .max()
                .unwrap_or(0);
            let top_ranked: Vec<Edit> = edits
                .iter()
                .filter(|e| policy.rank_of(&e.author_id) == top_rank)
                .cloned()
                .collect();
            // Ties between equally ranked authors fall back to
            // last-write-wins among the tied edits.
            Ok(Decision::Resolved {
                strategy_used: Strategy::Hierarchical,
                action: PlannedAction::CommitEdit {
                    edit_id: last_writer(&top_ranked)
                        .ok_or_else(no_competitors)?
                        .edit_id
                        .clone(),
                },
            })
        }

        Strategy::ConsensusRequired => {
            let quorum = policy.quorum.unwrap_or(1);
            Ok(Decision::NeedsManualInput {
                strategy_used: Strategy::ConsensusRequired,
                reason: format!("awaiting acceptance from a quorum of {quorum} approvers"),
            })
        }
    }
}

/// The edit with the latest submission time, ties broken by edit ID.
fn last_writer(edits: &[Edit]) -> Option<&Edit> {
    edits.iter().max_by(|a, b| a.order_key().cmp(&b.order_key()))
}

/// Combines the non-overlapping region patches of the non-terminal
/// competitors into one synthesized payload.
///
/// Committed competitors contribute nothing: their regions are already part
/// of the element's current content, which the merged patch is applied on
/// top of. Detection only classifies a conflict mergeable when every pending
/// side is a region patch and the whole set is mutually disjoint, so a
/// non-patch pending competitor here means the conflict record and journal
/// disagree.
fn synthesize_merge(conflict: &Conflict, edits: &[Edit]) -> Result<EditPayload, StrategyError> {
    let mut regions: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut saw_pending = false;
    for edit in edits.iter().filter(|e| !e.status.is_terminal()) {
        saw_pending = true;
        match &edit.payload {
            EditPayload::Patch { regions: touched } => {
                for (name, bytes) in touched {
                    regions.insert(name.clone(), bytes.clone());
                }
            }
            other => {
                return Err(StrategyError::Unresolvable {
                    conflict_id: conflict.conflict_id.clone(),
                    reason: format!(
                        "mergeable conflict carries a whole-element payload ({other:?})"
                    ),
                });
            }
        }
    }
    if !saw_pending {
        return Err(StrategyError::Unresolvable {
            conflict_id: conflict.conflict_id.clone(),
            reason: "no pending competitor left to merge".to_string(),
        });
    }
    Ok(EditPayload::Patch { regions })
}
