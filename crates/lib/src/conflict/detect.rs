//! Conflict detection.
//!
//! Detection is a pure function over a snapshot of element state and journal
//! history. Given the same competing edits and the same element history it
//! always produces the same classification; there is no randomness and no
//! reliance on wall-clock races, which keeps retries and tests reproducible.

use crate::element::Element;
use crate::journal::{Edit, EditId};

use super::Classification;

/// Snapshot of the state an edit is classified against.
///
/// The coordinator assembles this from the backend; detection itself never
/// touches storage.
#[derive(Debug)]
pub struct DetectionInput<'a> {
    /// The target element's committed state. `None` when the element has not
    /// been introduced yet, which detection treats as version 0 with empty
    /// content.
    pub element: Option<&'a Element>,

    /// The edit being classified.
    pub edit: &'a Edit,

    /// Other non-terminal edits on the same element, in canonical submission
    /// order, excluding `edit` itself.
    pub concurrent_pending: &'a [Edit],

    /// Committed edits whose resulting version is greater than the edit's
    /// base version, ordered by the version they produced. This is the
    /// history the edit's author did not see.
    pub committed_trail: &'a [Edit],
}

/// Outcome of classifying a newly submitted edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The edit is based on the current version and collides with nothing:
    /// it may proceed directly to commit. No conflict record is created.
    Compatible,
    /// The edit conflicts; a conflict record must be created referencing the
    /// returned competitors (the classified edit itself is not included).
    Conflicting {
        classification: Classification,
        competitors: Vec<EditId>,
    },
}

/// Classifies a newly submitted edit against concurrent and committed state.
///
/// The rules, in order:
/// 1. A deleted target element makes any edit contradictory against the
///    deletion.
/// 2. A stale edit (base version behind the element) is mergeable only when
///    its payload is disjoint from everything committed past its base
///    version; otherwise contradictory.
/// 3. Concurrent pending edits sharing the edit's base version are compared
///    region-wise: mutually disjoint patches are mergeable, anything else is
///    contradictory.
/// 4. Otherwise the edit is compatible.
///
/// Authorship is irrelevant: a same-author resubmission runs through the
/// identical logic.
pub fn classify(input: &DetectionInput<'_>) -> Detection {
    let current_version = input.element.map(|e| e.current_version).unwrap_or(0);
    let deleted = input.element.map(|e| e.deleted).unwrap_or(false);
    let edit = input.edit;

    // Edits racing on the same base version, in canonical order.
    let racing: Vec<&Edit> = input
        .concurrent_pending
        .iter()
        .filter(|other| other.base_version == edit.base_version)
        .collect();

    if deleted {
        let mut competitors: Vec<EditId> = input
            .committed_trail
            .iter()
            .map(|e| e.edit_id.clone())
            .collect();
        competitors.extend(racing.iter().map(|e| e.edit_id.clone()));
        return Detection::Conflicting {
            classification: Classification::Contradictory,
            competitors,
        };
    }

    let stale = edit.base_version < current_version;

    if stale {
        let mut competitors: Vec<EditId> = input
            .committed_trail
            .iter()
            .map(|e| e.edit_id.clone())
            .collect();
        competitors.extend(racing.iter().map(|e| e.edit_id.clone()));

        // Disjointness must hold against the entire unseen history and any
        // racing submissions; an empty trail gives nothing to prove
        // disjointness against.
        let mergeable = !input.committed_trail.is_empty()
            && input
                .committed_trail
                .iter()
                .all(|committed| !committed.payload.overlaps(&edit.payload))
            && racing.iter().all(|other| !other.payload.overlaps(&edit.payload))
            && pairwise_disjoint(&racing);

        return Detection::Conflicting {
            classification: if mergeable {
                Classification::Mergeable
            } else {
                Classification::Contradictory
            },
            competitors,
        };
    }

    if racing.is_empty() {
        return Detection::Compatible;
    }

    // True concurrent submission race: same base version, multiple pending
    // edits. Mergeable only when the whole competing set is mutually
    // disjoint, so a later auto-merge can combine every side.
    let mergeable = racing
        .iter()
        .all(|other| !other.payload.overlaps(&edit.payload))
        && pairwise_disjoint(&racing);

    Detection::Conflicting {
        classification: if mergeable {
            Classification::Mergeable
        } else {
            Classification::Contradictory
        },
        competitors: racing.iter().map(|e| e.edit_id.clone()).collect(),
    }
}

fn pairwise_disjoint(edits: &[&Edit]) -> bool {
    for (i, a) in edits.iter().enumerate() {
        for b in &edits[i + 1..] {
            if a.payload.overlaps(&b.payload) {
                return false;
            }
        }
    }
    true
}
