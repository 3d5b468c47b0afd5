//! Manual resolution paths: explicit decisions, hand-authored merges,
//! consensus quorums, and manual-resolution timeouts.

use concord::backend::Backend;
use concord::conflict::{ConflictId, DecidedBy};
use concord::element::{Content, ElementId};
use concord::journal::EditStatus;
use concord::policy::{Policy, PolicyBook, Strategy};
use concord::session::{ManualOutcome, ResolveOutcome, SubmitOutcome};

use crate::helpers::*;

/// Drives a two-sided contradictory conflict under the given policy and
/// returns (engine, conflict id, seeded edit id, submitted edit id).
async fn contested_element(
    policy: Policy,
) -> (TestEngine, ConflictId, concord::journal::EditId, concord::journal::EditId) {
    let engine = engine_with(PolicyBook::with_default(policy));
    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();
    let seeded = seed_pending(
        &engine.backend,
        "seeded",
        "para-1",
        "alice",
        1,
        patch("title", "alice's title"),
        1000,
    )
    .await;
    let handle = engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("title", "bob's title"))
        .await
        .unwrap();
    let SubmitOutcome::Conflicted { conflict_id, .. } = handle.outcome else {
        panic!("expected a conflict");
    };
    let submitted = handle.edit_id;
    (engine, conflict_id, seeded, submitted)
}

#[tokio::test]
async fn manual_decision_commits_the_chosen_edit() {
    let (engine, conflict_id, seeded, submitted) =
        contested_element(Policy::new(Strategy::ManualMerge)).await;

    let outcome = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(submitted.clone()), "lead")
        .await
        .unwrap();

    let ResolveOutcome::Resolved { resolution, new_version } = outcome else {
        panic!("expected a resolution");
    };
    assert_eq!(new_version, Some(2));
    assert_eq!(
        resolution.decided_by,
        DecidedBy::Author("lead".into())
    );
    assert_edit_status(&engine.backend, &submitted, EditStatus::Committed).await;
    assert_edit_status(&engine.backend, &seeded, EditStatus::Superseded).await;
}

#[tokio::test]
async fn manual_decision_can_commit_a_hand_authored_merge() {
    let (engine, conflict_id, seeded, submitted) =
        contested_element(Policy::new(Strategy::ManualMerge)).await;

    let merged = Content::opaque(b"hand-merged title".to_vec());
    let outcome = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::Merge(merged.clone()), "lead")
        .await
        .unwrap();

    assert!(matches!(outcome, ResolveOutcome::Resolved { new_version: Some(2), .. }));
    // Both originals lost to the hand-authored content
    assert_edit_status(&engine.backend, &seeded, EditStatus::Superseded).await;
    assert_edit_status(&engine.backend, &submitted, EditStatus::Superseded).await;
    let element = engine
        .backend
        .element(&ElementId::new("para-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(element.content, merged);
}

#[tokio::test]
async fn manual_decision_can_reject_all_sides() {
    let (engine, conflict_id, seeded, submitted) =
        contested_element(Policy::new(Strategy::ManualMerge)).await;

    let outcome = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::RejectAll, "lead")
        .await
        .unwrap();

    assert!(matches!(outcome, ResolveOutcome::Resolved { new_version: None, .. }));
    assert_edit_status(&engine.backend, &seeded, EditStatus::Rejected).await;
    assert_edit_status(&engine.backend, &submitted, EditStatus::Rejected).await;
    // The element was left untouched
    assert_element_version(&engine.backend, "para-1", 1).await;
}

#[tokio::test]
async fn choosing_an_outside_edit_is_rejected() {
    let (engine, conflict_id, _, _) =
        contested_element(Policy::new(Strategy::ManualMerge)).await;

    let outsider = seed_pending(
        &engine.backend,
        "outsider",
        "para-9",
        "mallory",
        0,
        replace("unrelated"),
        2000,
    )
    .await;
    let err = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(outsider), "lead")
        .await
        .unwrap_err();
    assert!(err.is_validation_error());
}

#[tokio::test]
async fn consensus_waits_for_the_quorum() {
    let policy = Policy::new(Strategy::ConsensusRequired)
        .with_quorum(2)
        .with_approver("lead")
        .with_approver("qa");
    let (engine, conflict_id, _, submitted) = contested_element(policy).await;

    let first = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(submitted.clone()), "lead")
        .await
        .unwrap();
    assert_eq!(
        first,
        ResolveOutcome::QuorumPending {
            conflict_id: conflict_id.clone(),
            votes: 1,
            quorum: 2
        }
    );
    // The element is untouched while the quorum is open
    assert_element_version(&engine.backend, "para-1", 1).await;

    let second = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(submitted.clone()), "qa")
        .await
        .unwrap();
    assert!(matches!(second, ResolveOutcome::Resolved { new_version: Some(2), .. }));
    assert_edit_status(&engine.backend, &submitted, EditStatus::Committed).await;
}

#[tokio::test]
async fn split_votes_do_not_reach_the_quorum() {
    let policy = Policy::new(Strategy::ConsensusRequired)
        .with_quorum(2)
        .with_approver("lead")
        .with_approver("qa");
    let (engine, conflict_id, seeded, submitted) = contested_element(policy).await;

    engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(seeded.clone()), "lead")
        .await
        .unwrap();
    let split = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(submitted.clone()), "qa")
        .await
        .unwrap();
    // One vote each: still pending
    assert!(matches!(split, ResolveOutcome::QuorumPending { votes: 1, quorum: 2, .. }));

    // The lead changes their vote; the quorum converges on one outcome
    let converged = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(submitted.clone()), "lead")
        .await
        .unwrap();
    assert!(matches!(converged, ResolveOutcome::Resolved { .. }));
}

#[tokio::test]
async fn votes_from_outside_the_approver_set_are_rejected() {
    let policy = Policy::new(Strategy::ConsensusRequired)
        .with_quorum(2)
        .with_approver("lead")
        .with_approver("qa");
    let (engine, conflict_id, _, submitted) = contested_element(policy).await;

    let err = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(submitted), "mallory")
        .await
        .unwrap_err();
    assert!(err.is_validation_error());
}

#[tokio::test]
async fn expired_conflicts_escalate_with_last_write_wins_on_access() {
    let policy = Policy::new(Strategy::ManualMerge).with_timeout_ms(60_000);
    let (engine, conflict_id, seeded, submitted) = contested_element(policy).await;

    engine.clock.advance(61_000);
    let outcome = engine.coordinator.resolve_conflict(&conflict_id).await.unwrap();

    let ResolveOutcome::Resolved { resolution, .. } = outcome else {
        panic!("expected an escalated resolution");
    };
    assert_eq!(resolution.strategy_used, Strategy::LastWriteWins);
    assert_eq!(resolution.decided_by, DecidedBy::System);
    // Bob submitted last, so his edit wins the escalation
    assert_edit_status(&engine.backend, &submitted, EditStatus::Committed).await;
    assert_edit_status(&engine.backend, &seeded, EditStatus::Superseded).await;
}

#[tokio::test]
async fn late_manual_decisions_lose_to_the_timeout() {
    let policy = Policy::new(Strategy::ManualMerge).with_timeout_ms(60_000);
    let (engine, conflict_id, seeded, submitted) = contested_element(policy).await;

    engine.clock.advance(61_000);
    // The decision arrives after the deadline: the access escalates instead
    let outcome = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(seeded.clone()), "lead")
        .await
        .unwrap();
    let ResolveOutcome::Resolved { resolution, .. } = outcome else {
        panic!("expected an escalated resolution");
    };
    assert_eq!(resolution.decided_by, DecidedBy::System);
    assert_edit_status(&engine.backend, &submitted, EditStatus::Committed).await;
}

#[tokio::test]
async fn the_timeout_sweep_escalates_every_overdue_conflict() {
    let policy = Policy::new(Strategy::ManualMerge).with_timeout_ms(60_000);
    let (engine, conflict_id, _, _) = contested_element(policy).await;

    // Not expired yet: the sweep does nothing
    assert!(engine.coordinator.check_timeouts().await.unwrap().is_empty());
    assert!(!engine.backend.conflict(&conflict_id).await.unwrap().is_resolved());

    engine.clock.advance(61_000);
    let outcomes = engine.coordinator.check_timeouts().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert!(engine.backend.conflict(&conflict_id).await.unwrap().is_resolved());
}

#[tokio::test]
async fn hierarchical_precedence_beats_submission_order() {
    let policy = Policy::new(Strategy::Hierarchical)
        .with_rank("lead", 10)
        .with_rank("intern", 1);
    let engine = engine_with(PolicyBook::with_default(policy));

    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();
    let lead_edit = seed_pending(
        &engine.backend,
        "lead-edit",
        "para-1",
        "lead",
        1,
        patch("title", "lead's title"),
        1000,
    )
    .await;
    // The intern submits later; under last-write-wins they would win
    let handle = engine
        .coordinator
        .submit_edit("para-1", "intern", 1, patch("title", "intern's title"))
        .await
        .unwrap();
    let SubmitOutcome::Conflicted { edit_status, .. } = handle.outcome else {
        panic!("expected a conflict");
    };
    assert_eq!(edit_status, EditStatus::Superseded);
    assert_edit_status(&engine.backend, &lead_edit, EditStatus::Committed).await;
}
