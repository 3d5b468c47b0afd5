//! End-to-end submission scenarios: direct commits, concurrent races under
//! different strategies, stale submissions, and the engine-wide guarantees
//! (no conflict records for compatible edits, exactly one resolution,
//! no lost edits).

use concord::backend::Backend;
use concord::conflict::Classification;
use concord::element::ElementId;
use concord::journal::EditStatus;
use concord::policy::{Policy, PolicyBook, Strategy};
use concord::session::{ManualOutcome, SubmitOutcome};

use crate::helpers::*;

#[tokio::test]
async fn single_editor_commits_without_contention() {
    let engine = engine();
    let handle = engine
        .coordinator
        .submit_edit("para-1", "alice", 0, replace("hello"))
        .await
        .unwrap();

    assert_eq!(handle.outcome, SubmitOutcome::Committed { new_version: 1 });
    assert_element_version(&engine.backend, "para-1", 1).await;
    // Compatible edits never create a conflict record
    assert!(engine.backend.open_conflicts().await.unwrap().is_empty());
    assert_eq!(engine.backend.counts().await.unwrap().open_conflicts, 0);
}

#[tokio::test]
async fn disjoint_race_auto_merges_into_a_synthesized_edit() {
    let engine = engine_with(PolicyBook::with_default(Policy::new(Strategy::AutoMerge)));

    // Establish the element at version 1 with two regions
    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "draft"))
        .await
        .unwrap();

    // A concurrent edit to the body, recorded but not yet detected
    let theirs = seed_pending(
        &engine.backend,
        "theirs",
        "para-1",
        "bob",
        1,
        patch("body", "their text"),
        1000,
    )
    .await;

    // Our racing edit touches only the title
    let handle = engine
        .coordinator
        .submit_edit("para-1", "alice", 1, patch("title", "our title"))
        .await
        .unwrap();

    let SubmitOutcome::Conflicted {
        conflict_id,
        edit_status,
    } = handle.outcome
    else {
        panic!("expected a conflict");
    };
    // Both originals lost to the synthesized merge
    assert_eq!(edit_status, EditStatus::Superseded);
    assert_edit_status(&engine.backend, &theirs, EditStatus::Superseded).await;

    let conflict = engine.backend.conflict(&conflict_id).await.unwrap();
    assert_eq!(conflict.classification, Classification::Mergeable);
    assert!(conflict.is_resolved());

    // The merge combined both regions and committed as one new version
    assert_element_version(&engine.backend, "para-1", 2).await;
    let element = engine
        .backend
        .element(&ElementId::new("para-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(element.content.regions.get("title").unwrap(), b"our title");
    assert_eq!(element.content.regions.get("body").unwrap(), b"their text");
}

#[tokio::test]
async fn overlapping_race_under_last_write_wins_picks_the_later_edit() {
    let engine = engine();

    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();

    // Concurrent earlier-submitted edit from Alice
    let earlier = seed_pending(
        &engine.backend,
        "earlier",
        "para-1",
        "alice",
        1,
        patch("title", "alice's version"),
        1000,
    )
    .await;

    // Bob's edit arrives later and touches the same region
    let handle = engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("title", "bob's version"))
        .await
        .unwrap();

    let SubmitOutcome::Conflicted {
        conflict_id,
        edit_status,
    } = handle.outcome
    else {
        panic!("expected a conflict");
    };
    assert_eq!(edit_status, EditStatus::Committed);
    assert_edit_status(&engine.backend, &earlier, EditStatus::Superseded).await;

    let conflict = engine.backend.conflict(&conflict_id).await.unwrap();
    assert_eq!(conflict.classification, Classification::Contradictory);
    assert!(conflict.is_resolved());

    let element = engine
        .backend
        .element(&ElementId::new("para-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(element.current_version, 2);
    assert_eq!(element.content.regions.get("title").unwrap(), b"bob's version");
}

#[tokio::test]
async fn manual_merge_policy_defers_and_leaves_the_element_untouched() {
    let engine = engine_with(PolicyBook::with_default(Policy::new(Strategy::ManualMerge)));

    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();

    let earlier = seed_pending(
        &engine.backend,
        "earlier",
        "para-1",
        "alice",
        1,
        patch("title", "alice's version"),
        1000,
    )
    .await;

    let handle = engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("title", "bob's version"))
        .await
        .unwrap();

    let SubmitOutcome::Conflicted {
        conflict_id,
        edit_status,
    } = handle.outcome
    else {
        panic!("expected a conflict");
    };
    assert_eq!(edit_status, EditStatus::AwaitingManualResolution);
    assert_edit_status(&engine.backend, &earlier, EditStatus::AwaitingManualResolution).await;

    // No element mutation until the manual decision arrives
    assert_element_version(&engine.backend, "para-1", 1).await;

    let outcome = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(earlier.clone()), "lead")
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        concord::session::ResolveOutcome::Resolved { .. }
    ));
    assert_edit_status(&engine.backend, &earlier, EditStatus::Committed).await;
    assert_element_version(&engine.backend, "para-1", 2).await;
}

#[tokio::test]
async fn stale_submission_with_overlapping_history_is_contradictory() {
    let engine = engine_with(PolicyBook::with_default(Policy::new(Strategy::ManualMerge)));

    // Build history: versions 1 and 2 both touch the title
    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "v1"))
        .await
        .unwrap();
    engine
        .coordinator
        .submit_edit("para-1", "alice", 1, patch("title", "v2"))
        .await
        .unwrap();

    // Bob read version 1 and proposes a title change against it
    let handle = engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("title", "bob's title"))
        .await
        .unwrap();

    let SubmitOutcome::Conflicted {
        conflict_id,
        edit_status,
    } = handle.outcome
    else {
        panic!("expected a conflict");
    };
    let conflict = engine.backend.conflict(&conflict_id).await.unwrap();
    assert_eq!(conflict.classification, Classification::Contradictory);
    // The engine did not auto-commit the stale edit
    assert_eq!(edit_status, EditStatus::AwaitingManualResolution);
    assert_element_version(&engine.backend, "para-1", 2).await;
}

#[tokio::test]
async fn stale_submission_with_disjoint_history_is_mergeable() {
    let engine = engine_with(PolicyBook::with_default(Policy::new(Strategy::AutoMerge)));

    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "v1"))
        .await
        .unwrap();
    engine
        .coordinator
        .submit_edit("para-1", "alice", 1, patch("title", "v2"))
        .await
        .unwrap();

    // Bob read version 1 but only touches the body
    let handle = engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("body", "bob's body"))
        .await
        .unwrap();

    let SubmitOutcome::Conflicted { conflict_id, .. } = handle.outcome else {
        panic!("expected a conflict");
    };
    let conflict = engine.backend.conflict(&conflict_id).await.unwrap();
    assert_eq!(conflict.classification, Classification::Mergeable);
    assert!(conflict.is_resolved());

    let element = engine
        .backend
        .element(&ElementId::new("para-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(element.current_version, 3);
    assert_eq!(element.content.regions.get("title").unwrap(), b"v2");
    assert_eq!(element.content.regions.get("body").unwrap(), b"bob's body");
}

#[tokio::test]
async fn a_resolved_conflict_accepts_no_second_resolution() {
    let engine = engine();

    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();
    let earlier = seed_pending(
        &engine.backend,
        "earlier",
        "para-1",
        "alice",
        1,
        patch("title", "a"),
        1000,
    )
    .await;
    let handle = engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("title", "b"))
        .await
        .unwrap();
    let SubmitOutcome::Conflicted { conflict_id, .. } = handle.outcome else {
        panic!("expected a conflict");
    };
    assert!(engine.backend.conflict(&conflict_id).await.unwrap().is_resolved());

    let err = engine
        .coordinator
        .apply_manual_decision(&conflict_id, ManualOutcome::ChooseEdit(earlier), "lead")
        .await
        .unwrap_err();
    assert!(err.is_invalid_transition());

    let err = engine.coordinator.resolve_conflict(&conflict_id).await.unwrap_err();
    assert!(err.is_invalid_transition());
}

#[tokio::test]
async fn every_edit_ends_in_a_terminal_or_tracked_state() {
    let engine = engine();

    // A mix of clean commits and conflicting traffic
    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "v1"))
        .await
        .unwrap();
    seed_pending(
        &engine.backend,
        "racer",
        "para-1",
        "bob",
        1,
        patch("title", "b"),
        1000,
    )
    .await;
    engine
        .coordinator
        .submit_edit("para-1", "carol", 1, patch("title", "c"))
        .await
        .unwrap();
    engine
        .coordinator
        .submit_edit("para-2", "dave", 0, replace("other element"))
        .await
        .unwrap();

    // Every recorded edit is either terminal, or awaiting manual resolution
    // and referenced by an open conflict. Nothing is lost.
    let counts = engine.backend.counts().await.unwrap();
    assert!(counts.edits >= 4);
    for element in ["para-1", "para-2"] {
        for edit in engine
            .backend
            .pending_for(&ElementId::new(element))
            .await
            .unwrap()
        {
            assert_eq!(edit.status, EditStatus::AwaitingManualResolution);
            let conflict = engine
                .backend
                .open_conflict_for_edit(&edit.edit_id)
                .await
                .unwrap();
            assert!(
                conflict.is_some(),
                "non-terminal edit {} must be tracked by an open conflict",
                edit.edit_id
            );
        }
    }
}

#[tokio::test]
async fn identical_histories_resolve_identically() {
    // Two engines fed the same ordered submissions reach the same
    // classification, the same winner, and the same final content.
    async fn run() -> (Classification, Vec<u8>, u64) {
        let engine = engine();
        engine
            .coordinator
            .submit_edit("para-1", "alice", 0, patch("title", "original"))
            .await
            .unwrap();
        seed_pending(
            &engine.backend,
            "seeded",
            "para-1",
            "alice",
            1,
            patch("title", "a"),
            1000,
        )
        .await;
        let handle = engine
            .coordinator
            .submit_edit("para-1", "bob", 1, patch("title", "b"))
            .await
            .unwrap();
        let SubmitOutcome::Conflicted { conflict_id, .. } = handle.outcome else {
            panic!("expected a conflict");
        };
        let conflict = engine.backend.conflict(&conflict_id).await.unwrap();
        let element = engine
            .backend
            .element(&ElementId::new("para-1"))
            .await
            .unwrap()
            .unwrap();
        (
            conflict.classification,
            element.content.regions.get("title").unwrap().clone(),
            element.current_version,
        )
    }

    let first = run().await;
    let second = run().await;
    assert_eq!(first, second);
}
