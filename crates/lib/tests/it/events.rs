//! Outbound event emission through the coordinator's hook collection.

use std::sync::Arc;

use concord::backend::InMemory;
use concord::events::{ChannelRelay, EngineEvent};
use concord::policy::{Policy, PolicyBook, Strategy};
use concord::session::SubmitOutcome;
use concord::{Coordinator, FixedClock};
use tokio::sync::mpsc;

use crate::helpers::*;

struct EventedEngine {
    coordinator: Coordinator,
    backend: Arc<InMemory>,
    rx: mpsc::Receiver<EngineEvent>,
}

fn evented_engine(policies: PolicyBook) -> EventedEngine {
    let backend = Arc::new(InMemory::new());
    let clock = Arc::new(FixedClock::default());
    let (tx, rx) = mpsc::channel(64);
    let mut coordinator =
        Coordinator::open_with_clock(backend.clone(), clock).with_policies(policies);
    coordinator.add_hook(Arc::new(ChannelRelay::new(tx)));
    EventedEngine {
        coordinator,
        backend,
        rx,
    }
}

#[tokio::test]
async fn a_direct_commit_emits_edit_committed() {
    let mut engine = evented_engine(PolicyBook::default());
    let handle = engine
        .coordinator
        .submit_edit("para-1", "alice", 0, replace("hello"))
        .await
        .unwrap();

    match engine.rx.try_recv().unwrap() {
        EngineEvent::EditCommitted {
            edit_id,
            element_id,
            new_version,
        } => {
            assert_eq!(edit_id, handle.edit_id);
            assert_eq!(element_id, "para-1");
            assert_eq!(new_version, 1);
        }
        other => panic!("expected EditCommitted, got {other:?}"),
    }
    assert!(engine.rx.try_recv().is_err());
}

#[tokio::test]
async fn an_auto_resolved_conflict_emits_the_full_sequence() {
    let mut engine = evented_engine(PolicyBook::default());
    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();
    // Drain the setup commit event
    engine.rx.try_recv().unwrap();

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

    match engine.rx.try_recv().unwrap() {
        EngineEvent::ConflictDetected {
            conflict_id: detected,
            competing_edit_ids,
            ..
        } => {
            assert_eq!(detected, conflict_id);
            assert_eq!(competing_edit_ids.len(), 2);
        }
        other => panic!("expected ConflictDetected, got {other:?}"),
    }
    match engine.rx.try_recv().unwrap() {
        EngineEvent::ConflictResolved {
            conflict_id: resolved,
            resolution,
        } => {
            assert_eq!(resolved, conflict_id);
            assert_eq!(resolution.strategy_used, Strategy::LastWriteWins);
        }
        other => panic!("expected ConflictResolved, got {other:?}"),
    }
    match engine.rx.try_recv().unwrap() {
        EngineEvent::EditCommitted { edit_id, .. } => {
            assert_eq!(edit_id, handle.edit_id);
        }
        other => panic!("expected EditCommitted, got {other:?}"),
    }
}

#[tokio::test]
async fn a_parked_conflict_emits_only_detection() {
    let mut engine = evented_engine(PolicyBook::with_default(Policy::new(Strategy::ManualMerge)));
    engine
        .coordinator
        .submit_edit("para-1", "alice", 0, patch("title", "original"))
        .await
        .unwrap();
    engine.rx.try_recv().unwrap();

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
    engine
        .coordinator
        .submit_edit("para-1", "bob", 1, patch("title", "b"))
        .await
        .unwrap();

    assert!(matches!(
        engine.rx.try_recv().unwrap(),
        EngineEvent::ConflictDetected { .. }
    ));
    // No resolution, no commit: the conflict awaits a human
    assert!(engine.rx.try_recv().is_err());
}

#[tokio::test]
async fn withdrawal_emits_edit_rejected() {
    let mut engine = evented_engine(PolicyBook::default());
    let edit = seed_pending(
        &engine.backend,
        "mine",
        "para-1",
        "alice",
        0,
        replace("draft"),
        1000,
    )
    .await;
    engine.coordinator.withdraw_edit(&edit, "alice").await.unwrap();

    match engine.rx.try_recv().unwrap() {
        EngineEvent::EditRejected {
            edit_id, reason, ..
        } => {
            assert_eq!(edit_id, edit);
            assert!(reason.contains("withdrawn"));
        }
        other => panic!("expected EditRejected, got {other:?}"),
    }
}
