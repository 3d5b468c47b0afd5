//! Simulate command - replays a scenario file through an in-memory engine
//! and reports the outcomes and emitted events.

use std::sync::Arc;

use concord::Coordinator;
use concord::backend::{Backend, InMemory};
use concord::conflict::Conflict;
use concord::element::Content;
use concord::events::{ChannelRelay, EngineEvent};
use concord::journal::EditId;
use concord::policy::PolicyBook;
use concord::session::{ManualOutcome, ResolveOutcome, SubmitOutcome};
use tokio::sync::mpsc;

use crate::cli::SimulateArgs;
use crate::output::OutputFormat;
use crate::scenario::{Scenario, Step};

/// Run the simulate command
pub async fn run(
    args: &SimulateArgs,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let scenario: Scenario = serde_json::from_str(&std::fs::read_to_string(&args.scenario)?)?;
    tracing::info!(steps = scenario.steps.len(), "scenario loaded");
    let policies: PolicyBook = match &args.policy {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => scenario.policies.clone().unwrap_or_default(),
    };
    policies.validate()?;

    let backend = Arc::new(InMemory::new());
    let (tx, mut rx) = mpsc::channel(1024);
    let mut coordinator = Coordinator::open(backend.clone()).with_policies(policies);
    coordinator.add_hook(Arc::new(ChannelRelay::new(tx)));

    let mut submit_ids: Vec<EditId> = Vec::new();
    let mut step_reports: Vec<serde_json::Value> = Vec::new();

    for (index, step) in scenario.steps.iter().enumerate() {
        let report = execute_step(&coordinator, &backend, step, &mut submit_ids).await?;
        if format == OutputFormat::Human {
            println!("step {index}: {}", render_report(&report));
        }
        step_reports.push(report);
    }

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let counts = backend.counts().await?;
    if let Some(path) = &args.save_state {
        backend.save_to_file(path).await?;
    }

    match format {
        OutputFormat::Human => {
            println!();
            println!("events:");
            for event in &events {
                println!("  {}", render_event(event));
            }
            println!();
            println!("Elements:         {}", counts.elements);
            println!("Edits:            {}", counts.edits);
            println!("Open conflicts:   {}", counts.open_conflicts);
            println!("Resolutions:      {}", counts.resolutions);
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "steps": step_reports,
                "events": events,
                "counts": counts,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }

    Ok(())
}

async fn execute_step(
    coordinator: &Coordinator,
    backend: &Arc<InMemory>,
    step: &Step,
    submit_ids: &mut Vec<EditId>,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    match step {
        Step::Tag {
            element,
            doc,
            class,
        } => {
            coordinator
                .tag_element(element.as_str(), doc.clone(), class.clone())
                .await?;
            Ok(serde_json::json!({ "op": "tag", "element": element }))
        }
        Step::Submit {
            element,
            author,
            base_version,
            payload,
        } => {
            let payload = payload.to_payload()?;
            let handle = coordinator
                .submit_edit(element.as_str(), author.as_str(), *base_version, payload)
                .await?;
            submit_ids.push(handle.edit_id.clone());
            let outcome = match &handle.outcome {
                SubmitOutcome::Committed { new_version } => {
                    serde_json::json!({ "committed": new_version })
                }
                SubmitOutcome::Conflicted {
                    conflict_id,
                    edit_status,
                } => serde_json::json!({
                    "conflict": conflict_id.to_string(),
                    "edit_status": format!("{edit_status:?}"),
                }),
            };
            Ok(serde_json::json!({
                "op": "submit",
                "element": element,
                "edit": handle.edit_id.to_string(),
                "outcome": outcome,
            }))
        }
        Step::Choose { submit, decided_by } => {
            let edit_id = submit_edit_at(submit_ids, *submit)?;
            let conflict = backend
                .open_conflict_for_edit(&edit_id)
                .await?
                .ok_or_else(|| format!("submission {submit} is not in an open conflict"))?;
            let outcome = coordinator
                .apply_manual_decision(
                    &conflict.conflict_id,
                    ManualOutcome::ChooseEdit(edit_id),
                    decided_by.as_str(),
                )
                .await?;
            Ok(serde_json::json!({
                "op": "choose",
                "conflict": conflict.conflict_id.to_string(),
                "outcome": render_resolve(&outcome),
            }))
        }
        Step::Merge {
            element,
            content,
            decided_by,
        } => {
            let conflict = latest_open_conflict(backend, element).await?;
            let outcome = coordinator
                .apply_manual_decision(
                    &conflict.conflict_id,
                    ManualOutcome::Merge(Content::opaque(content.as_bytes().to_vec())),
                    decided_by.as_str(),
                )
                .await?;
            Ok(serde_json::json!({
                "op": "merge",
                "conflict": conflict.conflict_id.to_string(),
                "outcome": render_resolve(&outcome),
            }))
        }
        Step::Reject {
            element,
            decided_by,
        } => {
            let conflict = latest_open_conflict(backend, element).await?;
            let outcome = coordinator
                .apply_manual_decision(
                    &conflict.conflict_id,
                    ManualOutcome::RejectAll,
                    decided_by.as_str(),
                )
                .await?;
            Ok(serde_json::json!({
                "op": "reject",
                "conflict": conflict.conflict_id.to_string(),
                "outcome": render_resolve(&outcome),
            }))
        }
        Step::Resolve { element } => {
            let conflict = latest_open_conflict(backend, element).await?;
            let outcome = coordinator.resolve_conflict(&conflict.conflict_id).await?;
            Ok(serde_json::json!({
                "op": "resolve",
                "conflict": conflict.conflict_id.to_string(),
                "outcome": render_resolve(&outcome),
            }))
        }
        Step::Sweep => {
            let outcomes = coordinator.check_timeouts().await?;
            Ok(serde_json::json!({
                "op": "sweep",
                "escalated": outcomes.len(),
            }))
        }
        Step::Withdraw { submit, author } => {
            let edit_id = submit_edit_at(submit_ids, *submit)?;
            coordinator.withdraw_edit(&edit_id, author.as_str()).await?;
            Ok(serde_json::json!({
                "op": "withdraw",
                "edit": edit_id.to_string(),
            }))
        }
    }
}

fn submit_edit_at(submit_ids: &[EditId], index: usize) -> Result<EditId, String> {
    submit_ids
        .get(index)
        .cloned()
        .ok_or_else(|| format!("no submission with index {index}"))
}

async fn latest_open_conflict(
    backend: &Arc<InMemory>,
    element: &str,
) -> Result<Conflict, Box<dyn std::error::Error>> {
    let open = backend.open_conflicts().await?;
    open.into_iter()
        .filter(|c| c.element_id.as_str() == element)
        .next_back()
        .ok_or_else(|| format!("no open conflict on element '{element}'").into())
}

fn render_resolve(outcome: &ResolveOutcome) -> serde_json::Value {
    match outcome {
        ResolveOutcome::Resolved {
            resolution,
            new_version,
        } => serde_json::json!({
            "resolved": resolution.resolution_id.to_string(),
            "strategy": resolution.strategy_used,
            "new_version": new_version,
        }),
        ResolveOutcome::AwaitingManual { reason, .. } => {
            serde_json::json!({ "awaiting_manual": reason })
        }
        ResolveOutcome::QuorumPending { votes, quorum, .. } => {
            serde_json::json!({ "quorum_pending": format!("{votes}/{quorum}") })
        }
    }
}

fn render_report(report: &serde_json::Value) -> String {
    serde_json::to_string(report).unwrap_or_else(|_| "<unrenderable>".to_string())
}

fn render_event(event: &EngineEvent) -> String {
    match event {
        EngineEvent::ConflictDetected {
            conflict_id,
            element_id,
            competing_edit_ids,
            classification,
        } => format!(
            "conflict detected on {element_id}: {conflict_id} ({classification:?}, {} edits)",
            competing_edit_ids.len()
        ),
        EngineEvent::ConflictResolved {
            conflict_id,
            resolution,
        } => format!(
            "conflict {conflict_id} resolved by {} ({:?})",
            resolution.strategy_used, resolution.outcome
        ),
        EngineEvent::EditCommitted {
            edit_id,
            element_id,
            new_version,
        } => format!("edit {edit_id} committed on {element_id} as version {new_version}"),
        EngineEvent::EditRejected {
            edit_id,
            element_id,
            reason,
        } => format!("edit {edit_id} rejected on {element_id}: {reason}"),
    }
}
