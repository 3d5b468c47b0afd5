//! Outbound engine events.
//!
//! The coordinator publishes typed events for an external collaboration
//! layer to relay to clients: conflict detection, conflict resolution, and
//! edit commits. Subscribers register [`EventHook`]s; the coordinator never
//! holds direct references to subscriber objects, and hook failures never
//! roll back the state change that triggered them (they are logged and
//! reported, nothing more).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Result;
use crate::conflict::{Classification, ConflictId, Resolution};
use crate::element::{ElementId, Version};
use crate::journal::EditId;

/// Events the engine emits for the collaboration layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    /// A conflict was detected between competing edits.
    ConflictDetected {
        conflict_id: ConflictId,
        element_id: ElementId,
        competing_edit_ids: Vec<EditId>,
        classification: Classification,
    },
    /// A resolution settled a conflict.
    ConflictResolved {
        conflict_id: ConflictId,
        resolution: Resolution,
    },
    /// An edit's content became the element's committed state.
    EditCommitted {
        edit_id: EditId,
        element_id: ElementId,
        new_version: Version,
    },
    /// An edit terminated without landing (withdrawal or explicit rejection).
    EditRejected {
        edit_id: EditId,
        element_id: ElementId,
        reason: String,
    },
}

/// Trait for subscribing to engine events.
///
/// Hooks are called after the triggering state change has been applied.
/// A hook failure does not roll anything back; it is logged and the first
/// error is reported to the caller of the fan-out.
pub trait EventHook: Send + Sync {
    /// Called for every event the coordinator publishes.
    fn on_event(&self, event: &EngineEvent) -> Result<()>;
}

/// A collection of event hooks executed together, in registration order.
#[derive(Default)]
pub struct EventHookCollection {
    hooks: Vec<Arc<dyn EventHook>>,
}

impl EventHookCollection {
    /// Create a new empty hook collection.
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Add an event hook to the collection.
    pub fn add_hook(&mut self, hook: Arc<dyn EventHook>) {
        self.hooks.push(hook);
    }

    /// Execute all hooks with the given event.
    ///
    /// If a hook fails, execution continues with the remaining hooks and the
    /// first error is returned.
    pub fn execute_hooks(&self, event: &EngineEvent) -> Result<()> {
        let mut first_error = None;

        for hook in &self.hooks {
            if let Err(e) = hook.on_event(event) {
                tracing::error!("Event hook failed: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Check if there are any hooks registered.
    pub fn has_hooks(&self) -> bool {
        !self.hooks.is_empty()
    }

    /// Get the number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

/// Channel-based hook that forwards events into an `mpsc` queue for
/// out-of-process consumers.
///
/// Uses `try_send` so event fan-out never blocks a commit; a full or closed
/// channel drops the event with an error log.
pub struct ChannelRelay {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelRelay {
    /// Create a relay forwarding into the given channel.
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventHook for ChannelRelay {
    fn on_event(&self, event: &EngineEvent) -> Result<()> {
        if let Err(e) = self.tx.try_send(event.clone()) {
            tracing::error!("Failed to relay engine event: {e}");
        }
        Ok(())
    }
}
