//! Scenario file format for the simulate command.
//!
//! A scenario is a JSON document describing an ordered sequence of engine
//! operations: element tagging, edit submissions, manual decisions, and
//! timeout sweeps. Submissions are referenced by their zero-based position
//! among the scenario's `submit` steps, since edit IDs are assigned at run
//! time.

use std::collections::BTreeMap;

use concord::element::Content;
use concord::journal::EditPayload;
use concord::policy::PolicyBook;
use serde::Deserialize;

/// A replayable sequence of engine operations.
#[derive(Debug, Deserialize)]
pub struct Scenario {
    /// Policy configuration for the run. Overridable from the command line.
    #[serde(default)]
    pub policies: Option<PolicyBook>,

    /// The operations, executed in order.
    pub steps: Vec<Step>,
}

/// One scenario operation.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Register document/class labels on an element.
    Tag {
        element: String,
        #[serde(default)]
        doc: Option<String>,
        #[serde(default)]
        class: Option<String>,
    },
    /// Submit an edit.
    Submit {
        element: String,
        author: String,
        base_version: u64,
        #[serde(flatten)]
        payload: PayloadSpec,
    },
    /// Manually settle the open conflict referencing an earlier submission
    /// by choosing that submission's edit.
    Choose {
        /// Zero-based index among the scenario's submit steps.
        submit: usize,
        decided_by: String,
    },
    /// Manually settle the latest open conflict on an element with
    /// hand-authored content.
    Merge {
        element: String,
        content: String,
        decided_by: String,
    },
    /// Manually reject every side of the latest open conflict on an element.
    Reject { element: String, decided_by: String },
    /// Re-run automated resolution on the latest open conflict on an element.
    Resolve { element: String },
    /// Escalate every conflict whose manual-resolution timeout expired.
    Sweep,
    /// Withdraw an earlier submission.
    Withdraw {
        /// Zero-based index among the scenario's submit steps.
        submit: usize,
        author: String,
    },
}

/// The payload of a submit step; exactly one of the fields should be set.
#[derive(Debug, Default, Deserialize)]
pub struct PayloadSpec {
    /// Full-content replacement (UTF-8 text).
    #[serde(default)]
    pub replace: Option<String>,

    /// Region patch: region name to replacement text.
    #[serde(default)]
    pub patch: Option<BTreeMap<String, String>>,

    /// Delete the element.
    #[serde(default)]
    pub delete: bool,
}

impl PayloadSpec {
    /// Builds the edit payload, rejecting ambiguous or empty specs.
    pub fn to_payload(&self) -> Result<EditPayload, String> {
        match (&self.replace, &self.patch, self.delete) {
            (Some(text), None, false) => {
                Ok(EditPayload::Replace(Content::opaque(text.as_bytes().to_vec())))
            }
            (None, Some(patch), false) => Ok(EditPayload::Patch {
                regions: patch
                    .iter()
                    .map(|(region, text)| (region.clone(), text.as_bytes().to_vec()))
                    .collect(),
            }),
            (None, None, true) => Ok(EditPayload::Delete),
            (None, None, false) => {
                Err("submit step needs one of 'replace', 'patch', or 'delete'".to_string())
            }
            _ => Err("submit step must set exactly one of 'replace', 'patch', 'delete'".to_string()),
        }
    }
}
