//! Resolution policy configuration.
//!
//! A [`Policy`] selects the strategy used to settle conflicts and carries the
//! strategy's parameters: a fallback for degradation, an optional manual
//! resolution timeout, the author precedence table, and consensus quorum
//! settings. A [`PolicyBook`] layers a global default with per-document and
//! per-element-class overrides (e.g. protected sections that always require
//! manual review).
//!
//! Policies are read-only configuration: the engine consumes them during
//! resolution and never mutates them at runtime.

mod errors;

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::journal::AuthorId;

pub use errors::PolicyError;

/// The policy-selectable algorithm used to settle a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The competing edit with the latest submission time wins; ties are
    /// broken by edit ID ordering.
    LastWriteWins,
    /// No automatic outcome; the conflict waits for an explicit human
    /// decision.
    ManualMerge,
    /// Synthesizes a new payload combining the non-overlapping regions of
    /// the competing edits. Only applicable to mergeable conflicts;
    /// contradictions degrade to the configured fallback.
    AutoMerge,
    /// The edit whose author holds the highest configured precedence rank
    /// wins; ties fall back to last-write-wins.
    Hierarchical,
    /// Resolution is deferred until a quorum of approvers accept one
    /// outcome.
    ConsensusRequired,
}

impl Strategy {
    /// Canonical lower-case name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::LastWriteWins => "last_write_wins",
            Strategy::ManualMerge => "manual_merge",
            Strategy::AutoMerge => "auto_merge",
            Strategy::Hierarchical => "hierarchical",
            Strategy::ConsensusRequired => "consensus_required",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Strategy {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last_write_wins" => Ok(Strategy::LastWriteWins),
            "manual_merge" => Ok(Strategy::ManualMerge),
            "auto_merge" => Ok(Strategy::AutoMerge),
            "hierarchical" => Ok(Strategy::Hierarchical),
            "consensus_required" => Ok(Strategy::ConsensusRequired),
            other => Err(PolicyError::UnknownStrategy {
                name: other.to_string(),
            }),
        }
    }
}

/// Configuration consumed during conflict resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// The strategy applied to conflicts under this policy.
    pub strategy: Strategy,

    /// Strategy applied when the primary strategy cannot decide (auto-merge
    /// on a contradictory conflict). `None` means degrade to manual merge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_strategy: Option<Strategy>,

    /// How long a conflict may sit awaiting manual resolution before the
    /// coordinator escalates it with last-write-wins, in milliseconds.
    /// `None` disables the timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual_resolution_timeout_ms: Option<u64>,

    /// Author precedence ranks for the hierarchical strategy. Authors not
    /// listed rank 0.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub precedence: BTreeMap<AuthorId, u32>,

    /// Number of accepting approvers required by the consensus strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quorum: Option<u32>,

    /// Designated approvers whose votes count toward the quorum. Empty means
    /// any author may vote.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub approvers: BTreeSet<AuthorId>,
}

impl Policy {
    /// A policy using the given strategy with no overrides.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            fallback_strategy: None,
            manual_resolution_timeout_ms: None,
            precedence: BTreeMap::new(),
            quorum: None,
            approvers: BTreeSet::new(),
        }
    }

    /// Sets the fallback strategy.
    pub fn with_fallback(mut self, fallback: Strategy) -> Self {
        self.fallback_strategy = Some(fallback);
        self
    }

    /// Sets the manual resolution timeout.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.manual_resolution_timeout_ms = Some(timeout_ms);
        self
    }

    /// Sets an author's precedence rank.
    pub fn with_rank(mut self, author: impl Into<AuthorId>, rank: u32) -> Self {
        self.precedence.insert(author.into(), rank);
        self
    }

    /// Sets the consensus quorum.
    pub fn with_quorum(mut self, quorum: u32) -> Self {
        self.quorum = Some(quorum);
        self
    }

    /// Adds a designated approver.
    pub fn with_approver(mut self, author: impl Into<AuthorId>) -> Self {
        self.approvers.insert(author.into());
        self
    }

    /// The precedence rank of an author; unlisted authors rank 0.
    pub fn rank_of(&self, author: &AuthorId) -> u32 {
        self.precedence.get(author).copied().unwrap_or(0)
    }

    /// Whether an author's vote counts toward the consensus quorum.
    pub fn is_approver(&self, author: &AuthorId) -> bool {
        self.approvers.is_empty() || self.approvers.contains(author)
    }

    /// Validates strategy parameters.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.quorum == Some(0) {
            return Err(PolicyError::ZeroQuorum);
        }
        let consensus_in_use = self.strategy == Strategy::ConsensusRequired
            || self.fallback_strategy == Some(Strategy::ConsensusRequired);
        if consensus_in_use && self.quorum.is_none() {
            return Err(PolicyError::QuorumRequired {
                strategy: Strategy::ConsensusRequired.name().to_string(),
            });
        }
        if self.strategy == Strategy::AutoMerge
            && self.fallback_strategy == Some(Strategy::AutoMerge)
        {
            return Err(PolicyError::RecursiveFallback);
        }
        Ok(())
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(Strategy::LastWriteWins)
    }
}

/// Layered policy configuration: a global default plus per-document and
/// per-element-class overrides.
///
/// Lookup order is most-specific-first: element class, then document, then
/// the global default. Class overrides outrank document overrides so that a
/// "protected" section stays under manual review whatever its document's
/// policy says.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBook {
    /// The global default policy.
    #[serde(default)]
    pub default: Policy,

    /// Per-document overrides, keyed by document identifier.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub documents: BTreeMap<String, Policy>,

    /// Per-element-class overrides, keyed by class label.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub element_classes: BTreeMap<String, Policy>,
}

impl PolicyBook {
    /// A book holding only the given default policy.
    pub fn with_default(default: Policy) -> Self {
        Self {
            default,
            documents: BTreeMap::new(),
            element_classes: BTreeMap::new(),
        }
    }

    /// Adds a per-document override.
    pub fn with_document(mut self, doc: impl Into<String>, policy: Policy) -> Self {
        self.documents.insert(doc.into(), policy);
        self
    }

    /// Adds a per-element-class override.
    pub fn with_element_class(mut self, class: impl Into<String>, policy: Policy) -> Self {
        self.element_classes.insert(class.into(), policy);
        self
    }

    /// The policy in effect for an element with the given document and class
    /// labels.
    pub fn effective(&self, doc: Option<&str>, class: Option<&str>) -> &Policy {
        if let Some(class) = class
            && let Some(policy) = self.element_classes.get(class)
        {
            return policy;
        }
        if let Some(doc) = doc
            && let Some(policy) = self.documents.get(doc)
        {
            return policy;
        }
        &self.default
    }

    /// Validates every policy in the book.
    pub fn validate(&self) -> Result<(), PolicyError> {
        self.default.validate()?;
        for policy in self.documents.values() {
            policy.validate()?;
        }
        for policy in self.element_classes.values() {
            policy.validate()?;
        }
        Ok(())
    }
}
