//! Versioned element model.
//!
//! An element is the smallest addressable unit of document content the engine
//! tracks: a paragraph, a cell, an embedded object. The engine treats element
//! content as an opaque payload plus optional merge hints (named regions), and
//! guards every mutation behind a per-element optimistic version check. The
//! version counter is the optimistic-concurrency primitive the rest of the
//! system is built on: it only ever increases, and a commit succeeds only when
//! the committer observed the current value.

mod errors;
mod id;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use errors::ElementError;
pub use id::ElementId;

/// Monotonically increasing element version. A freshly created element is at
/// version 0; every committed change increments it by one.
pub type Version = u64;

/// Element content: an opaque byte payload plus optional merge hints.
///
/// When the document subsystem supplies structured diff hints, content is
/// organized as named regions (`regions`), and `data` is the canonical
/// flattening (region bytes concatenated in region-name order). Without
/// hints, `data` is the raw opaque payload and `regions` is empty. Region
/// names are the unit of overlap detection: two edits touch "the same part"
/// of an element exactly when their region-name sets intersect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Content {
    /// Opaque payload bytes. The document subsystem owns their structure.
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,

    /// Optional named-region decomposition of the payload.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub regions: BTreeMap<String, Vec<u8>>,
}

impl Content {
    /// Opaque content with no merge hints.
    pub fn opaque(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            regions: BTreeMap::new(),
        }
    }

    /// Region-structured content. The flat payload is derived from the
    /// regions in name order.
    pub fn from_regions(regions: BTreeMap<String, Vec<u8>>) -> Self {
        let data = flatten(&regions);
        Self { data, regions }
    }

    /// Empty content (the state of a newly introduced element).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this content carries named-region merge hints.
    pub fn is_structured(&self) -> bool {
        !self.regions.is_empty()
    }

    /// Returns a new content with the given region replacements applied.
    ///
    /// Untouched regions are preserved; the flat payload is re-derived.
    pub fn with_regions_replaced(&self, replacements: &BTreeMap<String, Vec<u8>>) -> Self {
        let mut regions = self.regions.clone();
        for (name, bytes) in replacements {
            regions.insert(name.clone(), bytes.clone());
        }
        Self::from_regions(regions)
    }
}

/// Canonical flattening: region bytes concatenated in region-name order.
fn flatten(regions: &BTreeMap<String, Vec<u8>>) -> Vec<u8> {
    let mut data = Vec::new();
    for bytes in regions.values() {
        data.extend_from_slice(bytes);
    }
    data
}

/// An addressable unit of document content and its committed state.
///
/// Elements are created when first introduced into a document, mutated only
/// through committed edits, and never physically removed: deletion is itself
/// a recorded edit that leaves a tombstone behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Stable identifier of this content unit.
    pub id: ElementId,

    /// Current committed version. Strictly increasing, never reused.
    pub current_version: Version,

    /// Committed content as of `current_version`.
    pub content: Content,

    /// Tombstone flag: set when a committed deletion removed the element
    /// from the document. The record survives for audit and staleness checks.
    pub deleted: bool,

    /// Document this element belongs to, when the document subsystem has
    /// registered one. Used for per-document policy overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    /// Element class label (e.g. a protected section marker). Used for
    /// per-element-class policy overrides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
}

impl Element {
    /// A newly introduced element at version 0 with empty content.
    pub fn new(id: impl Into<ElementId>) -> Self {
        Self {
            id: id.into(),
            current_version: 0,
            content: Content::empty(),
            deleted: false,
            doc: None,
            class: None,
        }
    }
}
