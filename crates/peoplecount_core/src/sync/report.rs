//! Outcomes of relationship edits.

use crate::key::NormalizedKey;
use crate::types::EntityRef;
use serde::Serialize;

/// Result of linking one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// At least one side was written; both now hold the edge.
    Linked,
    /// Both sides already held the edge.
    AlreadyLinked,
    /// The named document does not exist; nothing was written.
    NotFound(EntityRef),
}

/// Result of unlinking one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlinkOutcome {
    /// At least one side was written; neither holds the edge now.
    Unlinked,
    /// Neither side held the edge.
    AlreadyUnlinked,
    /// The named document does not exist.
    NotFound(EntityRef),
}

/// Partition of a batch link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkReport {
    /// Targets now linked by this call.
    pub linked: Vec<NormalizedKey>,
    /// Targets that were linked before.
    pub already_linked: Vec<NormalizedKey>,
    /// Targets that do not exist.
    pub not_found: Vec<NormalizedKey>,
}

impl LinkReport {
    pub(crate) fn record(&mut self, target: NormalizedKey, outcome: &LinkOutcome) {
        match outcome {
            LinkOutcome::Linked => self.linked.push(target),
            LinkOutcome::AlreadyLinked => self.already_linked.push(target),
            LinkOutcome::NotFound(_) => self.not_found.push(target),
        }
    }

    /// True if some targets were skipped as missing.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.not_found.is_empty()
    }
}

/// Partition of a batch unlink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkReport {
    /// Targets unlinked by this call.
    pub unlinked: Vec<NormalizedKey>,
    /// Targets that were not linked.
    pub already_unlinked: Vec<NormalizedKey>,
    /// Targets that do not exist.
    pub not_found: Vec<NormalizedKey>,
}

impl UnlinkReport {
    pub(crate) fn record(&mut self, target: NormalizedKey, outcome: &UnlinkOutcome) {
        match outcome {
            UnlinkOutcome::Unlinked => self.unlinked.push(target),
            UnlinkOutcome::AlreadyUnlinked => self.already_unlinked.push(target),
            UnlinkOutcome::NotFound(_) => self.not_found.push(target),
        }
    }

    /// True if some targets were skipped as missing.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.not_found.is_empty()
    }
}
