//! Duplicate detection over allow rules and the review derived from it.

pub mod detect;
pub mod review;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use detect::{DuplicateEntry, detect, group_count};
pub use review::{Disposition, ReviewedEntry, review_groups};

use crate::model::DuplicateRole;

/// Side artifact persisted by the duplicate stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateArtifact {
    pub groups: usize,
    pub entries: Vec<DuplicateEntry>,
    #[serde(default)]
    pub review: Vec<ReviewedEntry>,
}

impl DuplicateArtifact {
    pub fn new(entries: Vec<DuplicateEntry>, review: Vec<ReviewedEntry>) -> Self {
        Self {
            groups: group_count(&entries),
            entries,
            review,
        }
    }

    /// Role and group of each member, keyed by `(partition, name)`.
    pub fn roles(&self) -> BTreeMap<(Option<String>, String), (DuplicateRole, u32)> {
        self.entries
            .iter()
            .map(|e| ((e.partition.clone(), e.name.clone()), (e.role, e.group_id)))
            .collect()
    }
}
