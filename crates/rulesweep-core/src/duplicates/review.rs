//! Keep/delete decisions for duplicate groups.
//!
//! Within a group the member whose request runs longest is kept and every
//! other member is a deletion candidate. When members were requested by
//! different people the whole group needs a notice to its owners before
//! anything is removed.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::detect::DuplicateEntry;
use crate::model::ClassifiedRule;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Keep,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewedEntry {
    #[serde(flatten)]
    pub entry: DuplicateEntry,
    pub disposition: Disposition,
    /// Members have different requesters.
    pub notice: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
}

/// Derives a disposition for every member of every group.
///
/// The kept member is the one with the latest resolved end date, the first
/// such member on ties. Groups where no member has an end date have nothing
/// to keep and are dropped.
pub fn review_groups(entries: &[DuplicateEntry], rules: &[ClassifiedRule]) -> Vec<ReviewedEntry> {
    let by_key: HashMap<(Option<&str>, &str), &ClassifiedRule> = rules
        .iter()
        .map(|r| ((r.rule.partition.as_deref(), r.rule.name.as_str()), r))
        .collect();

    let mut out = Vec::with_capacity(entries.len());
    for group in entries.chunk_by(|a, b| a.group_id == b.group_id) {
        let facts: Vec<(Option<NaiveDate>, Option<String>)> = group
            .iter()
            .map(|e| {
                by_key
                    .get(&(e.partition.as_deref(), e.name.as_str()))
                    .map(|r| {
                        let requester = r.state.request.as_ref().and_then(|q| q.requester.clone());
                        (r.state.resolved_end_date(), requester)
                    })
                    .unwrap_or_default()
            })
            .collect();

        let latest = facts.iter().filter_map(|(end, _)| *end).max();
        let Some(latest) = latest else {
            debug!(group = group[0].group_id, "no member has an end date; group dropped");
            continue;
        };
        let keep_idx = facts
            .iter()
            .position(|(end, _)| *end == Some(latest))
            .unwrap_or(0);

        let mut requesters: Vec<&str> = facts.iter().filter_map(|(_, r)| r.as_deref()).collect();
        requesters.sort_unstable();
        requesters.dedup();
        let notice = requesters.len() != 1;

        for (idx, (entry, (end_date, requester))) in group.iter().zip(facts).enumerate() {
            out.push(ReviewedEntry {
                entry: entry.clone(),
                disposition: if idx == keep_idx {
                    Disposition::Keep
                } else {
                    Disposition::Delete
                },
                notice,
                end_date,
                requester,
            });
        }
    }
    out
}
