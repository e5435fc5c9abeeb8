//! Deterministic ordering helpers.
//!
//! Every artifact this crate writes is ordered by these helpers so identical
//! inputs always produce byte-identical snapshots and reports.

use crate::duplicates::DuplicateEntry;
use crate::impact::AffectedRule;
use crate::model::RuleRecord;

/// Sort rules by evaluation order, then by `(partition, name)`.
///
/// Sequence numbers are unique within a validated snapshot; the name key only
/// matters for hand-built inputs.
pub fn sort_rules(rules: &mut [RuleRecord]) {
    rules.sort_by(|a, b| {
        (a.sequence, a.partition.as_deref(), a.name.as_str()).cmp(&(
            b.sequence,
            b.partition.as_deref(),
            b.name.as_str(),
        ))
    });
}

/// Sort duplicate entries by group id, `Upper` before `Lower`, then sequence.
pub fn sort_duplicate_entries(entries: &mut [DuplicateEntry]) {
    entries.sort_by(|a, b| (a.group_id, a.role, a.sequence).cmp(&(b.group_id, b.role, b.sequence)));
}

/// Sort affected deny rules by evaluation order.
pub fn sort_affected(rules: &mut [AffectedRule]) {
    rules.sort_by(|a, b| (a.sequence, a.name.as_str()).cmp(&(b.sequence, b.name.as_str())));
}
