//! Single-pass duplicate grouping over enabled allow rules.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{DuplicateRole, RuleRecord, Vendor};
use crate::normalize::{SignatureFields, signature};
use crate::util::deterministic::sort_duplicate_entries;

/// One member of a duplicate group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateEntry {
    pub group_id: u32,
    pub role: DuplicateRole,
    pub sequence: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
}

/// Groups enabled allow rules that share a normalized signature.
///
/// The topmost rule of each signature is `Upper`; every later one is `Lower`.
/// Only groups holding both roles survive, renumbered 1.. in first-seen order.
/// Output is ordered by group id, `Upper` first, then by sequence.
pub fn detect(rules: &[RuleRecord], vendor: Vendor) -> Vec<DuplicateEntry> {
    let fields = SignatureFields::for_snapshot(vendor, rules);

    let mut candidates: Vec<&RuleRecord> = rules
        .iter()
        .filter(|r| r.enabled && r.is_allow())
        .collect();
    candidates.sort_by_key(|r| r.sequence);

    debug!(candidates = candidates.len(), ?fields, "checking duplicate signatures");

    // Provisional group id is the position of the group's first member.
    let mut groups: HashMap<_, u32> = HashMap::new();
    let mut provisional = Vec::with_capacity(candidates.len());
    for (position, rule) in candidates.iter().enumerate() {
        let key = signature(rule, &fields);
        match groups.get(&key) {
            Some(&group) => provisional.push((group, DuplicateRole::Lower, *rule)),
            None => {
                let group = position as u32;
                groups.insert(key, group);
                provisional.push((group, DuplicateRole::Upper, *rule));
            }
        }
    }

    let mut counts: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for (group, role, _) in &provisional {
        let entry = counts.entry(*group).or_default();
        match role {
            DuplicateRole::Upper => entry.0 += 1,
            DuplicateRole::Lower => entry.1 += 1,
        }
    }

    // BTreeMap iteration follows provisional ids, i.e. first-seen order.
    let renumbered: HashMap<u32, u32> = counts
        .iter()
        .filter(|(_, (upper, lower))| *upper == 1 && *lower >= 1)
        .enumerate()
        .map(|(idx, (group, _))| (*group, idx as u32 + 1))
        .collect();

    let mut entries: Vec<DuplicateEntry> = provisional
        .into_iter()
        .filter_map(|(group, role, rule)| {
            renumbered.get(&group).map(|&group_id| DuplicateEntry {
                group_id,
                role,
                sequence: rule.sequence,
                name: rule.name.clone(),
                partition: rule.partition.clone(),
            })
        })
        .collect();

    sort_duplicate_entries(&mut entries);

    info!(
        groups = renumbered.len(),
        members = entries.len(),
        "duplicate analysis finished"
    );
    entries
}

/// Number of distinct groups in `entries`.
pub fn group_count(entries: &[DuplicateEntry]) -> usize {
    let mut ids: Vec<u32> = entries.iter().map(|e| e.group_id).collect();
    ids.dedup();
    ids.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, FieldSet};

    fn allow(seq: u32, name: &str, source: &str) -> RuleRecord {
        let mut r = RuleRecord::new(Vendor::Secui, seq, name, Action::Allow);
        r.source = FieldSet::parse(source);
        r.destination = FieldSet::parse("10.9.9.9");
        r.service = FieldSet::parse("tcp/443");
        r
    }

    #[test]
    fn same_signature_at_three_and_seven_forms_one_group() {
        let rules = vec![
            allow(1, "a", "10.0.0.1"),
            allow(3, "first", "10.1.0.1,10.1.0.2"),
            allow(5, "b", "10.0.0.5"),
            allow(7, "second", "10.1.0.2,10.1.0.1"),
        ];

        let entries = detect(&rules, Vendor::Secui);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group_id, 1);
        assert_eq!(entries[0].role, DuplicateRole::Upper);
        assert_eq!(entries[0].sequence, 3);
        assert_eq!(entries[1].group_id, 1);
        assert_eq!(entries[1].role, DuplicateRole::Lower);
        assert_eq!(entries[1].sequence, 7);
    }

    #[test]
    fn disabled_and_deny_rules_are_ignored() {
        let mut disabled = allow(2, "disabled", "10.0.0.1");
        disabled.enabled = false;
        let mut deny = allow(3, "deny", "10.0.0.1");
        deny.action = Action::Deny;

        let rules = vec![allow(1, "a", "10.0.0.1"), disabled, deny];
        assert!(detect(&rules, Vendor::Secui).is_empty());
    }

    #[test]
    fn group_ids_are_contiguous_in_first_seen_order() {
        let rules = vec![
            allow(1, "lonely", "10.0.0.1"),
            allow(2, "x-upper", "10.0.0.2"),
            allow(3, "y-upper", "10.0.0.3"),
            allow(4, "y-lower", "10.0.0.3"),
            allow(5, "x-lower", "10.0.0.2"),
            allow(6, "x-lower-2", "10.0.0.2"),
        ];

        let entries = detect(&rules, Vendor::Secui);
        let summary: Vec<(u32, &str, &str)> = entries
            .iter()
            .map(|e| (e.group_id, e.role.as_str(), e.name.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, "Upper", "x-upper"),
                (1, "Lower", "x-lower"),
                (1, "Lower", "x-lower-2"),
                (2, "Upper", "y-upper"),
                (2, "Lower", "y-lower"),
            ]
        );
        assert_eq!(group_count(&entries), 2);
    }

    #[test]
    fn input_order_does_not_matter() {
        let rules = vec![allow(7, "second", "10.1.0.1"), allow(3, "first", "10.1.0.1")];
        let entries = detect(&rules, Vendor::Secui);
        assert_eq!(entries[0].name, "first");
        assert_eq!(entries[0].role, DuplicateRole::Upper);
    }
}
