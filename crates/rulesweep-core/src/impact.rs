//! Blast radius of moving an allow rule further down the rule base.
//!
//! Firewalls stop at the first matching rule. When an allow rule is moved
//! past a deny rule that matches some of the same traffic, the first match
//! for that shared traffic changes. Those deny rules are the affected set.
//!
//! Disabled deny rules stay candidates: re-enabling one later would expose
//! the same bypass. Each partition (vsys) is its own rule base, so only deny
//! rules of the moved rule's partition are considered.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::model::RuleRecord;
use crate::overlap::{ObjectCatalog, OverlapEngine};
use crate::util::deterministic::sort_affected;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AffectedRule {
    pub sequence: u32,
    pub name: String,
}

/// One relocation request. `partition` selects the rule base when the same
/// name exists in several.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImpactTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    pub rule: String,
    pub to: u32,
}

impl ImpactTarget {
    pub fn new(rule: impl Into<String>, to: u32) -> Self {
        Self {
            partition: None,
            rule: rule.into(),
            to,
        }
    }

    pub fn in_partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }
}

/// Affected deny rules for one relocation, keyed by the moved rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImpactReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    pub rule: String,
    pub from: u32,
    pub to: u32,
    /// Deny rules in `(from, to]` that were considered.
    pub candidates: usize,
    pub affected: Vec<AffectedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImpactFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    pub rule: String,
    pub to: u32,
    pub error: String,
}

/// Outcome of [`ImpactAnalyzer::analyze_many`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchImpact {
    pub reports: Vec<ImpactReport>,
    pub failures: Vec<ImpactFailure>,
}

pub struct ImpactAnalyzer<'a> {
    rules: &'a [RuleRecord],
    catalog: &'a ObjectCatalog,
    max_depth: usize,
}

impl<'a> ImpactAnalyzer<'a> {
    pub fn new(rules: &'a [RuleRecord], catalog: &'a ObjectCatalog, max_depth: usize) -> Self {
        Self {
            rules,
            catalog,
            max_depth,
        }
    }

    /// Deny rules whose effect changes if `name` moves to sequence `to`.
    ///
    /// Only downward moves (`to` greater than the current sequence) are
    /// supported. Without a partition the name must be unique across the
    /// snapshot.
    pub fn analyze(&self, partition: Option<&str>, name: &str, to: u32) -> Result<ImpactReport> {
        let moved = self.find(partition, name)?;

        if !moved.is_allow() {
            return Err(Error::NotAllowRule { rule: name.into() });
        }
        let from = moved.sequence;
        if to <= from {
            return Err(Error::UnsupportedDirection {
                rule: name.into(),
                from,
                to,
            });
        }

        let candidates: Vec<&RuleRecord> = self
            .rules
            .iter()
            .filter(|r| r.partition == moved.partition)
            .filter(|r| r.sequence > from && r.sequence <= to)
            .filter(|r| r.is_deny())
            .collect();

        // One engine per call: the expansion cache is never shared.
        let mut engine = OverlapEngine::new(self.catalog, self.max_depth);
        let mut affected: Vec<AffectedRule> = candidates
            .iter()
            .filter(|candidate| engine.overlap(moved, candidate))
            .map(|r| AffectedRule {
                sequence: r.sequence,
                name: r.name.clone(),
            })
            .collect();
        sort_affected(&mut affected);

        debug!(
            rule = name,
            from,
            to,
            candidates = candidates.len(),
            affected = affected.len(),
            "impact analyzed"
        );

        Ok(ImpactReport {
            partition: moved.partition.clone(),
            rule: name.to_string(),
            from,
            to,
            candidates: candidates.len(),
            affected,
        })
    }

    /// Runs [`analyze`](Self::analyze) for every target, collecting failures
    /// instead of stopping at the first one.
    pub fn analyze_many(&self, targets: &[ImpactTarget]) -> BatchImpact {
        let mut batch = BatchImpact::default();
        for (idx, target) in targets.iter().enumerate() {
            debug!(progress = idx + 1, total = targets.len(), rule = %target.rule, "analyzing target");
            match self.analyze(target.partition.as_deref(), &target.rule, target.to) {
                Ok(report) => batch.reports.push(report),
                Err(err) => {
                    warn!(rule = %target.rule, to = target.to, error = %err, "impact analysis failed");
                    batch.failures.push(ImpactFailure {
                        partition: target.partition.clone(),
                        rule: target.rule.clone(),
                        to: target.to,
                        error: err.to_string(),
                    });
                }
            }
        }
        info!(
            succeeded = batch.reports.len(),
            failed = batch.failures.len(),
            "batch impact analysis finished"
        );
        batch
    }

    fn find(&self, partition: Option<&str>, name: &str) -> Result<&'a RuleRecord> {
        let rules = self.rules;
        let mut matches = rules.iter().filter(|r| {
            r.name == name && partition.is_none_or(|p| r.partition.as_deref() == Some(p))
        });
        let found = matches.next().ok_or_else(|| match partition {
            Some(p) => Error::lookup(format!("rule '{name}' in partition '{p}'")),
            None => Error::lookup(format!("rule '{name}'")),
        })?;
        if matches.next().is_some() {
            return Err(Error::lookup(format!(
                "unique rule '{name}' (present in several partitions; name one)"
            )));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, FieldSet, Vendor};

    fn rule(seq: u32, name: &str, action: Action, src: &str, svc: &str) -> RuleRecord {
        let mut r = RuleRecord::new(Vendor::PaloAlto, seq, name, action);
        r.source = FieldSet::parse(src);
        r.service = FieldSet::parse(svc);
        r
    }

    #[test]
    fn upward_move_is_rejected() {
        let rules = vec![
            rule(1, "D1", Action::Deny, "10.0.0.0/24", "tcp/80"),
            rule(2, "A1", Action::Allow, "10.0.0.5", "tcp/80"),
            rule(3, "A2", Action::Allow, "10.0.0.6", "tcp/80"),
        ];
        let catalog = ObjectCatalog::new();
        let analyzer = ImpactAnalyzer::new(&rules, &catalog, 32);

        let err = analyzer.analyze(None, "A2", 0).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedDirection { from: 3, to: 0, .. }
        ));
        assert!(matches!(
            analyzer.analyze(None, "A2", 3).unwrap_err(),
            Error::UnsupportedDirection { .. }
        ));
    }

    #[test]
    fn overlapping_deny_rules_in_range_are_affected() {
        let mut disabled = rule(4, "D-off", Action::Deny, "10.0.0.7", "tcp/443");
        disabled.enabled = false;
        let rules = vec![
            rule(1, "A", Action::Allow, "10.0.0.0/24", "tcp/443"),
            rule(2, "D-hit", Action::Deny, "10.0.0.128/25", "tcp"),
            rule(3, "D-miss", Action::Deny, "10.0.1.0/24", "tcp/443"),
            disabled,
            rule(5, "B", Action::Allow, "any", "any"),
            rule(6, "D-edge", Action::Deny, "any", "tcp/443"),
            rule(7, "D-beyond", Action::Deny, "any", "any"),
        ];
        let catalog = ObjectCatalog::new();
        let analyzer = ImpactAnalyzer::new(&rules, &catalog, 32);

        let report = analyzer.analyze(None, "A", 6).unwrap();
        assert_eq!(report.from, 1);
        assert_eq!(report.candidates, 4);
        let names: Vec<&str> = report.affected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["D-hit", "D-off", "D-edge"]);
    }

    #[test]
    fn disabled_deny_rule_is_still_a_candidate() {
        let mut off = rule(2, "D", Action::Deny, "any", "any");
        off.enabled = false;
        let rules = vec![rule(1, "A", Action::Allow, "any", "any"), off];
        let catalog = ObjectCatalog::new();

        let report = ImpactAnalyzer::new(&rules, &catalog, 32)
            .analyze(None, "A", 2)
            .unwrap();
        assert_eq!(report.candidates, 1);
        assert_eq!(report.affected[0].name, "D");
    }

    fn in_vsys(mut r: RuleRecord, vsys: &str) -> RuleRecord {
        r.partition = Some(vsys.to_string());
        r
    }

    #[test]
    fn partitions_are_separate_rule_bases() {
        let rules = vec![
            in_vsys(rule(1, "web", Action::Allow, "any", "any"), "vsys1"),
            in_vsys(rule(2, "block", Action::Deny, "any", "any"), "vsys2"),
            in_vsys(rule(3, "web", Action::Allow, "any", "any"), "vsys2"),
            in_vsys(rule(4, "block1", Action::Deny, "any", "any"), "vsys1"),
            in_vsys(rule(5, "block2", Action::Deny, "any", "any"), "vsys2"),
        ];
        let catalog = ObjectCatalog::new();
        let analyzer = ImpactAnalyzer::new(&rules, &catalog, 32);

        let report = analyzer.analyze(Some("vsys1"), "web", 5).unwrap();
        assert_eq!(report.from, 1);
        assert_eq!(report.partition.as_deref(), Some("vsys1"));
        let names: Vec<&str> = report.affected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["block1"]);

        let report = analyzer.analyze(Some("vsys2"), "web", 5).unwrap();
        assert_eq!(report.from, 3);
        let names: Vec<&str> = report.affected.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["block2"]);
    }

    #[test]
    fn name_shared_across_partitions_needs_a_partition() {
        let rules = vec![
            in_vsys(rule(1, "web", Action::Allow, "any", "any"), "vsys1"),
            in_vsys(rule(3, "web", Action::Allow, "any", "any"), "vsys2"),
        ];
        let catalog = ObjectCatalog::new();
        let analyzer = ImpactAnalyzer::new(&rules, &catalog, 32);

        let err = analyzer.analyze(None, "web", 5).unwrap_err();
        assert!(err.to_string().contains("several partitions"), "{err}");
        assert!(matches!(
            analyzer.analyze(Some("vsys3"), "web", 5).unwrap_err(),
            Error::Lookup { .. }
        ));
    }

    #[test]
    fn deny_and_unknown_targets_fail() {
        let rules = vec![rule(1, "D", Action::Deny, "any", "any")];
        let catalog = ObjectCatalog::new();
        let analyzer = ImpactAnalyzer::new(&rules, &catalog, 32);

        assert!(matches!(
            analyzer.analyze(None, "D", 5).unwrap_err(),
            Error::NotAllowRule { .. }
        ));
        assert!(matches!(
            analyzer.analyze(None, "missing", 5).unwrap_err(),
            Error::Lookup { .. }
        ));
    }

    #[test]
    fn batch_collects_failures() {
        let rules = vec![
            rule(1, "A", Action::Allow, "any", "any"),
            rule(2, "D", Action::Deny, "any", "any"),
        ];
        let catalog = ObjectCatalog::new();
        let analyzer = ImpactAnalyzer::new(&rules, &catalog, 32);

        let batch = analyzer.analyze_many(&[
            ImpactTarget::new("A", 2),
            ImpactTarget::new("A", 1),
            ImpactTarget::new("nope", 9),
        ]);
        assert_eq!(batch.reports.len(), 1);
        assert_eq!(batch.reports[0].affected.len(), 1);
        assert_eq!(batch.failures.len(), 2);
        assert!(batch.failures[1].error.contains("nope"));
    }
}
