//! Usage resolution.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDateTime;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::model::{ClassifiedRule, UsageFlag, UsageRecord, UsageSource};

fn by_hit(last_hit: NaiveDateTime, cutoff: NaiveDateTime) -> UsageFlag {
    if last_hit < cutoff {
        UsageFlag::Unused
    } else {
        UsageFlag::Used
    }
}

/// Resolves a used/unused flag per rule.
///
/// Strategies, first applicable wins: the external flag for the rule, the
/// external last-hit timestamp, the rule's own last-hit timestamp. A rule
/// with none of these is unused.
pub fn process(
    rules: &[ClassifiedRule],
    usage: Option<&[UsageRecord]>,
    config: &AnalysisConfig,
) -> Vec<ClassifiedRule> {
    let cutoff = config.staleness_cutoff();
    let external: HashMap<&str, &UsageRecord> = usage
        .unwrap_or_default()
        .iter()
        .map(|u| (u.name.as_str(), u))
        .collect();

    if usage.is_none() {
        warn!("no usage data supplied; falling back to rule last-hit values");
    }

    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    let out = rules
        .iter()
        .map(|current| {
            let record = external.get(current.rule.name.as_str());
            let (flag, source) = match (
                record.and_then(|r| r.flag),
                record.and_then(|r| r.last_hit),
                current.rule.last_hit,
            ) {
                (Some(flag), _, _) => (flag, UsageSource::ExternalFlag),
                (None, Some(hit), _) => (by_hit(hit, cutoff), UsageSource::ExternalLastHit),
                (None, None, Some(hit)) => (by_hit(hit, cutoff), UsageSource::RuleLastHit),
                (None, None, None) => (UsageFlag::Unused, UsageSource::Default),
            };
            *tally.entry(source.as_str()).or_default() += 1;

            let mut next = current.clone();
            next.state.usage = Some(flag);
            next.state.usage_source = Some(source);
            next
        })
        .collect();

    info!(%cutoff, ?tally, "usage resolved");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, RuleRecord, Vendor};
    use chrono::Duration;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            as_of: Some("2026-01-31T00:00:00".parse().unwrap()),
            ..Default::default()
        }
    }

    fn rule(name: &str, last_hit: Option<NaiveDateTime>) -> ClassifiedRule {
        let mut r = RuleRecord::new(Vendor::PaloAlto, 1, name, Action::Allow);
        r.last_hit = last_hit;
        ClassifiedRule::new(r)
    }

    #[test]
    fn fallbacks_apply_in_order() {
        let config = config();
        let now = config.now();
        let usage = vec![
            UsageRecord {
                name: "flagged".into(),
                flag: Some(UsageFlag::Used),
                last_hit: Some(now - Duration::days(400)),
            },
            UsageRecord {
                name: "external-hit".into(),
                flag: None,
                last_hit: Some(now - Duration::days(10)),
            },
        ];
        let rules = vec![
            rule("flagged", None),
            rule("external-hit", Some(now - Duration::days(300))),
            rule("own-hit", Some(now - Duration::days(95))),
            rule("nothing", None),
        ];

        let out = process(&rules, Some(usage.as_slice()), &config);
        let got: Vec<(UsageFlag, UsageSource)> = out
            .iter()
            .map(|r| (r.state.usage.unwrap(), r.state.usage_source.unwrap()))
            .collect();
        assert_eq!(
            got,
            vec![
                (UsageFlag::Used, UsageSource::ExternalFlag),
                (UsageFlag::Used, UsageSource::ExternalLastHit),
                (UsageFlag::Unused, UsageSource::RuleLastHit),
                (UsageFlag::Unused, UsageSource::Default),
            ]
        );
    }

    #[test]
    fn window_boundary_counts_as_used() {
        let config = config();
        let rules = vec![rule("edge", Some(config.staleness_cutoff()))];
        let out = process(&rules, None, &config);
        assert_eq!(out[0].state.usage, Some(UsageFlag::Used));
    }
}
