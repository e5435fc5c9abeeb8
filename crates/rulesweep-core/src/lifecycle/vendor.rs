//! Vendor-specific exception tagging and expiration.
//!
//! Responsibilities:
//! - Assign at most one exception tag per rule
//! - Decide whether the rule's request has expired
//!
//! Non-responsibilities:
//! - Resolving request history or usage (earlier stages)
//! - Deciding report placement (handled in `report::assemble`)
//!
//! Tagging is an ordered chain of `(tag, predicate)` pairs. Every predicate
//! is evaluated and the last one that holds decides the tag:
//!
//!   1. request id has an exception prefix   → exception-requested
//!   2. request auto-extended                → auto-extended
//!   3. name embeds a recent date            → new-policy
//!   4. above the baseline deny-all rule     → infrastructure-policy
//!   5. test naming convention               → test-group-policy
//!   6. disabled                             → disabled-policy
//!   7. disabled baseline rule               → baseline-policy
//!   8. deny action                          → blocking-policy
//!
//! Predicates never read the previous tag, so re-running the stage on an
//! already tagged snapshot yields the same tags.

use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::model::{ClassificationState, ClassifiedRule, ExceptionTag, Expiration, RuleRecord, Vendor};

static NAME_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{8})").expect("valid name date pattern"));

/// Snapshot-wide facts the predicates read.
pub struct TagContext<'a> {
    pub vendor: Vendor,
    pub config: &'a AnalysisConfig,
    pub now: NaiveDateTime,
    /// Sequence of the baseline deny-all rule, if the snapshot has one.
    pub marker_sequence: Option<u32>,
}

impl<'a> TagContext<'a> {
    pub fn new(vendor: Vendor, config: &'a AnalysisConfig, rules: &[ClassifiedRule]) -> Self {
        let marker = &config.baseline_marker;
        let marker_sequence = rules
            .iter()
            .map(|r| &r.rule)
            .filter(|r| match vendor {
                Vendor::PaloAlto => r.name == *marker,
                Vendor::Secui => r.description.contains(marker.as_str()),
            })
            .map(|r| r.sequence)
            .min();

        Self {
            vendor,
            config,
            now: config.now(),
            marker_sequence,
        }
    }

    /// Where naming conventions are read: the name or the description.
    fn convention_text<'r>(&self, rule: &'r RuleRecord) -> &'r str {
        match self.vendor {
            Vendor::PaloAlto => &rule.name,
            Vendor::Secui => &rule.description,
        }
    }
}

type Predicate = fn(&ClassifiedRule, &TagContext<'_>) -> bool;

/// The tagging chain, in evaluation order.
pub const TAG_CHAIN: [(ExceptionTag, Predicate); 8] = [
    (ExceptionTag::ExceptionRequested, exception_requested),
    (ExceptionTag::AutoExtended, auto_extended),
    (ExceptionTag::NewPolicy, new_policy),
    (ExceptionTag::InfrastructurePolicy, infrastructure),
    (ExceptionTag::TestGroupPolicy, test_group),
    (ExceptionTag::DisabledPolicy, disabled),
    (ExceptionTag::BaselinePolicy, baseline),
    (ExceptionTag::BlockingPolicy, blocking),
];

fn exception_requested(r: &ClassifiedRule, ctx: &TagContext<'_>) -> bool {
    r.state.request_id().is_some_and(|id| {
        ctx.config
            .exception_request_prefixes
            .iter()
            .any(|p| !p.is_empty() && id.starts_with(p.as_str()))
    })
}

fn auto_extended(r: &ClassifiedRule, _: &TagContext<'_>) -> bool {
    r.state.auto_extended
}

fn new_policy(r: &ClassifiedRule, ctx: &TagContext<'_>) -> bool {
    let cutoff = ctx.config.new_policy_cutoff();
    NAME_DATE
        .captures_iter(&r.rule.name)
        .filter_map(|c| NaiveDate::parse_from_str(&c[1], "%Y%m%d").ok())
        .map(|d| d.and_time(NaiveTime::MIN))
        .any(|d| d >= cutoff && d <= ctx.now)
}

fn infrastructure(r: &ClassifiedRule, ctx: &TagContext<'_>) -> bool {
    match ctx.marker_sequence {
        Some(marker) => r.rule.sequence < marker,
        None => {
            let text = ctx.convention_text(&r.rule).to_lowercase();
            ctx.config
                .infrastructure_keywords
                .iter()
                .any(|k| text.contains(&k.to_lowercase()))
        }
    }
}

fn test_group(r: &ClassifiedRule, ctx: &TagContext<'_>) -> bool {
    let prefixes = &ctx.config.test_prefixes;
    match ctx.vendor {
        Vendor::PaloAlto => prefixes.iter().any(|p| r.rule.name.starts_with(p.as_str())),
        Vendor::Secui => prefixes.iter().any(|p| r.rule.description.contains(p.as_str())),
    }
}

fn disabled(r: &ClassifiedRule, _: &TagContext<'_>) -> bool {
    !r.rule.enabled
}

fn baseline(r: &ClassifiedRule, ctx: &TagContext<'_>) -> bool {
    let named = match ctx.vendor {
        Vendor::PaloAlto => r.rule.name.ends_with(ctx.config.baseline_name_suffix.as_str()),
        Vendor::Secui => r
            .rule
            .description
            .contains(ctx.config.baseline_description_marker.as_str()),
    };
    named && !r.rule.enabled
}

fn blocking(r: &ClassifiedRule, _: &TagContext<'_>) -> bool {
    r.rule.is_deny()
}

/// Last tag in the chain whose predicate holds.
pub fn exception_tag(rule: &ClassifiedRule, ctx: &TagContext<'_>) -> Option<ExceptionTag> {
    TAG_CHAIN
        .iter()
        .filter(|(_, holds)| holds(rule, ctx))
        .map(|(tag, _)| *tag)
        .last()
}

/// Expired when the resolved end date is not after `now`. A rule with no
/// resolvable end date counts as expired.
pub fn expiration(state: &ClassificationState, now: NaiveDateTime) -> Expiration {
    match state.resolved_end_date() {
        Some(end) if end.and_time(NaiveTime::MIN) > now => Expiration::NotExpired,
        _ => Expiration::Expired,
    }
}

pub fn process(
    rules: &[ClassifiedRule],
    vendor: Vendor,
    config: &AnalysisConfig,
) -> Vec<ClassifiedRule> {
    let ctx = TagContext::new(vendor, config, rules);
    debug!(%vendor, marker = ?ctx.marker_sequence, "vendor tagging context");

    let out: Vec<ClassifiedRule> = rules
        .iter()
        .map(|current| {
            let mut next = current.clone();
            next.state.exception = exception_tag(current, &ctx);
            next.state.expiration = Some(expiration(&current.state, ctx.now));
            next
        })
        .collect();

    let tagged = out.iter().filter(|r| r.state.exception.is_some()).count();
    let expired = out
        .iter()
        .filter(|r| r.state.expiration == Some(Expiration::Expired))
        .count();
    info!(%vendor, tagged, expired, "vendor rules applied");
    out
}
