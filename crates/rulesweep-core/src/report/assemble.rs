//! Bucket placement.
//!
//! Every bucket is a fixed predicate over five classification columns:
//! exception tag, duplicate role, request history, expiration and usage.
//! A rule may land in several buckets (a duplicate Lower that is also
//! expired), or in none.
//!
//! The expired buckets require known request history and the no-history
//! bucket requires unknown history, so "expired and unused" and "no history
//! and unused" never share a rule.

use chrono::NaiveDateTime;
use tracing::{debug, info};

use super::model::{Bucket, BucketTable, Report, ReportRow};
use crate::model::{ClassifiedRule, DuplicateRole, ExceptionTag, Expiration, UsageFlag, Vendor};

fn no_exception(r: &ClassifiedRule) -> bool {
    r.state.exception.is_none()
}

/// New rules still expire: a recent name date does not shield a lapsed request.
fn no_exception_or_new(r: &ClassifiedRule) -> bool {
    matches!(r.state.exception, None | Some(ExceptionTag::NewPolicy))
}

fn not_duplicate(r: &ClassifiedRule) -> bool {
    r.state.duplicate.is_none()
}

fn has_history(r: &ClassifiedRule) -> bool {
    r.state.request_type.is_known()
}

fn is_expired(r: &ClassifiedRule) -> bool {
    r.state.expiration == Some(Expiration::Expired)
}

fn is_unexpired(r: &ClassifiedRule) -> bool {
    r.state.expiration == Some(Expiration::NotExpired)
}

fn is_used(r: &ClassifiedRule) -> bool {
    r.state.usage == Some(UsageFlag::Used)
}

fn is_unused(r: &ClassifiedRule) -> bool {
    r.state.usage == Some(UsageFlag::Unused)
}

/// Whether `rule` belongs in `bucket`.
pub fn belongs(bucket: Bucket, r: &ClassifiedRule) -> bool {
    match bucket {
        Bucket::ExpiredUsed => {
            no_exception_or_new(r) && not_duplicate(r) && has_history(r) && is_expired(r) && is_used(r)
        }
        Bucket::ExpiredUnused => {
            no_exception_or_new(r)
                && not_duplicate(r)
                && has_history(r)
                && is_expired(r)
                && is_unused(r)
        }
        Bucket::UnexpiredUnused => {
            no_exception(r) && not_duplicate(r) && has_history(r) && is_unexpired(r) && is_unused(r)
        }
        Bucket::NoHistoryUnused => {
            no_exception(r) && not_duplicate(r) && !has_history(r) && is_unused(r)
        }
        Bucket::DuplicateNotice => r.state.duplicate == Some(DuplicateRole::Upper),
        Bucket::DuplicateDelete => r.state.duplicate == Some(DuplicateRole::Lower),
    }
}

/// Places every rule of the final snapshot.
///
/// Duplicate buckets are ordered by group then sequence so each group's rows
/// stay together; the rest follow sequence order.
pub fn assemble(rules: &[ClassifiedRule], vendor: Vendor, generated_at: NaiveDateTime) -> Report {
    let mut ordered: Vec<&ClassifiedRule> = rules.iter().collect();
    ordered.sort_by(|a, b| {
        (a.rule.sequence, &a.rule.name).cmp(&(b.rule.sequence, &b.rule.name))
    });

    let final_table: Vec<ReportRow> = ordered.iter().map(|r| ReportRow::from(*r)).collect();

    let buckets: Vec<BucketTable> = Bucket::ALL
        .iter()
        .map(|bucket| {
            let mut members: Vec<&ClassifiedRule> = ordered
                .iter()
                .copied()
                .filter(|r| belongs(*bucket, r))
                .collect();
            if matches!(bucket, Bucket::DuplicateNotice | Bucket::DuplicateDelete) {
                members.sort_by_key(|r| (r.state.duplicate_group, r.rule.sequence));
            }
            let rows: Vec<ReportRow> = members.into_iter().map(ReportRow::from).collect();
            debug!(%bucket, rows = rows.len(), "bucket filled");
            BucketTable::new(*bucket, rows)
        })
        .collect();

    let report = Report::new(vendor, generated_at, final_table, buckets);
    info!(%vendor, rules = rules.len(), summary = ?report.summary, "reports assembled");
    report
}
