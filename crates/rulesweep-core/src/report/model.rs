use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::SCHEMA_VERSION;
use crate::model::{
    ClassifiedRule, DuplicateRole, ExceptionTag, Expiration, RequestType, UsageFlag, Vendor,
};

/// Named output bucket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    ExpiredUsed,
    ExpiredUnused,
    UnexpiredUnused,
    NoHistoryUnused,
    DuplicateNotice,
    DuplicateDelete,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::ExpiredUsed,
        Bucket::ExpiredUnused,
        Bucket::UnexpiredUnused,
        Bucket::NoHistoryUnused,
        Bucket::DuplicateNotice,
        Bucket::DuplicateDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::ExpiredUsed => "expired_used",
            Bucket::ExpiredUnused => "expired_unused",
            Bucket::UnexpiredUnused => "unexpired_unused",
            Bucket::NoHistoryUnused => "no_history_unused",
            Bucket::DuplicateNotice => "duplicate_notice",
            Bucket::DuplicateDelete => "duplicate_delete",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Bucket::ExpiredUsed => "Expired and used",
            Bucket::ExpiredUnused => "Expired and unused",
            Bucket::UnexpiredUnused => "Not expired and unused",
            Bucket::NoHistoryUnused => "No request history and unused",
            Bucket::DuplicateNotice => "Duplicates for notice",
            Bucket::DuplicateDelete => "Duplicates for deletion",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row background used to tell duplicate roles apart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RowShade {
    Light,
    Dark,
}

impl From<DuplicateRole> for RowShade {
    fn from(role: DuplicateRole) -> Self {
        match role {
            DuplicateRole::Upper => RowShade::Light,
            DuplicateRole::Lower => RowShade::Dark,
        }
    }
}

/// Per-rule classification columns handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportRow {
    pub sequence: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    pub enabled: bool,
    pub action: String,
    pub source: String,
    pub user: String,
    pub destination: String,
    pub service: String,
    pub application: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_group: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shade: Option<RowShade>,
}

impl From<&ClassifiedRule> for ReportRow {
    fn from(r: &ClassifiedRule) -> Self {
        let request = r.state.request.as_ref();
        Self {
            sequence: r.rule.sequence,
            name: r.rule.name.clone(),
            partition: r.rule.partition.clone(),
            enabled: r.rule.enabled,
            action: r.rule.action.as_str().to_string(),
            source: r.rule.source.joined(),
            user: r.rule.user.joined(),
            destination: r.rule.destination.joined(),
            service: r.rule.service.joined(),
            application: r.rule.application.joined(),
            description: r.rule.description.clone(),
            request_id: request.map(|q| q.request_id.clone()),
            request_type: r.state.request_type,
            requester: request.and_then(|q| q.requester.clone()),
            end_date: r.state.resolved_end_date(),
            exception: r.state.exception,
            expiration: r.state.expiration,
            usage: r.state.usage,
            duplicate: r.state.duplicate,
            duplicate_group: r.state.duplicate_group,
            shade: r.state.duplicate.map(RowShade::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketTable {
    pub bucket: Bucket,
    pub title: String,
    pub rows: Vec<ReportRow>,
}

impl BucketTable {
    pub fn new(bucket: Bucket, rows: Vec<ReportRow>) -> Self {
        Self {
            bucket,
            title: bucket.title().to_string(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Tool metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInfo {
    pub name: String,
    pub version: String,
}

impl Default for ToolInfo {
    fn default() -> Self {
        Self {
            name: crate::TOOL_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Output of the report stage.
///
/// Must remain deterministic for identical snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Report {
    pub schema_version: String,
    pub tool: ToolInfo,
    pub vendor: Vendor,
    pub generated_at: NaiveDateTime,
    pub summary: BTreeMap<Bucket, usize>,
    /// Every rule with its classification columns, in sequence order.
    pub final_table: Vec<ReportRow>,
    /// One table per bucket, empty buckets included.
    pub buckets: Vec<BucketTable>,
}

impl Report {
    pub fn new(
        vendor: Vendor,
        generated_at: NaiveDateTime,
        final_table: Vec<ReportRow>,
        buckets: Vec<BucketTable>,
    ) -> Self {
        let summary = buckets.iter().map(|t| (t.bucket, t.rows.len())).collect();
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            tool: ToolInfo::default(),
            vendor,
            generated_at,
            summary,
            final_table,
            buckets,
        }
    }

    pub fn bucket(&self, bucket: Bucket) -> Option<&BucketTable> {
        self.buckets.iter().find(|t| t.bucket == bucket)
    }

    /// Names of the rules placed in `bucket`.
    pub fn names(&self, bucket: Bucket) -> Vec<&str> {
        self.bucket(bucket)
            .map(|t| t.rows.iter().map(|r| r.name.as_str()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, RuleRecord};

    #[test]
    fn bucket_names_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&Bucket::NoHistoryUnused).unwrap(),
            "\"no_history_unused\""
        );
        assert_eq!(Bucket::DuplicateDelete.to_string(), "duplicate_delete");
    }

    #[test]
    fn row_shade_follows_role() {
        let mut rule = ClassifiedRule::new(RuleRecord::new(Vendor::Secui, 1, "a", Action::Allow));
        assert_eq!(ReportRow::from(&rule).shade, None);

        rule.state.duplicate = Some(DuplicateRole::Lower);
        assert_eq!(ReportRow::from(&rule).shade, Some(RowShade::Dark));
    }

    #[test]
    fn summary_counts_every_bucket() {
        let buckets = Bucket::ALL.iter().map(|b| BucketTable::new(*b, Vec::new())).collect();
        let report = Report::new(
            Vendor::PaloAlto,
            "2026-01-31T00:00:00".parse().unwrap(),
            Vec::new(),
            buckets,
        );
        assert_eq!(report.summary.len(), 6);
        assert!(report.names(Bucket::ExpiredUsed).is_empty());
        assert_eq!(report.tool.name, crate::TOOL_NAME);
    }
}
