use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::request::{RequestInfo, RequestType};
use super::rule::RuleRecord;

/// Exception labels, listed in the order the tagging chain evaluates them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum ExceptionTag {
    ExceptionRequested,
    AutoExtended,
    NewPolicy,
    InfrastructurePolicy,
    TestGroupPolicy,
    DisabledPolicy,
    BaselinePolicy,
    BlockingPolicy,
}

impl ExceptionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionTag::ExceptionRequested => "exception-requested",
            ExceptionTag::AutoExtended => "auto-extended",
            ExceptionTag::NewPolicy => "new-policy",
            ExceptionTag::InfrastructurePolicy => "infrastructure-policy",
            ExceptionTag::TestGroupPolicy => "test-group-policy",
            ExceptionTag::DisabledPolicy => "disabled-policy",
            ExceptionTag::BaselinePolicy => "baseline-policy",
            ExceptionTag::BlockingPolicy => "blocking-policy",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DuplicateRole {
    Upper,
    Lower,
}

impl DuplicateRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateRole::Upper => "Upper",
            DuplicateRole::Lower => "Lower",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "upper" => Some(DuplicateRole::Upper),
            "lower" => Some(DuplicateRole::Lower),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UsageFlag {
    Used,
    Unused,
}

impl UsageFlag {
    /// Reads an explicit usage column value. Unrecognized values yield `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "used" | "use" | "n" | "no" | "false" | "0" => Some(UsageFlag::Used),
            "unused" | "y" | "yes" | "true" | "1" => Some(UsageFlag::Unused),
            _ => None,
        }
    }
}

/// Which fallback produced a rule's usage flag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum UsageSource {
    ExternalFlag,
    ExternalLastHit,
    RuleLastHit,
    Default,
}

impl UsageSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageSource::ExternalFlag => "external-flag",
            UsageSource::ExternalLastHit => "external-last-hit",
            UsageSource::RuleLastHit => "rule-last-hit",
            UsageSource::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Expiration {
    Expired,
    NotExpired,
}

/// Per-rule classification accumulated by the lifecycle stages.
///
/// Every field starts empty; each stage fills in only the fields it owns.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassificationState {
    #[serde(default)]
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<RequestInfo>,
    /// End date parsed from the description, kept even when no request id was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub auto_extended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_source: Option<UsageSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate: Option<DuplicateRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duplicate_group: Option<u32>,
}

impl ClassificationState {
    /// End date used for expiration: the resolved request first, then the description.
    pub fn resolved_end_date(&self) -> Option<NaiveDate> {
        self.request
            .as_ref()
            .and_then(|r| r.end_date)
            .or(self.parsed_end_date)
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request.as_ref().map(|r| r.request_id.as_str())
    }
}

/// A rule together with its classification state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifiedRule {
    pub rule: RuleRecord,
    #[serde(default)]
    pub state: ClassificationState,
}

impl ClassifiedRule {
    pub fn new(rule: RuleRecord) -> Self {
        Self {
            rule,
            state: ClassificationState::default(),
        }
    }
}
