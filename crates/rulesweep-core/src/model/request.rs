use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Request-history type of a rule, derived from its request id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Normal,
    Group,
    Server,
    Pam,
    Old,
    #[default]
    Unknown,
}

impl RequestType {
    /// Classifies a request id by its leading type letter.
    pub fn from_request_id(id: &str) -> Self {
        match id.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('P') => RequestType::Group,
            Some('F') => RequestType::Normal,
            Some('S') => RequestType::Server,
            Some('M') => RequestType::Pam,
            _ => RequestType::Unknown,
        }
    }

    /// Any type other than `Unknown` counts as having request history.
    pub fn is_known(&self) -> bool {
        *self != RequestType::Unknown
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Normal => "normal",
            RequestType::Group => "group",
            RequestType::Server => "server",
            RequestType::Pam => "pam",
            RequestType::Old => "old",
            RequestType::Unknown => "unknown",
        }
    }
}

/// One row of the external request-metadata table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestRecord {
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approver_id: Option<String>,
}

/// Where a rule's resolved request record came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RequestOrigin {
    /// Joined from the request-metadata table.
    Matched,
    /// Built from fields parsed out of the description.
    Synthesized,
}

/// Request metadata resolved for a single rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestInfo {
    pub request_id: String,
    pub request_type: RequestType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ruleset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u32>,
    pub origin: RequestOrigin,
}
