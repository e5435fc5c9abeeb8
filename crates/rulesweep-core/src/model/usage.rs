use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::state::UsageFlag;

/// One row of an externally supplied usage table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsageRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<UsageFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hit: Option<NaiveDateTime>,
}
