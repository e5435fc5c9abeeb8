use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

/// Lifecycle stages in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Initialized,
    RequestInfoProcessed,
    UsageProcessed,
    VendorProcessed,
    DuplicatesAnalyzed,
    ReportsGenerated,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Initialized,
        Stage::RequestInfoProcessed,
        Stage::UsageProcessed,
        Stage::VendorProcessed,
        Stage::DuplicatesAnalyzed,
        Stage::ReportsGenerated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Initialized => "initialized",
            Stage::RequestInfoProcessed => "request_info_processed",
            Stage::UsageProcessed => "usage_processed",
            Stage::VendorProcessed => "vendor_processed",
            Stage::DuplicatesAnalyzed => "duplicates_analyzed",
            Stage::ReportsGenerated => "reports_generated",
        }
    }

    /// Zero-based position in the pipeline.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Stages that must complete before this one may run.
    pub fn prerequisites(&self) -> &'static [Stage] {
        &Self::ALL[..self.index()]
    }

    pub fn previous(&self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Self::ALL[i])
    }

    pub fn next(&self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StageRecord {
    pub status: StageStatus,
    pub message: String,
    pub timestamp: Option<NaiveDateTime>,
}

/// Status entry for every stage, persisted next to the snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StatusTable(BTreeMap<Stage, StageRecord>);

impl Default for StatusTable {
    fn default() -> Self {
        Self(
            Stage::ALL
                .iter()
                .map(|s| (*s, StageRecord::default()))
                .collect(),
        )
    }
}

impl StatusTable {
    pub fn get(&self, stage: Stage) -> StageRecord {
        self.0.get(&stage).cloned().unwrap_or_default()
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.get(stage).status == StageStatus::Completed
    }

    /// Prerequisites of `stage` that have not completed.
    pub fn missing_for(&self, stage: Stage) -> Vec<Stage> {
        stage
            .prerequisites()
            .iter()
            .copied()
            .filter(|s| !self.is_completed(*s))
            .collect()
    }

    /// First stage that has not completed.
    pub fn next_pending(&self) -> Option<Stage> {
        Stage::ALL.into_iter().find(|s| !self.is_completed(*s))
    }

    /// Records a transition and logs it at a level matching its outcome.
    pub fn update(
        &mut self,
        stage: Stage,
        status: StageStatus,
        message: impl Into<String>,
        at: NaiveDateTime,
    ) {
        let message = message.into();
        match status {
            StageStatus::Completed => info!(%stage, "{message}"),
            StageStatus::Failed => error!(%stage, "{message}"),
            StageStatus::Pending | StageStatus::Processing => debug!(%stage, "{message}"),
        }
        self.0.insert(
            stage,
            StageRecord {
                status,
                message,
                timestamp: Some(at),
            },
        );
    }

    /// Returns every stage after `stage` to pending.
    pub fn reset_after(&mut self, stage: Stage) {
        for later in Stage::ALL.iter().filter(|s| **s > stage) {
            self.0.insert(*later, StageRecord::default());
        }
    }

    /// Returns `stage` and every later stage to pending.
    pub fn reset_from(&mut self, stage: Stage) {
        self.0.insert(stage, StageRecord::default());
        self.reset_after(stage);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Stage, &StageRecord)> {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at() -> NaiveDateTime {
        "2026-01-31T00:00:00".parse().unwrap()
    }

    #[test]
    fn stages_are_strictly_ordered() {
        assert_eq!(Stage::Initialized.prerequisites(), &[] as &[Stage]);
        assert_eq!(
            Stage::UsageProcessed.prerequisites(),
            &[Stage::Initialized, Stage::RequestInfoProcessed]
        );
        assert_eq!(Stage::ReportsGenerated.next(), None);
        assert_eq!(Stage::VendorProcessed.previous(), Some(Stage::UsageProcessed));
        assert_eq!(Stage::DuplicatesAnalyzed.to_string(), "duplicates_analyzed");
    }

    #[test]
    fn missing_lists_every_incomplete_prerequisite() {
        let mut table = StatusTable::default();
        table.update(Stage::Initialized, StageStatus::Completed, "ok", at());
        table.update(Stage::RequestInfoProcessed, StageStatus::Failed, "boom", at());

        assert_eq!(
            table.missing_for(Stage::ReportsGenerated),
            vec![
                Stage::RequestInfoProcessed,
                Stage::UsageProcessed,
                Stage::VendorProcessed,
                Stage::DuplicatesAnalyzed,
            ]
        );
        assert_eq!(table.next_pending(), Some(Stage::RequestInfoProcessed));
    }

    #[test]
    fn reset_after_returns_later_stages_to_pending() {
        let mut table = StatusTable::default();
        for stage in Stage::ALL {
            table.update(stage, StageStatus::Completed, "ok", at());
        }
        table.reset_after(Stage::UsageProcessed);
        assert!(table.is_completed(Stage::UsageProcessed));
        assert_eq!(table.get(Stage::VendorProcessed).status, StageStatus::Pending);
        assert_eq!(table.get(Stage::VendorProcessed).timestamp, None);

        table.reset_from(Stage::Initialized);
        assert_eq!(table.next_pending(), Some(Stage::Initialized));
    }

    #[test]
    fn status_table_serializes_by_stage_name() {
        let json = serde_json::to_value(StatusTable::default()).unwrap();
        assert_eq!(json["reports_generated"]["status"], "pending");
    }
}
