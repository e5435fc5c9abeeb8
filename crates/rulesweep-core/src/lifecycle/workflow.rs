//! The lifecycle state machine.
//!
//! Stages run strictly in order. Each reads the snapshot emitted by its
//! predecessor and emits a new one, so re-running a stage with the same
//! inputs reproduces the same snapshot and invalidates everything after it.
//! A failed stage records its message and produces no snapshot.

use std::collections::BTreeMap;

use chrono::Local;
use tracing::{info, warn};

use super::stage::{Stage, StageStatus, StatusTable};
use super::{request, usage, vendor};
use crate::config::AnalysisConfig;
use crate::duplicates::{self, DuplicateArtifact};
use crate::error::{Error, Result};
use crate::model::{ClassifiedRule, RuleRecord, Vendor};
use crate::report::{self, Bucket, Report};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::table::Table;
use crate::table::convert::{requests_from_table, rules_from_table, usage_from_table};

/// External tables for one run. Only the rule table is mandatory, and only
/// while the first stage is still pending.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInputs {
    pub rules: Option<Table>,
    pub requests: Option<Table>,
    pub usage: Option<Table>,
}

pub struct Workflow {
    vendor: Vendor,
    config: AnalysisConfig,
    status: StatusTable,
    snapshots: BTreeMap<Stage, Snapshot>,
    duplicates: Option<DuplicateArtifact>,
    report: Option<Report>,
    store: Option<SnapshotStore>,
}

impl Workflow {
    /// Fresh workflow. The config's "now" is pinned for the whole run.
    pub fn new(vendor: Vendor, config: AnalysisConfig) -> Self {
        Self {
            vendor,
            config: config.pinned(),
            status: StatusTable::default(),
            snapshots: BTreeMap::new(),
            duplicates: None,
            report: None,
            store: None,
        }
    }

    /// Persists every snapshot, the status table and side artifacts to `store`.
    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Reloads a run from `store` and continues after its last verified stage.
    ///
    /// A snapshot whose fingerprint no longer matches its rules was edited
    /// after it was written; that stage and everything after it run again.
    pub fn resume(store: SnapshotStore, config: AnalysisConfig) -> Result<Self> {
        let vendor = store.vendor();
        let mut status = store.load_status()?;
        let mut snapshots = BTreeMap::new();

        for stage in Stage::ALL {
            if !status.is_completed(stage) {
                status.reset_from(stage);
                break;
            }
            let snapshot = store.load(stage)?;
            if !snapshot.verify()? {
                warn!(%stage, "snapshot fingerprint mismatch, stage will run again");
                status.reset_from(stage);
                break;
            }
            snapshots.insert(stage, snapshot);
        }

        let duplicates = if status.is_completed(Stage::DuplicatesAnalyzed) {
            Some(store.load_artifact()?)
        } else {
            None
        };
        let report = snapshots
            .get(&Stage::ReportsGenerated)
            .map(|s| report::assemble(&s.rules, vendor, s.created_at));

        info!(
            %vendor,
            restored = snapshots.len(),
            next = ?status.next_pending(),
            "workflow resumed"
        );

        Ok(Self {
            vendor,
            config: config.pinned(),
            status,
            snapshots,
            duplicates,
            report,
            store: Some(store),
        })
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn status(&self) -> &StatusTable {
        &self.status
    }

    pub fn snapshot(&self, stage: Stage) -> Option<&Snapshot> {
        self.snapshots.get(&stage)
    }

    /// Snapshot of the most advanced completed stage.
    pub fn current(&self) -> Option<&Snapshot> {
        self.snapshots.values().next_back()
    }

    pub fn duplicates(&self) -> Option<&DuplicateArtifact> {
        self.duplicates.as_ref()
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn initialize(&mut self, rules: &Table) -> Result<()> {
        self.initialize_from(Some(rules))
    }

    fn initialize_from(&mut self, rules: Option<&Table>) -> Result<()> {
        let family = self.vendor;
        self.run_stage(Stage::Initialized, |_, _| {
            let table = rules.ok_or_else(|| Error::lookup("rule table"))?;
            let records = rules_from_table(table, family)?;
            Ok(records.into_iter().map(ClassifiedRule::new).collect())
        })
    }

    pub fn process_request_info(&mut self, requests: Option<&Table>) -> Result<()> {
        self.run_stage(Stage::RequestInfoProcessed, |config, rules| {
            let records = requests.map(requests_from_table).transpose()?;
            Ok(request::process(rules, records.as_deref(), config))
        })
    }

    pub fn process_usage_data(&mut self, usage_table: Option<&Table>) -> Result<()> {
        self.run_stage(Stage::UsageProcessed, |config, rules| {
            let records = usage_table.map(usage_from_table).transpose()?;
            Ok(usage::process(rules, records.as_deref(), config))
        })
    }

    pub fn process_vendor_specific(&mut self) -> Result<()> {
        let family = self.vendor;
        self.run_stage(Stage::VendorProcessed, |config, rules| {
            Ok(vendor::process(rules, family, config))
        })
    }

    pub fn analyze_duplicates(&mut self) -> Result<&DuplicateArtifact> {
        let family = self.vendor;
        let store = self.store.clone();
        let mut artifact = None;
        self.run_stage(Stage::DuplicatesAnalyzed, |_, rules| {
            let (merged, found) = merge_duplicates(rules, family);
            if let Some(store) = &store {
                store.save_artifact(&found)?;
            }
            artifact = Some(found);
            Ok(merged)
        })?;

        let artifact = artifact.ok_or_else(|| Error::lookup("duplicate artifact"))?;
        let artifact: &DuplicateArtifact = self.duplicates.insert(artifact);
        Ok(artifact)
    }

    /// Assembles the report buckets. Requires every earlier stage completed.
    pub fn generate_reports(&mut self) -> Result<&Report> {
        let family = self.vendor;
        let store = self.store.clone();
        let mut assembled = None;
        self.run_stage(Stage::ReportsGenerated, |config, rules| {
            let report = report::assemble(rules, family, config.now());
            if let Some(store) = &store {
                write_reports(store, &report)?;
            }
            assembled = Some(report);
            Ok(rules.to_vec())
        })?;

        let report = assembled.ok_or_else(|| Error::lookup("report"))?;
        let report: &Report = self.report.insert(report);
        Ok(report)
    }

    /// Runs every stage that has not completed, in order.
    pub fn run(&mut self, inputs: &WorkflowInputs) -> Result<&Report> {
        while let Some(stage) = self.status.next_pending() {
            match stage {
                Stage::Initialized => self.initialize_from(inputs.rules.as_ref())?,
                Stage::RequestInfoProcessed => {
                    self.process_request_info(inputs.requests.as_ref())?
                }
                Stage::UsageProcessed => self.process_usage_data(inputs.usage.as_ref())?,
                Stage::VendorProcessed => self.process_vendor_specific()?,
                Stage::DuplicatesAnalyzed => {
                    self.analyze_duplicates()?;
                }
                Stage::ReportsGenerated => {
                    self.generate_reports()?;
                }
            }
        }
        self.report.as_ref().ok_or_else(|| Error::lookup("report"))
    }

    fn run_stage<F>(&mut self, stage: Stage, step: F) -> Result<()>
    where
        F: FnOnce(&AnalysisConfig, &[ClassifiedRule]) -> Result<Vec<ClassifiedRule>>,
    {
        let missing = self.status.missing_for(stage);
        if !missing.is_empty() {
            return Err(Error::StageOrder { stage, missing });
        }

        // Predicates see the pinned analysis time; status records the wall clock.
        let now = self.config.now();
        self.status.update(
            stage,
            StageStatus::Processing,
            "processing",
            Local::now().naive_local(),
        );

        let outcome = match stage.previous() {
            Some(prev) => match self.snapshots.get(&prev) {
                Some(input) => step(&self.config, &input.rules),
                None => Err(Error::lookup(format!("snapshot for stage {prev}"))),
            },
            None => step(&self.config, &[]),
        }
        .and_then(|rules| Snapshot::new(self.vendor, stage, now, rules))
        .and_then(|snapshot| match &self.store {
            Some(store) => store.save(&snapshot).map(|_| snapshot),
            None => Ok(snapshot),
        });

        // Anything derived from an earlier run of this stage is stale now.
        self.status.reset_after(stage);
        self.snapshots.retain(|s, _| *s < stage);
        if stage <= Stage::DuplicatesAnalyzed {
            self.duplicates = None;
        }
        self.report = None;

        match outcome {
            Ok(snapshot) => {
                let message = format!("{} rules", snapshot.len());
                self.snapshots.insert(stage, snapshot);
                self.status.update(
                    stage,
                    StageStatus::Completed,
                    message,
                    Local::now().naive_local(),
                );
                self.persist_status()
            }
            Err(err) => {
                self.status.update(
                    stage,
                    StageStatus::Failed,
                    err.to_string(),
                    Local::now().naive_local(),
                );
                if let Err(persist) = self.persist_status() {
                    warn!(%stage, error = %persist, "failed to persist stage status");
                }
                Err(err.in_stage(stage))
            }
        }
    }

    fn persist_status(&self) -> Result<()> {
        if let Some(store) = &self.store {
            store.save_status(&self.status)?;
        }
        Ok(())
    }
}

/// Detects duplicates and writes each rule's role back onto its state.
fn merge_duplicates(
    rules: &[ClassifiedRule],
    vendor: Vendor,
) -> (Vec<ClassifiedRule>, DuplicateArtifact) {
    let records: Vec<RuleRecord> = rules.iter().map(|r| r.rule.clone()).collect();
    let entries = duplicates::detect(&records, vendor);
    let review = duplicates::review_groups(&entries, rules);
    let artifact = DuplicateArtifact::new(entries, review);

    let roles = artifact.roles();
    let merged = rules
        .iter()
        .map(|current| {
            let key = (current.rule.partition.clone(), current.rule.name.clone());
            let found = roles.get(&key);
            let mut next = current.clone();
            next.state.duplicate = found.map(|(role, _)| *role);
            next.state.duplicate_group = found.map(|(_, group)| *group);
            next
        })
        .collect();

    (merged, artifact)
}

/// Full report plus one file per non-empty bucket.
fn write_reports(store: &SnapshotStore, report: &Report) -> Result<()> {
    store.save_report("final_report", report)?;
    for table in report.buckets.iter().filter(|t| !t.is_empty()) {
        store.save_report(table.bucket.as_str(), table)?;
    }
    for bucket in Bucket::ALL {
        if report.bucket(bucket).is_none_or(|t| t.is_empty()) {
            info!(%bucket, "no rules in bucket");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DuplicateRole, ExceptionTag, UsageFlag};
    use crate::table::table_from_json;
    use serde_json::json;
    use tempfile::tempdir;

    fn config() -> AnalysisConfig {
        AnalysisConfig {
            as_of: Some("2026-01-31T00:00:00".parse().unwrap()),
            ..Default::default()
        }
    }

    fn rules() -> Table {
        table_from_json(json!([
            { "Seq": 1, "Rule Name": "deny_rule", "Enable": "Y", "Action": "deny",
              "Source": "any", "Destination": "any", "Service": "any" },
            { "Seq": 3, "Rule Name": "web_a", "Enable": "Y", "Action": "allow",
              "Source": "10.0.0.1", "Destination": "10.1.0.1", "Service": "tcp/443",
              "Description": "REQ: F100 2025-01-01~2027-12-31" },
            { "Seq": 7, "Rule Name": "web_b", "Enable": "Y", "Action": "allow",
              "Source": "10.0.0.1", "Destination": "10.1.0.1", "Service": "tcp/443",
              "Description": "REQ: F101 2025-01-01~2025-06-30" },
            { "Seq": 9, "Rule Name": "old", "Enable": "N", "Action": "allow",
              "Source": "any", "Destination": "any", "Service": "any",
              "Last Hit": "2025-10-28 00:00:00" }
        ]))
    }

    fn inputs() -> WorkflowInputs {
        WorkflowInputs {
            rules: Some(rules()),
            ..Default::default()
        }
    }

    fn state<'a>(wf: &'a Workflow, name: &str) -> &'a ClassifiedRule {
        wf.current()
            .and_then(|s| s.rules.iter().find(|r| r.rule.name == name))
            .unwrap()
    }

    #[test]
    fn full_run_completes_every_stage() {
        let mut wf = Workflow::new(Vendor::PaloAlto, config());
        let report = wf.run(&inputs()).unwrap();
        assert_eq!(report.names(Bucket::DuplicateNotice), vec!["web_a"]);
        assert_eq!(report.names(Bucket::DuplicateDelete), vec!["web_b"]);

        assert!(Stage::ALL.iter().all(|s| wf.status().is_completed(*s)));
        assert_eq!(wf.snapshots.len(), 6);

        let old = state(&wf, "old");
        assert_eq!(old.state.exception, Some(ExceptionTag::DisabledPolicy));
        assert_eq!(old.state.usage, Some(UsageFlag::Unused));

        let upper = state(&wf, "web_a");
        assert_eq!(upper.state.duplicate, Some(DuplicateRole::Upper));
        assert_eq!(upper.state.duplicate_group, Some(1));
    }

    #[test]
    fn stages_refuse_to_run_out_of_order() {
        let mut wf = Workflow::new(Vendor::Secui, config());
        let err = wf.generate_reports().unwrap_err();
        assert!(matches!(
            err,
            Error::StageOrder { stage: Stage::ReportsGenerated, ref missing } if missing.len() == 5
        ));
        assert_eq!(wf.status().get(Stage::ReportsGenerated).status, StageStatus::Pending);
    }

    #[test]
    fn failed_stage_records_message_and_keeps_no_snapshot() {
        let mut wf = Workflow::new(Vendor::Secui, config());
        let err = wf.initialize(&Table::default()).unwrap_err();
        assert!(err.to_string().starts_with("stage initialized failed: validation failed"));

        let record = wf.status().get(Stage::Initialized);
        assert_eq!(record.status, StageStatus::Failed);
        assert!(record.message.contains("rules table is empty"));
        assert!(record.timestamp.is_some());
        assert!(wf.current().is_none());
    }

    #[test]
    fn status_timestamps_use_the_wall_clock() {
        let before = Local::now().naive_local();
        let mut wf = Workflow::new(Vendor::PaloAlto, config());
        wf.initialize(&rules()).unwrap();
        let after = Local::now().naive_local();

        let stamped = wf.status().get(Stage::Initialized).timestamp.unwrap();
        assert!(stamped >= before && stamped <= after, "{stamped}");
        assert_ne!(Some(stamped), wf.config().as_of);
    }

    #[test]
    fn missing_rule_table_fails_the_first_stage() {
        let mut wf = Workflow::new(Vendor::Secui, config());
        let err = wf.run(&WorkflowInputs::default()).unwrap_err();
        assert_eq!(err.to_string(), "stage initialized failed: not found: rule table");
    }

    #[test]
    fn rerunning_a_stage_is_idempotent_and_invalidates_later_stages() {
        let mut wf = Workflow::new(Vendor::PaloAlto, config());
        wf.run(&inputs()).unwrap();
        let before = wf.snapshot(Stage::UsageProcessed).cloned().unwrap();

        wf.process_usage_data(None).unwrap();
        assert_eq!(wf.snapshot(Stage::UsageProcessed), Some(&before));
        assert_eq!(wf.status().next_pending(), Some(Stage::VendorProcessed));
        assert!(wf.report().is_none());
        assert!(wf.duplicates().is_none());
    }

    #[test]
    fn persisted_run_resumes_where_it_stopped() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::create(dir.path(), Vendor::PaloAlto).unwrap();

        let mut wf = Workflow::new(Vendor::PaloAlto, config()).with_store(store.clone());
        wf.initialize(&rules()).unwrap();
        wf.process_request_info(None).unwrap();
        let expected = wf.snapshot(Stage::RequestInfoProcessed).cloned().unwrap();
        drop(wf);

        let mut resumed = Workflow::resume(store.clone(), config()).unwrap();
        assert_eq!(resumed.snapshot(Stage::RequestInfoProcessed), Some(&expected));
        assert_eq!(resumed.status().next_pending(), Some(Stage::UsageProcessed));

        resumed.run(&WorkflowInputs::default()).unwrap();
        assert!(dir.path().join("paloalto_policies_vf.json").exists());
        assert!(dir.path().join("paloalto_duplicates.json").exists());
        assert!(dir.path().join("paloalto_duplicate_delete.json").exists());
        assert!(!dir.path().join("paloalto_expired_used.json").exists());

        let again = Workflow::resume(store, config()).unwrap();
        assert_eq!(again.status().next_pending(), None);
        assert!(again.report().is_some());
        assert!(again.duplicates().is_some());
    }

    #[test]
    fn edited_snapshot_is_recomputed_on_resume() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::create(dir.path(), Vendor::PaloAlto).unwrap();
        let mut wf = Workflow::new(Vendor::PaloAlto, config()).with_store(store.clone());
        wf.initialize(&rules()).unwrap();
        wf.process_request_info(None).unwrap();

        let mut tampered = store.load(Stage::RequestInfoProcessed).unwrap();
        tampered.rules[0].rule.enabled = false;
        store.save(&tampered).unwrap();

        let resumed = Workflow::resume(store, config()).unwrap();
        assert_eq!(resumed.status().next_pending(), Some(Stage::RequestInfoProcessed));
        assert!(resumed.snapshot(Stage::Initialized).is_some());
    }
}
