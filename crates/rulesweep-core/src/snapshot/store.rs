//! On-disk layout of a run.
//!
//! ```text
//! <dir>/<vendor>_policies_v1.json .. _v5.json   one per stage
//! <dir>/<vendor>_policies_vf.json               final snapshot
//! <dir>/<vendor>_status.json                    stage status table
//! <dir>/<vendor>_duplicates.json                duplicate artifact
//! <dir>/<vendor>_<report>.json                  report tables
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::Snapshot;
use crate::duplicates::DuplicateArtifact;
use crate::error::{Error, Result};
use crate::lifecycle::{Stage, StatusTable};
use crate::model::Vendor;

static VERSION_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)_v(\d+|f)$").expect("valid version pattern"));

/// `stem` → `stem_v1`, `stem_vN` → `stem_v{N+1}`. `stem_vf` is terminal.
pub fn next_version(name: &str) -> String {
    match VERSION_SUFFIX.captures(name) {
        Some(caps) => match caps[2].parse::<u64>() {
            Ok(n) => format!("{}_v{}", &caps[1], n + 1),
            Err(_) => name.to_string(),
        },
        None => format!("{name}_v1"),
    }
}

/// `stem_vN` → `stem_vf`; an unversioned name gains the final suffix.
pub fn final_version(name: &str) -> String {
    match VERSION_SUFFIX.captures(name) {
        Some(caps) => format!("{}_vf", &caps[1]),
        None => format!("{name}_vf"),
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    vendor: Vendor,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, vendor: Vendor) -> Self {
        Self {
            dir: dir.into(),
            vendor,
        }
    }

    /// Same as [`SnapshotStore::new`], creating the directory if needed.
    pub fn create(dir: impl Into<PathBuf>, vendor: Vendor) -> Result<Self> {
        let store = Self::new(dir, vendor);
        fs::create_dir_all(&store.dir)?;
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vendor(&self) -> Vendor {
        self.vendor
    }

    fn stem(&self) -> String {
        format!("{}_policies", self.vendor)
    }

    /// Versioned file name of the snapshot emitted by `stage`.
    pub fn snapshot_name(&self, stage: Stage) -> String {
        let mut name = self.stem();
        for _ in 0..=stage.index() {
            name = next_version(&name);
        }
        if stage.next().is_none() {
            name = final_version(&name);
        }
        format!("{name}.json")
    }

    pub fn snapshot_path(&self, stage: Stage) -> PathBuf {
        self.dir.join(self.snapshot_name(stage))
    }

    fn side_path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}_{suffix}.json", self.vendor))
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<PathBuf> {
        let path = self.snapshot_path(snapshot.stage);
        write_json(&path, snapshot)?;
        info!(stage = %snapshot.stage, path = %path.display(), rules = snapshot.len(), "snapshot saved");
        Ok(path)
    }

    pub fn load(&self, stage: Stage) -> Result<Snapshot> {
        read_json(&self.snapshot_path(stage))
    }

    /// Most advanced stage with a persisted snapshot.
    pub fn latest(&self) -> Result<Option<Snapshot>> {
        for stage in Stage::ALL.iter().rev() {
            if self.snapshot_path(*stage).exists() {
                return self.load(*stage).map(Some);
            }
        }
        Ok(None)
    }

    pub fn save_status(&self, status: &StatusTable) -> Result<()> {
        write_json(&self.side_path("status"), status)
    }

    pub fn load_status(&self) -> Result<StatusTable> {
        read_json(&self.side_path("status"))
    }

    pub fn save_artifact(&self, artifact: &DuplicateArtifact) -> Result<PathBuf> {
        let path = self.side_path("duplicates");
        write_json(&path, artifact)?;
        Ok(path)
    }

    pub fn load_artifact(&self) -> Result<DuplicateArtifact> {
        read_json(&self.side_path("duplicates"))
    }

    pub fn save_report<T: Serialize>(&self, name: &str, report: &T) -> Result<PathBuf> {
        let path = self.side_path(name);
        write_json(&path, report)?;
        Ok(path)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    debug!(path = %path.display(), "wrote");
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(Error::lookup(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ClassifiedRule, RuleRecord};
    use tempfile::tempdir;

    #[test]
    fn version_arithmetic() {
        assert_eq!(next_version("paloalto_policies"), "paloalto_policies_v1");
        assert_eq!(next_version("paloalto_policies_v1"), "paloalto_policies_v2");
        assert_eq!(next_version("x_v9"), "x_v10");
        assert_eq!(final_version("x_v5"), "x_vf");
        assert_eq!(final_version("x"), "x_vf");
        assert_eq!(next_version("x_vf"), "x_vf");
        assert_eq!(final_version("x_vf"), "x_vf");
    }

    #[test]
    fn stage_file_names() {
        let store = SnapshotStore::new("/tmp", Vendor::Secui);
        assert_eq!(store.snapshot_name(Stage::Initialized), "secui_policies_v1.json");
        assert_eq!(store.snapshot_name(Stage::DuplicatesAnalyzed), "secui_policies_v5.json");
        assert_eq!(store.snapshot_name(Stage::ReportsGenerated), "secui_policies_vf.json");
    }

    #[test]
    fn round_trip_preserves_state() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::create(dir.path(), Vendor::PaloAlto).unwrap();

        let mut rule = ClassifiedRule::new(RuleRecord::new(Vendor::PaloAlto, 4, "web", Action::Allow));
        rule.state.auto_extended = true;
        rule.state.duplicate_group = Some(2);
        let snap = Snapshot::new(
            Vendor::PaloAlto,
            Stage::UsageProcessed,
            "2026-01-31T00:00:00".parse().unwrap(),
            vec![rule],
        )
        .unwrap();

        let path = store.save(&snap).unwrap();
        assert!(path.ends_with("paloalto_policies_v3.json"));

        let loaded = store.load(Stage::UsageProcessed).unwrap();
        assert_eq!(loaded, snap);
        assert!(loaded.verify().unwrap());
        assert_eq!(store.latest().unwrap(), Some(snap));
    }

    #[test]
    fn missing_files_are_lookup_errors() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path(), Vendor::Secui);
        assert!(matches!(store.load(Stage::Initialized), Err(Error::Lookup { .. })));
        assert!(matches!(store.load_status(), Err(Error::Lookup { .. })));
        assert_eq!(store.latest().unwrap(), None);
    }
}
