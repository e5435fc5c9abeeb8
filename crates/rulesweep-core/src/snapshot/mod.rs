//! Versioned stage snapshots.
//!
//! Each lifecycle stage emits a new snapshot instead of mutating the previous
//! one. A snapshot carries a SHA-256 fingerprint of its rule table so a
//! resumed run can tell when a persisted file was edited by hand.

pub mod store;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::lifecycle::Stage;
use crate::model::{ClassifiedRule, Vendor};

pub use store::{SnapshotStore, final_version, next_version};

/// Cryptographic fingerprint of a snapshot's rule table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub algorithm: String,
    pub value: String,
}

impl Fingerprint {
    /// Hash of the compact JSON encoding of `rules`.
    pub fn of(rules: &[ClassifiedRule]) -> Result<Self> {
        let bytes = serde_json::to_vec(rules)?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hasher.finalize();

        Ok(Self {
            algorithm: "sha256".to_string(),
            value: hex::encode(digest),
        })
    }
}

/// Rule table as it stood after one stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub schema_version: String,
    pub vendor: Vendor,
    pub stage: Stage,
    pub created_at: NaiveDateTime,
    pub fingerprint: Fingerprint,
    pub rules: Vec<ClassifiedRule>,
}

impl Snapshot {
    pub fn new(
        vendor: Vendor,
        stage: Stage,
        created_at: NaiveDateTime,
        rules: Vec<ClassifiedRule>,
    ) -> Result<Self> {
        Ok(Self {
            schema_version: crate::SCHEMA_VERSION.to_string(),
            vendor,
            stage,
            created_at,
            fingerprint: Fingerprint::of(&rules)?,
            rules,
        })
    }

    /// True when the rule table still matches the recorded fingerprint.
    pub fn verify(&self) -> Result<bool> {
        Ok(Fingerprint::of(&self.rules)? == self.fingerprint)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, RuleRecord};

    fn snapshot() -> Snapshot {
        let rules = vec![ClassifiedRule::new(RuleRecord::new(
            Vendor::Secui,
            1,
            "a",
            Action::Allow,
        ))];
        Snapshot::new(
            Vendor::Secui,
            Stage::Initialized,
            "2026-01-31T00:00:00".parse().unwrap(),
            rules,
        )
        .unwrap()
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let snap = snapshot();
        assert_eq!(snap.fingerprint.algorithm, "sha256");
        assert_eq!(snap.fingerprint.value.len(), 64);
        assert!(snap.verify().unwrap());
    }

    #[test]
    fn edits_break_verification() {
        let mut snap = snapshot();
        snap.rules[0].rule.enabled = false;
        assert!(!snap.verify().unwrap());
    }

    #[test]
    fn fingerprint_depends_only_on_rules() {
        let a = snapshot();
        let mut b = snapshot();
        b.created_at = "2027-01-01T00:00:00".parse().unwrap();
        assert_eq!(Fingerprint::of(&a.rules).unwrap(), Fingerprint::of(&b.rules).unwrap());
    }
}
