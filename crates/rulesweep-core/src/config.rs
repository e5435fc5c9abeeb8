//! Analysis configuration.
//!
//! Every threshold and naming convention the classifier relies on lives here,
//! with defaults matching the conventions of the supported vendors. A config
//! file only needs to name the values it overrides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Rules without a hit inside this window are unused.
    pub staleness_days: i64,

    /// Rules whose name embeds a date inside this window are new.
    pub new_policy_days: i64,

    /// Request status codes meaning "automatically renewed".
    pub auto_extension_codes: Vec<u32>,

    /// Request-id prefixes granted a standing exception.
    pub exception_request_prefixes: Vec<String>,

    /// Name (Palo Alto) or description fragment (SECUI) of the baseline deny-all rule.
    pub baseline_marker: String,

    /// Used instead of the marker position when no marker rule exists.
    pub infrastructure_keywords: Vec<String>,

    pub test_prefixes: Vec<String>,

    pub baseline_name_suffix: String,

    pub baseline_description_marker: String,

    /// Upper bound on nested group expansion.
    pub max_group_depth: usize,

    /// Reference "now" for every time-based predicate. `None` means wall clock.
    pub as_of: Option<NaiveDateTime>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            staleness_days: 90,
            new_policy_days: 90,
            auto_extension_codes: vec![98, 99],
            exception_request_prefixes: Vec::new(),
            baseline_marker: "deny_rule".to_string(),
            infrastructure_keywords: vec!["infra".to_string(), "infrastructure".to_string()],
            test_prefixes: vec!["sample_".to_string(), "test_".to_string()],
            baseline_name_suffix: "_Rule".to_string(),
            baseline_description_marker: "baseline".to_string(),
            max_group_depth: 32,
            as_of: None,
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        debug!(path = %path.display(), "loading configuration");

        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        Self::from_json(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: AnalysisConfig =
            serde_json::from_str(json).context("failed to parse JSON configuration")?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.staleness_days <= 0 {
            anyhow::bail!("staleness_days must be positive");
        }
        if self.new_policy_days <= 0 {
            anyhow::bail!("new_policy_days must be positive");
        }
        if self.baseline_marker.trim().is_empty() {
            anyhow::bail!("baseline_marker must not be empty");
        }
        if self.max_group_depth == 0 {
            anyhow::bail!("max_group_depth must be at least 1");
        }

        info!("configuration validated successfully");
        Ok(())
    }

    /// Pins `as_of` to the wall clock if unset, so one run sees one "now".
    pub fn pinned(mut self) -> Self {
        if self.as_of.is_none() {
            self.as_of = Some(Local::now().naive_local());
        }
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        self.as_of.unwrap_or_else(|| Local::now().naive_local())
    }

    pub fn staleness_cutoff(&self) -> NaiveDateTime {
        self.now() - Duration::days(self.staleness_days)
    }

    pub fn new_policy_cutoff(&self) -> NaiveDateTime {
        self.now() - Duration::days(self.new_policy_days)
    }

    pub fn is_auto_extension(&self, status: u32) -> bool {
        self.auto_extension_codes.contains(&status)
    }
}
