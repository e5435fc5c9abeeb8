//! Structural validation of input tables.
//!
//! One validator covers every table kind. Each kind declares its required
//! columns (with alternative spellings); rule tables additionally get their
//! cell values checked because later stages assume them well-formed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::columns::{self, ColumnSpec};
use super::{Table, cell, cell_opt};
use crate::model::Action;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum TableKind {
    Rules,
    Usage,
    Requests,
    DuplicateAnalysis,
}

impl TableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Rules => "rules",
            TableKind::Usage => "usage",
            TableKind::Requests => "requests",
            TableKind::DuplicateAnalysis => "duplicate-analysis",
        }
    }

    fn required(&self) -> &'static [ColumnSpec] {
        const RULES: &[ColumnSpec] = &[
            columns::RULE_NAME,
            columns::ENABLE,
            columns::ACTION,
            columns::SOURCE,
            columns::DESTINATION,
            columns::SERVICE,
        ];
        const USAGE: &[ColumnSpec] = &[columns::RULE_NAME];
        const REQUESTS: &[ColumnSpec] = &[columns::REQUEST_ID];
        const DUPLICATES: &[ColumnSpec] = &[columns::RULE_NAME, columns::DUPLICATE_ROLE];

        match self {
            TableKind::Rules => RULES,
            TableKind::Usage => USAGE,
            TableKind::Requests => REQUESTS,
            TableKind::DuplicateAnalysis => DUPLICATES,
        }
    }
}

/// Outcome of validating one table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub table: TableKind,
    pub missing_columns: Vec<String>,
    pub empty: bool,
    pub duplicate_keys: Vec<String>,
    pub messages: Vec<String>,
}

impl ValidationReport {
    fn new(table: TableKind) -> Self {
        Self {
            table,
            missing_columns: Vec::new(),
            empty: false,
            duplicate_keys: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.empty
            && self.missing_columns.is_empty()
            && self.duplicate_keys.is_empty()
            && self.messages.is_empty()
    }

    /// Report for an empty table of `kind`.
    pub fn empty_table(kind: TableKind) -> Self {
        let mut report = Self::new(kind);
        report.empty = true;
        report
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} table", self.table.as_str())?;
        if self.empty {
            return write!(f, " is empty");
        }
        let mut problems = Vec::new();
        if !self.missing_columns.is_empty() {
            problems.push(format!(
                "missing columns [{}]",
                self.missing_columns.join(", ")
            ));
        }
        if !self.duplicate_keys.is_empty() {
            problems.push(format!(
                "duplicate keys [{}]",
                self.duplicate_keys.join(", ")
            ));
        }
        problems.extend(self.messages.iter().cloned());
        if problems.is_empty() {
            write!(f, " is valid")
        } else {
            write!(f, ": {}", problems.join("; "))
        }
    }
}

/// Validates `table` as a table of `kind`.
pub fn validate(table: &Table, kind: TableKind) -> ValidationReport {
    let mut report = ValidationReport::new(kind);

    if table.is_empty() {
        report.empty = true;
        return report;
    }

    for spec in kind.required() {
        if table.resolve(spec).is_none() {
            report.missing_columns.push(spec.canonical.to_string());
        }
    }
    if !report.missing_columns.is_empty() {
        return report;
    }

    match kind {
        TableKind::Rules => check_rule_cells(table, &mut report),
        TableKind::Usage => check_usage(table, &mut report),
        TableKind::Requests | TableKind::DuplicateAnalysis => {}
    }

    report
}

fn check_rule_cells(table: &Table, report: &mut ValidationReport) {
    let name_col = table.resolve(&columns::RULE_NAME);
    let enable_col = table.resolve(&columns::ENABLE);
    let action_col = table.resolve(&columns::ACTION);
    let partition_col = table.resolve(&columns::PARTITION);
    let seq_col = table.resolve(&columns::SEQUENCE);

    let mandatory: Vec<(&str, Option<&str>)> = TableKind::Rules
        .required()
        .iter()
        .map(|spec| (spec.canonical, table.resolve(spec)))
        .collect();

    let mut seen_names: BTreeMap<(Option<String>, String), usize> = BTreeMap::new();
    let mut seen_seq = BTreeSet::new();
    let mut duplicate_seq = BTreeSet::new();

    for (idx, row) in table.rows().iter().enumerate() {
        let line = idx + 1;

        for (canonical, column) in &mandatory {
            if cell_opt(row, *column).is_none() {
                report
                    .messages
                    .push(format!("row {line}: empty mandatory value '{canonical}'"));
            }
        }

        if let Some(raw) = cell_opt(row, enable_col) {
            if parse_enabled(&raw).is_none() {
                report
                    .messages
                    .push(format!("row {line}: invalid Enable value '{raw}'"));
            }
        }
        if let Some(raw) = cell_opt(row, action_col) {
            if Action::parse(&raw).is_none() {
                report
                    .messages
                    .push(format!("row {line}: invalid Action value '{raw}'"));
            }
        }

        if let Some(seq_col) = seq_col {
            match cell(row, seq_col).map(|s| s.parse::<u32>()) {
                Some(Ok(seq)) => {
                    if !seen_seq.insert(seq) {
                        duplicate_seq.insert(seq);
                    }
                }
                Some(Err(_)) | None => report
                    .messages
                    .push(format!("row {line}: sequence is not a non-negative integer")),
            }
        }

        if let Some(name) = cell_opt(row, name_col) {
            let key = (cell_opt(row, partition_col), name);
            *seen_names.entry(key).or_default() += 1;
        }
    }

    report.duplicate_keys = seen_names
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|((partition, name), _)| match partition {
            Some(p) => format!("{p}/{name}"),
            None => name,
        })
        .collect();

    for seq in duplicate_seq {
        report.messages.push(format!("duplicate sequence {seq}"));
    }
}

fn check_usage(table: &Table, report: &mut ValidationReport) {
    if table.resolve(&columns::UNUSED_FLAG).is_none() && table.resolve(&columns::LAST_HIT).is_none()
    {
        report.missing_columns.push(format!(
            "{} or {}",
            columns::UNUSED_FLAG.canonical,
            columns::LAST_HIT.canonical
        ));
        return;
    }

    let name_col = table.resolve(&columns::RULE_NAME);
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for row in table.rows() {
        if let Some(name) = cell_opt(row, name_col) {
            if !seen.insert(name.clone()) {
                duplicates.insert(name);
            }
        }
    }
    report.duplicate_keys = duplicates.into_iter().collect();
}

/// Reads the enabled flag spellings used by the supported exporters.
pub fn parse_enabled(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "enable" | "enabled" | "1" => Some(true),
        "n" | "no" | "false" | "disable" | "disabled" | "0" => Some(false),
        _ => None,
    }
}
