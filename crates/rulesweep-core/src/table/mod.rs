//! Loosely typed input tables.
//!
//! Collectors and request systems export rows as JSON objects keyed by column
//! name. Column naming drifts between exporters, so every lookup goes through
//! a `ColumnSpec` that lists the accepted spellings.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod columns;
pub mod convert;
pub mod validate;

pub use columns::ColumnSpec;

pub type Row = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    /// Reads a JSON array of row objects.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read table: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse table: {}", path.display()))
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Union of the keys seen on any row.
    pub fn columns(&self) -> BTreeSet<&str> {
        self.rows
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect()
    }

    /// First accepted spelling of `spec` present in the table.
    pub fn resolve(&self, spec: &ColumnSpec) -> Option<&'static str> {
        let columns = self.columns();
        spec.spellings().find(|name| columns.contains(name))
    }
}

/// Cell text for `column`, trimmed; nulls and blanks read as `None`.
pub fn cell(row: &Row, column: &str) -> Option<String> {
    let text = match row.get(column)? {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    if text.is_empty() || text.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(text)
    }
}

/// Cell text looked up through a resolved column name.
pub fn cell_opt(row: &Row, column: Option<&str>) -> Option<String> {
    column.and_then(|c| cell(row, c))
}

#[cfg(test)]
pub(crate) fn table_from_json(json: Value) -> Table {
    serde_json::from_value(json).expect("fixture table")
}
