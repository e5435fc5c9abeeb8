//! Order-independent comparison keys for rule fields.
//!
//! Collectors emit multi-valued fields in whatever order the device returned
//! them. Two rules that list the same members in a different order are the
//! same rule for duplicate purposes, so comparisons go through these keys.

use crate::model::{FieldSet, RuleRecord, Vendor};

/// Sorted, comma-joined form of a field. The wildcard is compared literally.
pub fn normalize(field: &FieldSet) -> String {
    normalize_tokens(field.tokens().iter().map(String::as_str))
}

/// Same as [`normalize`] for a raw comma-separated column value.
pub fn normalize_str(raw: &str) -> String {
    normalize(&FieldSet::parse(raw))
}

fn normalize_tokens<'a>(tokens: impl Iterator<Item = &'a str>) -> String {
    let mut tokens: Vec<&str> = tokens.collect();
    tokens.sort_unstable();
    tokens.join(",")
}

/// Which optional fields participate in a rule signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignatureFields {
    /// Append the multi-tenant partition id.
    pub partition: bool,
    /// Append the vendor category column.
    pub category: bool,
    /// Treat `_` and `-` as the same character in service names.
    pub fold_service_separators: bool,
}

impl SignatureFields {
    /// Field list for a snapshot of `vendor` rules.
    ///
    /// The partition is only appended when at least one rule carries one, so
    /// single-tenant exports are not split by an empty column.
    pub fn for_snapshot(vendor: Vendor, rules: &[RuleRecord]) -> Self {
        let palo_alto = vendor == Vendor::PaloAlto;
        Self {
            partition: rules.iter().any(|r| r.partition.is_some()),
            category: palo_alto,
            fold_service_separators: palo_alto,
        }
    }
}

/// Normalized comparison key of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature(Vec<String>);

impl Signature {
    pub fn parts(&self) -> &[String] {
        &self.0
    }
}

pub fn signature(rule: &RuleRecord, fields: &SignatureFields) -> Signature {
    let service = if fields.fold_service_separators {
        let folded: Vec<String> = rule
            .service
            .tokens()
            .iter()
            .map(|t| t.replace('_', "-"))
            .collect();
        normalize_tokens(folded.iter().map(String::as_str))
    } else {
        normalize(&rule.service)
    };

    let mut parts = vec![
        if rule.enabled { "Y" } else { "N" }.to_string(),
        rule.action.as_str().to_string(),
        normalize(&rule.source),
        normalize(&rule.user),
        normalize(&rule.destination),
        service,
        normalize(&rule.application),
    ];
    if fields.partition {
        parts.push(rule.partition.clone().unwrap_or_default());
    }
    if fields.category {
        parts.push(rule.category.clone().unwrap_or_default());
    }

    Signature(parts)
}
