use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Literal wildcard token. Never expanded, only compared.
pub const WILDCARD: &str = "any";

/// Firewall vendor family a rule table was collected from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    PaloAlto,
    Secui,
}

impl Vendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::PaloAlto => "paloalto",
            Vendor::Secui => "secui",
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paloalto" | "palo-alto" | "pan" => Ok(Vendor::PaloAlto),
            "secui" | "ngf" | "mf2" => Ok(Vendor::Secui),
            other => Err(format!("unsupported vendor: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Allow,
    Deny,
}

impl Action {
    /// Accepts the spellings used by the supported vendors.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "allow" | "permit" | "accept" => Some(Action::Allow),
            "deny" | "drop" | "reject" | "block" => Some(Action::Deny),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "allow",
            Action::Deny => "deny",
        }
    }
}

/// A multi-valued rule field such as source or service.
///
/// Tokens keep their collected order; comparisons that must ignore order go
/// through `normalize`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct FieldSet(Vec<String>);

impl FieldSet {
    /// Splits a comma-separated column value. Empty tokens are dropped.
    pub fn parse(raw: &str) -> Self {
        Self(
            raw.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn any() -> Self {
        Self(vec![WILDCARD.to_string()])
    }

    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(tokens.into_iter().map(Into::into).collect())
    }

    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True when the field carries the literal wildcard token.
    pub fn is_any(&self) -> bool {
        self.0.iter().any(|t| t == WILDCARD)
    }

    /// Comma-joined form, in collected order.
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

/// One firewall security rule as produced by a vendor collector.
///
/// Identity for lookups is `(vendor, name)`; evaluation order is `sequence`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleRecord {
    pub vendor: Vendor,
    pub sequence: u32,
    pub name: String,
    pub enabled: bool,
    pub action: Action,
    pub source: FieldSet,
    pub user: FieldSet,
    pub destination: FieldSet,
    pub service: FieldSet,
    pub application: FieldSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Multi-tenant partition (Palo Alto vsys).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_hit: Option<NaiveDateTime>,
}

impl RuleRecord {
    /// Minimal enabled rule with wildcard fields; tests and fixtures refine it.
    pub fn new(vendor: Vendor, sequence: u32, name: impl Into<String>, action: Action) -> Self {
        Self {
            vendor,
            sequence,
            name: name.into(),
            enabled: true,
            action,
            source: FieldSet::any(),
            user: FieldSet::any(),
            destination: FieldSet::any(),
            service: FieldSet::any(),
            application: FieldSet::any(),
            category: None,
            partition: None,
            description: String::new(),
            last_hit: None,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.action == Action::Allow
    }

    pub fn is_deny(&self) -> bool {
        self.action == Action::Deny
    }
}
