//! Service tokens of the form `protocol[/port|/lo-hi]`.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use super::interval::{Interval, parse_port_range};
use crate::model::WILDCARD;

static SERVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z][A-Za-z0-9]*)(?:/(\d+(?:-\d+)?))?$").expect("valid service pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    /// Lower-cased protocol name.
    pub protocol: String,
    /// `None` means every port of the protocol.
    pub ports: Option<Interval>,
}

impl ServiceSpec {
    pub fn parse(token: &str) -> Option<Self> {
        let caps = SERVICE.captures(token.trim())?;
        let protocol = caps.get(1)?.as_str().to_ascii_lowercase();
        let ports = match caps.get(2) {
            Some(m) => Some(parse_port_range(m.as_str())?),
            None => None,
        };
        Some(Self { protocol, ports })
    }

    pub fn overlaps(&self, other: &ServiceSpec) -> bool {
        if self.protocol != other.protocol {
            return false;
        }
        match (self.ports, other.ports) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => true,
        }
    }
}

/// Service-axis overlap over already expanded tokens.
///
/// The wildcard on either side matches everything; malformed tokens are
/// skipped.
pub fn services_overlap<'a, A, B>(a: A, b: B) -> bool
where
    A: IntoIterator<Item = &'a str>,
    B: IntoIterator<Item = &'a str>,
{
    let a: Vec<&str> = a.into_iter().collect();
    let b: Vec<&str> = b.into_iter().collect();
    if a.contains(&WILDCARD) || b.contains(&WILDCARD) {
        return true;
    }

    let a = parse_all(&a);
    let b = parse_all(&b);
    a.iter().any(|x| b.iter().any(|y| x.overlaps(y)))
}

fn parse_all(tokens: &[&str]) -> Vec<ServiceSpec> {
    tokens
        .iter()
        .filter_map(|t| {
            let spec = ServiceSpec::parse(t);
            if spec.is_none() {
                debug!(token = t, "skipping malformed service token");
            }
            spec
        })
        .collect()
}
