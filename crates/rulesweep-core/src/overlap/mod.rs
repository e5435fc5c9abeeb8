//! Traffic overlap between two rules.
//!
//! Two rules overlap when some flow could match both: their applications,
//! services, sources and destinations must all intersect. Users are compared
//! and reported but do not take part in the decision.
//!
//! An [`OverlapEngine`] owns the expansion cache for one analysis. It takes
//! `&mut self`, so a cache can never be shared between concurrent analyses;
//! build a new engine per call.

pub mod interval;
pub mod objects;
pub mod service;

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{FieldSet, RuleRecord, WILDCARD};
use interval::{AddressRange, address_intervals, any_overlap, intersections};
pub use objects::{ObjectCatalog, ObjectKind, ObjectTables};
use service::services_overlap;

/// Per-axis outcome of comparing two rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverlapReport {
    pub application: bool,
    pub service: bool,
    pub source: bool,
    pub destination: bool,
    /// Informational only.
    pub user: bool,
    /// Shared source ranges, `start-end`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_sources: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shared_destinations: Vec<String>,
}

impl OverlapReport {
    pub fn overlaps(&self) -> bool {
        self.application && self.service && self.source && self.destination
    }
}

pub struct OverlapEngine<'a> {
    catalog: &'a ObjectCatalog,
    max_depth: usize,
    cache: HashMap<(ObjectKind, String), BTreeSet<String>>,
}

impl<'a> OverlapEngine<'a> {
    pub fn new(catalog: &'a ObjectCatalog, max_depth: usize) -> Self {
        Self {
            catalog,
            max_depth,
            cache: HashMap::new(),
        }
    }

    /// Whether `a` and `b` could act on a common flow.
    pub fn overlap(&mut self, a: &RuleRecord, b: &RuleRecord) -> bool {
        let apps_a = self.expand_field(ObjectKind::Application, &a.application);
        let apps_b = self.expand_field(ObjectKind::Application, &b.application);
        if !sets_intersect(&apps_a, &apps_b) {
            return false;
        }

        let svc_a = self.expand_field(ObjectKind::Service, &a.service);
        let svc_b = self.expand_field(ObjectKind::Service, &b.service);
        if !services_overlap(svc_a.iter().map(String::as_str), svc_b.iter().map(String::as_str)) {
            return false;
        }

        self.addresses_overlap(&a.source, &b.source)
            && self.addresses_overlap(&a.destination, &b.destination)
    }

    /// Full per-axis comparison, including the shared address ranges.
    pub fn explain(&mut self, a: &RuleRecord, b: &RuleRecord) -> OverlapReport {
        let apps_a = self.expand_field(ObjectKind::Application, &a.application);
        let apps_b = self.expand_field(ObjectKind::Application, &b.application);
        let svc_a = self.expand_field(ObjectKind::Service, &a.service);
        let svc_b = self.expand_field(ObjectKind::Service, &b.service);

        let shared_sources = self.shared_ranges(&a.source, &b.source);
        let shared_destinations = self.shared_ranges(&a.destination, &b.destination);

        OverlapReport {
            application: sets_intersect(&apps_a, &apps_b),
            service: services_overlap(
                svc_a.iter().map(String::as_str),
                svc_b.iter().map(String::as_str),
            ),
            source: !shared_sources.is_empty(),
            destination: !shared_destinations.is_empty(),
            user: sets_intersect(&literal_set(&a.user), &literal_set(&b.user)),
            shared_sources,
            shared_destinations,
        }
    }

    fn addresses_overlap(&mut self, a: &FieldSet, b: &FieldSet) -> bool {
        let a = self.expand_field(ObjectKind::Address, a);
        let b = self.expand_field(ObjectKind::Address, b);
        any_overlap(
            &address_intervals(a.iter().map(String::as_str)),
            &address_intervals(b.iter().map(String::as_str)),
        )
    }

    fn shared_ranges(&mut self, a: &FieldSet, b: &FieldSet) -> Vec<String> {
        let a = self.expand_field(ObjectKind::Address, a);
        let b = self.expand_field(ObjectKind::Address, b);
        intersections(
            &address_intervals(a.iter().map(String::as_str)),
            &address_intervals(b.iter().map(String::as_str)),
        )
        .into_iter()
        .map(|i| AddressRange(i).to_string())
        .collect()
    }

    /// Union of the expansions of every token in `field`.
    ///
    /// Each top-level token is expanded with its own visited set and then
    /// memoized for the lifetime of this engine.
    fn expand_field(&mut self, kind: ObjectKind, field: &FieldSet) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for token in field.tokens() {
            let key = (kind, token.clone());
            if let Some(hit) = self.cache.get(&key) {
                out.extend(hit.iter().cloned());
                continue;
            }
            let expanded =
                self.catalog
                    .expand(kind, token, &mut HashSet::new(), 0, self.max_depth);
            out.extend(expanded.iter().cloned());
            self.cache.insert(key, expanded);
        }
        out
    }

    pub fn cached_expansions(&self) -> usize {
        self.cache.len()
    }
}

fn literal_set(field: &FieldSet) -> BTreeSet<String> {
    field.tokens().iter().cloned().collect()
}

/// Plain intersection; the wildcard on either side matches everything.
fn sets_intersect(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a.contains(WILDCARD) || b.contains(WILDCARD) || !a.is_disjoint(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Vendor};

    fn rule(src: &str, dst: &str, svc: &str, app: &str) -> RuleRecord {
        let mut r = RuleRecord::new(Vendor::PaloAlto, 1, "r", Action::Allow);
        r.source = FieldSet::parse(src);
        r.destination = FieldSet::parse(dst);
        r.service = FieldSet::parse(svc);
        r.application = FieldSet::parse(app);
        r
    }

    #[test]
    fn all_four_axes_must_overlap() {
        let catalog = ObjectCatalog::new();
        let mut engine = OverlapEngine::new(&catalog, 32);

        let a = rule("10.0.0.0/24", "any", "tcp/80", "any");
        assert!(engine.overlap(&a, &rule("10.0.0.5", "10.9.9.9", "tcp", "web")));
        assert!(!engine.overlap(&a, &rule("10.0.1.5", "any", "tcp/80", "any")));
        assert!(!engine.overlap(&a, &rule("any", "any", "udp/80", "any")));

        let b = rule("any", "any", "any", "ssh");
        let c = rule("any", "any", "any", "web,dns");
        assert!(!engine.overlap(&b, &c));
    }

    #[test]
    fn users_are_reported_but_not_decisive() {
        let catalog = ObjectCatalog::new();
        let mut engine = OverlapEngine::new(&catalog, 32);

        let mut a = rule("any", "any", "any", "any");
        a.user = FieldSet::parse("alice");
        let mut b = a.clone();
        b.user = FieldSet::parse("bob");

        let report = engine.explain(&a, &b);
        assert!(!report.user);
        assert!(report.overlaps());
        assert!(engine.overlap(&a, &b));
    }

    #[test]
    fn groups_are_expanded_and_cached() {
        let mut catalog = ObjectCatalog::new();
        catalog.insert_address("web-1", "10.0.0.10");
        catalog.insert_group(ObjectKind::Address, "web", "web-1");
        catalog.insert_service("http", "tcp", Some("80"));

        let mut engine = OverlapEngine::new(&catalog, 32);
        let a = rule("web", "any", "http", "any");
        let b = rule("10.0.0.0/24", "any", "tcp/80-90", "any");
        assert!(engine.overlap(&a, &b));
        assert!(engine.cached_expansions() > 0);

        let report = engine.explain(&a, &b);
        assert_eq!(report.shared_sources, vec!["10.0.0.10-10.0.0.10"]);
    }

    #[test]
    fn malformed_addresses_mean_no_overlap() {
        let catalog = ObjectCatalog::new();
        let mut engine = OverlapEngine::new(&catalog, 32);
        let a = rule("10.0.0.999", "any", "any", "any");
        let b = rule("any", "any", "any", "any");
        assert!(!engine.overlap(&a, &b));
        assert!(!engine.overlap(&b, &a));
    }
}
