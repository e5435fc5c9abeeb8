//! Named network, service and application objects.
//!
//! Rules reference objects and groups by name. Before overlap can be decided
//! every name has to be reduced to the literal addresses, `proto/port` tokens
//! or application ids it stands for. Groups may nest, and exported data can
//! contain membership cycles, so expansion carries an explicit visited set
//! and a depth bound.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{FieldSet, WILDCARD};
use crate::table::{Table, cell_opt, columns};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Address,
    Service,
    Application,
}

/// Object tables as exported by a collector. Every table is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectTables {
    #[serde(default)]
    pub network_objects: Table,
    #[serde(default)]
    pub network_groups: Table,
    #[serde(default)]
    pub service_objects: Table,
    #[serde(default)]
    pub service_groups: Table,
    #[serde(default)]
    pub application_groups: Table,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectCatalog {
    addresses: HashMap<String, Vec<String>>,
    services: HashMap<String, Vec<String>>,
    groups: HashMap<ObjectKind, HashMap<String, Vec<String>>>,
}

impl ObjectCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads an object-tables JSON document.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read objects file: {}", path.display()))?;
        let tables: ObjectTables = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse objects file: {}", path.display()))?;
        Ok(Self::from_tables(&tables))
    }

    pub fn from_tables(tables: &ObjectTables) -> Self {
        let mut catalog = Self::new();

        let t = &tables.network_objects;
        let (name, value) = (
            t.resolve(&columns::OBJECT_NAME),
            t.resolve(&columns::OBJECT_VALUE),
        );
        for row in t.rows() {
            if let (Some(n), Some(v)) = (cell_opt(row, name), cell_opt(row, value)) {
                catalog.insert_address(n, &v);
            }
        }

        let t = &tables.service_objects;
        let (name, protocol, port) = (
            t.resolve(&columns::OBJECT_NAME),
            t.resolve(&columns::PROTOCOL),
            t.resolve(&columns::PORT),
        );
        for row in t.rows() {
            if let (Some(n), Some(p)) = (cell_opt(row, name), cell_opt(row, protocol)) {
                catalog.insert_service(n, &p, cell_opt(row, port).as_deref());
            }
        }

        for (kind, t) in [
            (ObjectKind::Address, &tables.network_groups),
            (ObjectKind::Service, &tables.service_groups),
            (ObjectKind::Application, &tables.application_groups),
        ] {
            let (name, members) = (
                t.resolve(&columns::GROUP_NAME),
                t.resolve(&columns::GROUP_MEMBERS),
            );
            for row in t.rows() {
                if let Some(n) = cell_opt(row, name) {
                    let members = cell_opt(row, members).unwrap_or_default();
                    catalog.insert_group(kind, n, &members);
                }
            }
        }

        debug!(
            addresses = catalog.addresses.len(),
            services = catalog.services.len(),
            groups = catalog.groups.values().map(HashMap::len).sum::<usize>(),
            "object catalog built"
        );
        catalog
    }

    /// Registers an address object; `value` may list several literals.
    pub fn insert_address(&mut self, name: impl Into<String>, value: &str) {
        self.addresses
            .insert(name.into(), FieldSet::parse(value).tokens().to_vec());
    }

    /// Registers a service object. `ports` may be empty, a port, a range or a list.
    pub fn insert_service(&mut self, name: impl Into<String>, protocol: &str, ports: Option<&str>) {
        let protocol = protocol.trim().to_ascii_lowercase();
        let ports = FieldSet::parse(ports.unwrap_or_default());
        let tokens = if ports.is_empty() {
            vec![protocol]
        } else {
            ports
                .tokens()
                .iter()
                .map(|p| format!("{protocol}/{p}"))
                .collect()
        };
        self.services.insert(name.into(), tokens);
    }

    pub fn insert_group(&mut self, kind: ObjectKind, name: impl Into<String>, members: &str) {
        self.groups
            .entry(kind)
            .or_default()
            .insert(name.into(), FieldSet::parse(members).tokens().to_vec());
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty() && self.services.is_empty() && self.groups.is_empty()
    }

    fn group(&self, kind: ObjectKind, name: &str) -> Option<&[String]> {
        self.groups
            .get(&kind)
            .and_then(|g| g.get(name))
            .map(Vec::as_slice)
    }

    /// Literal members `token` stands for.
    ///
    /// `visited` holds the names already entered on this expansion; seeing one
    /// again is a cycle and contributes nothing. Expansion stops below
    /// `max_depth` levels of nesting. Unknown names are returned as-is, since
    /// they are usually literals already.
    pub fn expand(
        &self,
        kind: ObjectKind,
        token: &str,
        visited: &mut HashSet<String>,
        depth: usize,
        max_depth: usize,
    ) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.expand_into(kind, token, visited, depth, max_depth, &mut out);
        out
    }

    fn expand_into(
        &self,
        kind: ObjectKind,
        token: &str,
        visited: &mut HashSet<String>,
        depth: usize,
        max_depth: usize,
        out: &mut BTreeSet<String>,
    ) {
        if token == WILDCARD {
            out.insert(WILDCARD.to_string());
            return;
        }
        if depth > max_depth {
            warn!(?kind, token, max_depth, "group nesting too deep; expansion truncated");
            return;
        }
        if !visited.insert(token.to_string()) {
            debug!(?kind, token, "group cycle detected");
            return;
        }

        if let Some(members) = self.group(kind, token) {
            for member in members {
                self.expand_into(kind, member, visited, depth + 1, max_depth, out);
            }
            return;
        }

        let literals = match kind {
            ObjectKind::Address => self.addresses.get(token),
            ObjectKind::Service => self.services.get(token),
            ObjectKind::Application => None,
        };
        match literals {
            Some(values) => out.extend(values.iter().cloned()),
            None => {
                out.insert(token.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_from_json;
    use serde_json::json;

    fn expand(catalog: &ObjectCatalog, kind: ObjectKind, token: &str) -> Vec<String> {
        catalog
            .expand(kind, token, &mut HashSet::new(), 0, 32)
            .into_iter()
            .collect()
    }

    #[test]
    fn nested_groups_expand_to_literals() {
        let mut catalog = ObjectCatalog::new();
        catalog.insert_address("web-1", "10.0.0.10");
        catalog.insert_address("web-2", "10.0.0.11");
        catalog.insert_group(ObjectKind::Address, "web", "web-1,web-2");
        catalog.insert_group(ObjectKind::Address, "dmz", "web,172.16.0.0/16");

        assert_eq!(
            expand(&catalog, ObjectKind::Address, "dmz"),
            vec!["10.0.0.10", "10.0.0.11", "172.16.0.0/16"]
        );
    }

    #[test]
    fn cycles_terminate() {
        let mut catalog = ObjectCatalog::new();
        catalog.insert_group(ObjectKind::Address, "a", "b,10.0.0.1");
        catalog.insert_group(ObjectKind::Address, "b", "a,10.0.0.2");

        assert_eq!(
            expand(&catalog, ObjectKind::Address, "a"),
            vec!["10.0.0.1", "10.0.0.2"]
        );
    }

    #[test]
    fn depth_bound_truncates() {
        let mut catalog = ObjectCatalog::new();
        catalog.insert_group(ObjectKind::Application, "l0", "l1");
        catalog.insert_group(ObjectKind::Application, "l1", "l2");
        catalog.insert_group(ObjectKind::Application, "l2", "ssh");

        let deep = catalog.expand(ObjectKind::Application, "l0", &mut HashSet::new(), 0, 1);
        assert!(deep.is_empty());
        let full = catalog.expand(ObjectKind::Application, "l0", &mut HashSet::new(), 0, 3);
        assert_eq!(full.into_iter().collect::<Vec<_>>(), vec!["ssh"]);
    }

    #[test]
    fn services_become_protocol_port_tokens() {
        let mut catalog = ObjectCatalog::new();
        catalog.insert_service("web", "TCP", Some("80,443"));
        catalog.insert_service("all-udp", "udp", None);
        catalog.insert_group(ObjectKind::Service, "mixed", "web,all-udp");

        assert_eq!(
            expand(&catalog, ObjectKind::Service, "mixed"),
            vec!["tcp/443", "tcp/80", "udp"]
        );
        assert_eq!(expand(&catalog, ObjectKind::Service, "any"), vec!["any"]);
    }

    #[test]
    fn builds_from_exported_tables() {
        let tables = ObjectTables {
            network_objects: table_from_json(json!([
                { "Name": "host-a", "Type": "ip-netmask", "Value": "10.1.1.1/32" }
            ])),
            network_groups: table_from_json(json!([
                { "Group Name": "hosts", "Entry": "host-a, 10.1.1.2" }
            ])),
            service_objects: table_from_json(json!([
                { "Name": "ssh", "Protocol": "tcp", "Port": "22" }
            ])),
            ..Default::default()
        };
        let catalog = ObjectCatalog::from_tables(&tables);
        assert!(!catalog.is_empty());
        assert_eq!(
            expand(&catalog, ObjectKind::Address, "hosts"),
            vec!["10.1.1.1/32", "10.1.1.2"]
        );
        assert_eq!(expand(&catalog, ObjectKind::Service, "ssh"), vec!["tcp/22"]);
    }
}
