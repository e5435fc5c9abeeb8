/// A logical column and the header spellings exporters use for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub canonical: &'static str,
    pub alternatives: &'static [&'static str],
}

impl ColumnSpec {
    pub const fn new(canonical: &'static str, alternatives: &'static [&'static str]) -> Self {
        Self {
            canonical,
            alternatives,
        }
    }

    pub fn spellings(&self) -> impl Iterator<Item = &'static str> + '_ {
        std::iter::once(self.canonical).chain(self.alternatives.iter().copied())
    }
}

// Rule table.
pub const SEQUENCE: ColumnSpec = ColumnSpec::new("Seq", &["seq", "Sequence", "sequence"]);
pub const RULE_NAME: ColumnSpec =
    ColumnSpec::new("Rule Name", &["rule_name", "rulename", "RuleName", "name", "Name"]);
pub const ENABLE: ColumnSpec = ColumnSpec::new("Enable", &["enable", "enabled", "Enabled"]);
pub const ACTION: ColumnSpec = ColumnSpec::new("Action", &["action"]);
pub const SOURCE: ColumnSpec = ColumnSpec::new("Source", &["source"]);
pub const USER: ColumnSpec = ColumnSpec::new("User", &["user"]);
pub const DESTINATION: ColumnSpec = ColumnSpec::new("Destination", &["destination"]);
pub const SERVICE: ColumnSpec = ColumnSpec::new("Service", &["service"]);
pub const APPLICATION: ColumnSpec = ColumnSpec::new("Application", &["application"]);
pub const CATEGORY: ColumnSpec = ColumnSpec::new("Category", &["category"]);
pub const PARTITION: ColumnSpec = ColumnSpec::new("Vsys", &["vsys", "Partition", "partition"]);
pub const DESCRIPTION: ColumnSpec = ColumnSpec::new("Description", &["description"]);
pub const LAST_HIT: ColumnSpec = ColumnSpec::new(
    "Last Hit",
    &[
        "last_hit",
        "Last Hit Date",
        "last_hit_timestamp",
        "last_used",
    ],
);

// Usage table.
pub const UNUSED_FLAG: ColumnSpec = ColumnSpec::new("Unused", &["unused", "usage", "Usage"]);

// Request-metadata table.
pub const REQUEST_ID: ColumnSpec =
    ColumnSpec::new("REQUEST_ID", &["Request ID", "request_id", "request_number"]);
pub const SECONDARY_ID: ColumnSpec = ColumnSpec::new("MIS_ID", &["MIS ID", "mis_id", "secondary_id"]);
pub const RULESET_ID: ColumnSpec = ColumnSpec::new("RULESET_ID", &["Ruleset ID", "ruleset_id"]);
pub const REQUEST_STATUS: ColumnSpec =
    ColumnSpec::new("REQUEST_STATUS", &["Request Status", "status"]);
pub const REQUEST_START_DATE: ColumnSpec =
    ColumnSpec::new("REQUEST_START_DATE", &["Start Date", "start_date"]);
pub const REQUEST_END_DATE: ColumnSpec =
    ColumnSpec::new("REQUEST_END_DATE", &["End Date", "end_date"]);
pub const TITLE: ColumnSpec = ColumnSpec::new("TITLE", &["Title", "title"]);
pub const REQUESTER_ID: ColumnSpec =
    ColumnSpec::new("REQUESTER_ID", &["Requester", "requester_id"]);
pub const REQUESTER_EMAIL: ColumnSpec =
    ColumnSpec::new("REQUESTER_EMAIL", &["requester_email"]);
pub const WRITER_ID: ColumnSpec =
    ColumnSpec::new("WRITE_PERSON_ID", &["WRITER_PERSON_ID", "writer_id"]);
pub const APPROVER_ID: ColumnSpec =
    ColumnSpec::new("APPROVAL_PERSON_ID", &["approver_id"]);

// Duplicate-analysis artifact.
pub const DUPLICATE_ROLE: ColumnSpec =
    ColumnSpec::new("Type", &["duplicate_status", "status", "Role"]);

// Object tables.
pub const OBJECT_NAME: ColumnSpec = ColumnSpec::new("Name", &["name", "object_name"]);
pub const OBJECT_TYPE: ColumnSpec = ColumnSpec::new("Type", &["type"]);
pub const OBJECT_VALUE: ColumnSpec = ColumnSpec::new("Value", &["value", "address"]);
pub const GROUP_NAME: ColumnSpec = ColumnSpec::new("Group Name", &["group_name", "name", "Name"]);
pub const GROUP_MEMBERS: ColumnSpec =
    ColumnSpec::new("Entry", &["entry", "members", "Members", "member"]);
pub const PROTOCOL: ColumnSpec = ColumnSpec::new("Protocol", &["protocol"]);
pub const PORT: ColumnSpec = ColumnSpec::new("Port", &["port", "destination_port"]);
