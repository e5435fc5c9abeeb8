//! Conversion of validated tables into typed records.

use tracing::{debug, warn};

use super::columns;
use super::validate::{TableKind, parse_enabled, validate};
use super::{Table, cell_opt};
use crate::error::{Error, Result};
use crate::model::{
    Action, FieldSet, RequestRecord, RuleRecord, UsageFlag, UsageRecord, Vendor,
};
use crate::util::deterministic::sort_rules;
use crate::util::time::{parse_date, parse_timestamp};

/// Converts a rule table into records ordered by sequence.
///
/// Without a sequence column, row order is the evaluation order (1-based).
pub fn rules_from_table(table: &Table, vendor: Vendor) -> Result<Vec<RuleRecord>> {
    let report = validate(table, TableKind::Rules);
    if !report.is_valid() {
        return Err(Error::Validation(report));
    }

    let seq = table.resolve(&columns::SEQUENCE);
    let name = table.resolve(&columns::RULE_NAME);
    let enable = table.resolve(&columns::ENABLE);
    let action = table.resolve(&columns::ACTION);
    let source = table.resolve(&columns::SOURCE);
    let user = table.resolve(&columns::USER);
    let destination = table.resolve(&columns::DESTINATION);
    let service = table.resolve(&columns::SERVICE);
    let application = table.resolve(&columns::APPLICATION);
    let category = table.resolve(&columns::CATEGORY);
    let partition = table.resolve(&columns::PARTITION);
    let description = table.resolve(&columns::DESCRIPTION);
    let last_hit = table.resolve(&columns::LAST_HIT);

    let field = |row, col| {
        cell_opt(row, col)
            .map(|raw| FieldSet::parse(&raw))
            .unwrap_or_else(FieldSet::any)
    };

    let mut rules = Vec::with_capacity(table.len());
    for (idx, row) in table.rows().iter().enumerate() {
        // Validation guarantees these cells parse.
        let sequence = cell_opt(row, seq)
            .and_then(|s| s.parse().ok())
            .unwrap_or(idx as u32 + 1);
        let enabled = cell_opt(row, enable)
            .and_then(|s| parse_enabled(&s))
            .unwrap_or(false);
        let action = cell_opt(row, action)
            .and_then(|s| Action::parse(&s))
            .unwrap_or(Action::Deny);

        let raw_hit = cell_opt(row, last_hit);
        let parsed_hit = raw_hit.as_deref().and_then(parse_timestamp);
        if raw_hit.is_some() && parsed_hit.is_none() {
            debug!(sequence, value = ?raw_hit, "unreadable last-hit timestamp ignored");
        }

        rules.push(RuleRecord {
            vendor,
            sequence,
            name: cell_opt(row, name).unwrap_or_default(),
            enabled,
            action,
            source: field(row, source),
            user: field(row, user),
            destination: field(row, destination),
            service: field(row, service),
            application: field(row, application),
            category: cell_opt(row, category),
            partition: cell_opt(row, partition),
            description: cell_opt(row, description).unwrap_or_default(),
            last_hit: parsed_hit,
        });
    }

    sort_rules(&mut rules);
    Ok(rules)
}

/// Converts the request-metadata table. Unreadable dates and codes become `None`.
pub fn requests_from_table(table: &Table) -> Result<Vec<RequestRecord>> {
    let report = validate(table, TableKind::Requests);
    if !report.is_valid() {
        return Err(Error::Validation(report));
    }

    let id = table.resolve(&columns::REQUEST_ID);
    let secondary = table.resolve(&columns::SECONDARY_ID);
    let ruleset = table.resolve(&columns::RULESET_ID);
    let status = table.resolve(&columns::REQUEST_STATUS);
    let start = table.resolve(&columns::REQUEST_START_DATE);
    let end = table.resolve(&columns::REQUEST_END_DATE);
    let title = table.resolve(&columns::TITLE);
    let requester = table.resolve(&columns::REQUESTER_ID);
    let email = table.resolve(&columns::REQUESTER_EMAIL);
    let writer = table.resolve(&columns::WRITER_ID);
    let approver = table.resolve(&columns::APPROVER_ID);

    let records = table
        .rows()
        .iter()
        .filter_map(|row| {
            let request_id = cell_opt(row, id)?;
            Some(RequestRecord {
                request_id,
                secondary_id: cell_opt(row, secondary),
                ruleset_id: cell_opt(row, ruleset),
                status: cell_opt(row, status).and_then(|s| parse_status(&s)),
                start_date: cell_opt(row, start).and_then(|s| parse_date(&s)),
                end_date: cell_opt(row, end).and_then(|s| parse_date(&s)),
                title: cell_opt(row, title),
                requester_id: cell_opt(row, requester),
                requester_email: cell_opt(row, email),
                writer_id: cell_opt(row, writer),
                approver_id: cell_opt(row, approver),
            })
        })
        .collect();

    Ok(records)
}

/// Converts a usage table. Rows naming no rule are dropped.
pub fn usage_from_table(table: &Table) -> Result<Vec<UsageRecord>> {
    let report = validate(table, TableKind::Usage);
    if !report.is_valid() {
        return Err(Error::Validation(report));
    }

    let name = table.resolve(&columns::RULE_NAME);
    let flag = table.resolve(&columns::UNUSED_FLAG);
    let last_hit = table.resolve(&columns::LAST_HIT);

    let records = table
        .rows()
        .iter()
        .filter_map(|row| {
            let name = cell_opt(row, name)?;
            let flag_raw = cell_opt(row, flag);
            let flag = flag_raw.as_deref().and_then(UsageFlag::parse);
            if flag_raw.is_some() && flag.is_none() {
                warn!(rule = %name, value = ?flag_raw, "unrecognized usage flag ignored");
            }
            Some(UsageRecord {
                name,
                flag,
                last_hit: cell_opt(row, last_hit).and_then(|s| parse_timestamp(&s)),
            })
        })
        .collect();

    Ok(records)
}

/// Status codes arrive as integers, floats ("99.0") or strings.
fn parse_status(raw: &str) -> Option<u32> {
    raw.parse::<u32>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::table_from_json;
    use serde_json::json;

    #[test]
    fn rules_are_typed_and_sorted_by_sequence() {
        let table = table_from_json(json!([
            { "Seq": 7, "Rule Name": "late", "Enable": "N", "Action": "deny",
              "Source": "10.0.0.0/8", "Destination": "any", "Service": "tcp/22" },
            { "Seq": 3, "Rule Name": "early", "Enable": "Y", "Action": "allow",
              "Source": "b,a", "User": "alice", "Destination": "any", "Service": "any",
              "Description": "REQ: F1", "Last Hit": "2026-01-02 03:04:05" }
        ]));

        let rules = rules_from_table(&table, Vendor::PaloAlto).unwrap();
        assert_eq!(rules[0].name, "early");
        assert_eq!(rules[0].sequence, 3);
        assert!(rules[0].enabled);
        assert_eq!(rules[0].source.tokens(), &["b".to_string(), "a".to_string()]);
        assert_eq!(rules[0].user.joined(), "alice");
        assert!(rules[0].application.is_any());
        assert_eq!(
            rules[0].last_hit.map(|t| t.to_string()).as_deref(),
            Some("2026-01-02 03:04:05")
        );

        assert_eq!(rules[1].name, "late");
        assert!(!rules[1].enabled);
        assert_eq!(rules[1].action, Action::Deny);
    }

    #[test]
    fn row_order_is_sequence_without_seq_column() {
        let table = table_from_json(json!([
            { "Rule Name": "a", "Enable": "Y", "Action": "allow",
              "Source": "any", "Destination": "any", "Service": "any" },
            { "Rule Name": "b", "Enable": "Y", "Action": "allow",
              "Source": "any", "Destination": "any", "Service": "any" }
        ]));
        let rules = rules_from_table(&table, Vendor::Secui).unwrap();
        assert_eq!(
            rules.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn invalid_rule_table_is_a_validation_error() {
        let table = table_from_json(json!([{ "Rule Name": "a" }]));
        let err = rules_from_table(&table, Vendor::Secui).unwrap_err();
        assert!(matches!(err, Error::Validation(ref r) if r.missing_columns.len() == 5));
    }

    #[test]
    fn requests_parse_status_and_dates() {
        let table = table_from_json(json!([
            { "REQUEST_ID": "P100", "MIS_ID": "M-1", "REQUEST_STATUS": 99.0,
              "REQUEST_END_DATE": "2026-12-31", "WRITE_PERSON_ID": "kim" },
            { "REQUEST_ID": null },
            { "REQUEST_ID": "F200", "REQUEST_STATUS": "n/a", "REQUEST_END_DATE": "soon" }
        ]));
        let records = requests_from_table(&table).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, Some(99));
        assert_eq!(records[0].secondary_id.as_deref(), Some("M-1"));
        assert_eq!(records[0].writer_id.as_deref(), Some("kim"));
        assert_eq!(records[0].end_date.map(|d| d.to_string()).as_deref(), Some("2026-12-31"));
        assert_eq!(records[1].status, None);
        assert_eq!(records[1].end_date, None);
    }

    #[test]
    fn usage_rows_carry_flag_or_last_hit() {
        let table = table_from_json(json!([
            { "Rule Name": "a", "Unused": "Y" },
            { "Rule Name": "b", "Unused": "?", "last_hit": "2026-01-01" }
        ]));
        let usage = usage_from_table(&table).unwrap();
        assert_eq!(usage[0].flag, Some(UsageFlag::Unused));
        assert_eq!(usage[1].flag, None);
        assert!(usage[1].last_hit.is_some());
    }
}
