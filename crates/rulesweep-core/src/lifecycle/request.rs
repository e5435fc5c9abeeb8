//! Request-history resolution.
//!
//! Rule descriptions carry the id of the change request that created the
//! rule. The id is parsed out, joined against the request system's export,
//! and the result attached to the rule. Rules whose id has a known type but
//! no row in the export get a record synthesized from the description, so
//! later stages always have an end date and requester to test.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::AnalysisConfig;
use crate::model::{ClassifiedRule, RequestInfo, RequestOrigin, RequestRecord, RequestType};
use crate::util::time::parse_date;

macro_rules! pattern {
    ($re:expr) => {
        LazyLock::new(|| Regex::new($re).expect("valid description pattern"))
    };
}

static REQUEST_ID: LazyLock<Regex> =
    pattern!(r"(?i)\b(?:REQ|Request\s*ID)\s*[:=]\s*([A-Za-z0-9][A-Za-z0-9-]*)");
static SECONDARY_ID: LazyLock<Regex> = pattern!(r"(?i)\bMIS(?:\s*ID)?\s*[:=]\s*([A-Za-z0-9-]+)");
static RULESET_ID: LazyLock<Regex> =
    pattern!(r"(?i)\bRULESET(?:\s*ID)?\s*[:=]\s*([A-Za-z0-9-]+)");
static REQUESTER: LazyLock<Regex> = pattern!(r"(?i)\b(?:REQUESTER|USER)\s*[:=]\s*([^\s,;]+)");
static PERIOD: LazyLock<Regex> =
    pattern!(r"(\d{4}-\d{2}-\d{2}|\d{8})\s*~\s*(\d{4}-\d{2}-\d{2}|\d{8})");
static COMPACT_PERIOD: LazyLock<Regex> = pattern!(r"\b(\d{8})\s*-\s*(\d{8})\b");
static LEGACY: LazyLock<Regex> = pattern!(r"(?i)\bACL-(\d+)\b");

/// Fields recovered from a rule description.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedRequest {
    pub request_id: Option<String>,
    pub request_type: RequestType,
    pub secondary_id: Option<String>,
    pub ruleset_id: Option<String>,
    pub requester: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn parse_description(description: &str) -> ParsedRequest {
    let mut parsed = ParsedRequest {
        secondary_id: capture(&SECONDARY_ID, description),
        ruleset_id: capture(&RULESET_ID, description),
        requester: capture(&REQUESTER, description),
        ..Default::default()
    };

    if let Some(id) = capture(&REQUEST_ID, description) {
        parsed.request_type = RequestType::from_request_id(&id);
        parsed.request_id = Some(id);
    } else if let Some(id) = capture(&LEGACY, description) {
        parsed.request_type = RequestType::Old;
        parsed.request_id = Some(id);
    }

    let period = PERIOD
        .captures(description)
        .or_else(|| COMPACT_PERIOD.captures(description));
    if let Some(caps) = period {
        parsed.start_date = caps.get(1).and_then(|m| parse_date(m.as_str()));
        parsed.end_date = caps.get(2).and_then(|m| parse_date(m.as_str()));
    }

    parsed
}

/// Request-metadata rows indexed by request id.
pub struct RequestIndex<'a> {
    by_id: HashMap<&'a str, Vec<&'a RequestRecord>>,
}

impl<'a> RequestIndex<'a> {
    pub fn new(records: &'a [RequestRecord]) -> Self {
        let mut by_id: HashMap<&str, Vec<&RequestRecord>> = HashMap::new();
        for record in records {
            by_id.entry(record.request_id.as_str()).or_default().push(record);
        }
        Self { by_id }
    }

    /// Row for a parsed request.
    ///
    /// Group requests share an id across many rows, so they are joined with
    /// three predicates tried in order: id and secondary id, then id, end
    /// date and writer, then id, end date and requester. The first predicate
    /// with a match wins. When several rows satisfy it the first row is
    /// taken and the ambiguity is logged.
    pub fn resolve(&self, parsed: &ParsedRequest) -> Option<&'a RequestRecord> {
        let id = parsed.request_id.as_deref()?;
        let rows = self.by_id.get(id)?;

        if parsed.request_type != RequestType::Group {
            return first_match(id, rows.iter().copied());
        }

        let same_end = |r: &RequestRecord| parsed.end_date.is_some() && r.end_date == parsed.end_date;
        let predicates: [&dyn Fn(&RequestRecord) -> bool; 3] = [
            &|r: &RequestRecord| {
                parsed.secondary_id.is_some() && r.secondary_id == parsed.secondary_id
            },
            &|r: &RequestRecord| {
                same_end(r) && parsed.requester.is_some() && r.writer_id == parsed.requester
            },
            &|r: &RequestRecord| {
                same_end(r) && parsed.requester.is_some() && r.requester_id == parsed.requester
            },
        ];
        predicates
            .iter()
            .find_map(|pred| first_match(id, rows.iter().copied().filter(|r| pred(r))))
    }
}

fn first_match<'a>(
    id: &str,
    mut rows: impl Iterator<Item = &'a RequestRecord>,
) -> Option<&'a RequestRecord> {
    let first = rows.next()?;
    let extra = rows.count();
    if extra > 0 {
        warn!(request_id = id, candidates = extra + 1, "ambiguous request join; first row taken");
    }
    Some(first)
}

fn matched_info(parsed: &ParsedRequest, record: &RequestRecord) -> RequestInfo {
    RequestInfo {
        request_id: record.request_id.clone(),
        request_type: parsed.request_type,
        ruleset_id: record.ruleset_id.clone().or_else(|| parsed.ruleset_id.clone()),
        secondary_id: record.secondary_id.clone().or_else(|| parsed.secondary_id.clone()),
        requester: record
            .requester_id
            .clone()
            .or_else(|| record.writer_id.clone())
            .or_else(|| parsed.requester.clone()),
        start_date: record.start_date,
        end_date: record.end_date,
        status: record.status,
        origin: RequestOrigin::Matched,
    }
}

fn synthesized_info(parsed: &ParsedRequest) -> Option<RequestInfo> {
    if !parsed.request_type.is_known() {
        return None;
    }
    Some(RequestInfo {
        request_id: parsed.request_id.clone()?,
        request_type: parsed.request_type,
        ruleset_id: parsed.ruleset_id.clone(),
        secondary_id: parsed.secondary_id.clone(),
        requester: parsed.requester.clone(),
        start_date: parsed.start_date,
        end_date: parsed.end_date,
        status: None,
        origin: RequestOrigin::Synthesized,
    })
}

/// Attaches request history to every rule of `rules`.
pub fn process(
    rules: &[ClassifiedRule],
    requests: Option<&[RequestRecord]>,
    config: &AnalysisConfig,
) -> Vec<ClassifiedRule> {
    let index = requests.map(RequestIndex::new);
    let (mut matched, mut synthesized, mut extended) = (0usize, 0usize, 0usize);

    let out: Vec<ClassifiedRule> = rules
        .iter()
        .map(|current| {
            let parsed = parse_description(&current.rule.description);
            let record = index.as_ref().and_then(|idx| idx.resolve(&parsed));

            let request = match record {
                Some(record) => {
                    matched += 1;
                    Some(matched_info(&parsed, record))
                }
                None => synthesized_info(&parsed).inspect(|_| synthesized += 1),
            };
            let auto_extended = request
                .as_ref()
                .and_then(|r| r.status)
                .is_some_and(|s| config.is_auto_extension(s));
            if auto_extended {
                extended += 1;
            }

            let mut next = current.clone();
            next.state.request_type = parsed.request_type;
            next.state.parsed_end_date = parsed.end_date;
            next.state.request = request;
            next.state.auto_extended = auto_extended;
            next
        })
        .collect();

    debug!(
        table = requests.is_some(),
        rows = requests.map_or(0, <[RequestRecord]>::len),
        "request metadata joined"
    );
    info!(matched, synthesized, auto_extended = extended, "request history resolved");
    out
}
