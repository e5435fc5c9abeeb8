//! Closed integer intervals over the IPv4 address space and port numbers.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::model::WILDCARD;

/// Closed interval `[lo, hi]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Interval {
    pub lo: u32,
    pub hi: u32,
}

impl Interval {
    pub const FULL: Interval = Interval { lo: 0, hi: u32::MAX };

    /// `None` for reversed bounds.
    pub fn new(lo: u32, hi: u32) -> Option<Self> {
        (lo <= hi).then_some(Self { lo, hi })
    }

    pub fn point(v: u32) -> Self {
        Self { lo: v, hi: v }
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.lo <= other.hi && other.lo <= self.hi
    }

    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        Interval::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }
}

/// Address interval rendered as `a.b.c.d-e.f.g.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange(pub Interval);

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", Ipv4Addr::from(self.0.lo), Ipv4Addr::from(self.0.hi))
    }
}

/// Parses one address token.
///
/// Accepted forms: the wildcard, `a.b.c.d`, `a.b.c.d/len`, `a.b.c.d/m.m.m.m`
/// (contiguous mask) and `start-end`. Host bits under a prefix are ignored.
/// Anything else, including IPv6 and reversed ranges, is `None`.
pub fn parse_address(token: &str) -> Option<Interval> {
    let token = token.trim();
    if token == WILDCARD {
        return Some(Interval::FULL);
    }

    if let Some((start, end)) = token.split_once('-') {
        let start: Ipv4Addr = start.trim().parse().ok()?;
        let end: Ipv4Addr = end.trim().parse().ok()?;
        return Interval::new(start.into(), end.into());
    }

    let (addr, prefix) = match token.split_once('/') {
        Some((addr, mask)) => (addr, parse_prefix(mask)?),
        None => (token, 32),
    };
    let addr: u32 = addr.parse::<Ipv4Addr>().ok()?.into();

    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = addr & mask;
    Some(Interval {
        lo: network,
        hi: network | !mask,
    })
}

fn parse_prefix(mask: &str) -> Option<u32> {
    if let Ok(len) = mask.parse::<u32>() {
        return (len <= 32).then_some(len);
    }
    let bits: u32 = mask.parse::<Ipv4Addr>().ok()?.into();
    let len = bits.leading_ones();
    // Reject non-contiguous masks such as 255.0.255.0.
    (bits.checked_shl(len).unwrap_or(0) == 0).then_some(len)
}

/// Parses `port` or `lo-hi`. Out-of-range or reversed values are `None`.
pub fn parse_port_range(raw: &str) -> Option<Interval> {
    let port = |s: &str| s.trim().parse::<u16>().ok().map(u32::from);
    match raw.split_once('-') {
        Some((lo, hi)) => Interval::new(port(lo)?, port(hi)?),
        None => port(raw).map(Interval::point),
    }
}

/// Intervals for a list of address tokens; malformed tokens are skipped.
pub fn address_intervals<'a, I>(tokens: I) -> Vec<Interval>
where
    I: IntoIterator<Item = &'a str>,
{
    tokens
        .into_iter()
        .filter_map(|token| {
            let parsed = parse_address(token);
            if parsed.is_none() {
                debug!(token, "skipping malformed address token");
            }
            parsed
        })
        .collect()
}

/// True if any pair of intervals intersects.
pub fn any_overlap(a: &[Interval], b: &[Interval]) -> bool {
    a.iter().any(|x| b.iter().any(|y| x.overlaps(y)))
}

/// Every pairwise intersection, sorted and deduplicated.
pub fn intersections(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out: Vec<Interval> = a
        .iter()
        .flat_map(|x| b.iter().filter_map(move |y| x.intersection(y)))
        .collect();
    out.sort();
    out.dedup();
    out
}
