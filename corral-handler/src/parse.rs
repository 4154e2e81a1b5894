//! Parsers for cgroup interface file formats
//!
//! Flat keyed files (`cpu.stat`, `memory.events`) hold one `key value` pair
//! per line. Nested keyed files (`io.stat`, `io.max`) hold one
//! `key sub=value ...` entry per line. Malformed lines are skipped.

use std::collections::BTreeMap;

use corral_core::{Error, Limit, Pressure, PressureLine, Result};

/// Parse a single-value file
pub fn parse_u64(file: &str, content: &str) -> Result<u64> {
    content
        .trim()
        .parse()
        .map_err(|_| Error::internal(format!("unexpected content in {file}: {:?}", content.trim())))
}

/// Parse a single-value file where `max` means unlimited
pub fn parse_limit(file: &str, content: &str) -> Result<Limit<u64>> {
    match content.trim() {
        "max" => Ok(Limit::Max),
        _ => parse_u64(file, content).map(Limit::Value),
    }
}

/// Parse a `0`/`1` file
pub fn parse_bool(file: &str, content: &str) -> Result<bool> {
    match content.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(Error::internal(format!("unexpected content in {file}: {other:?}"))),
    }
}

/// Parse a flat keyed file
///
/// Format:
/// ```text
/// usage_usec 12345678
/// nr_throttled 123
/// ```
pub fn parse_flat_keyed(content: &str) -> BTreeMap<&str, u64> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?;
            let value = parts.next()?.parse().ok()?;
            parts.next().is_none().then_some((key, value))
        })
        .collect()
}

/// Parse one nested keyed line into its key and `sub=value` pairs
///
/// ```text
/// 8:0 rbytes=1234567 wbytes=890123 rios=456 wios=789
/// ```
pub fn parse_nested_line(line: &str) -> Option<(&str, BTreeMap<&str, &str>)> {
    let mut parts = line.split_whitespace();
    let key = parts.next()?;
    let values = parts.filter_map(|part| part.split_once('=')).collect();
    Some((key, values))
}

/// Parse a `major:minor` device number
pub fn parse_device(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.split_once(':')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Parse a nested value that may be `max`
pub fn parse_limit_value(value: Option<&&str>) -> Limit<u64> {
    match value {
        Some(&v) if v != "max" => v.parse().map_or(Limit::Max, Limit::Value),
        _ => Limit::Max,
    }
}

/// Parse a pressure stall information file
///
/// Format:
/// ```text
/// some avg10=0.00 avg60=0.00 avg300=0.00 total=0
/// full avg10=0.00 avg60=0.00 avg300=0.00 total=0
/// ```
pub fn parse_pressure(file: &str, content: &str) -> Result<Pressure> {
    let mut some = None;
    let mut full = None;

    for line in content.lines() {
        let Some((kind, values)) = parse_nested_line(line) else {
            continue;
        };
        let field = |name: &str| values.get(name).and_then(|v| v.parse::<f64>().ok());
        let parsed = PressureLine {
            avg10: field("avg10").unwrap_or_default(),
            avg60: field("avg60").unwrap_or_default(),
            avg300: field("avg300").unwrap_or_default(),
            total_us: values
                .get("total")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        };
        match kind {
            "some" => some = Some(parsed),
            "full" => full = Some(parsed),
            _ => {}
        }
    }

    let some = some.ok_or_else(|| Error::internal(format!("no `some` line in {file}")))?;
    Ok(Pressure { some, full })
}
