use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, TimeZone as _};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::Write;

use crate::error::{MergeError, Result};

const LENIENT_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M %p",
    "%m/%d/%Y %I:%M:%S %p",
];

const LENIENT_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Zone a naive call date is read in when converting to epoch millis.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeZone {
    #[default]
    Utc,
    Local,
}

pub fn parse_strict(raw: &str, pattern: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    NaiveDateTime::parse_from_str(trimmed, pattern)
        .map_err(|e| MergeError::DateParse(format!("'{}': {}", trimmed, e)))
}

/// Best-effort parse over a handful of common layouts. Offsets in RFC 3339
/// input are kept as wall-clock time.
pub fn parse_lenient(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.naive_local());
    }

    if let Some(dt) = LENIENT_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
    {
        return Ok(dt);
    }

    LENIENT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .ok_or_else(|| MergeError::DateParse(format!("'{}': no known layout", trimmed)))
}

pub fn epoch_millis(dt: NaiveDateTime, zone: TimeZone) -> Result<i64> {
    match zone {
        TimeZone::Utc => Ok(dt.and_utc().timestamp_millis()),
        TimeZone::Local => match chrono::Local.from_local_datetime(&dt) {
            LocalResult::Single(local) => Ok(local.timestamp_millis()),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest.timestamp_millis()),
            LocalResult::None => Err(MergeError::DateParse(format!(
                "'{}' does not exist in the local time zone",
                dt
            ))),
        },
    }
}

/// Rewrites a call-date cell into `output_pattern`. Text cells must match
/// `input_pattern`; other cells go through the lenient layouts. Anything that
/// cannot be parsed becomes null.
pub fn reformat(value: &Value, input_pattern: &str, output_pattern: &str) -> Value {
    let parsed = match value {
        Value::Null => return Value::Null,
        Value::String(s) => parse_strict(s, input_pattern),
        other => parse_lenient(&other.to_string()),
    };

    parsed
        .ok()
        .and_then(|dt| format_datetime(&dt, output_pattern))
        .map_or(Value::Null, Value::String)
}

fn format_datetime(dt: &NaiveDateTime, pattern: &str) -> Option<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(pattern)).ok()?;
    Some(out)
}
