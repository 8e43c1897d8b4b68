//! Timestamp decoding for inbound records.
//!
//! Servers emit either ISO-8601 strings or the legacy `/Date(ms)/` form. Anything
//! else is carried through untouched as [`Timestamp::Raw`].

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::OnceLock;

const ISO_PATTERN: &str =
    r"^([0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2})(\.[0-9]*)?(Z|[+-][0-9:]*)?$";
const LEGACY_PATTERN: &str = r"^\\?/Date\(([+-]?[0-9]+)(?:[+-][0-9]{4})?\)\\?/$";

fn iso_regex() -> &'static Regex {
    static ISO: OnceLock<Regex> = OnceLock::new();
    ISO.get_or_init(|| Regex::new(ISO_PATTERN).expect("valid regex"))
}

fn legacy_regex() -> &'static Regex {
    static LEGACY: OnceLock<Regex> = OnceLock::new();
    LEGACY.get_or_init(|| Regex::new(LEGACY_PATTERN).expect("valid regex"))
}

/// Tries the ISO rule first, then the legacy millisecond rule.
pub fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    decode_iso(raw).or_else(|| decode_legacy(raw))
}

fn decode_iso(raw: &str) -> Option<DateTime<Utc>> {
    let captures = iso_regex().captures(raw)?;
    let base = captures.get(1)?.as_str();
    // a bare "." carries no digits; treat it as whole seconds
    let naive = match captures.get(2).map(|m| m.as_str()).filter(|f| f.len() > 1) {
        Some(fraction) => {
            NaiveDateTime::parse_from_str(&format!("{base}{fraction}"), "%Y-%m-%dT%H:%M:%S%.f")
                .ok()?
        }
        None => NaiveDateTime::parse_from_str(base, "%Y-%m-%dT%H:%M:%S").ok()?,
    };
    // an absent offset is read as UTC
    let offset = match captures.get(3).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(zone) => offset_seconds(zone)?,
    };
    FixedOffset::east_opt(offset)?
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn offset_seconds(zone: &str) -> Option<i32> {
    let (sign, rest) = match zone.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|ch| *ch != ':').collect();
    let (hours, minutes): (i32, i32) = match digits.len() {
        2 => (digits.parse().ok()?, 0),
        4 => (digits[..2].parse().ok()?, digits[2..].parse().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    Some(sign * (hours * 3600 + minutes * 60))
}

fn decode_legacy(raw: &str) -> Option<DateTime<Utc>> {
    let captures = legacy_regex().captures(raw)?;
    let millis: i64 = captures.get(1)?.as_str().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

/// A decoded instant, or the original string when neither rule matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    At(DateTime<Utc>),
    Raw(String),
}

impl Timestamp {
    pub fn decode(raw: &str) -> Self {
        match decode_timestamp(raw) {
            Some(instant) => Timestamp::At(instant),
            None => Timestamp::Raw(raw.to_string()),
        }
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::At(instant) => Some(*instant),
            Timestamp::Raw(_) => None,
        }
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Timestamp::At(value)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::At(instant) => {
                f.write_str(&instant.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            Timestamp::Raw(raw) => f.write_str(raw),
        }
    }
}

impl Serialize for Timestamp {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(Timestamp::decode(&raw))
    }
}
