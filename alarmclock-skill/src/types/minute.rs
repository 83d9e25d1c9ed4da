//! Minute-resolution wall-clock timestamps.
//!
//! Alarms are scheduled in naive local time truncated to the minute. The
//! persisted form is ISO-8601 with minute precision (`2024-03-01T07:30`);
//! the older space-separated form is still accepted when reading.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Duration, PrimitiveDateTime};

const RECORD_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]");

const SPACED_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]");

const CLOCK_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[hour]:[minute]");

/// Drop seconds and sub-second precision.
pub fn truncate(dt: PrimitiveDateTime) -> PrimitiveDateTime {
    dt - Duration::seconds(i64::from(dt.second()))
        - Duration::nanoseconds(i64::from(dt.nanosecond()))
}

/// Persisted form, e.g. `2024-03-01T07:30`.
pub fn format(dt: PrimitiveDateTime) -> String {
    dt.format(RECORD_FORMAT).unwrap_or_else(|_| dt.to_string())
}

/// Spoken/displayed time of day, e.g. `07:30`.
pub fn clock_time(dt: PrimitiveDateTime) -> String {
    dt.format(CLOCK_FORMAT)
        .unwrap_or_else(|_| format!("{:02}:{:02}", dt.hour(), dt.minute()))
}

/// Parse the persisted form, or the legacy `YYYY-MM-DD HH:MM` form.
pub fn parse(s: &str) -> Result<PrimitiveDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(s, RECORD_FORMAT).or_else(|_| PrimitiveDateTime::parse(s, SPACED_FORMAT))
}

/// Parse an NLU time value such as `2024-03-01 07:30:00 +01:00`.
///
/// Everything from the seconds onwards (including the zone offset) is
/// dropped; the result is the naive local wall-clock minute.
pub fn parse_slot(value: &str) -> Option<PrimitiveDateTime> {
    let mut parts = value.splitn(3, ':');
    let head = parts.next()?;
    let minute = parts.next()?;
    let minute = minute.get(..2).unwrap_or(minute);
    PrimitiveDateTime::parse(&format!("{head}:{minute}"), SPACED_FORMAT).ok()
}

/// Serde adapter for minute timestamps in persisted records.
pub mod serde_minute {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S: Serializer>(dt: &PrimitiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format(*dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<PrimitiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse(&raw).map_err(serde::de::Error::custom)
    }
}
