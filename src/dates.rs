// SPDX-License-Identifier: GPL-3.0-only

//! Date and time reconciliation.
//!
//! A log's date arrives from several untrustworthy places at once: the
//! filename parenthetical, element `time` attributes, and in-body timestamp
//! spans. Every parse here is permissive — each helper tries the common
//! format first and falls back through the variants seen in real logs,
//! returning `None` rather than failing when nothing matches.
//!
//! The canonical start-date priority, applied by both parsers, is:
//! filename parenthetical first, earliest dated message second.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

/// Extracts and parses the parenthetical timestamp from a log file name,
/// e.g. `bob (2011-03-16T11.18.15-0400).AdiumHTMLLog`.
///
/// The time-of-day separator in these filenames is `.` rather than `:`
/// (colons are unusable in filenames on the source platform); it is
/// normalized before parsing. A bare date parenthetical yields midnight in
/// the configured timezone.
#[must_use]
pub fn filename_timestamp(file_name: &str, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let start = file_name.find('(')?;
    let end = file_name[start..].find(')')? + start;
    let raw = &file_name[start + 1..end];
    let normalized = normalize_time_punctuation(raw);

    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_local_timezone(tz).single();
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0)?.and_local_timezone(tz).single();
    }
    debug!(raw, "filename parenthetical did not parse as a timestamp");
    None
}

/// Permissive parse of an ISO-8601-like `time` attribute value.
///
/// Tries RFC 3339 first, then the offset-without-colon form, then the
/// punctuation-normalized form some log writers produced.
#[must_use]
pub fn parse_attr_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt);
    }
    let normalized = normalize_time_punctuation(value);
    if let Ok(dt) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt);
    }
    debug!(value, "time attribute did not parse as a timestamp");
    None
}

/// Combines a conversation date with a record's time-of-day string.
///
/// The 12-hour form with AM/PM suffix is the common case; records without
/// the suffix get a second attempt as 24-hour time. Logs that span midnight
/// keep the conversation date for every record, so message order near a day
/// boundary may be canonically wrong — a documented limitation of the log
/// format, left as-is.
#[must_use]
pub fn combine_date_time(
    date: NaiveDate,
    time_of_day: &str,
    tz: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    let time_of_day = time_of_day.trim();
    let time = NaiveTime::parse_from_str(time_of_day, "%I:%M:%S %p")
        .or_else(|_| NaiveTime::parse_from_str(time_of_day, "%H:%M:%S"))
        .ok()?;
    date.and_time(time).and_local_timezone(tz).single()
}

/// Replaces `.` with `:` inside the time-of-day portion (after the `T`),
/// leaving the date portion untouched.
fn normalize_time_punctuation(s: &str) -> String {
    match s.split_once('T') {
        Some((date, time)) => format!("{date}T{}", time.replace('.', ":")),
        None => s.to_string(),
    }
}
