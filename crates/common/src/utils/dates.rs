//! Date and time helpers

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, Utc};
use std::fmt::Write;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

/// Timestamp safe to embed in file names, e.g. `2024-03-01_14-05-09-123`
pub fn file_timestamp() -> String {
    file_timestamp_at(Local::now())
}

pub fn file_timestamp_at<Tz: chrono::TimeZone>(at: DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%d_%H-%M-%S-%3f").to_string()
}

/// RFC 3339 timestamp in UTC with millisecond precision
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn epoch_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
}

pub fn to_epoch_millis(at: &DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

/// Format a date with a strftime pattern. Unknown specifiers, and time
/// specifiers a bare date cannot fill, are rejected.
pub fn format_date(date: NaiveDate, pattern: &str) -> Result<String> {
    let invalid = || Error::InvalidConfig {
        key: "date pattern".to_string(),
        value: pattern.to_string(),
    };

    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(invalid());
    }

    let mut out = String::new();
    write!(out, "{}", date.format_with_items(items.iter())).map_err(|_| invalid())?;
    Ok(out)
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Shift a date by `days` (negative moves back). `None` when the result is
/// out of range.
pub fn add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    date.checked_add_signed(ChronoDuration::try_days(days)?)
}

/// Whether `modified` lies further than `age` in the past relative to `now`
pub fn is_older_than(modified: SystemTime, age: Duration, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|elapsed| elapsed > age)
        .unwrap_or(false)
}
