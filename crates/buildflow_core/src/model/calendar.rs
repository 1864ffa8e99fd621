//! Date helpers shared by entity parsing and reminder rules.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Parses an ISO instant as stored by the entity forms.
///
/// Accepts RFC 3339 timestamps and date-only `YYYY-MM-DD` values. Date-only
/// values resolve to midnight UTC.
pub fn parse_iso_instant(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(instant.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Canonical text form used for persisted instants.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// UTC calendar day (`YYYY-MM-DD`) used as the same-day dedup stamp.
pub fn day_stamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%d").to_string()
}

/// Whole days from `from` to `to`, rounded up.
///
/// Negative when `to` is before `from`. Partial days count as a full day in
/// the direction of travel, matching `Math.ceil` on a millisecond delta.
pub fn ceil_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    let millis = to.timestamp_millis() - from.timestamp_millis();
    let whole = millis.div_euclid(MILLIS_PER_DAY);
    if millis.rem_euclid(MILLIS_PER_DAY) == 0 {
        whole
    } else {
        whole + 1
    }
}
