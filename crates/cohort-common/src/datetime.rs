//! Warehouse timestamp parsing and formatting.
//!
//! Warehouse exports carry `start_date`/`end_date` as either a bare date
//! (`2015-03-04`) or a date-time (`2015-03-04 13:45:00`, optionally with a
//! `T` separator or fractional seconds). Everything is normalised to a
//! [`NaiveDateTime`]; a bare date becomes midnight.
//!
//! Output formats follow the import templates:
//! - date fields use `%Y-%m-%d` (REDCap `date_ymd`)
//! - exposure start/end use `%Y-%m-%d %H:%M`
//! - identifiers built from a timestamp keep whole seconds and any fraction

use chrono::{Months, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"];

/// Parse a warehouse timestamp. Returns `None` for blank or unrecognised input.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(parsed);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, format) {
            return parsed.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Format as `YYYY-MM-DD`.
pub fn format_date(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d").to_string()
}

/// Format as `YYYY-MM-DD HH:MM`.
pub fn format_minute(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M").to_string()
}

/// Format as `YYYY-MM-DD HH:MM:SS`, with a fraction only when non-zero.
pub fn format_precise(value: NaiveDateTime) -> String {
    value.format("%Y-%m-%d %H:%M:%S%.f").to_string()
}

/// Add whole calendar years.
///
/// Feb 29 maps to Feb 28 in non-leap target years.
pub fn add_years(value: NaiveDateTime, years: u32) -> Option<NaiveDateTime> {
    value.checked_add_months(Months::new(years.checked_mul(12)?))
}

/// Signed distance `to - from` in fractional days.
pub fn day_delta(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 86_400.0
}
