//! Human-facing timestamp formatting. Stored times are UTC unix seconds;
//! output shifts them by the configured offset.

use chrono::{DateTime, FixedOffset};

/// Format `timestamp` as local wall-clock time at `offset_hours` from UTC,
/// e.g. `2023-11-14 18:13:20 -04:00`. Out-of-range inputs fall back to the
/// raw number.
pub fn format_timestamp(timestamp: i64, offset_hours: i32) -> String {
    let Some(offset) = FixedOffset::east_opt(offset_hours * 3600) else {
        return timestamp.to_string();
    };
    match DateTime::from_timestamp(timestamp, 0) {
        Some(utc) => utc
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S %:z")
            .to_string(),
        None => timestamp.to_string(),
    }
}

/// Whole minutes in `secs`, rounded down.
pub fn minutes(secs: f64) -> i64 {
    (secs / 60.0).floor() as i64
}
