//! Calendar-month bucket derivation.
//!
//! Messages are grouped into human-readable month buckets, and the bucket
//! string doubles as the `?month=` filter key, so it must be derived the
//! same way everywhere.  Buckets use a fixed UTC+7 offset (the board's home
//! timezone) and English month names — no platform locale or tz database
//! lookup is involved.

use chrono::{DateTime, Duration, Utc};

/// Fixed offset applied before bucketing (Indochina Time).
pub const BUCKET_UTC_OFFSET_HOURS: i64 = 7;

/// Derive the month bucket for a timestamp, e.g. `"July 2025"`.
pub fn month_bucket(timestamp: DateTime<Utc>) -> String {
    let shifted = timestamp + Duration::hours(BUCKET_UTC_OFFSET_HOURS);
    shifted.format("%B %Y").to_string()
}
