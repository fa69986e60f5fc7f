//! Time-related utilities.
//!
//! Timestamps are carried as Unix epoch milliseconds (UTC) internally and
//! converted to RFC 3339 strings at the wire and database boundaries.

use chrono::{TimeZone, Utc};

/// Get current Unix timestamp in UTC (milliseconds)
pub fn now_utc_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert Unix timestamp (milliseconds) to an RFC 3339 string in UTC
pub fn millis_to_rfc3339(timestamp_millis: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_millis).unwrap().to_rfc3339()
}
