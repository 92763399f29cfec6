//! Timestamp utilities
//!
//! Timestamps are persisted as INTEGER microseconds since the Unix epoch so
//! that window arithmetic and ordering in SQL is exact integer math.

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Microseconds in one day, for attribution-window arithmetic
pub const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Get current UTC timestamp, truncated to the stored precision
pub fn now() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_micros(now.timestamp_micros()).unwrap_or(now)
}

/// Convert a timestamp to its stored representation
pub fn to_micros(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

/// Decode a stored timestamp
pub fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::InvalidValue(format!("timestamp out of range: {}", micros)))
}
