//! Timestamp utilities

use chrono::{DateTime, Duration, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp the way every table stores it (RFC 3339, UTC)
pub fn to_db_string(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp back to UTC
pub fn parse_db_string(value: &str) -> crate::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| crate::Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

/// True when `updated_at` is younger than `window` relative to `now`.
///
/// A missing timestamp (never ingested) is never fresh.
pub fn is_fresh(updated_at: Option<DateTime<Utc>>, window: Duration, now: DateTime<Utc>) -> bool {
    match updated_at {
        Some(ts) => now.signed_duration_since(ts) < window,
        None => false,
    }
}
