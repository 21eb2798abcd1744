//! Timestamp parsing and formatting
//!
//! Curated observations and feature rows are keyed by RFC 3339 UTC
//! timestamps stored as TEXT. The stored format sorts lexicographically in
//! chronological order, so range queries can compare the TEXT column
//! directly.

use chrono::{DateTime, SecondsFormat, Utc};

/// Parse an RFC 3339 timestamp into UTC.
///
/// Returns `None` when the text does not parse; callers decide whether that
/// drops the row or aborts the run.
pub fn parse_ts(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a UTC timestamp the way it is stored (RFC 3339, whole seconds, Z).
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
