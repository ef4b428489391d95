//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// A UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 string with microseconds,
/// e.g. `2024-05-01T12:00:00.000000+00:00`.
///
/// # Examples
///
/// ```
/// use deliveryflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Parses a timestamp produced by [`iso_timestamp`] or any RFC 3339 string.
///
/// # Errors
///
/// Returns the parse error if the input is not RFC 3339.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_rfc3339(input.trim()).map(|dt| dt.with_timezone(&Utc))
}

/// Milliseconds between two ISO 8601 timestamps, or `None` if either is
/// malformed.
#[must_use]
pub fn elapsed_between(start: &str, end: &str) -> Option<i64> {
    let start = parse_timestamp(start).ok()?;
    let end = parse_timestamp(end).ok()?;
    Some((end - start).num_milliseconds())
}
