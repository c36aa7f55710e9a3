//! Command-line timestamp parsing.

use anyhow::{Context, bail};
use chrono::{DateTime, NaiveDate};

/// Epoch milliseconds from `raw`.
///
/// Accepts an integer millisecond count, an RFC 3339 timestamp
/// (`2024-01-01T00:00:00Z`) or a bare UTC date (`2024-01-01`).
pub fn parse_timestamp_millis(raw: &str) -> anyhow::Result<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("timestamp is empty");
    }
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("'{raw}' is neither epoch millis, RFC 3339 nor YYYY-MM-DD"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .context("midnight is always representable")?;
    Ok(midnight.and_utc().timestamp_millis())
}
