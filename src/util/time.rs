//! Timestamp parsing for provider quota payloads.

use chrono::{DateTime, FixedOffset, NaiveDateTime};

/// Parse a provider `resetTime` into epoch seconds.
///
/// Accepts ISO-8601 timestamps with either an explicit offset or a trailing
/// `Z`; the `Z` is normalized to `+00:00` before parsing. A timestamp without
/// any offset is taken as UTC. Returns `None` for anything else.
#[must_use]
pub fn parse_reset_time(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(base) => format!("{base}+00:00"),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(&normalized) {
        return Some(epoch_seconds(dt.timestamp(), dt.timestamp_subsec_nanos()));
    }

    // Offset-less forms; fractional seconds optional.
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(&normalized, fmt).ok())
        .map(|naive| {
            let utc = naive.and_utc();
            epoch_seconds(utc.timestamp(), utc.timestamp_subsec_nanos())
        })
}

#[allow(clippy::cast_precision_loss)]
fn epoch_seconds(secs: i64, nanos: u32) -> f64 {
    secs as f64 + f64::from(nanos) / 1_000_000_000.0
}
