use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Duration, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // <number><unit> with an optional fractional part; a missing unit means seconds
    static ref DURATION_TOKEN: Regex = Regex::new(r"(?i)(\d+(?:\.\d+)?)([smhdw]?)").unwrap();
}

fn unit_seconds(unit: &str) -> f64 {
    match unit.to_ascii_lowercase().as_str() {
        "m" => 60.0,
        "h" => 60.0 * 60.0,
        "d" => 24.0 * 60.0 * 60.0,
        "w" => 7.0 * 24.0 * 60.0 * 60.0,
        _ => 1.0,
    }
}

/// Convert an offset like "2w", "3d12h" or "1.5h" to whole seconds.
///
/// Every `<number><unit>` token found is summed. Text with no tokens yields 0.
pub fn parse_duration(text: &str) -> i64 {
    let total: f64 = DURATION_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let unit = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            Some(value * unit_seconds(unit))
        })
        .sum();

    total as i64
}

/// Time range `[now, now + max_offset]` used when listing existing events.
///
/// Fails when the end of the range is past what a timestamp can hold.
pub fn lookahead_window(
    now: DateTime<Utc>,
    max_offset: &str,
) -> SyncResult<(DateTime<Utc>, DateTime<Utc>)> {
    let until = Duration::try_seconds(parse_duration(max_offset))
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| SyncError::Config(format!("max_offset '{}' is too large", max_offset)))?;
    Ok((now, until))
}
