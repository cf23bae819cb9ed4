//! Human-readable duration parsing for limiter configuration.

use std::time::Duration;

/// Parse a duration like `"250ms"`, `"1.5s"`, `"2m"`, `"1h"` or `"1d"`.
///
/// Units are case-insensitive and a bare number means milliseconds.
/// Malformed input — unknown units, negative or non-numeric values — yields
/// `Duration::ZERO`, which the engine rejects at limiter creation; this
/// parser is a boundary convenience, not a validator.
pub fn parse_duration(input: &str) -> Duration {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Duration::ZERO;
    }

    let unit_start = trimmed
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(unit_start);

    let Ok(value) = number.parse::<f64>() else {
        return Duration::ZERO;
    };
    if !value.is_finite() {
        return Duration::ZERO;
    }

    let unit_ms = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "ms" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        _ => return Duration::ZERO,
    };

    Duration::from_millis((value * unit_ms) as u64)
}
