// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-friendly duration strings.
//!
//! Interval schedules and timeouts are declared as `"50ms"`, `"30s"`,
//! `"5m"`, `"6h"`, `"2d"`. A bare number means seconds.

use std::time::Duration;
use thiserror::Error;

/// Errors from [`parse_duration`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid number in duration: {0}")]
    InvalidNumber(String),
    #[error("unknown duration suffix: {0}")]
    UnknownSuffix(String),
}

/// Parse a human duration string into a [`Duration`].
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let (num_str, suffix) = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .unwrap_or((s, ""));

    let num: u64 = num_str
        .parse()
        .map_err(|_| DurationError::InvalidNumber(s.to_string()))?;

    let millis = match suffix.trim() {
        "ms" | "millis" | "millisecond" | "milliseconds" => num,
        "" | "s" | "sec" | "secs" | "second" | "seconds" => num * 1_000,
        "m" | "min" | "mins" | "minute" | "minutes" => num * 60_000,
        "h" | "hr" | "hrs" | "hour" | "hours" => num * 3_600_000,
        "d" | "day" | "days" => num * 86_400_000,
        other => return Err(DurationError::UnknownSuffix(other.to_string())),
    };

    Ok(Duration::from_millis(millis))
}

/// Render a duration in the shortest exact suffix form.
///
/// Used by the config diff to print changes like `interval: 1h → 2h`.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".to_string();
    }
    if ms % 86_400_000 == 0 {
        return format!("{}d", ms / 86_400_000);
    }
    if ms % 3_600_000 == 0 {
        return format!("{}h", ms / 3_600_000);
    }
    if ms % 60_000 == 0 {
        return format!("{}m", ms / 60_000);
    }
    if ms % 1_000 == 0 {
        return format!("{}s", ms / 1_000);
    }
    format!("{}ms", ms)
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;
