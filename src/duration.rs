//! Human-friendly duration parsing with day units.
//!
//! Accepts a sequence of `<number><unit>` pairs where the unit is one of
//! `d`, `h`, `m`, or `s`, e.g. `7d`, `24h`, `1d12h`, `90s`.

use std::time::Duration;

use crate::{AppError, Result};

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;
const SECS_PER_DAY: u64 = 24 * SECS_PER_HOUR;

/// Parse a duration such as `7d` or `1d12h`.
///
/// # Errors
///
/// Returns `AppError::InvalidArgument` if the input is empty, has a missing
/// or unknown unit, or overflows.
pub fn parse_duration_with_days(raw: &str) -> Result<Duration> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(AppError::InvalidArgument("duration cannot be empty".into()));
    }

    let invalid = || AppError::InvalidArgument(format!("invalid duration '{raw}'"));

    let mut total: u64 = 0;
    let mut digits = String::new();
    for ch in input.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if digits.is_empty() {
            return Err(invalid());
        }
        let unit = match ch {
            'd' => SECS_PER_DAY,
            'h' => SECS_PER_HOUR,
            'm' => SECS_PER_MINUTE,
            's' => 1,
            _ => return Err(invalid()),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        total = value
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
    }

    // A trailing number without a unit.
    if !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}
