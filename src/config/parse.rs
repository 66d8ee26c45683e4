use std::time::Duration;

use crate::error::ConfigError;

/// Parses scenario duration strings: `"250ms"`, `"30s"`, `"20m"`, `"1h"`.
/// A bare number is taken as seconds.
///
/// # Errors
///
/// Returns the matching `ConfigError` duration variant for empty input,
/// malformed numbers, unknown units, or overflow.
pub fn parse_duration(text: &str) -> Result<Duration, ConfigError> {
    let value = text.trim();
    if value.is_empty() {
        return Err(ConfigError::DurationEmpty);
    }

    let mut digits_len = 0usize;
    for ch in value.chars() {
        if ch.is_ascii_digit() {
            digits_len = digits_len.saturating_add(1);
        } else {
            break;
        }
    }
    if digits_len == 0 {
        return Err(ConfigError::InvalidDurationFormat {
            value: value.to_owned(),
        });
    }

    let (num_part, unit_part) = value.split_at(digits_len);
    let number: u64 = num_part
        .parse()
        .map_err(|err| ConfigError::InvalidDurationNumber {
            value: value.to_owned(),
            source: err,
        })?;

    match unit_part.trim() {
        "ms" => Ok(Duration::from_millis(number)),
        "" | "s" => Ok(Duration::from_secs(number)),
        "m" => number
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or(ConfigError::DurationOverflow),
        "h" => number
            .checked_mul(3_600)
            .map(Duration::from_secs)
            .ok_or(ConfigError::DurationOverflow),
        unit => Err(ConfigError::InvalidDurationUnit {
            unit: unit.to_owned(),
        }),
    }
}
