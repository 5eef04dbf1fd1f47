//! Duration strings for the periodic dependency refresh

use std::time::Duration;

use crate::config::ConfigError;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Parse an interval such as `90s`, `30m` or `1h`.
///
/// An empty string disables the refresh and yields `None`. A value without a
/// recognised suffix falls back to the 30 minute default.
pub fn parse_interval(value: &str) -> Result<Option<Duration>, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }

    let multiplier = match value.chars().last() {
        Some('s') => 1,
        Some('m') => 60,
        Some('h') => 60 * 60,
        _ => return Ok(Some(DEFAULT_INTERVAL)),
    };

    let amount: u64 = value[..value.len() - 1]
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidInterval(value.to_string()))?;
    if amount == 0 {
        return Err(ConfigError::InvalidInterval(value.to_string()));
    }

    let seconds = amount
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigError::InvalidInterval(value.to_string()))?;
    Ok(Some(Duration::from_secs(seconds)))
}
