//! Duration arguments

use crate::error::{CliError, CliResult};
use std::time::Duration;

/// Parse a human duration such as `500ms`, `2s`, `1m` or `1h30m`.
pub fn parse_duration(value: &str) -> CliResult<Duration> {
    let duration = humantime::parse_duration(value.trim())
        .map_err(|e| CliError::InvalidInput(format!("invalid duration {value:?}: {e}")))?;
    if duration.is_zero() {
        return Err(CliError::InvalidInput(format!(
            "duration {value:?} must be greater than zero"
        )));
    }
    Ok(duration)
}

/// clap value parser for `parse_duration`
pub fn duration_arg(value: &str) -> Result<Duration, String> {
    parse_duration(value).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("1m").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_rejects_garbage_and_zero() {
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0s").is_err());
    }
}
