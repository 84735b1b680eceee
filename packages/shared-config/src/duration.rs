//! Human-readable duration values ("15m", "2h", "7d")

use std::env;
use std::time::Duration;

use crate::{ConfigError, ConfigResult};

/// Parse duration strings like "30s", "15m", "2h", "7d" or "1w"
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let unit_start = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, unit) = s.split_at(unit_start);
    let num: u64 = num_str.parse().ok()?;

    let multiplier = match unit.trim() {
        "" | "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 24 * 3600,
        "w" => 7 * 24 * 3600,
        _ => return None,
    };

    num.checked_mul(multiplier).map(Duration::from_secs)
}

/// Read a duration from the environment, falling back to `default` when unset
pub fn parse_env_duration(name: &str, default: Duration) -> ConfigResult<Duration> {
    match env::var(name) {
        Ok(val) if !val.trim().is_empty() => parse_duration(&val)
            .ok_or_else(|| ConfigError::InvalidDuration(name.to_string(), val)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m"), Some(Duration::from_secs(900)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("7d"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration("1w"), Some(Duration::from_secs(604_800)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("45"), Some(Duration::from_secs(45)));
        assert_eq!(parse_duration(" 10m "), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("15x"), None);
        assert_eq!(parse_duration("invalid"), None);
        assert_eq!(parse_duration("-5m"), None);
        assert_eq!(parse_duration("5é"), None);
    }

    #[test]
    fn test_parse_env_duration_default_when_unset() {
        temp_env::with_var_unset("TEST_TRAINHUB_WINDOW", || {
            let value = parse_env_duration("TEST_TRAINHUB_WINDOW", Duration::from_secs(60));
            assert_eq!(value.unwrap(), Duration::from_secs(60));
        });
    }

    #[test]
    fn test_parse_env_duration_invalid() {
        temp_env::with_var("TEST_TRAINHUB_WINDOW", Some("soon"), || {
            let err = parse_env_duration("TEST_TRAINHUB_WINDOW", Duration::from_secs(60))
                .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidDuration(name, _) if name == "TEST_TRAINHUB_WINDOW"));
        });
    }
}
