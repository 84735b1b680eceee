//! Shared configuration types for TrainHub services
//!
//! This crate provides the environment-driven configuration pieces used by
//! the API server and its supporting packages.

mod database;
mod duration;
mod error;
mod redis;

pub use database::DatabaseConfig;
pub use duration::{parse_duration, parse_env_duration};
pub use error::{ConfigError, ConfigResult};
pub use redis::RedisConfig;

use std::env;

/// Application environment mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        })
    }
}

impl Environment {
    /// Read `ENVIRONMENT` (falling back to `NODE_ENV`), defaulting to development
    pub fn from_env() -> Self {
        env::var("ENVIRONMENT")
            .or_else(|_| env::var("NODE_ENV"))
            .unwrap_or_default()
            .parse()
            .unwrap_or_default()
    }

    /// Check if this is a production environment
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Check if this is a development environment
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// Helper function to get a required environment variable
pub fn get_required_env(name: &str) -> ConfigResult<String> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

/// Helper function to get an optional environment variable with a default
pub fn get_env_or_default(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Helper function to get an optional, non-empty environment variable
pub fn get_optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Helper function to parse an environment variable into a specific type
pub fn parse_env<T>(name: &str, default: T) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .trim()
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            "production".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "prod".parse::<Environment>().unwrap(),
            Environment::Production
        );
        assert_eq!(
            "stage".parse::<Environment>().unwrap(),
            Environment::Staging
        );
        assert_eq!(
            "dev".parse::<Environment>().unwrap(),
            Environment::Development
        );
        assert_eq!(
            "anything".parse::<Environment>().unwrap(),
            Environment::Development
        );
    }

    #[test]
    fn test_environment_display() {
        assert_eq!(format!("{}", Environment::Production), "production");
        assert_eq!(format!("{}", Environment::Staging), "staging");
        assert_eq!(format!("{}", Environment::Development), "development");
    }

    #[test]
    fn test_environment_from_env_falls_back_to_node_env() {
        temp_env::with_vars(
            vec![("ENVIRONMENT", None), ("NODE_ENV", Some("production"))],
            || assert_eq!(Environment::from_env(), Environment::Production),
        );
    }

    #[test]
    fn test_parse_env() {
        temp_env::with_var("TEST_TRAINHUB_ATTEMPTS", Some(" 7 "), || {
            assert_eq!(parse_env("TEST_TRAINHUB_ATTEMPTS", 5u32).unwrap(), 7);
        });
        temp_env::with_var("TEST_TRAINHUB_ATTEMPTS", Some("many"), || {
            assert!(matches!(
                parse_env("TEST_TRAINHUB_ATTEMPTS", 5u32),
                Err(ConfigError::InvalidValue(..))
            ));
        });
    }

    #[test]
    fn test_get_optional_env_ignores_blank() {
        temp_env::with_var("TEST_TRAINHUB_DOMAIN", Some("   "), || {
            assert_eq!(get_optional_env("TEST_TRAINHUB_DOMAIN"), None);
        });
    }
}
