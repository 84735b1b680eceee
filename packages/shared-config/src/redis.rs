//! Redis configuration types

use std::env;

/// Redis configuration
///
/// Redis is optional: without `REDIS_URL` the API keeps login attempt state
/// in process memory.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,

    /// Optional password for Redis authentication
    pub password: Option<String>,
}

impl RedisConfig {
    /// Load Redis configuration from environment variables, `None` when unset
    pub fn from_env() -> Option<Self> {
        let url = env::var("REDIS_URL").ok().filter(|s| !s.trim().is_empty())?;
        Some(Self {
            url,
            password: env::var("REDIS_PASSWORD").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            password: None,
        }
    }

    /// Build the full connection URL including password if set
    pub fn connection_url(&self) -> String {
        if let Some(ref password) = self.password {
            if let Some((scheme, rest)) = self.url.split_once("://") {
                if !rest.contains('@') {
                    return format!("{}://:{}@{}", scheme, password, rest);
                }
            }
        }
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_url() {
        let config = RedisConfig::with_url("redis://custom:6380");
        assert_eq!(config.url, "redis://custom:6380");
        assert!(config.password.is_none());
    }

    #[test]
    fn test_connection_url_no_password() {
        let config = RedisConfig::with_url("redis://localhost:6379");
        assert_eq!(config.connection_url(), "redis://localhost:6379");
    }

    #[test]
    fn test_connection_url_with_password() {
        let config = RedisConfig {
            url: "redis://localhost:6379".to_string(),
            password: Some("s3cret".to_string()),
        };
        assert_eq!(config.connection_url(), "redis://:s3cret@localhost:6379");
    }

    #[test]
    fn test_from_env_absent() {
        temp_env::with_var_unset("REDIS_URL", || {
            assert!(RedisConfig::from_env().is_none());
        });
    }
}
