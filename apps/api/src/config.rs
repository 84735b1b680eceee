//! API server configuration

use std::net::IpAddr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use trainhub_shared_config::{
    get_env_or_default, get_optional_env, parse_env, parse_env_duration, DatabaseConfig,
    Environment, RedisConfig,
};

use crate::services::attempt_store::{AttemptPolicy, MAX_POLICY_DURATION};

/// Minimum required length for JWT_SECRET to be considered secure
const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Signing secret used outside production when JWT_SECRET is unset
const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Payment processor settings
#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    /// Checkout is disabled when unset
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    /// Override for the processor API base URL
    pub api_base: Option<String>,
    pub currency: String,
}

/// API server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,

    /// Server port (default: 8080)
    pub port: u16,

    pub database: DatabaseConfig,

    /// Shared login attempt store; in-process memory when unset
    pub redis: Option<RedisConfig>,

    /// Identity token signing secret
    pub jwt_secret: String,

    /// Identity token lifetime (default: 2h)
    pub token_lifetime: Duration,

    pub cookie_domain: Option<String>,

    /// Session cookie Max-Age (default: 7200s)
    pub cookie_max_age: Duration,

    /// `Secure; SameSite=None` on the session cookie (default: true)
    pub cookie_secure: bool,

    pub attempt_policy: AttemptPolicy,

    /// How often expired attempt entries are evicted (default: 10m)
    pub attempt_sweep_interval: Duration,

    /// Wallet address identifying the platform owner
    pub admin_wallet: Option<String>,

    /// Proxies whose `X-Forwarded-For` / `X-Real-IP` are believed
    pub trusted_proxies: Vec<IpAddr>,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,

    pub payments: PaymentsConfig,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production mode, this function requires:
    /// - `JWT_SECRET`: Must be set and at least 32 characters long
    /// - `DATABASE_URL`: Must be explicitly set (no insecure defaults)
    ///
    /// In development/staging mode, sensible defaults are used for convenience.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_env();
        let is_production = environment.is_production();

        let jwt_secret = Self::load_jwt_secret(is_production)?;

        if is_production {
            Self::validate_database_url()?;
        }

        let defaults = AttemptPolicy::default();
        let attempt_policy = AttemptPolicy {
            max_attempts: parse_env("LOGIN_MAX_ATTEMPTS", defaults.max_attempts)?,
            window: parse_env_duration("LOGIN_WINDOW", defaults.window)?,
            block_duration: parse_env_duration("LOGIN_BLOCK_DURATION", defaults.block_duration)?,
        };
        Self::validate_attempt_policy(&attempt_policy)?;

        let token_lifetime = parse_env_duration("JWT_EXPIRES", Duration::from_secs(2 * 3600))?;
        if token_lifetime.is_zero() {
            bail!("JWT_EXPIRES must be a positive duration");
        }

        Ok(Self {
            environment,

            port: parse_env("PORT", 8080u16).context("Invalid PORT value")?,

            database: DatabaseConfig::from_env()
                .map_err(|e| anyhow::anyhow!("Failed to load database config: {}", e))?,

            redis: RedisConfig::from_env(),

            jwt_secret,

            token_lifetime,

            cookie_domain: get_optional_env("COOKIE_DOMAIN"),

            cookie_max_age: parse_env_duration("COOKIE_MAX_AGE", Duration::from_secs(7200))?,

            cookie_secure: parse_env("COOKIE_SECURE", true)?,

            attempt_policy,

            attempt_sweep_interval: parse_env_duration(
                "LOGIN_SWEEP_INTERVAL",
                Duration::from_secs(10 * 60),
            )?,

            admin_wallet: get_optional_env("ADMIN_WALLET"),

            trusted_proxies: match get_optional_env("TRUSTED_PROXIES") {
                Some(raw) => parse_trusted_proxies(&raw)?,
                None => Vec::new(),
            },

            cors_allowed_origins: get_optional_env("CORS_ORIGINS").map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            }),

            payments: PaymentsConfig {
                secret_key: get_optional_env("STRIPE_SECRET_KEY"),
                webhook_secret: get_optional_env("STRIPE_WEBHOOK_SECRET"),
                success_url: get_env_or_default(
                    "STRIPE_SUCCESS_URL",
                    "http://localhost:3000/purchase/success?session_id={CHECKOUT_SESSION_ID}",
                ),
                cancel_url: get_env_or_default(
                    "STRIPE_CANCEL_URL",
                    "http://localhost:3000/purchase/cancel",
                ),
                api_base: get_optional_env("STRIPE_API_BASE"),
                currency: get_env_or_default("PAYMENT_CURRENCY", "eur").to_lowercase(),
            },
        })
    }

    /// Load and validate JWT_SECRET
    ///
    /// In production:
    /// - JWT_SECRET must be explicitly set
    /// - Must be at least MIN_JWT_SECRET_LENGTH characters
    ///
    /// In development: uses a default value with a warning
    fn load_jwt_secret(is_production: bool) -> Result<String> {
        match get_optional_env("JWT_SECRET") {
            Some(secret) => {
                if is_production && secret.len() < MIN_JWT_SECRET_LENGTH {
                    bail!(
                        "JWT_SECRET must be at least {} characters in production (got {})",
                        MIN_JWT_SECRET_LENGTH,
                        secret.len()
                    );
                }
                Ok(secret)
            }
            None if is_production => {
                bail!(
                    "JWT_SECRET environment variable is required in production. \
                     Please set a secure secret of at least {} characters.",
                    MIN_JWT_SECRET_LENGTH
                );
            }
            None => {
                tracing::warn!(
                    "JWT_SECRET not set, using insecure default. \
                     This is only acceptable in development mode."
                );
                Ok(DEV_JWT_SECRET.to_string())
            }
        }
    }

    fn validate_attempt_policy(policy: &AttemptPolicy) -> Result<()> {
        if policy.max_attempts == 0 {
            bail!("LOGIN_MAX_ATTEMPTS must be at least 1");
        }
        if policy.window.is_zero() || policy.window > MAX_POLICY_DURATION {
            bail!("LOGIN_WINDOW must be between 1s and 365d");
        }
        if policy.block_duration.is_zero() || policy.block_duration > MAX_POLICY_DURATION {
            bail!("LOGIN_BLOCK_DURATION must be between 1s and 365d");
        }
        Ok(())
    }

    /// Validate that DATABASE_URL is explicitly set in production
    fn validate_database_url() -> Result<()> {
        match get_optional_env("DATABASE_URL") {
            Some(_) => Ok(()),
            None => {
                bail!(
                    "DATABASE_URL environment variable is required in production. \
                     Please set your PostgreSQL connection string."
                );
            }
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

/// Comma-separated IP addresses
fn parse_trusted_proxies(raw: &str) -> Result<Vec<IpAddr>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<IpAddr>()
                .with_context(|| format!("TRUSTED_PROXIES entry '{}' is not an IP address", entry))
        })
        .collect()
}
