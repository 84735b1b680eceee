//! Authentication service for TrainHub
//!
//! This module handles:
//! - Login against the credential store, guarded by the login attempt tracker
//! - Registration with Argon2id password hashing
//! - Identity token issuance

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::middleware::rate_limit::blocked_error;
use crate::models::progress::MAX_WEIGHT_KG;
use crate::models::user::{NewAccount, ProfileUpdate, User};
use crate::services::credentials::CredentialStore;
use crate::services::login_attempts::{AttemptSnapshot, LoginAttemptTracker};
use crate::services::token::TokenCodec;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_HEIGHT_CM: f64 = 300.0;

/// Login request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginInput {
    /// Username or email
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// Registration request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationInput {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub height: Option<f64>,
    pub initial_weight: Option<f64>,
    pub fitness_level: Option<String>,
    pub fitness_goals: Option<String>,
    pub health_conditions: Option<String>,
}

/// A successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: User,
    pub token: String,
    pub attempts: AttemptSnapshot,
}

/// A successful registration
#[derive(Debug, Clone)]
pub struct Registration {
    pub user: User,
    pub token: String,
}

/// Authentication service providing login, registration and token issuance
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    tracker: LoginAttemptTracker,
    token_lifetime: Duration,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        tracker: LoginAttemptTracker,
        token_lifetime: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            tracker,
            token_lifetime,
        }
    }

    pub fn tracker(&self) -> &LoginAttemptTracker {
        &self.tracker
    }

    pub fn token_lifetime(&self) -> Duration {
        self.token_lifetime
    }

    /// Authenticate a user by username or email
    ///
    /// An attempt slot is reserved on the IP and the submitted username
    /// before the store is consulted, so concurrent guesses cannot get past
    /// the threshold. Unknown users and wrong passwords both count as
    /// failures and yield the same error; disabled accounts do not count.
    ///
    /// # Errors
    /// - `ApiError::RateLimited` if the IP or username is blocked
    /// - `ApiError::MissingField` if username or password is absent
    /// - `ApiError::InvalidCredentials` if the credentials do not match
    /// - `ApiError::AccountDisabled` if the account was deactivated
    pub async fn login(&self, client_ip: &str, input: &LoginInput) -> ApiResult<LoginOutcome> {
        let username = input
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let permit = match self.tracker.begin_attempt(client_ip, username).await {
            Ok(permit) => permit,
            Err(status) => {
                tracing::warn!(
                    ip = %client_ip,
                    reason = status.reason.map(|r| r.as_str()),
                    retry_after = status.retry_after_secs,
                    "Login refused for blocked caller"
                );
                return Err(blocked_error(&status));
            }
        };

        let user = match self
            .verify_credentials(client_ip, username, input.password.as_deref())
            .await
        {
            Ok(user) => user,
            Err(ApiError::InvalidCredentials) => {
                self.tracker.fail(permit).await;
                return Err(ApiError::InvalidCredentials);
            }
            Err(e) => {
                self.tracker.abandon(permit).await;
                return Err(e);
            }
        };

        self.tracker.succeed(permit).await;

        if let Err(e) = self.store.update_last_login(user.id).await {
            tracing::warn!(user_id = user.id, error = %e, "Failed to update last login");
        }

        let token = self.issue_token(&user)?;
        let attempts = self.tracker.attempts(client_ip, username).await;

        tracing::info!(user_id = user.id, username = %user.username, "User logged in successfully");

        Ok(LoginOutcome {
            user,
            token,
            attempts,
        })
    }

    /// Resolve the account and compare the password
    ///
    /// Only `ApiError::InvalidCredentials` counts against the caller.
    async fn verify_credentials(
        &self,
        client_ip: &str,
        username: Option<&str>,
        password: Option<&str>,
    ) -> ApiResult<User> {
        let username = username.ok_or(ApiError::MissingField("username"))?;
        let password = password
            .filter(|p| !p.is_empty())
            .ok_or(ApiError::MissingField("password"))?;

        let Some(user) = self.store.find_user_by_username_or_email(username).await? else {
            let _ = self.store.compare_password_hash(password, None).await;
            tracing::warn!(ip = %client_ip, username = %username, "Login failed: user not found");
            return Err(ApiError::InvalidCredentials);
        };

        if !user.is_active {
            tracing::warn!(user_id = user.id, "Login refused: account disabled");
            return Err(ApiError::AccountDisabled);
        }

        let valid = self
            .store
            .compare_password_hash(password, Some(&user.password_hash))
            .await?;
        if !valid {
            tracing::warn!(ip = %client_ip, user_id = user.id, "Login failed: invalid password");
            return Err(ApiError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Register a new account and issue its first token
    ///
    /// # Errors
    /// - `ApiError::RateLimited` if the IP or username is blocked
    /// - `ApiError::MissingField` / `ApiError::ValidationError` on bad input
    /// - `ApiError::Conflict` if the username or email is taken
    pub async fn register(
        &self,
        client_ip: &str,
        input: &RegistrationInput,
    ) -> ApiResult<Registration> {
        let status = self
            .tracker
            .check_blocked(client_ip, input.username.as_deref())
            .await;
        if status.blocked {
            tracing::warn!(ip = %client_ip, "Registration refused for blocked caller");
            return Err(blocked_error(&status));
        }

        let (username, email, password) = validate_registration(input)?;

        if self.store.identifier_taken(username, email).await? {
            return Err(ApiError::conflict("user", username));
        }

        let password_hash = self.store.hash_password(password).await?;

        let account = NewAccount {
            username: username.to_string(),
            email: email.to_lowercase(),
            password_hash,
            first_name: non_blank(&input.first_name),
            last_name: non_blank(&input.last_name),
            phone: non_blank(&input.phone),
            birth_date: input.birth_date,
            height_cm: input.height,
            initial_weight: input.initial_weight,
            fitness_level: non_blank(&input.fitness_level),
            fitness_goals: non_blank(&input.fitness_goals),
            health_conditions: non_blank(&input.health_conditions),
        };

        let user = self.store.create_account(&account).await?;
        let token = self.issue_token(&user)?;

        tracing::info!(user_id = user.id, username = %user.username, "User registered successfully");

        Ok(Registration { user, token })
    }

    /// Current attempt counts for the rate limit headers
    pub async fn attempts(&self, client_ip: &str, username: Option<&str>) -> AttemptSnapshot {
        self.tracker.attempts(client_ip, username).await
    }

    fn issue_token(&self, user: &User) -> ApiResult<String> {
        self.codec
            .issue(&user.identity(), self.token_lifetime)
            .map_err(|e| ApiError::Internal(format!("token issuance failed: {}", e)))
    }
}

fn validate_registration(input: &RegistrationInput) -> ApiResult<(&str, &str, &str)> {
    let username = input
        .username
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ApiError::MissingField("username"))?;
    let email = input
        .email
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .ok_or(ApiError::MissingField("email"))?;
    let password = input
        .password
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or(ApiError::MissingField("password"))?;

    if !is_valid_username(username) {
        return Err(ApiError::ValidationError(
            "username must be 3-30 characters of letters, digits, '.', '_' or '-'".to_string(),
        ));
    }

    if !is_valid_email(email) {
        return Err(ApiError::ValidationError(
            "invalid email format".to_string(),
        ));
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::ValidationError(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    check_phone(input.phone.as_deref())?;
    check_body_metrics(input.height, input.initial_weight)?;

    Ok((username, email, password))
}

/// Validate a `PUT /profile` body with the registration rules
///
/// # Errors
/// `ApiError::ValidationError` for an empty update or any out-of-range field
pub fn validate_profile_update(update: &ProfileUpdate) -> ApiResult<()> {
    if update.is_empty() {
        return Err(ApiError::ValidationError("no fields to update".to_string()));
    }

    if let Some(email) = update.email.as_deref() {
        if !is_valid_email(email) {
            return Err(ApiError::ValidationError(
                "invalid email format".to_string(),
            ));
        }
    }

    check_phone(update.phone.as_deref())?;
    check_body_metrics(update.height, update.current_weight)
}

fn check_phone(phone: Option<&str>) -> ApiResult<()> {
    match phone.map(str::trim).filter(|p| !p.is_empty()) {
        Some(phone) if !is_valid_phone(phone) => Err(ApiError::ValidationError(
            "phone must be 9-15 digits with an optional leading '+'".to_string(),
        )),
        _ => Ok(()),
    }
}

fn check_body_metrics(height: Option<f64>, weight: Option<f64>) -> ApiResult<()> {
    if let Some(height) = height {
        if !(height > 0.0 && height <= MAX_HEIGHT_CM) {
            return Err(ApiError::ValidationError(
                "height must be between 0 and 300 cm".to_string(),
            ));
        }
    }

    if let Some(weight) = weight {
        if !(weight > 0.0 && weight <= MAX_WEIGHT_KG) {
            return Err(ApiError::ValidationError(
                "weight must be between 0 and 500 kg".to_string(),
            ));
        }
    }

    Ok(())
}

fn is_valid_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (9..=15).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (3..=30).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Simple email validation
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.is_empty() || email.len() > 254 {
        return false;
    }

    // Must have exactly one @ symbol
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return false;
    }

    let (local, domain) = (parts[0], parts[1]);

    if local.is_empty() || local.len() > 64 {
        return false;
    }

    if domain.is_empty() || !domain.contains('.') {
        return false;
    }

    domain.split('.').all(|part| !part.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rstest::rstest;

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("test.user@domain.co.uk"));
        assert!(is_valid_email("user123@test.org"));
        assert!(!is_valid_email(""));
        assert!(!is_valid_email("invalid"));
        assert!(!is_valid_email("missing@domain"));
        assert!(!is_valid_email("@domain.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@@domain.com"));
    }

    #[rstest]
    #[case("alice", true)]
    #[case("a.b-c_d", true)]
    #[case("ab", false)]
    #[case("has space", false)]
    #[case("émile", false)]
    fn test_is_valid_username(#[case] username: &str, #[case] expected: bool) {
        assert_eq!(is_valid_username(username), expected);
    }

    fn registration() -> RegistrationInput {
        RegistrationInput {
            username: Some("alice".to_string()),
            email: Some("alice@example.com".to_string()),
            password: Some("long-enough".to_string()),
            ..RegistrationInput::default()
        }
    }

    #[test]
    fn test_validate_registration_ok() {
        let input = registration();
        let (username, email, _) = validate_registration(&input).unwrap();
        assert_eq!(username, "alice");
        assert_eq!(email, "alice@example.com");
    }

    #[test]
    fn test_validate_registration_errors() {
        let mut input = registration();
        input.email = None;
        assert_matches!(
            validate_registration(&input),
            Err(ApiError::MissingField("email"))
        );

        let mut input = registration();
        input.password = Some("short".to_string());
        assert_matches!(
            validate_registration(&input),
            Err(ApiError::ValidationError(_))
        );

        let mut input = registration();
        input.initial_weight = Some(501.0);
        assert_matches!(
            validate_registration(&input),
            Err(ApiError::ValidationError(_))
        );
    }

    #[rstest]
    #[case("+5511999998888", true)]
    #[case("119999988", true)]
    #[case("12345678", false)]
    #[case("+1234567890123456", false)]
    #[case("(11) 99999-8888", false)]
    #[case("++5511999998888", false)]
    fn test_is_valid_phone(#[case] phone: &str, #[case] expected: bool) {
        assert_eq!(is_valid_phone(phone), expected);
    }

    #[test]
    fn test_registration_checks_phone() {
        let mut input = registration();
        input.phone = Some("call me".to_string());
        assert_matches!(
            validate_registration(&input),
            Err(ApiError::ValidationError(_))
        );

        input.phone = Some("   ".to_string());
        assert!(validate_registration(&input).is_ok());
    }

    #[test]
    fn test_validate_profile_update() {
        assert_matches!(
            validate_profile_update(&ProfileUpdate::default()),
            Err(ApiError::ValidationError(_))
        );

        let update = ProfileUpdate {
            phone: Some("+5511999998888".to_string()),
            height: Some(181.0),
            current_weight: Some(79.5),
            ..ProfileUpdate::default()
        };
        assert!(validate_profile_update(&update).is_ok());

        for bad in [
            ProfileUpdate {
                email: Some("not-an-email".to_string()),
                ..ProfileUpdate::default()
            },
            ProfileUpdate {
                phone: Some("12".to_string()),
                ..ProfileUpdate::default()
            },
            ProfileUpdate {
                height: Some(0.0),
                ..ProfileUpdate::default()
            },
            ProfileUpdate {
                current_weight: Some(500.5),
                ..ProfileUpdate::default()
            },
        ] {
            assert_matches!(
                validate_profile_update(&bad),
                Err(ApiError::ValidationError(_))
            );
        }
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(&Some("  ".to_string())), None);
        assert_eq!(non_blank(&Some(" Ana ".to_string())), Some("Ana".to_string()));
        assert_eq!(non_blank(&None), None);
    }
}
