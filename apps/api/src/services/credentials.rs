//! Credential store and password hashing
//!
//! Authentication only needs a narrow slice of the user table, exposed as the
//! [`CredentialStore`] trait so login and registration can run against a
//! stub in tests.

use std::sync::Arc;

use argon2::{
    password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use async_trait::async_trait;

use crate::error::{ApiError, ApiResult};
use crate::models::user::{NewAccount, User};
use crate::repositories::UserRepository;

/// Argon2id hashing with a precomputed dummy hash
///
/// Verifying against the dummy hash when a user does not exist keeps the
/// response time of unknown-user logins in line with wrong-password ones.
#[derive(Clone)]
pub struct Passwords {
    argon2: Argon2<'static>,
    dummy_hash: Arc<str>,
}

impl std::fmt::Debug for Passwords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passwords").finish_non_exhaustive()
    }
}

impl Passwords {
    /// Argon2id with the crate's default cost parameters
    pub fn new() -> Result<Self, password_hash::Error> {
        Self::with_argon2(Argon2::default())
    }

    /// Argon2id with explicit cost parameters
    pub fn with_params(params: Params) -> Result<Self, password_hash::Error> {
        Self::with_argon2(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn with_argon2(argon2: Argon2<'static>) -> Result<Self, password_hash::Error> {
        let dummy_hash = hash_with(&argon2, "dummy_password_for_timing_equalization")?;
        Ok(Self {
            argon2,
            dummy_hash: dummy_hash.into(),
        })
    }

    /// Hash a password on the blocking pool
    pub async fn hash(&self, password: &str) -> ApiResult<String> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();

        tokio::task::spawn_blocking(move || hash_with(&argon2, &password))
            .await
            .map_err(|e| ApiError::Internal(format!("password hashing task failed: {}", e)))?
            .map_err(|e| ApiError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Compare `password` with `hash`, or with the dummy hash when `hash` is `None`
    ///
    /// Always false for the dummy comparison.
    pub async fn verify(&self, password: &str, hash: Option<&str>) -> ApiResult<bool> {
        let argon2 = self.argon2.clone();
        let password = password.to_owned();
        let (hash, is_real) = match hash {
            Some(hash) => (hash.to_owned(), true),
            None => (self.dummy_hash.to_string(), false),
        };

        let matched = tokio::task::spawn_blocking(move || -> Result<bool, password_hash::Error> {
            let parsed = PasswordHash::new(&hash)?;
            Ok(argon2.verify_password(password.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| ApiError::Internal(format!("password verification task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("Invalid password hash format: {}", e)))?;

        Ok(is_real && matched)
    }
}

fn hash_with(argon2: &Argon2<'_>, password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(argon2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// User lookups and password checks needed by login and registration
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-insensitive match on either username or email
    async fn find_user_by_username_or_email(&self, identifier: &str) -> ApiResult<Option<User>>;

    /// `hash` is `None` for unknown users; the comparison still runs
    async fn compare_password_hash(&self, password: &str, hash: Option<&str>) -> ApiResult<bool>;

    async fn update_last_login(&self, user_id: i64) -> ApiResult<()>;

    async fn hash_password(&self, password: &str) -> ApiResult<String>;

    async fn identifier_taken(&self, username: &str, email: &str) -> ApiResult<bool>;

    async fn create_account(&self, account: &NewAccount) -> ApiResult<User>;
}

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct PgCredentialStore {
    users: UserRepository,
    passwords: Passwords,
}

impl PgCredentialStore {
    pub fn new(users: UserRepository, passwords: Passwords) -> Self {
        Self { users, passwords }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_user_by_username_or_email(&self, identifier: &str) -> ApiResult<Option<User>> {
        Ok(self.users.find_by_username_or_email(identifier).await?)
    }

    async fn compare_password_hash(&self, password: &str, hash: Option<&str>) -> ApiResult<bool> {
        self.passwords.verify(password, hash).await
    }

    async fn update_last_login(&self, user_id: i64) -> ApiResult<()> {
        Ok(self.users.update_last_login(user_id).await?)
    }

    async fn hash_password(&self, password: &str) -> ApiResult<String> {
        self.passwords.hash(password).await
    }

    async fn identifier_taken(&self, username: &str, email: &str) -> ApiResult<bool> {
        Ok(self.users.username_or_email_exists(username, email).await?)
    }

    async fn create_account(&self, account: &NewAccount) -> ApiResult<User> {
        self.users.create_account(account).await.map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                ApiError::conflict("user", account.username.clone())
            }
            _ => ApiError::Database(e),
        })
    }
}
