//! User and identity models
//!
//! This module contains:
//! - User accounts and profiles from the database
//! - Identity token claims and the identity they are issued for
//! - Registration input and profile updates

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User account from the users table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,

    pub username: String,

    pub email: String,

    /// Argon2 hashed password
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    /// First and last name, or the username when neither was given
    pub display_name: String,

    pub phone: Option<String>,

    pub birth_date: Option<NaiveDate>,

    /// Wallet address used to identify the platform owner
    pub wallet_address: Option<String>,

    pub is_admin: bool,

    pub is_super_admin: bool,

    /// Disabled accounts cannot log in
    pub is_active: bool,

    pub is_verified: bool,

    /// Processor-side customer id, created on first checkout
    #[serde(skip_serializing)]
    pub payment_customer_id: Option<String>,

    pub last_login: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The identity an issued token should carry for this user
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin,
            is_super_admin: self.is_super_admin,
            verified: self.is_verified,
            wallet_address: self.wallet_address.clone(),
        }
    }
}

/// Physical profile from the user_profiles table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub height_cm: Option<f64>,
    pub current_weight: Option<f64>,
    pub fitness_level: Option<String>,
    pub health_conditions: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Who a token is issued for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub username: String,
    pub is_admin: bool,
    pub is_super_admin: bool,
    pub verified: bool,
    pub wallet_address: Option<String>,
}

/// Identity token payload
///
/// Role flags are only serialized when set, so a plain user's token carries
/// `{id, username, verified, iat, exp}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject (user id)
    pub id: i64,

    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_super_admin: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Build claims for `identity`, valid for `lifetime_secs` from `issued_at`
    pub fn new(identity: &Identity, issued_at: i64, lifetime_secs: i64) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            is_admin: identity.is_admin.then_some(true),
            is_super_admin: identity.is_super_admin.then_some(true),
            verified: Some(identity.verified),
            wallet_address: identity.wallet_address.clone(),
            iat: issued_at,
            exp: issued_at.saturating_add(lifetime_secs),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }

    pub fn is_super_admin(&self) -> bool {
        self.is_super_admin.unwrap_or(false)
    }

    /// Whether the token is expired at `now`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            username: self.username.clone(),
            is_admin: self.is_admin(),
            is_super_admin: self.is_super_admin(),
            verified: self.verified.unwrap_or(false),
            wallet_address: self.wallet_address.clone(),
        }
    }
}

/// Validated registration input
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub initial_weight: Option<f64>,
    pub fitness_level: Option<String>,
    pub fitness_goals: Option<String>,
    pub health_conditions: Option<String>,
}

/// `PUT /profile` body; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birth_date: Option<NaiveDate>,
    /// Centimetres
    pub height: Option<f64>,
    pub current_weight: Option<f64>,
    pub fitness_level: Option<String>,
    pub health_conditions: Option<String>,
}

impl ProfileUpdate {
    /// Whether any user_profiles column is set
    pub fn touches_profile(&self) -> bool {
        self.height.is_some()
            || self.current_weight.is_some()
            || self.fitness_level.is_some()
            || self.health_conditions.is_some()
    }

    pub fn is_empty(&self) -> bool {
        !self.touches_profile()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.birth_date.is_none()
    }
}

impl NewAccount {
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }
}
