//! Business logic services for TrainHub
//!
//! This module contains the core business logic including:
//! - Identity token issuance and verification
//! - Login attempt tracking with pluggable storage
//! - Login, registration and the credential store
//! - Plan checkout and payment reconciliation
//! - Health checks

pub mod attempt_store;
pub mod auth;
pub mod credentials;
pub mod health;
pub mod login_attempts;
pub mod payments;
pub mod token;

pub use attempt_store::{AttemptPolicy, AttemptStore, InMemoryAttemptStore, RedisAttemptStore};
pub use auth::AuthService;
pub use credentials::{CredentialStore, Passwords, PgCredentialStore};
pub use health::HealthService;
pub use login_attempts::LoginAttemptTracker;
pub use payments::{CheckoutService, CheckoutSettings};
pub use token::{TokenCodec, TokenError};
