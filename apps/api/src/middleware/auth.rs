//! Authentication gate and role extractors
//!
//! `require_auth` runs before every protected handler:
//! 1. extract a token from the configured sources, in order
//! 2. verify it with the [`TokenCodec`]
//! 3. attach a [`RequestIdentity`] to the request extensions
//!
//! Handlers then state the role they need through an extractor:
//! - `AuthUser`: any authenticated caller
//! - `AdminUser`: `isAdmin` claim (or super admin), 403 otherwise
//! - `SuperAdminUser`: `isSuperAdmin` claim or the configured admin wallet, 403 otherwise
//!
//! # Usage
//!
//! ```rust,ignore
//! let protected = Router::new()
//!     .route("/profile", get(profile))
//!     .route_layer(middleware::from_fn_with_state(gate, require_auth));
//!
//! async fn profile(AuthUser(identity): AuthUser) -> impl IntoResponse {
//!     format!("Hello, {}!", identity.username())
//! }
//! ```

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::cookie::{read_cookie, SESSION_COOKIE_NAME};
use crate::error::ApiError;
use crate::models::user::Claims;
use crate::services::token::{TokenCodec, TokenError};

/// Where to look for an identity token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// `Authorization: Bearer <token>`
    BearerHeader,
    /// A named cookie
    Cookie(&'static str),
}

impl TokenSource {
    pub fn extract<'a>(&self, headers: &'a HeaderMap) -> Option<&'a str> {
        match self {
            Self::BearerHeader => headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|token| !token.is_empty()),
            Self::Cookie(name) => read_cookie(headers, name),
        }
    }
}

/// Header first, then the session cookie
pub const DEFAULT_TOKEN_SOURCES: [TokenSource; 2] = [
    TokenSource::BearerHeader,
    TokenSource::Cookie(SESSION_COOKIE_NAME),
];

/// First token found, trying `sources` in order
pub fn extract_token<'a>(headers: &'a HeaderMap, sources: &[TokenSource]) -> Option<&'a str> {
    sources.iter().find_map(|source| source.extract(headers))
}

/// Decoded identity attached to an authenticated request
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub claims: Claims,
    /// `isSuperAdmin` claim, or the claimed wallet matches the admin wallet
    pub is_super_admin: bool,
}

impl RequestIdentity {
    pub fn user_id(&self) -> i64 {
        self.claims.id
    }

    pub fn username(&self) -> &str {
        &self.claims.username
    }

    pub fn is_admin(&self) -> bool {
        self.claims.is_admin() || self.is_super_admin
    }
}

/// Why the gate refused a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthRejection {
    MissingToken,
    ExpiredToken,
    InvalidToken(String),
    Forbidden(&'static str),
    /// Failure inside the gate itself; never the caller's fault
    Internal(String),
}

impl From<TokenError> for AuthRejection {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Expired => Self::ExpiredToken,
            TokenError::Invalid(reason) => Self::InvalidToken(reason),
            TokenError::Configuration => Self::Internal("token codec not configured".to_string()),
            TokenError::Internal(reason) => Self::Internal(reason),
        }
    }
}

impl From<AuthRejection> for ApiError {
    fn from(rejection: AuthRejection) -> Self {
        match rejection {
            AuthRejection::MissingToken => ApiError::MissingToken,
            AuthRejection::ExpiredToken => ApiError::ExpiredToken,
            AuthRejection::InvalidToken(reason) => ApiError::InvalidToken(reason),
            AuthRejection::Forbidden(role) => ApiError::Forbidden(format!("{} access required", role)),
            AuthRejection::Internal(reason) => ApiError::AuthGate(reason),
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        ApiError::from(self).into_response()
    }
}

/// Token verification plus admin identity, shared by the gate middleware
#[derive(Clone)]
pub struct AuthGate {
    codec: Arc<TokenCodec>,
    admin_wallet: Option<String>,
    sources: Arc<[TokenSource]>,
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("admin_wallet", &self.admin_wallet)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

impl AuthGate {
    pub fn new(codec: Arc<TokenCodec>, admin_wallet: Option<String>) -> Self {
        Self {
            codec,
            admin_wallet: admin_wallet
                .map(|w| w.trim().to_string())
                .filter(|w| !w.is_empty()),
            sources: Arc::from(DEFAULT_TOKEN_SOURCES.as_slice()),
        }
    }

    /// Replace the token extraction order
    pub fn with_sources(mut self, sources: &[TokenSource]) -> Self {
        self.sources = Arc::from(sources);
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Extract and verify the token carried by `headers`
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<RequestIdentity, AuthRejection> {
        let token = extract_token(headers, &self.sources).ok_or(AuthRejection::MissingToken)?;
        let claims = self.codec.verify(token)?;
        let is_super_admin = claims.is_super_admin() || self.is_admin_wallet(&claims);

        Ok(RequestIdentity {
            claims,
            is_super_admin,
        })
    }

    fn is_admin_wallet(&self, claims: &Claims) -> bool {
        match (&self.admin_wallet, &claims.wallet_address) {
            (Some(admin), Some(claimed)) => admin.eq_ignore_ascii_case(claimed.trim()),
            _ => false,
        }
    }
}

/// Middleware rejecting requests without a valid identity token
pub async fn require_auth(State(gate): State<AuthGate>, mut request: Request, next: Next) -> Response {
    match gate.authenticate(request.headers()) {
        Ok(identity) => {
            tracing::debug!(user_id = identity.user_id(), "Request authenticated");
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(rejection) => rejection.into_response(),
    }
}

fn identity_from(parts: &Parts) -> Result<RequestIdentity, AuthRejection> {
    parts
        .extensions
        .get::<RequestIdentity>()
        .cloned()
        .ok_or_else(|| AuthRejection::Internal("auth gate not installed on this route".to_string()))
}

/// Any authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub RequestIdentity);

/// Caller with the admin role
#[derive(Debug, Clone)]
pub struct AdminUser(pub RequestIdentity);

/// The platform owner
#[derive(Debug, Clone)]
pub struct SuperAdminUser(pub RequestIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from(parts).map(AuthUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_from(parts)?;
        if !identity.is_admin() {
            tracing::warn!(user_id = identity.user_id(), "Admin route refused");
            return Err(AuthRejection::Forbidden("admin"));
        }
        Ok(AdminUser(identity))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for SuperAdminUser
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = identity_from(parts)?;
        if !identity.is_super_admin {
            tracing::warn!(user_id = identity.user_id(), "Super admin route refused");
            return Err(AuthRejection::Forbidden("super admin"));
        }
        Ok(SuperAdminUser(identity))
    }
}
