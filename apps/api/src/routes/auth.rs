//! Authentication REST route handlers for TrainHub
//!
//! Provides endpoints for user authentication:
//! - `POST /register` - Create a new account and log it in
//! - `POST /login` - Authenticate with username or email
//! - `POST /logout` - Expire the session cookie
//!
//! Register and login sit behind [`attempt_guard`], which refuses blocked
//! IPs and adds the `X-RateLimit-*` headers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::SET_COOKIE, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{attempt_guard, ClientIp, SessionCookie};
use crate::models::user::User;
use crate::services::auth::{LoginInput, RegistrationInput};
use crate::services::{AuthService, LoginAttemptTracker};

/// Shared application state for auth handlers
#[derive(Clone)]
pub struct AuthState {
    /// Authentication service
    pub auth_service: Arc<AuthService>,
    /// Session cookie settings
    pub cookie: SessionCookie,
}

impl AuthState {
    pub fn new(auth_service: AuthService, cookie: SessionCookie) -> Self {
        Self {
            auth_service: Arc::new(auth_service),
            cookie,
        }
    }

    fn tracker(&self) -> LoginAttemptTracker {
        self.auth_service.tracker().clone()
    }
}

/// Create authentication router
pub fn auth_router(state: AuthState) -> Router {
    let guarded = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route_layer(middleware::from_fn_with_state(
            state.tracker(),
            attempt_guard,
        ))
        .with_state(state.clone());

    let other_routes = Router::new()
        .route("/logout", post(logout))
        .with_state(state);

    Router::new().merge(guarded).merge(other_routes)
}

// ========== Response Types ==========

/// The user fields returned on login
#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: i64,
    pub username: String,
    pub verified: bool,
}

impl From<&User> for LoginUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            verified: user.is_verified,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub message: &'static str,
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
    pub message: &'static str,
}

// ========== Route Handlers ==========

/// Register a new account
///
/// # Response
/// - 201 Created with the token, also set as the session cookie
/// - 400 Bad Request: missing or invalid fields
/// - 409 Conflict: username or email already registered
/// - 429 Too Many Requests: caller is blocked
async fn register(
    State(state): State<AuthState>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<RegistrationInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;

    let registration = state.auth_service.register(&client_ip, &input).await?;
    let cookie = state.cookie.set(&registration.token)?;

    let response = RegisterResponse {
        success: true,
        message: "Registration successful",
        user_id: registration.user.id,
        token: registration.token,
    };

    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], Json(response)))
}

/// Login with username or email and password
///
/// # Response
/// - 200 OK with the token, also set as the session cookie
/// - 401 Unauthorized: invalid credentials
/// - 403 Forbidden: account disabled
/// - 429 Too Many Requests: IP or username blocked
///
/// Failed responses carry the attempt counts for the username as well, so
/// the rate limit headers reflect the stricter of the two keys.
async fn login(
    State(state): State<AuthState>,
    ClientIp(client_ip): ClientIp,
    payload: Result<Json<LoginInput>, JsonRejection>,
) -> Response {
    let input = match payload {
        Ok(Json(input)) => input,
        Err(rejection) => return ApiError::from(rejection).into_response(),
    };

    let result = state.auth_service.login(&client_ip, &input).await;
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            let attempts = state
                .auth_service
                .attempts(&client_ip, input.username.as_deref())
                .await;
            let mut response = err.into_response();
            response.extensions_mut().insert(attempts);
            return response;
        }
    };

    let cookie = match state.cookie.set(&outcome.token) {
        Ok(cookie) => cookie,
        Err(err) => return err.into_response(),
    };

    let body = LoginResponse {
        success: true,
        user: LoginUser::from(&outcome.user),
        token: outcome.token,
    };

    let mut response = ([(SET_COOKIE, cookie)], Json(body)).into_response();
    response.extensions_mut().insert(outcome.attempts);
    response
}

/// Expire the session cookie
///
/// Tokens are stateless; a bearer token stays valid until it expires.
async fn logout(State(state): State<AuthState>) -> ApiResult<impl IntoResponse> {
    let cookie = state.cookie.clear()?;
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LogoutResponse {
            success: true,
            message: "Logged out",
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_login_user_from_user() {
        let user = User {
            id: 7,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: "hash".to_string(),
            first_name: None,
            last_name: None,
            display_name: "alice".to_string(),
            phone: None,
            birth_date: None,
            wallet_address: None,
            is_admin: false,
            is_super_admin: false,
            is_active: true,
            is_verified: true,
            payment_customer_id: None,
            last_login: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_value(LoginUser::from(&user)).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "username": "alice", "verified": true}));
    }
}
