//! Error handling for the TrainHub API
//!
//! This module provides a unified error type hierarchy using thiserror,
//! with automatic HTTP status code mapping via Axum's IntoResponse trait.
//! Error codes are stable lowercase identifiers clients can match on.

use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header::RETRY_AFTER, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use trainhub_payments_client::PaymentsError;

/// When false, 5xx responses carry a generic message instead of the error text
static EXPOSE_INTERNAL_ERRORS: AtomicBool = AtomicBool::new(false);

/// Toggle detailed messages on 5xx responses (development builds)
pub fn set_expose_internal_errors(expose: bool) {
    EXPOSE_INTERNAL_ERRORS.store(expose, Ordering::Relaxed);
}

fn expose_internal_errors() -> bool {
    EXPOSE_INTERNAL_ERRORS.load(Ordering::Relaxed)
}

/// API error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for client-side handling
    pub code: &'static str,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Main API error type
#[derive(Error, Debug)]
pub enum ApiError {
    // ========== Authentication & Authorization ==========
    /// Username/email and password did not match
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No bearer header and no session cookie
    #[error("authentication required")]
    MissingToken,

    /// Token is past its expiry
    #[error("authentication token has expired")]
    ExpiredToken,

    /// Token signature or structure is invalid
    #[error("invalid authentication token: {0}")]
    InvalidToken(String),

    /// Authenticated, but lacking the role the route needs
    #[error("insufficient permissions: {0}")]
    Forbidden(String),

    /// Account exists but was deactivated
    #[error("account is disabled, contact support")]
    AccountDisabled,

    /// Unexpected failure inside the authentication gate
    #[error("authentication failed: {0}")]
    AuthGate(String),

    // ========== Resource Errors ==========
    /// Requested resource not found
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Resource already exists (conflict)
    #[error("{resource_type} already exists: {id}")]
    Conflict {
        resource_type: &'static str,
        id: String,
    },

    // ========== Validation Errors ==========
    /// Request validation failed
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Invalid request body format
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// Missing required field
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Invalid query parameter
    #[error("invalid query parameter '{name}': {reason}")]
    InvalidQueryParam { name: &'static str, reason: String },

    /// Webhook payload failed signature verification
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    // ========== Rate Limiting ==========
    /// Caller is blocked by the login attempt tracker
    #[error("{message}")]
    RateLimited {
        retry_after: u64,
        reason: &'static str,
        message: String,
    },

    // ========== Database Errors ==========
    /// Database query failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database connection pool exhausted
    #[error("database connection unavailable")]
    DatabaseUnavailable,

    // ========== External Service Errors ==========
    /// Payment processor call failed
    #[error("payment provider error: {0}")]
    PaymentProvider(String),

    // ========== Configuration Errors ==========
    /// Server is missing configuration required for this operation
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== Internal Errors ==========
    /// Internal server error (catch-all for unexpected errors)
    #[error("internal server error: {0}")]
    Internal(String),

    /// JSON serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 401 Unauthorized
            Self::InvalidCredentials
            | Self::MissingToken
            | Self::ExpiredToken
            | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,

            // 403 Forbidden
            Self::Forbidden(_) | Self::AccountDisabled => StatusCode::FORBIDDEN,

            // 404 Not Found
            Self::NotFound { .. } => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::Conflict { .. } => StatusCode::CONFLICT,

            // 400 Bad Request
            Self::ValidationError(_)
            | Self::InvalidBody(_)
            | Self::MissingField(_)
            | Self::InvalidQueryParam { .. }
            | Self::InvalidSignature(_) => StatusCode::BAD_REQUEST,

            // 429 Too Many Requests
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,

            // 503 Service Unavailable
            Self::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // 502 Bad Gateway
            Self::PaymentProvider(_) => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            Self::AuthGate(_)
            | Self::Database(_)
            | Self::Configuration(_)
            | Self::Internal(_)
            | Self::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code string for client-side handling
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid_credentials",
            Self::MissingToken => "missing_token",
            Self::ExpiredToken => "expired_token",
            Self::InvalidToken(_) => "invalid_token",
            Self::Forbidden(_) => "forbidden",
            Self::AccountDisabled => "account_disabled",
            Self::AuthGate(_) => "auth_error",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidBody(_) => "invalid_body",
            Self::MissingField(_) => "missing_field",
            Self::InvalidQueryParam { .. } => "invalid_query_param",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::RateLimited { .. } => "rate_limited",
            Self::Database(_) => "database_error",
            Self::DatabaseUnavailable => "database_unavailable",
            Self::PaymentProvider(_) => "payment_provider_error",
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
            Self::Serialization(_) => "serialization_error",
        }
    }

    /// Create a not found error for a specific resource
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    /// Create a conflict error for a specific resource
    pub fn conflict(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::Conflict {
            resource_type,
            id: id.into(),
        }
    }

    /// Message sent to the client
    ///
    /// Server errors are reduced to a generic sentence unless detailed
    /// errors were enabled at startup.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() && !expose_internal_errors() {
            return match self {
                Self::AuthGate(_) => "authentication could not be completed".to_string(),
                Self::DatabaseUnavailable => "service temporarily unavailable".to_string(),
                Self::PaymentProvider(_) => "payment provider unavailable".to_string(),
                _ => "an internal error occurred while processing the request".to_string(),
            };
        }
        self.to_string()
    }

    /// Log the error with appropriate severity based on status code
    pub fn log(&self) {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Server error occurred"
            );
        } else if status == StatusCode::UNAUTHORIZED
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            tracing::warn!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Authorization error"
            );
        } else {
            tracing::debug!(
                error = %self,
                code = self.error_code(),
                status = status.as_u16(),
                "Client error"
            );
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status_code();
        let details = match &self {
            Self::RateLimited {
                retry_after,
                reason,
                ..
            } => Some(json!({
                "retry_after_seconds": retry_after,
                "reason": reason,
            })),
            _ => None,
        };
        let error_response = ErrorResponse {
            code: self.error_code(),
            message: self.public_message(),
            details,
        };

        if let Self::RateLimited { retry_after, .. } = &self {
            return (
                status,
                [(RETRY_AFTER, retry_after.to_string())],
                Json(error_response),
            )
                .into_response();
        }

        (status, Json(error_response)).into_response()
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;

// ========== Conversion Implementations ==========

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ApiError>() {
            Ok(api_err) => api_err,
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidBody(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidQueryParam {
            name: "query",
            reason: rejection.body_text(),
        }
    }
}

impl From<PaymentsError> for ApiError {
    fn from(err: PaymentsError) -> Self {
        match err {
            PaymentsError::InvalidInput(msg) => Self::ValidationError(msg),
            PaymentsError::InvalidSignature(reason) => Self::InvalidSignature(reason.to_string()),
            PaymentsError::MissingApiKey => {
                Self::Configuration("payment processor is not configured".to_string())
            }
            other => Self::PaymentProvider(other.to_string()),
        }
    }
}
