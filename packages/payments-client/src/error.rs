//! Payment processor error types

use thiserror::Error;

/// Payment processor client errors
#[derive(Error, Debug)]
pub enum PaymentsError {
    /// Secret key is missing
    #[error("secret key is required for payment processor access")]
    MissingApiKey,

    /// Invalid input provided to an API method
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse payment processor response: {0}")]
    Parse(#[from] serde_json::Error),

    /// Processor returned an error object
    #[error("payment processor error {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Rate limited by the processor
    #[error("Rate limited by payment processor")]
    RateLimited,

    /// Request timeout
    #[error("Request to payment processor timed out")]
    Timeout,

    /// Webhook signature header missing, malformed, stale or not matching
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(&'static str),
}

impl PaymentsError {
    /// Check if this error is retryable (transient failure)
    ///
    /// Client errors (4xx other than 429) are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentsError::Timeout | PaymentsError::RateLimited => true,
            PaymentsError::Http(e) => {
                if e.is_timeout() || e.is_connect() {
                    return true;
                }
                matches!(e.status(), Some(status) if status.is_server_error())
            }
            PaymentsError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type for payment processor operations
pub type PaymentsResult<T> = Result<T, PaymentsError>;
