//! Payment processor API client implementation

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use crate::error::{PaymentsError, PaymentsResult};
use crate::models::{CheckoutSession, CheckoutSessionRequest, Customer, ErrorEnvelope};

/// Processor API base URL
pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default number of retry attempts for transient failures
const DEFAULT_MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (milliseconds)
const RETRY_BASE_DELAY_MS: u64 = 100;

/// Maximum length of a checkout session id we will look up
const MAX_SESSION_ID_LENGTH: usize = 255;

/// Payment processor API client
#[derive(Clone)]
pub struct PaymentsClient {
    http_client: Client,
    secret_key: String,
    base_url: String,
    max_retries: u32,
}

impl fmt::Debug for PaymentsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentsClient")
            .field("secret_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl PaymentsClient {
    /// Create a new client with the given secret key against the live API
    ///
    /// # Errors
    /// Returns `PaymentsError::MissingApiKey` if the key is empty
    pub fn new(secret_key: impl Into<String>) -> PaymentsResult<Self> {
        Self::with_base_url(secret_key, DEFAULT_API_BASE)
    }

    /// Create a client against a custom API base (mock servers, proxies)
    pub fn with_base_url(
        secret_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> PaymentsResult<Self> {
        let secret_key = secret_key.into();
        if secret_key.trim().is_empty() {
            return Err(PaymentsError::MissingApiKey);
        }

        let http_client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .user_agent("TrainHub/1.0")
            .build()?;

        Ok(Self {
            http_client,
            secret_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    /// Override the retry budget for transient failures
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Execute an operation with retry logic for transient failures
    async fn with_retry<T, F, Fut>(&self, operation: F) -> PaymentsResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = PaymentsResult<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay_ms = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                    warn!(
                        attempt = attempt,
                        max_retries = self.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Payment processor request failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn map_send_error(e: reqwest::Error) -> PaymentsError {
        if e.is_timeout() {
            PaymentsError::Timeout
        } else {
            PaymentsError::Http(e)
        }
    }

    /// Turn a processor response into `T` or its error envelope
    async fn parse_response<T: DeserializeOwned>(response: Response) -> PaymentsResult<T> {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Payment processor rate limited");
            return Err(PaymentsError::RateLimited);
        }

        let text = response.text().await.map_err(PaymentsError::Http)?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ErrorEnvelope>(&text) {
                Ok(envelope) => PaymentsError::Api {
                    status: status.as_u16(),
                    code: envelope.error.code,
                    message: envelope.error.message,
                },
                Err(_) => PaymentsError::Api {
                    status: status.as_u16(),
                    code: None,
                    message: text,
                },
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> PaymentsResult<T> {
        let response = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .form(form)
            .send()
            .await
            .map_err(Self::map_send_error)?;
        Self::parse_response(response).await
    }

    /// Create a customer record
    #[instrument(skip(self, metadata))]
    pub async fn create_customer(
        &self,
        email: &str,
        name: Option<&str>,
        metadata: &BTreeMap<String, String>,
    ) -> PaymentsResult<Customer> {
        if email.trim().is_empty() {
            return Err(PaymentsError::InvalidInput(
                "customer email cannot be empty".to_string(),
            ));
        }

        let mut form = vec![("email".to_string(), email.trim().to_string())];
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            form.push(("name".to_string(), name.trim().to_string()));
        }
        for (key, value) in metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        // Creation is not idempotent without an idempotency key, so no retry here
        let customer: Customer = self.post_form("/v1/customers", &form).await?;
        debug!(customer_id = %customer.id, "Created payment customer");
        Ok(customer)
    }

    /// Create a hosted checkout session for a single line item
    ///
    /// # Errors
    /// - `PaymentsError::InvalidInput` for a non-positive amount or empty product name
    /// - `PaymentsError::Api` if the processor rejects the request
    #[instrument(skip(self, request), fields(product = %request.product_name, amount = request.unit_amount))]
    pub async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> PaymentsResult<CheckoutSession> {
        if request.unit_amount <= 0 {
            return Err(PaymentsError::InvalidInput(
                "unit amount must be positive".to_string(),
            ));
        }
        if request.product_name.trim().is_empty() {
            return Err(PaymentsError::InvalidInput(
                "product name cannot be empty".to_string(),
            ));
        }

        let form = request.to_form();
        let session: CheckoutSession = self.post_form("/v1/checkout/sessions", &form).await?;
        debug!(session_id = %session.id, "Created checkout session");
        Ok(session)
    }

    /// Retrieve a checkout session by id
    #[instrument(skip(self))]
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> PaymentsResult<CheckoutSession> {
        let session_id = session_id.trim();
        if session_id.is_empty()
            || session_id.len() > MAX_SESSION_ID_LENGTH
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(PaymentsError::InvalidInput(
                "malformed checkout session id".to_string(),
            ));
        }

        let url = format!("{}/v1/checkout/sessions/{}", self.base_url, session_id);
        self.with_retry(|| async {
            let response = self
                .http_client
                .get(&url)
                .bearer_auth(&self.secret_key)
                .send()
                .await
                .map_err(Self::map_send_error)?;
            Self::parse_response(response).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_with_empty_key() {
        let result = PaymentsClient::new("");
        assert!(matches!(result, Err(PaymentsError::MissingApiKey)));
    }

    #[test]
    fn test_client_debug_redacts_secret_key() {
        let client = PaymentsClient::new("sk_test_secret").unwrap();
        let debug_str = format!("{:?}", client);
        assert!(!debug_str.contains("sk_test_secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = PaymentsClient::with_base_url("sk_test", "http://localhost:1234/").unwrap();
        assert_eq!(client.base_url, "http://localhost:1234");
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(PaymentsError::Timeout.is_retryable());
        assert!(PaymentsError::RateLimited.is_retryable());
        assert!(PaymentsError::Api {
            status: 503,
            code: None,
            message: "unavailable".to_string()
        }
        .is_retryable());
        assert!(!PaymentsError::Api {
            status: 404,
            code: Some("resource_missing".to_string()),
            message: "No such checkout.session".to_string()
        }
        .is_retryable());
        assert!(!PaymentsError::MissingApiKey.is_retryable());
    }

    #[test]
    fn test_checkout_form_prefers_customer_over_email() {
        let mut metadata = BTreeMap::new();
        metadata.insert("purchase_id".to_string(), "7".to_string());
        let request = CheckoutSessionRequest {
            customer_id: Some("cus_1".to_string()),
            customer_email: Some("a@b.c".to_string()),
            product_name: "Strength 12w".to_string(),
            unit_amount: 4999,
            currency: "eur".to_string(),
            success_url: "https://app/success?session_id={CHECKOUT_SESSION_ID}".to_string(),
            cancel_url: "https://app/cancel".to_string(),
            metadata,
        };

        let form = request.to_form();
        let has = |k: &str, v: &str| form.iter().any(|(fk, fv)| fk == k && fv == v);

        assert!(has("customer", "cus_1"));
        assert!(!form.iter().any(|(k, _)| k == "customer_email"));
        assert!(has("line_items[0][price_data][unit_amount]", "4999"));
        assert!(has("metadata[purchase_id]", "7"));
        assert!(has(
            "line_items[0][price_data][product_data][metadata][purchase_id]",
            "7"
        ));
        assert!(has("payment_intent_data[metadata][purchase_id]", "7"));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_malformed_session_id() {
        let client = PaymentsClient::new("sk_test").unwrap();
        let result = client.retrieve_checkout_session("../v1/customers").await;
        assert!(matches!(result, Err(PaymentsError::InvalidInput(_))));
    }
}
