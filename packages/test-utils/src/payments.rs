//! Mock payment processor for testing checkout flows
//!
//! Provides a [`MockPaymentsServer`] that answers the customer and checkout
//! session endpoints the API server uses.

use serde_json::json;
use wiremock::matchers::{header_exists, method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock payment processor
///
/// Wraps a [`wiremock::MockServer`] with helpers for the common responses.
pub struct MockPaymentsServer {
    server: MockServer,
}

impl MockPaymentsServer {
    /// Start a new mock payment processor
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Get the server URL
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Mount a mock for customer creation returning `customer_id`
    pub async fn mock_create_customer(&self, customer_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/customers"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": customer_id,
                "object": "customer",
                "email": "athlete@example.com",
                "name": null
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for checkout session creation returning `session_id`
    pub async fn mock_create_checkout_session(&self, session_id: &str) {
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": session_id,
                "object": "checkout.session",
                "url": format!("https://checkout.test/pay/{}", session_id),
                "status": "open",
                "payment_status": "unpaid",
                "payment_intent": null,
                "customer": null,
                "metadata": {}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a mock for retrieving `session_id` with the given payment status
    pub async fn mock_retrieve_session(
        &self,
        session_id: &str,
        payment_status: &str,
        payment_intent: Option<&str>,
    ) {
        let status = if payment_status == "paid" {
            "complete"
        } else {
            "open"
        };
        Mock::given(method("GET"))
            .and(path(format!("/v1/checkout/sessions/{}", session_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": session_id,
                "object": "checkout.session",
                "url": null,
                "status": status,
                "payment_status": payment_status,
                "payment_intent": payment_intent,
                "customer": "cus_test",
                "metadata": {}
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a 404 `resource_missing` for any session lookup
    pub async fn mock_session_not_found(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/checkout/sessions/.+$"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "code": "resource_missing",
                    "message": "No such checkout.session"
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Mount a 500 for every request
    pub async fn mock_server_error(&self) {
        Mock::given(path_regex(r"^/v1/.*$"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {
                    "type": "api_error",
                    "message": "Something went wrong on our end"
                }
            })))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has received so far
    pub async fn received_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map(|requests| requests.len())
            .unwrap_or(0)
    }

    /// Get the underlying mock server for custom mocks
    pub fn inner(&self) -> &MockServer {
        &self.server
    }
}
