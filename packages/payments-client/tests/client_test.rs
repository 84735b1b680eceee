//! Client tests against a mocked processor API

use std::collections::BTreeMap;

use trainhub_payments_client::{CheckoutSessionRequest, PaymentsClient, PaymentsError};
use trainhub_test_utils::MockPaymentsServer;

fn checkout_request() -> CheckoutSessionRequest {
    let mut metadata = BTreeMap::new();
    metadata.insert("purchase_id".to_string(), "12".to_string());
    CheckoutSessionRequest {
        customer_id: Some("cus_test".to_string()),
        customer_email: None,
        product_name: "Cutting 8 weeks".to_string(),
        unit_amount: 2999,
        currency: "eur".to_string(),
        success_url: "https://app.test/ok?session_id={CHECKOUT_SESSION_ID}".to_string(),
        cancel_url: "https://app.test/cancel".to_string(),
        metadata,
    }
}

#[tokio::test]
async fn test_create_checkout_session() {
    let server = MockPaymentsServer::start().await;
    server.mock_create_checkout_session("cs_test_1").await;

    let client = PaymentsClient::with_base_url("sk_test", server.url()).unwrap();
    let session = client
        .create_checkout_session(&checkout_request())
        .await
        .unwrap();

    assert_eq!(session.id, "cs_test_1");
    assert!(session.url.as_ref().unwrap().contains("cs_test_1"));
    assert!(!session.is_paid());
}

#[tokio::test]
async fn test_create_customer() {
    let server = MockPaymentsServer::start().await;
    server.mock_create_customer("cus_new").await;

    let client = PaymentsClient::with_base_url("sk_test", server.url()).unwrap();
    let customer = client
        .create_customer("athlete@example.com", Some("Alice"), &BTreeMap::new())
        .await
        .unwrap();

    assert_eq!(customer.id, "cus_new");
}

#[tokio::test]
async fn test_retrieve_paid_session() {
    let server = MockPaymentsServer::start().await;
    server.mock_retrieve_session("cs_paid", "paid", Some("pi_1")).await;

    let client = PaymentsClient::with_base_url("sk_test", server.url()).unwrap();
    let session = client.retrieve_checkout_session("cs_paid").await.unwrap();

    assert!(session.is_paid());
    assert_eq!(session.payment_intent.as_deref(), Some("pi_1"));
}

#[tokio::test]
async fn test_api_error_is_surfaced() {
    let server = MockPaymentsServer::start().await;
    server.mock_session_not_found().await;

    let client = PaymentsClient::with_base_url("sk_test", server.url()).unwrap();
    let err = client
        .retrieve_checkout_session("cs_missing")
        .await
        .unwrap_err();

    match err {
        PaymentsError::Api { status, code, .. } => {
            assert_eq!(status, 404);
            assert_eq!(code.as_deref(), Some("resource_missing"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let server = MockPaymentsServer::start().await;
    server.mock_server_error().await;

    let client = PaymentsClient::with_base_url("sk_test", server.url())
        .unwrap()
        .with_max_retries(1);
    let result = client.retrieve_checkout_session("cs_flaky").await;

    assert!(matches!(result, Err(PaymentsError::Api { status: 500, .. })));
    assert_eq!(server.received_count().await, 2);
}
