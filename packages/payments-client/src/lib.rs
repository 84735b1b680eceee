//! Payment processor client for TrainHub
//!
//! This crate talks to a Stripe-compatible REST API, enabling:
//! - Customer creation
//! - Hosted checkout sessions for plan purchases
//! - Session retrieval for payment reconciliation
//! - Webhook signature verification
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use trainhub_payments_client::{CheckoutSessionRequest, PaymentsClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = PaymentsClient::new("sk_test_...")?;
//!
//! let session = client
//!     .create_checkout_session(&CheckoutSessionRequest {
//!         customer_id: None,
//!         customer_email: Some("athlete@example.com".to_string()),
//!         product_name: "Hypertrophy 12 weeks".to_string(),
//!         unit_amount: 4999,
//!         currency: "eur".to_string(),
//!         success_url: "https://app.example.com/ok?session_id={CHECKOUT_SESSION_ID}".to_string(),
//!         cancel_url: "https://app.example.com/cancel".to_string(),
//!         metadata: BTreeMap::new(),
//!     })
//!     .await?;
//! println!("redirect to {:?}", session.url);
//! # Ok(())
//! # }
//! ```
//!
//! # Environment Variables
//!
//! - `STRIPE_SECRET_KEY`: processor secret key (read by the API server)
//! - `STRIPE_WEBHOOK_SECRET`: endpoint secret used by [`construct_event`]

mod client;
mod error;
mod models;
mod webhook;

pub use client::{PaymentsClient, DEFAULT_API_BASE};
pub use error::{PaymentsError, PaymentsResult};
pub use models::{CheckoutSession, CheckoutSessionRequest, Customer, WebhookEvent, WebhookEventData};
pub use webhook::{construct_event, sign_payload, DEFAULT_TOLERANCE_SECS};
