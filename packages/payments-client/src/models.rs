//! Payment processor request and response models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A processor-side customer record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Processor customer id (e.g. `cus_...`)
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Parameters for creating a one-off card checkout session
#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    /// Existing processor customer, if any
    pub customer_id: Option<String>,
    /// Used only when no customer id is given
    pub customer_email: Option<String>,
    /// Product name shown on the hosted checkout page
    pub product_name: String,
    /// Amount in the smallest currency unit
    pub unit_amount: i64,
    /// ISO currency code, lowercase
    pub currency: String,
    /// Redirect after payment; `{CHECKOUT_SESSION_ID}` is substituted by the processor
    pub success_url: String,
    pub cancel_url: String,
    /// Copied onto the product, the session and its payment intent
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSessionRequest {
    /// Flatten into the bracketed form encoding the processor expects
    pub(crate) fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), self.success_url.clone()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                self.unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                self.product_name.clone(),
            ),
        ];

        match (&self.customer_id, &self.customer_email) {
            (Some(customer), _) => form.push(("customer".to_string(), customer.clone())),
            (None, Some(email)) => form.push(("customer_email".to_string(), email.clone())),
            (None, None) => {}
        }

        for (key, value) in &self.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
            form.push((
                format!("line_items[0][price_data][product_data][metadata][{}]", key),
                value.clone(),
            ));
            // Payment intent events only carry the intent's own metadata
            form.push((
                format!("payment_intent_data[metadata][{}]", key),
                value.clone(),
            ));
        }

        form
    }
}

/// A checkout session as returned by create/retrieve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted checkout URL (absent once the session is complete)
    pub url: Option<String>,
    /// `open`, `complete` or `expired`
    pub status: Option<String>,
    /// `paid`, `unpaid` or `no_payment_required`
    pub payment_status: Option<String>,
    pub payment_intent: Option<String>,
    pub customer: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutSession {
    /// Whether the processor reports the session as paid
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }
}

/// Event delivered to the webhook endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The resource the event refers to, shape depends on `event_type`
    pub object: serde_json::Value,
}

// Internal response types for deserialization

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}
