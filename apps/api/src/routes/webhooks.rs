//! Payment processor webhooks
//!
//! - `POST /webhooks/payments` - signed event delivery
//!
//! The raw body is needed for signature verification, so it is taken as
//! `Bytes` rather than parsed JSON.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::services::payments::WebhookOutcome;
use crate::services::CheckoutService;

/// Header carrying `t=<timestamp>,v1=<signature>`
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Clone)]
pub struct WebhookState {
    pub checkout: Arc<CheckoutService>,
}

pub fn webhook_router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/payments", post(payments_webhook))
        .with_state(state)
}

async fn payments_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidSignature("missing signature header".to_string()))?;

    let outcome = state.checkout.handle_webhook(&body, signature).await?;

    let handled = match outcome {
        WebhookOutcome::Completed { purchase_id } => json!({ "purchase_id": purchase_id }),
        WebhookOutcome::Failed { purchases } => json!({ "failed_purchases": purchases }),
        WebhookOutcome::Expired { purchases } => json!({ "cancelled_purchases": purchases }),
        WebhookOutcome::AlreadyHandled | WebhookOutcome::Ignored => json!({}),
    };

    Ok(Json(json!({ "received": true, "result": handled })))
}
