//! Webhook signature verification
//!
//! The processor signs each delivery with a header of the form
//! `t=<unix seconds>,v1=<hex hmac-sha256>`; the signed payload is
//! `"<t>.<raw body>"` keyed with the endpoint secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{PaymentsError, PaymentsResult};
use crate::models::WebhookEvent;

type HmacSha256 = Hmac<Sha256>;

/// Default replay tolerance, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// Verify a webhook delivery and parse the event it carries
///
/// `now` is the current unix time in seconds.
pub fn construct_event(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> PaymentsResult<WebhookEvent> {
    if secret.is_empty() {
        return Err(PaymentsError::MissingApiKey);
    }

    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in signature_header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(PaymentsError::InvalidSignature("missing timestamp"))?;
    if signatures.is_empty() {
        return Err(PaymentsError::InvalidSignature("no v1 signature"));
    }
    if (now - timestamp).abs() > tolerance_secs {
        return Err(PaymentsError::InvalidSignature("timestamp outside tolerance"));
    }

    let matched = signatures.iter().any(|candidate| {
        let Ok(expected) = hex::decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
            return false;
        };
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected).is_ok()
    });

    if !matched {
        return Err(PaymentsError::InvalidSignature("signature mismatch"));
    }

    Ok(serde_json::from_slice(payload)?)
}

/// Produce a signature header for `payload`, as the processor would
///
/// Used by tests and local tooling that replay events.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return format!("t={}", timestamp),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
