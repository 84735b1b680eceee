//! Purchase models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Purchase lifecycle state matching PostgreSQL purchase_status type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "purchase_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

/// A row from purchases
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Purchase {
    pub id: i64,
    pub user_id: i64,
    pub plan_id: i64,
    pub variant_id: i64,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    #[serde(skip_serializing)]
    pub checkout_session_id: Option<String>,
    #[serde(skip_serializing)]
    pub payment_intent_id: Option<String>,
    pub access_granted: bool,
    pub access_granted_at: Option<DateTime<Utc>>,
    pub purchase_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchase joined with plan and buyer names, for listings
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PurchaseSummary {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub plan_id: i64,
    pub plan_name: String,
    pub variant_id: i64,
    pub duration_days: i32,
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    pub access_granted: bool,
    pub purchase_date: DateTime<Utc>,
}

/// Buyer-side purchase request
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePurchaseRequest {
    pub plan_id: i64,
    pub variant_id: i64,
}

/// Result of starting a checkout
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutStarted {
    pub success: bool,
    pub message: &'static str,
    pub purchase_id: i64,
    pub checkout_url: Option<String>,
    pub session_id: String,
}
