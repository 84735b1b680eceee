//! Plan checkout and payment reconciliation
//!
//! Starting a checkout commits the pending purchase first, then talks to the
//! processor with no transaction open. If a processor call fails the pending
//! row is deleted again.

use std::collections::BTreeMap;

use chrono::Utc;
use trainhub_payments_client::{
    construct_event, CheckoutSession, CheckoutSessionRequest, PaymentsClient, WebhookEvent,
    DEFAULT_TOLERANCE_SECS,
};

use crate::error::{ApiError, ApiResult};
use crate::models::plan::{PlanVariant, PlanWithVariants};
use crate::models::purchase::{CheckoutStarted, Purchase, PurchaseStatus};
use crate::models::user::User;
use crate::repositories::{PendingPurchase, PlanRepository, PurchaseRepository, UserRepository};

/// Checkout URLs and currency
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
    /// Secret used to verify webhook deliveries
    pub webhook_secret: Option<String>,
}

/// What a webhook delivery did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Completed { purchase_id: i64 },
    /// Already completed, or no purchase for the session
    AlreadyHandled,
    Failed { purchases: u64 },
    /// Checkout session expired before payment
    Expired { purchases: u64 },
    Ignored,
}

#[derive(Clone)]
pub struct CheckoutService {
    client: Option<PaymentsClient>,
    settings: CheckoutSettings,
    users: UserRepository,
    plans: PlanRepository,
    purchases: PurchaseRepository,
}

impl CheckoutService {
    pub fn new(
        client: Option<PaymentsClient>,
        settings: CheckoutSettings,
        users: UserRepository,
        plans: PlanRepository,
        purchases: PurchaseRepository,
    ) -> Self {
        Self {
            client,
            settings,
            users,
            plans,
            purchases,
        }
    }

    fn client(&self) -> ApiResult<&PaymentsClient> {
        self.client.as_ref().ok_or_else(|| {
            ApiError::Configuration("payment processor is not configured".to_string())
        })
    }

    /// Open a checkout for a published plan variant
    ///
    /// # Errors
    /// - `ApiError::NotFound` for an unknown or unpublished plan or inactive variant
    /// - `ApiError::Conflict` if the user already owns the plan
    /// - `ApiError::PaymentProvider` if the processor call fails
    pub async fn start_checkout(
        &self,
        user_id: i64,
        plan_id: i64,
        variant_id: i64,
    ) -> ApiResult<CheckoutStarted> {
        let client = self.client()?;

        let plan = self
            .plans
            .find_published(plan_id)
            .await?
            .ok_or_else(|| ApiError::not_found("plan", plan_id.to_string()))?;
        let variant = self
            .plans
            .find_active_variant(plan_id, variant_id)
            .await?
            .ok_or_else(|| ApiError::not_found("plan variant", variant_id.to_string()))?;
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ApiError::not_found("user", user_id.to_string()))?;

        let purchase = {
            let mut tx = self.purchases.pool().begin().await?;
            if PurchaseRepository::has_completed(&mut tx, user_id, plan_id).await? {
                return Err(ApiError::conflict("purchase", format!("plan {}", plan_id)));
            }
            let purchase = PurchaseRepository::insert_pending(
                &mut tx,
                user_id,
                plan_id,
                variant_id,
                variant.price_cents,
            )
            .await?;
            tx.commit().await?;
            purchase
        };

        let session = match self
            .open_session(client, &user, &plan, &variant, purchase.id)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                if let Err(cleanup) = self.purchases.discard_pending(purchase.id).await {
                    tracing::error!(
                        purchase_id = purchase.id,
                        error = %cleanup,
                        "Failed to discard pending purchase"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            user_id,
            plan_id,
            purchase_id = purchase.id,
            session_id = %session.id,
            "Checkout session created"
        );

        Ok(CheckoutStarted {
            success: true,
            message: "Checkout session created",
            purchase_id: purchase.id,
            checkout_url: session.url,
            session_id: session.id,
        })
    }

    /// Make sure the buyer has a processor customer, open the hosted session
    /// and store its id on the purchase
    async fn open_session(
        &self,
        client: &PaymentsClient,
        user: &User,
        plan: &PlanWithVariants,
        variant: &PlanVariant,
        purchase_id: i64,
    ) -> ApiResult<CheckoutSession> {
        let customer_id = match user.payment_customer_id.clone() {
            Some(id) => id,
            None => {
                let metadata = BTreeMap::from([("user_id".to_string(), user.id.to_string())]);
                let customer = client
                    .create_customer(&user.email, Some(&user.display_name), &metadata)
                    .await?;
                self.users.set_payment_customer_id(user.id, &customer.id).await?;
                customer.id
            }
        };

        let metadata = BTreeMap::from([
            ("purchase_id".to_string(), purchase_id.to_string()),
            ("user_id".to_string(), user.id.to_string()),
            ("plan_id".to_string(), plan.plan.id.to_string()),
            ("variant_id".to_string(), variant.id.to_string()),
        ]);
        let session = client
            .create_checkout_session(&CheckoutSessionRequest {
                customer_id: Some(customer_id),
                customer_email: None,
                product_name: format!("{} - {}", plan.plan.name, variant.label()),
                unit_amount: variant.price_cents,
                currency: self.settings.currency.clone(),
                success_url: self.settings.success_url.clone(),
                cancel_url: self.settings.cancel_url.clone(),
                metadata,
            })
            .await?;

        self.purchases.attach_session(purchase_id, &session.id).await?;
        Ok(session)
    }

    /// Reconcile a checkout session with the processor after the redirect
    pub async fn verify_session(&self, user_id: i64, session_id: &str) -> ApiResult<Purchase> {
        let purchase = self
            .purchases
            .find_by_session_for_user(user_id, session_id)
            .await?
            .ok_or_else(|| ApiError::not_found("purchase", session_id.to_string()))?;

        if purchase.status != PurchaseStatus::Pending {
            return Ok(purchase);
        }

        let session = self.client()?.retrieve_checkout_session(session_id).await?;
        if !session.is_paid() {
            return Ok(purchase);
        }

        match self
            .purchases
            .complete(session_id, session.payment_intent.as_deref())
            .await?
        {
            Some(completed) => {
                tracing::info!(purchase_id = completed.id, "Purchase completed on verification");
                Ok(completed)
            }
            // Completed concurrently by the webhook
            None => self
                .purchases
                .find_by_session_for_user(user_id, session_id)
                .await?
                .ok_or_else(|| ApiError::not_found("purchase", session_id.to_string())),
        }
    }

    /// Verify and apply a webhook delivery
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> ApiResult<WebhookOutcome> {
        let secret = self.settings.webhook_secret.as_deref().ok_or_else(|| {
            ApiError::Configuration("webhook secret is not configured".to_string())
        })?;

        let event = construct_event(
            payload,
            signature,
            secret,
            DEFAULT_TOLERANCE_SECS,
            Utc::now().timestamp(),
        )?;

        self.apply_event(&event).await
    }

    async fn apply_event(&self, event: &WebhookEvent) -> ApiResult<WebhookOutcome> {
        let object = &event.data.object;
        match event.event_type.as_str() {
            "checkout.session.completed" => {
                let session_id = object
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ApiError::InvalidBody("session id missing".to_string()))?;
                let payment_intent = object.get("payment_intent").and_then(|v| v.as_str());

                match self.purchases.complete(session_id, payment_intent).await? {
                    Some(purchase) => {
                        tracing::info!(
                            event_id = %event.id,
                            purchase_id = purchase.id,
                            "Purchase completed by webhook"
                        );
                        Ok(WebhookOutcome::Completed {
                            purchase_id: purchase.id,
                        })
                    }
                    None => {
                        tracing::debug!(event_id = %event.id, session_id, "No pending purchase for session");
                        Ok(WebhookOutcome::AlreadyHandled)
                    }
                }
            }
            "payment_intent.payment_failed" => {
                let intent_id = object
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ApiError::InvalidBody("payment intent id missing".to_string()))?;
                let target = match purchase_id_from_metadata(object) {
                    Some(id) => PendingPurchase::Id(id),
                    None => PendingPurchase::Intent(intent_id),
                };
                let purchases = self
                    .purchases
                    .close_pending(target, PurchaseStatus::Failed, Some(intent_id))
                    .await?;
                tracing::warn!(event_id = %event.id, intent_id, purchases, "Payment failed");
                Ok(WebhookOutcome::Failed { purchases })
            }
            "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                let session_id = object
                    .get("id")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| ApiError::InvalidBody("session id missing".to_string()))?;
                let payment_intent = object.get("payment_intent").and_then(|v| v.as_str());

                if event.event_type == "checkout.session.expired" {
                    let purchases = self
                        .purchases
                        .close_pending(PendingPurchase::Session(session_id), PurchaseStatus::Cancelled, None)
                        .await?;
                    tracing::info!(event_id = %event.id, session_id, purchases, "Checkout session expired");
                    Ok(WebhookOutcome::Expired { purchases })
                } else {
                    let purchases = self
                        .purchases
                        .close_pending(PendingPurchase::Session(session_id), PurchaseStatus::Failed, payment_intent)
                        .await?;
                    tracing::warn!(event_id = %event.id, session_id, purchases, "Async payment failed");
                    Ok(WebhookOutcome::Failed { purchases })
                }
            }
            other => {
                tracing::debug!(event_id = %event.id, event_type = other, "Ignoring webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }
}

/// `metadata.purchase_id` as set when the session was created
fn purchase_id_from_metadata(object: &serde_json::Value) -> Option<i64> {
    object
        .get("metadata")?
        .get("purchase_id")?
        .as_str()?
        .parse()
        .ok()
}
