//! Purchase repository
//!
//! The duplicate check and the pending insert run on a caller-owned
//! connection so they commit together.

use sqlx::{PgConnection, PgPool};

use super::utils::{contains_pattern, PURCHASE_COLUMNS};
use crate::models::purchase::{Purchase, PurchaseStatus, PurchaseSummary};

const SUMMARY_SELECT: &str = r#"
    SELECT
        pu.id, pu.user_id, u.username, pu.plan_id, p.name AS plan_name,
        pu.variant_id, v.duration_days, pu.amount_cents, pu.status,
        pu.access_granted, pu.purchase_date
    FROM purchases pu
    JOIN users u ON u.id = pu.user_id
    JOIN training_plans p ON p.id = pu.plan_id
    JOIN plan_variants v ON v.id = pu.variant_id
"#;

/// How a processor event points at a pending purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingPurchase<'a> {
    Id(i64),
    Session(&'a str),
    Intent(&'a str),
}

/// Filters for the admin sales listing
#[derive(Debug, Clone, Default)]
pub struct SalesFilter {
    pub status: Option<PurchaseStatus>,
    pub plan_id: Option<i64>,
    /// Matches username or email
    pub search: Option<String>,
}

/// Repository for purchase database operations
#[derive(Clone)]
pub struct PurchaseRepository {
    pool: PgPool,
}

impl PurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Whether the user already owns the plan
    pub async fn has_completed(
        conn: &mut PgConnection,
        user_id: i64,
        plan_id: i64,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM purchases
                WHERE user_id = $1 AND plan_id = $2 AND status = 'completed'
            )
            "#,
        )
        .bind(user_id)
        .bind(plan_id)
        .fetch_one(conn)
        .await
    }

    pub async fn insert_pending(
        conn: &mut PgConnection,
        user_id: i64,
        plan_id: i64,
        variant_id: i64,
        amount_cents: i64,
    ) -> Result<Purchase, sqlx::Error> {
        sqlx::query_as::<_, Purchase>(&format!(
            r#"
            INSERT INTO purchases (user_id, plan_id, variant_id, amount_cents, status)
            VALUES ($1, $2, $3, $4, 'pending')
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(user_id)
        .bind(plan_id)
        .bind(variant_id)
        .bind(amount_cents)
        .fetch_one(conn)
        .await
    }

    pub async fn attach_session(&self, purchase_id: i64, session_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE purchases SET checkout_session_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(purchase_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a pending purchase whose checkout could not be opened
    pub async fn discard_pending(&self, purchase_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM purchases WHERE id = $1 AND status = 'pending'")
            .bind(purchase_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn find_by_session_for_user(
        &self,
        user_id: i64,
        session_id: &str,
    ) -> Result<Option<Purchase>, sqlx::Error> {
        sqlx::query_as::<_, Purchase>(&format!(
            "SELECT {} FROM purchases WHERE checkout_session_id = $1 AND user_id = $2",
            PURCHASE_COLUMNS
        ))
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Complete the pending purchase for a checkout session and grant access
    ///
    /// Returns `None` when no pending purchase matches, which makes repeated
    /// webhook deliveries a no-op.
    pub async fn complete(
        &self,
        session_id: &str,
        payment_intent_id: Option<&str>,
    ) -> Result<Option<Purchase>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let purchase = sqlx::query_as::<_, Purchase>(&format!(
            r#"
            UPDATE purchases
            SET status = 'completed',
                payment_intent_id = COALESCE($2, payment_intent_id),
                access_granted = true,
                access_granted_at = NOW(),
                updated_at = NOW()
            WHERE checkout_session_id = $1 AND status = 'pending'
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(session_id)
        .bind(payment_intent_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(purchase) = purchase else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO activity_logs (user_id, action, description)
            VALUES ($1, 'purchase_completed', $2)
            "#,
        )
        .bind(purchase.user_id)
        .bind(format!(
            "Purchase {} of plan {} completed",
            purchase.id, purchase.plan_id
        ))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(purchase))
    }

    /// Move a pending purchase to `failed` or `cancelled`
    ///
    /// `payment_intent_id` is recorded when the event carries one. Purchases
    /// that already left `pending` are untouched, so redeliveries are no-ops.
    pub async fn close_pending(
        &self,
        target: PendingPurchase<'_>,
        status: PurchaseStatus,
        payment_intent_id: Option<&str>,
    ) -> Result<u64, sqlx::Error> {
        let (id, session_id, intent_id) = match target {
            PendingPurchase::Id(id) => (Some(id), None, None),
            PendingPurchase::Session(session_id) => (None, Some(session_id), None),
            PendingPurchase::Intent(intent_id) => (None, None, Some(intent_id)),
        };

        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET status = $4,
                payment_intent_id = COALESCE($5, payment_intent_id),
                updated_at = NOW()
            WHERE status = 'pending'
              AND (id = $1 OR checkout_session_id = $2 OR payment_intent_id = $3)
            "#,
        )
        .bind(id)
        .bind(session_id)
        .bind(intent_id)
        .bind(status)
        .bind(payment_intent_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_for_user(
        &self,
        user_id: i64,
        status: Option<PurchaseStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchaseSummary>, sqlx::Error> {
        sqlx::query_as::<_, PurchaseSummary>(&format!(
            r#"
            {}
            WHERE pu.user_id = $1 AND ($2::purchase_status IS NULL OR pu.status = $2)
            ORDER BY pu.purchase_date DESC, pu.id DESC
            LIMIT $3 OFFSET $4
            "#,
            SUMMARY_SELECT
        ))
        .bind(user_id)
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn list_sales(
        &self,
        filter: &SalesFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PurchaseSummary>, sqlx::Error> {
        sqlx::query_as::<_, PurchaseSummary>(&format!(
            r#"
            {}
            WHERE ($1::purchase_status IS NULL OR pu.status = $1)
              AND ($2::bigint IS NULL OR pu.plan_id = $2)
              AND ($3::text IS NULL OR u.username ILIKE $3 OR u.email ILIKE $3)
            ORDER BY pu.purchase_date DESC, pu.id DESC
            LIMIT $4 OFFSET $5
            "#,
            SUMMARY_SELECT
        ))
        .bind(filter.status)
        .bind(filter.plan_id)
        .bind(contains_pattern(filter.search.as_deref()))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Admin status change; access follows the status
    pub async fn update_status(
        &self,
        purchase_id: i64,
        status: PurchaseStatus,
    ) -> Result<Option<Purchase>, sqlx::Error> {
        let granted = status == PurchaseStatus::Completed;
        sqlx::query_as::<_, Purchase>(&format!(
            r#"
            UPDATE purchases
            SET status = $2,
                access_granted = $3,
                access_granted_at = CASE WHEN $3 THEN COALESCE(access_granted_at, NOW()) ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            PURCHASE_COLUMNS
        ))
        .bind(purchase_id)
        .bind(status)
        .bind(granted)
        .fetch_optional(&self.pool)
        .await
    }
}
