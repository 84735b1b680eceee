//! Training plan repository
//!
//! Public catalog reads only ever see published, active plans and their
//! active variants. Admin writes replace the variant set of a plan inside
//! the same transaction as the plan row.

use std::collections::HashMap;

use sqlx::{PgPool, Postgres, Transaction};

use super::utils::{contains_pattern, PLAN_COLUMNS, VARIANT_COLUMNS};
use crate::models::plan::{PlanInput, PlanSort, PlanVariant, PlanWithVariants, TrainingPlan};

/// Outcome of an admin plan delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDeletion {
    Deleted,
    NotFound,
    /// The plan has purchases and cannot be removed
    HasPurchases,
}

/// Repository for training plan database operations
#[derive(Clone)]
pub struct PlanRepository {
    pool: PgPool,
}

impl PlanRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Published, active plans with their active variants
    pub async fn list_published(
        &self,
        search: Option<&str>,
        sort: PlanSort,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<PlanWithVariants>, sqlx::Error> {
        let plans = sqlx::query_as::<_, TrainingPlan>(&format!(
            r#"
            SELECT {}
            FROM training_plans p
            WHERE p.status = 'published' AND p.is_active = true
              AND ($1::text IS NULL OR p.name ILIKE $1 OR p.description ILIKE $1)
            ORDER BY {}, p.id
            LIMIT $2 OFFSET $3
            "#,
            PLAN_COLUMNS,
            sort.order_by()
        ))
        .bind(contains_pattern(search))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        self.attach_variants(plans, true).await
    }

    /// A single published, active plan
    pub async fn find_published(&self, plan_id: i64) -> Result<Option<PlanWithVariants>, sqlx::Error> {
        let plan = sqlx::query_as::<_, TrainingPlan>(&format!(
            r#"
            SELECT {}
            FROM training_plans p
            WHERE p.id = $1 AND p.status = 'published' AND p.is_active = true
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        match plan {
            Some(plan) => Ok(self.attach_variants(vec![plan], true).await?.pop()),
            None => Ok(None),
        }
    }

    /// An active variant belonging to `plan_id`
    pub async fn find_active_variant(
        &self,
        plan_id: i64,
        variant_id: i64,
    ) -> Result<Option<PlanVariant>, sqlx::Error> {
        sqlx::query_as::<_, PlanVariant>(&format!(
            "SELECT {} FROM plan_variants WHERE id = $1 AND plan_id = $2 AND is_active = true",
            VARIANT_COLUMNS
        ))
        .bind(variant_id)
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Every plan regardless of status, with all variants
    pub async fn list_all(&self) -> Result<Vec<PlanWithVariants>, sqlx::Error> {
        let plans = sqlx::query_as::<_, TrainingPlan>(&format!(
            "SELECT {} FROM training_plans p ORDER BY p.created_at DESC, p.id",
            PLAN_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        self.attach_variants(plans, false).await
    }

    pub async fn create(&self, input: &PlanInput) -> Result<PlanWithVariants, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let plan = sqlx::query_as::<_, TrainingPlan>(&format!(
            r#"
            INSERT INTO training_plans AS p (
                name, description, short_description,
                base_price_cents, discount_price_cents, status, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.short_description)
        .bind(input.base_price_cents)
        .bind(input.discount_price_cents)
        .bind(input.status)
        .bind(input.is_active)
        .fetch_one(&mut *tx)
        .await?;

        let variants = insert_variants(&mut tx, plan.id, input).await?;
        tx.commit().await?;

        Ok(PlanWithVariants { plan, variants })
    }

    /// Replace a plan and its variant set
    ///
    /// Existing variants are deactivated rather than deleted since purchases
    /// reference them.
    pub async fn update(
        &self,
        plan_id: i64,
        input: &PlanInput,
    ) -> Result<Option<PlanWithVariants>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let plan = sqlx::query_as::<_, TrainingPlan>(&format!(
            r#"
            UPDATE training_plans AS p
            SET name = $2,
                description = $3,
                short_description = $4,
                base_price_cents = $5,
                discount_price_cents = $6,
                status = $7,
                is_active = $8,
                updated_at = NOW()
            WHERE p.id = $1
            RETURNING {}
            "#,
            PLAN_COLUMNS
        ))
        .bind(plan_id)
        .bind(input.name.trim())
        .bind(&input.description)
        .bind(&input.short_description)
        .bind(input.base_price_cents)
        .bind(input.discount_price_cents)
        .bind(input.status)
        .bind(input.is_active)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(plan) = plan else {
            return Ok(None);
        };

        sqlx::query("UPDATE plan_variants SET is_active = false WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;

        let variants = insert_variants(&mut tx, plan_id, input).await?;
        tx.commit().await?;

        Ok(Some(PlanWithVariants { plan, variants }))
    }

    pub async fn delete(&self, plan_id: i64) -> Result<PlanDeletion, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let has_purchases: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM purchases WHERE plan_id = $1)")
                .bind(plan_id)
                .fetch_one(&mut *tx)
                .await?;
        if has_purchases {
            return Ok(PlanDeletion::HasPurchases);
        }

        sqlx::query("DELETE FROM plan_variants WHERE plan_id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM training_plans WHERE id = $1")
            .bind(plan_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(PlanDeletion::NotFound);
        }

        tx.commit().await?;
        Ok(PlanDeletion::Deleted)
    }

    /// Load variants for `plans` in one query and group them per plan
    async fn attach_variants(
        &self,
        plans: Vec<TrainingPlan>,
        active_only: bool,
    ) -> Result<Vec<PlanWithVariants>, sqlx::Error> {
        if plans.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = plans.iter().map(|p| p.id).collect();
        let variants = sqlx::query_as::<_, PlanVariant>(&format!(
            r#"
            SELECT {}
            FROM plan_variants
            WHERE plan_id = ANY($1) AND (is_active = true OR NOT $2)
            ORDER BY plan_id, price_cents, duration_days
            "#,
            VARIANT_COLUMNS
        ))
        .bind(&ids)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        let mut by_plan: HashMap<i64, Vec<PlanVariant>> = HashMap::new();
        for variant in variants {
            by_plan.entry(variant.plan_id).or_default().push(variant);
        }

        Ok(plans
            .into_iter()
            .map(|plan| {
                let variants = by_plan.remove(&plan.id).unwrap_or_default();
                PlanWithVariants { plan, variants }
            })
            .collect())
    }
}

async fn insert_variants(
    tx: &mut Transaction<'_, Postgres>,
    plan_id: i64,
    input: &PlanInput,
) -> Result<Vec<PlanVariant>, sqlx::Error> {
    let mut created = Vec::with_capacity(input.variants.len());
    for variant in &input.variants {
        let name = variant
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("{} days", variant.duration_days));

        let row = sqlx::query_as::<_, PlanVariant>(&format!(
            r#"
            INSERT INTO plan_variants (
                plan_id, name, duration_days, price_cents,
                training_frequency, experience_level, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            VARIANT_COLUMNS
        ))
        .bind(plan_id)
        .bind(name)
        .bind(variant.duration_days)
        .bind(variant.price_cents)
        .bind(variant.training_frequency)
        .bind(&variant.experience_level)
        .bind(variant.is_active)
        .fetch_one(&mut **tx)
        .await?;
        created.push(row);
    }
    Ok(created)
}
