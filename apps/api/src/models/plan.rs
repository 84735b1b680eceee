//! Training plan catalog models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Publication state of a plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "plan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Draft,
    Published,
    Archived,
}

/// A row from training_plans
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrainingPlan {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub base_price_cents: i64,
    pub discount_price_cents: Option<i64>,
    pub status: PlanStatus,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingPlan {
    /// Visible in the public catalog and purchasable
    pub fn is_purchasable(&self) -> bool {
        self.is_active && self.status == PlanStatus::Published
    }
}

/// A purchasable duration/frequency option of a plan
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlanVariant {
    pub id: i64,
    pub plan_id: i64,
    pub name: String,
    pub duration_days: i32,
    pub price_cents: i64,
    pub training_frequency: Option<i32>,
    pub experience_level: Option<String>,
    pub is_active: bool,
}

impl PlanVariant {
    /// Label shown to buyers, e.g. "3x per week - 90 days"
    pub fn label(&self) -> String {
        match self.training_frequency {
            Some(freq) => format!("{}x per week - {} days", freq, self.duration_days),
            None => format!("{} days", self.duration_days),
        }
    }
}

/// A plan with its active variants, as served by the catalog
#[derive(Debug, Clone, Serialize)]
pub struct PlanWithVariants {
    #[serde(flatten)]
    pub plan: TrainingPlan,
    pub variants: Vec<PlanVariant>,
}

/// Catalog sort order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSort {
    #[default]
    Newest,
    Name,
    Price,
}

impl PlanSort {
    pub(crate) fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "p.created_at DESC",
            Self::Name => "p.name ASC",
            Self::Price => "COALESCE(p.discount_price_cents, p.base_price_cents) ASC",
        }
    }
}

/// Admin input for creating or replacing a plan
#[derive(Debug, Clone, Deserialize)]
pub struct PlanInput {
    pub name: String,
    pub description: Option<String>,
    pub short_description: Option<String>,
    pub base_price_cents: i64,
    pub discount_price_cents: Option<i64>,
    #[serde(default)]
    pub status: PlanStatus,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub variants: Vec<VariantInput>,
}

/// Admin input for a plan variant
#[derive(Debug, Clone, Deserialize)]
pub struct VariantInput {
    pub name: Option<String>,
    pub duration_days: i32,
    pub price_cents: i64,
    pub training_frequency: Option<i32>,
    pub experience_level: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_label() {
        let variant = PlanVariant {
            id: 1,
            plan_id: 1,
            name: String::new(),
            duration_days: 90,
            price_cents: 4_999,
            training_frequency: Some(3),
            experience_level: None,
            is_active: true,
        };
        assert_eq!(variant.label(), "3x per week - 90 days");
    }

    #[test]
    fn test_plan_sort_parse() {
        let sort: PlanSort = serde_json::from_str("\"price\"").unwrap();
        assert_eq!(sort, PlanSort::Price);
        assert!(serde_json::from_str::<PlanSort>("\"random\"").is_err());
    }

    #[test]
    fn test_plan_input_defaults() {
        let input: PlanInput =
            serde_json::from_str(r#"{"name":"Strength","base_price_cents":1000}"#).unwrap();
        assert_eq!(input.status, PlanStatus::Draft);
        assert!(input.is_active);
        assert!(input.variants.is_empty());
    }
}
