//! Public training plan catalog
//!
//! - `GET /plans` - Published plans with their active variants
//! - `GET /plans/:id` - A single published plan

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::models::plan::{PlanSort, PlanWithVariants};
use crate::repositories::PlanRepository;
use crate::routes::pagination::Pagination;

#[derive(Clone)]
pub struct PlansState {
    pub plans: PlanRepository,
}

pub fn plans_router(state: PlansState) -> Router {
    Router::new()
        .route("/plans", get(list_plans))
        .route("/plans/:id", get(get_plan))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: PlanSort,
}

#[derive(Debug, Serialize)]
pub struct PlanListResponse {
    pub success: bool,
    pub plans: Vec<PlanWithVariants>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub success: bool,
    pub plan: PlanWithVariants,
}

async fn list_plans(
    State(state): State<PlansState>,
    query: Result<Query<PlanListQuery>, QueryRejection>,
) -> ApiResult<Json<PlanListResponse>> {
    let Query(query) = query?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve()?;

    let plans = state
        .plans
        .list_published(query.search.as_deref(), query.sort_by, limit, offset)
        .await?;

    Ok(Json(PlanListResponse {
        success: true,
        plans,
        limit,
        offset,
    }))
}

async fn get_plan(
    State(state): State<PlansState>,
    Path(plan_id): Path<i64>,
) -> ApiResult<Json<PlanResponse>> {
    let plan = state
        .plans
        .find_published(plan_id)
        .await?
        .ok_or_else(|| ApiError::not_found("plan", plan_id.to_string()))?;

    Ok(Json(PlanResponse {
        success: true,
        plan,
    }))
}
