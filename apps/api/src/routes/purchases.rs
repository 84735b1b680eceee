//! Purchase endpoints for the authenticated buyer
//!
//! - `POST /purchases` - Start a checkout for a plan variant
//! - `GET /purchases` - The caller's purchases
//! - `GET /purchases/verify?session_id=` - Reconcile a checkout after redirect

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::purchase::{CreatePurchaseRequest, Purchase, PurchaseStatus, PurchaseSummary};
use crate::repositories::PurchaseRepository;
use crate::routes::pagination::Pagination;
use crate::services::CheckoutService;

#[derive(Clone)]
pub struct PurchasesState {
    pub checkout: Arc<CheckoutService>,
    pub purchases: PurchaseRepository,
}

pub fn purchases_router(state: PurchasesState) -> Router {
    Router::new()
        .route("/purchases", get(list_purchases).post(create_purchase))
        .route("/purchases/verify", get(verify_purchase))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct PurchaseListQuery {
    pub status: Option<PurchaseStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseListResponse {
    pub success: bool,
    pub purchases: Vec<PurchaseSummary>,
}

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub success: bool,
    pub purchase: Purchase,
}

async fn create_purchase(
    State(state): State<PurchasesState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<CreatePurchaseRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;

    let started = state
        .checkout
        .start_checkout(identity.user_id(), request.plan_id, request.variant_id)
        .await?;

    Ok((StatusCode::CREATED, Json(started)))
}

async fn list_purchases(
    State(state): State<PurchasesState>,
    AuthUser(identity): AuthUser,
    query: Result<Query<PurchaseListQuery>, QueryRejection>,
) -> ApiResult<Json<PurchaseListResponse>> {
    let Query(query) = query?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve()?;

    let purchases = state
        .purchases
        .list_for_user(identity.user_id(), query.status, limit, offset)
        .await?;

    Ok(Json(PurchaseListResponse {
        success: true,
        purchases,
    }))
}

async fn verify_purchase(
    State(state): State<PurchasesState>,
    AuthUser(identity): AuthUser,
    query: Result<Query<VerifyQuery>, QueryRejection>,
) -> ApiResult<Json<PurchaseResponse>> {
    let Query(query) = query?;
    let session_id = query
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(ApiError::MissingField("session_id"))?;

    let purchase = state
        .checkout
        .verify_session(identity.user_id(), session_id)
        .await?;

    Ok(Json(PurchaseResponse {
        success: true,
        purchase,
    }))
}
