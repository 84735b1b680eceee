//! Progress tracking endpoints, scoped to the authenticated user
//!
//! - `GET|POST /progress/weight`, `DELETE /progress/weight/:id`
//! - `GET|POST /progress/measurements`, `DELETE /progress/measurements/:id`
//! - `GET|POST /progress/photos`, `PUT|DELETE /progress/photos/:id`
//! - `GET|POST /progress/goals`, `PUT|DELETE /progress/goals/:id`

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::progress::{
    GoalUpdate, MeasurementType, NewGoal, NewMeasurement, NewProgressPhoto, NewWeightLog,
    PhotoType, PhotoUpdate, MAX_PHOTO_PATH_LEN, MAX_WEIGHT_KG,
};
use crate::repositories::progress::DateRange;
use crate::repositories::ProgressRepository;
use crate::routes::pagination::Pagination;

#[derive(Clone)]
pub struct ProgressState {
    pub progress: ProgressRepository,
}

pub fn progress_router(state: ProgressState) -> Router {
    Router::new()
        .route("/progress/weight", get(list_weights).post(log_weight))
        .route("/progress/weight/:id", delete(delete_weight))
        .route(
            "/progress/measurements",
            get(list_measurements).post(add_measurement),
        )
        .route("/progress/measurements/:id", delete(delete_measurement))
        .route("/progress/photos", get(list_photos).post(add_photo))
        .route("/progress/photos/:id", put(update_photo).delete(delete_photo))
        .route("/progress/goals", get(list_goals).post(add_goal))
        .route("/progress/goals/:id", put(update_goal).delete(delete_goal))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct WeightListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MeasurementListQuery {
    pub measurement_type: Option<MeasurementType>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PhotoListQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub photo_type: Option<PhotoType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct PhotoListing<T: Serialize> {
    success: bool,
    items: Vec<T>,
    total: i64,
    limit: i64,
    offset: i64,
}

#[derive(Debug, Serialize)]
struct PhotoDeleted {
    success: bool,
    message: &'static str,
    photo_path: String,
}

#[derive(Debug, Serialize)]
struct Listing<T: Serialize> {
    success: bool,
    items: Vec<T>,
}

#[derive(Debug, Serialize)]
struct Created<T: Serialize> {
    success: bool,
    item: T,
}

#[derive(Debug, Serialize)]
struct Deleted {
    success: bool,
    message: &'static str,
}

fn created<T: Serialize>(item: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(Created {
            success: true,
            item,
        }),
    )
}

fn deleted(found: bool, resource_type: &'static str, id: i64) -> ApiResult<Json<Deleted>> {
    if !found {
        return Err(ApiError::not_found(resource_type, id.to_string()));
    }
    Ok(Json(Deleted {
        success: true,
        message: "Deleted",
    }))
}

// ==================== Weight ====================

async fn log_weight(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<NewWeightLog>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(entry) = payload?;
    if !(entry.weight > 0.0 && entry.weight <= MAX_WEIGHT_KG) {
        return Err(ApiError::ValidationError(
            "weight must be greater than 0 and at most 500 kg".to_string(),
        ));
    }

    let log = state
        .progress
        .insert_weight(identity.user_id(), &entry)
        .await?;
    Ok(created(log))
}

async fn list_weights(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    query: Result<Query<WeightListQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve()?;

    let items = state
        .progress
        .list_weights(
            identity.user_id(),
            DateRange {
                from: query.from,
                to: query.to,
            },
            limit,
            offset,
        )
        .await?;
    Ok(Json(Listing {
        success: true,
        items,
    }))
}

async fn delete_weight(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let found = state.progress.delete_weight(identity.user_id(), id).await?;
    deleted(found, "weight log", id)
}

// ==================== Measurements ====================

async fn add_measurement(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<NewMeasurement>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(entry) = payload?;
    if entry.value <= 0.0 {
        return Err(ApiError::ValidationError(
            "measurement value must be positive".to_string(),
        ));
    }

    let measurement = state
        .progress
        .insert_measurement(identity.user_id(), &entry)
        .await?;
    Ok(created(measurement))
}

async fn list_measurements(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    query: Result<Query<MeasurementListQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let items = state
        .progress
        .list_measurements(
            identity.user_id(),
            query.measurement_type.map(MeasurementType::as_str),
        )
        .await?;
    Ok(Json(Listing {
        success: true,
        items,
    }))
}

async fn delete_measurement(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let found = state
        .progress
        .delete_measurement(identity.user_id(), id)
        .await?;
    deleted(found, "measurement", id)
}

// ==================== Photos ====================

async fn add_photo(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<NewProgressPhoto>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(photo) = payload?;
    let path = photo.photo_path.trim();
    if path.is_empty() {
        return Err(ApiError::MissingField("photo_path"));
    }
    if path.len() > MAX_PHOTO_PATH_LEN {
        return Err(ApiError::ValidationError(format!(
            "photo_path must be at most {} bytes",
            MAX_PHOTO_PATH_LEN
        )));
    }

    let photo = state.progress.insert_photo(identity.user_id(), &photo).await?;
    Ok(created(photo))
}

async fn list_photos(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    query: Result<Query<PhotoListQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve()?;

    let (items, total) = state
        .progress
        .list_photos(
            identity.user_id(),
            DateRange {
                from: query.from,
                to: query.to,
            },
            query.photo_type,
            limit,
            offset,
        )
        .await?;
    Ok(Json(PhotoListing {
        success: true,
        items,
        total,
        limit,
        offset,
    }))
}

async fn update_photo(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    payload: Result<Json<PhotoUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = payload?;
    if update.is_empty() {
        return Err(ApiError::ValidationError("no fields to update".to_string()));
    }

    let photo = state
        .progress
        .update_photo(identity.user_id(), id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("progress photo", id.to_string()))?;
    Ok(Json(Created {
        success: true,
        item: photo,
    }))
}

async fn delete_photo(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let photo_path = state
        .progress
        .delete_photo(identity.user_id(), id)
        .await?
        .ok_or_else(|| ApiError::not_found("progress photo", id.to_string()))?;
    Ok(Json(PhotoDeleted {
        success: true,
        message: "Deleted",
        photo_path,
    }))
}

// ==================== Goals ====================

async fn add_goal(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<NewGoal>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(goal) = payload?;
    if goal.goal_type.trim().is_empty() {
        return Err(ApiError::MissingField("goal_type"));
    }

    let goal = state.progress.insert_goal(identity.user_id(), &goal).await?;
    Ok(created(goal))
}

async fn list_goals(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<impl IntoResponse> {
    let items = state.progress.list_goals(identity.user_id()).await?;
    Ok(Json(Listing {
        success: true,
        items,
    }))
}

async fn update_goal(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
    payload: Result<Json<GoalUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = payload?;
    if update.is_empty() {
        return Err(ApiError::ValidationError("no fields to update".to_string()));
    }

    let goal = state
        .progress
        .update_goal(identity.user_id(), id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("goal", id.to_string()))?;
    Ok(Json(Created {
        success: true,
        item: goal,
    }))
}

async fn delete_goal(
    State(state): State<ProgressState>,
    AuthUser(identity): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let found = state.progress.delete_goal(identity.user_id(), id).await?;
    deleted(found, "goal", id)
}
