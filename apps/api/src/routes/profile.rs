//! - `GET /profile` - the caller's account, physical profile and recent weights
//! - `PUT /profile` - partial update of the account and physical profile

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::progress::WeightLog;
use crate::models::user::{ProfileUpdate, User, UserProfile};
use crate::repositories::UserRepository;
use crate::services::auth::validate_profile_update;

const RECENT_WEIGHT_LOGS: i64 = 10;

#[derive(Clone)]
pub struct ProfileState {
    pub users: UserRepository,
}

pub fn profile_router(state: ProfileState) -> Router {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: User,
    pub profile: Option<UserProfile>,
    pub weight_logs: Vec<WeightLog>,
}

async fn get_profile(
    State(state): State<ProfileState>,
    AuthUser(identity): AuthUser,
) -> ApiResult<Json<ProfileResponse>> {
    let user_id = identity.user_id();

    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user", user_id.to_string()))?;

    let (profile, weight_logs) = tokio::try_join!(
        state.users.find_profile(user_id),
        state.users.recent_weight_logs(user_id, RECENT_WEIGHT_LOGS),
    )?;

    Ok(Json(ProfileResponse {
        success: true,
        user,
        profile,
        weight_logs,
    }))
}

#[derive(Debug, Serialize)]
pub struct ProfileUpdated {
    pub success: bool,
    pub message: &'static str,
    pub user: User,
    pub profile: Option<UserProfile>,
}

async fn update_profile(
    State(state): State<ProfileState>,
    AuthUser(identity): AuthUser,
    payload: Result<Json<ProfileUpdate>, JsonRejection>,
) -> ApiResult<Json<ProfileUpdated>> {
    let Json(update) = payload?;
    validate_profile_update(&update)?;
    let user_id = identity.user_id();

    if let Some(email) = update.email.as_deref() {
        if state.users.email_taken_by_other(email, user_id).await? {
            return Err(ApiError::conflict("user", email.trim()));
        }
    }

    let user = state
        .users
        .update_profile(user_id, &update)
        .await?
        .ok_or_else(|| ApiError::not_found("user", user_id.to_string()))?;
    let profile = state.users.find_profile(user_id).await?;

    tracing::info!(user_id, "Profile updated");

    Ok(Json(ProfileUpdated {
        success: true,
        message: "Profile updated",
        user,
        profile,
    }))
}
