//! Admin endpoints
//!
//! Admin (`AdminUser`):
//! - `GET /admin/verify`, `GET /admin/stats`
//!
//! Any authenticated caller:
//! - `POST /admin/log` - append an audit entry
//!
//! Super admin (`SuperAdminUser`):
//! - `GET /admin/users`, `PUT|DELETE /admin/users/:id`
//! - `GET /admin/sales`, `PUT /admin/sales/:id`
//! - `GET|POST /admin/plans`, `PUT|DELETE /admin/plans/:id`
//! - `GET /admin/logs`, `POST /admin/action`
//!
//! Every mutation is recorded in the audit log.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, ApiResult};
use crate::middleware::{AdminUser, AuthUser, ClientIp, RequestIdentity, SuperAdminUser};
use crate::models::admin::{AdminAction, NewAdminLog};
use crate::models::plan::PlanInput;
use crate::models::purchase::PurchaseStatus;
use crate::repositories::admin::LogFilter;
use crate::repositories::plan::PlanDeletion;
use crate::repositories::purchase::SalesFilter;
use crate::repositories::{AdminRepository, PlanRepository, PurchaseRepository};
use crate::routes::pagination::{PageQuery, Pagination};

const MAX_DAYS_TO_KEEP: i32 = 3650;

#[derive(Clone)]
pub struct AdminState {
    pub admin: AdminRepository,
    pub plans: PlanRepository,
    pub purchases: PurchaseRepository,
}

pub fn admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/verify", get(verify))
        .route("/admin/stats", get(stats))
        .route("/admin/log", post(append_log))
        .route("/admin/users", get(list_users))
        .route("/admin/users/:id", put(update_user).delete(delete_user))
        .route("/admin/sales", get(list_sales))
        .route("/admin/sales/:id", put(update_sale))
        .route("/admin/plans", get(list_plans).post(create_plan))
        .route("/admin/plans/:id", put(update_plan).delete(delete_plan))
        .route("/admin/logs", get(list_logs))
        .route("/admin/action", post(run_action))
        .with_state(state)
}

/// Who performed an admin request, for the audit log
struct Actor {
    user_id: String,
    ip: String,
    user_agent: Option<String>,
}

impl Actor {
    fn new(identity: &RequestIdentity, ip: String, headers: &HeaderMap) -> Self {
        Self {
            user_id: identity.user_id().to_string(),
            ip,
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
        }
    }
}

impl AdminState {
    /// Record an audit entry; failures are logged and never fail the request
    async fn audit(&self, actor: &Actor, action: &str, details: Value) {
        let entry = NewAdminLog {
            user_id: Some(actor.user_id.clone()),
            action: action.to_string(),
            method: "api".to_string(),
            ip_address: Some(actor.ip.clone()),
            user_agent: actor.user_agent.clone(),
            details,
        };
        match self.admin.insert_log(&entry).await {
            Ok(_) => tracing::info!(user_id = %actor.user_id, action, "Admin action recorded"),
            Err(e) => tracing::warn!(action, error = %e, "Failed to record admin action"),
        }
    }
}

// ========== Request/Response Types ==========

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub user_id: i64,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogRequest {
    pub action: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UserListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UserUpdate {
    pub is_active: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct SalesQuery {
    pub status: Option<PurchaseStatus>,
    pub plan_id: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SaleUpdate {
    pub status: PurchaseStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

fn ok(data: impl Serialize) -> ApiResult<Json<Value>> {
    let Value::Object(extra) = serde_json::to_value(data)? else {
        return Err(ApiError::Serialization(<serde_json::Error as serde::ser::Error>::custom(
            "admin response payload is not an object",
        )));
    };
    let mut body = serde_json::Map::from_iter([("success".to_string(), Value::Bool(true))]);
    body.extend(extra);
    Ok(Json(Value::Object(body)))
}

// ========== Admin ==========

async fn verify(AdminUser(identity): AdminUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        success: true,
        user_id: identity.user_id(),
        is_admin: identity.is_admin(),
        is_super_admin: identity.is_super_admin,
    })
}

async fn stats(
    State(state): State<AdminState>,
    AdminUser(_): AdminUser,
) -> ApiResult<Json<Value>> {
    let stats = state.admin.stats().await?;
    ok(json!({ "stats": stats }))
}

/// Any authenticated user may append to the audit log
async fn append_log(
    State(state): State<AdminState>,
    AuthUser(identity): AuthUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    payload: Result<Json<LogRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let action = request.action.trim();
    if action.is_empty() {
        return Err(ApiError::MissingField("action"));
    }

    let actor = Actor::new(&identity, ip, &headers);
    let entry = NewAdminLog {
        user_id: Some(actor.user_id),
        action: action.to_string(),
        method: request.method.unwrap_or_else(|| "api".to_string()),
        ip_address: Some(actor.ip),
        user_agent: actor.user_agent,
        details: request.details.unwrap_or_else(|| json!({})),
    };
    let id = state.admin.insert_log(&entry).await?;

    Ok((StatusCode::CREATED, ok(json!({ "id": id }))?))
}

// ========== Users ==========

async fn list_users(
    State(state): State<AdminState>,
    SuperAdminUser(_): SuperAdminUser,
    query: Result<Query<UserListQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (limit, offset) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;

    let search = query.search.as_deref();
    let (users, total) = tokio::try_join!(
        state.admin.list_users(search, limit, offset),
        state.admin.count_users(search),
    )?;

    ok(json!({ "users": users, "total": total, "limit": limit, "offset": offset }))
}

async fn update_user(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
    payload: Result<Json<UserUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(update) = payload?;
    if user_id == identity.user_id() && !update.is_active {
        return Err(ApiError::ValidationError(
            "cannot deactivate your own account".to_string(),
        ));
    }

    if !state.admin.set_user_active(user_id, update.is_active).await? {
        return Err(ApiError::not_found("user", user_id.to_string()));
    }

    let actor = Actor::new(&identity, ip, &headers);
    state
        .audit(
            &actor,
            "update_user",
            json!({ "target_user_id": user_id, "is_active": update.is_active }),
        )
        .await;

    ok(json!({ "message": "User updated" }))
}

async fn delete_user(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    if user_id == identity.user_id() {
        return Err(ApiError::ValidationError(
            "cannot delete your own account".to_string(),
        ));
    }

    if !state.admin.delete_user(user_id).await? {
        return Err(ApiError::not_found("user", user_id.to_string()));
    }

    let actor = Actor::new(&identity, ip, &headers);
    state
        .audit(&actor, "delete_user", json!({ "target_user_id": user_id }))
        .await;

    ok(json!({ "message": "User deleted" }))
}

// ========== Sales ==========

async fn list_sales(
    State(state): State<AdminState>,
    SuperAdminUser(_): SuperAdminUser,
    query: Result<Query<SalesQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve()?;

    let filter = SalesFilter {
        status: query.status,
        plan_id: query.plan_id,
        search: query.search,
    };
    let sales = state.purchases.list_sales(&filter, limit, offset).await?;

    ok(json!({ "sales": sales, "limit": limit, "offset": offset }))
}

async fn update_sale(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(purchase_id): Path<i64>,
    payload: Result<Json<SaleUpdate>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(update) = payload?;

    let purchase = state
        .purchases
        .update_status(purchase_id, update.status)
        .await?
        .ok_or_else(|| ApiError::not_found("purchase", purchase_id.to_string()))?;

    let actor = Actor::new(&identity, ip, &headers);
    state
        .audit(
            &actor,
            "update_sale",
            json!({ "purchase_id": purchase_id, "status": update.status }),
        )
        .await;

    ok(json!({ "purchase": purchase }))
}

// ========== Plans ==========

fn validate_plan(input: &PlanInput) -> ApiResult<()> {
    if input.name.trim().is_empty() {
        return Err(ApiError::MissingField("name"));
    }
    if input.base_price_cents < 0 {
        return Err(ApiError::ValidationError(
            "base price must not be negative".to_string(),
        ));
    }
    if let Some(discount) = input.discount_price_cents {
        if discount < 0 || discount > input.base_price_cents {
            return Err(ApiError::ValidationError(
                "discount price must be between 0 and the base price".to_string(),
            ));
        }
    }
    for variant in &input.variants {
        if variant.duration_days <= 0 || variant.price_cents <= 0 {
            return Err(ApiError::ValidationError(
                "variant duration and price must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

async fn list_plans(
    State(state): State<AdminState>,
    SuperAdminUser(_): SuperAdminUser,
) -> ApiResult<Json<Value>> {
    let plans = state.plans.list_all().await?;
    ok(json!({ "plans": plans }))
}

async fn create_plan(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    payload: Result<Json<PlanInput>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(input) = payload?;
    validate_plan(&input)?;

    let plan = state.plans.create(&input).await?;

    let actor = Actor::new(&identity, ip, &headers);
    state
        .audit(
            &actor,
            "create_plan",
            json!({ "plan_id": plan.plan.id, "name": plan.plan.name }),
        )
        .await;

    Ok((StatusCode::CREATED, ok(json!({ "plan": plan }))?))
}

async fn update_plan(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(plan_id): Path<i64>,
    payload: Result<Json<PlanInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(input) = payload?;
    validate_plan(&input)?;

    let plan = state
        .plans
        .update(plan_id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found("plan", plan_id.to_string()))?;

    let actor = Actor::new(&identity, ip, &headers);
    state
        .audit(&actor, "update_plan", json!({ "plan_id": plan_id }))
        .await;

    ok(json!({ "plan": plan }))
}

async fn delete_plan(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    Path(plan_id): Path<i64>,
) -> ApiResult<Json<Value>> {
    match state.plans.delete(plan_id).await? {
        PlanDeletion::Deleted => {}
        PlanDeletion::NotFound => return Err(ApiError::not_found("plan", plan_id.to_string())),
        PlanDeletion::HasPurchases => {
            return Err(ApiError::conflict(
                "purchases for plan",
                plan_id.to_string(),
            ))
        }
    }

    let actor = Actor::new(&identity, ip, &headers);
    state
        .audit(&actor, "delete_plan", json!({ "plan_id": plan_id }))
        .await;

    ok(json!({ "message": "Plan deleted" }))
}

// ========== Logs & maintenance ==========

async fn list_logs(
    State(state): State<AdminState>,
    SuperAdminUser(_): SuperAdminUser,
    query: Result<Query<LogsQuery>, QueryRejection>,
) -> ApiResult<Json<Value>> {
    let Query(query) = query?;
    let (limit, offset) = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .resolve()?;

    let filter = LogFilter {
        action: query.action,
        user_id: query.user_id,
        start_date: query.start_date,
        end_date: query.end_date,
    };
    let logs = state.admin.list_logs(&filter, limit, offset).await?;

    ok(json!({ "logs": logs, "limit": limit, "offset": offset }))
}

async fn run_action(
    State(state): State<AdminState>,
    SuperAdminUser(identity): SuperAdminUser,
    ClientIp(ip): ClientIp,
    headers: HeaderMap,
    payload: Result<Json<AdminAction>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(action) = payload?;
    let actor = Actor::new(&identity, ip, &headers);

    let result = match &action {
        AdminAction::ClearLogs { days_to_keep } => {
            if !(0..=MAX_DAYS_TO_KEEP).contains(days_to_keep) {
                return Err(ApiError::ValidationError(format!(
                    "days_to_keep must be between 0 and {}",
                    MAX_DAYS_TO_KEEP
                )));
            }
            let deleted = state.admin.clear_logs(*days_to_keep).await?;
            json!({ "deleted": deleted, "days_to_keep": days_to_keep })
        }
        AdminAction::CheckDatabase => {
            let tables = state.admin.table_counts().await?;
            json!({ "tables": tables })
        }
    };

    state.audit(&actor, action.name(), result.clone()).await;

    ok(json!({ "action": action.name(), "result": result }))
}
