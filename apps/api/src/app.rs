//! Router assembly
//!
//! Public routes (auth, plan catalog, webhooks) and gated routes (profile,
//! purchases, progress, admin) are merged under `/api`. The gate runs as a
//! `route_layer`, so unknown paths still answer 404 instead of 401.

use std::sync::Arc;

use axum::{
    http::{header, Method},
    middleware::from_fn_with_state,
    routing::get,
    Extension, Router,
};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::middleware::{require_auth, AuthGate, SessionCookie, TrustedProxies};
use crate::repositories::{
    AdminRepository, PlanRepository, ProgressRepository, PurchaseRepository, UserRepository,
};
use crate::routes::{
    admin_router, auth_router, health_router, plans_router, profile_router, progress_router,
    purchases_router, webhook_router, AdminState, AuthState, HealthState, PlansState,
    ProfileState, ProgressState, PurchasesState, WebhookState,
};
use crate::services::{AuthService, CheckoutService, HealthService};

/// Everything the router needs, built once at startup
#[derive(Clone)]
pub struct AppContext {
    pub pool: PgPool,
    pub gate: AuthGate,
    pub auth_service: AuthService,
    pub cookie: SessionCookie,
    pub health: HealthService,
    pub checkout: Arc<CheckoutService>,
    /// Proxies allowed to report the client IP
    pub trusted_proxies: TrustedProxies,
}

/// Build the full application router
pub fn build_router(ctx: AppContext, cors: CorsLayer) -> Router {
    let users = UserRepository::new(ctx.pool.clone());
    let plans = PlanRepository::new(ctx.pool.clone());
    let purchases = PurchaseRepository::new(ctx.pool.clone());
    let progress = ProgressRepository::new(ctx.pool.clone());
    let admin = AdminRepository::new(ctx.pool.clone());

    let public = Router::new()
        .merge(auth_router(AuthState::new(ctx.auth_service, ctx.cookie)))
        .merge(plans_router(PlansState {
            plans: plans.clone(),
        }))
        .merge(webhook_router(WebhookState {
            checkout: ctx.checkout.clone(),
        }));

    let protected = Router::new()
        .merge(profile_router(ProfileState { users }))
        .merge(purchases_router(PurchasesState {
            checkout: ctx.checkout,
            purchases: purchases.clone(),
        }))
        .merge(progress_router(ProgressState { progress }))
        .merge(admin_router(AdminState {
            admin,
            plans,
            purchases,
        }))
        .route_layer(from_fn_with_state(ctx.gate, require_auth));

    Router::new()
        .route("/", get(root))
        .nest("/health", health_router(HealthState::new(ctx.health)))
        .nest("/api", public.merge(protected))
        .layer(Extension(ctx.trusted_proxies))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Build the CORS layer based on configuration.
///
/// In production mode:
/// - If `CORS_ORIGINS` is set, only those origins are allowed
/// - If `CORS_ORIGINS` is not set, CORS requests are rejected (no origins allowed)
///
/// In development mode:
/// - If `CORS_ORIGINS` is set, those origins are used
/// - If `CORS_ORIGINS` is not set, permissive CORS is used for convenience
pub fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<_> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                return CorsLayer::new();
            }

            tracing::info!(
                "CORS configured with {} allowed origin(s): {:?}",
                allowed_origins.len(),
                origins
            );
            // Credentials are required for the session cookie
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::PATCH,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    header::AUTHORIZATION,
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::ORIGIN,
                ])
                .expose_headers([
                    header::RETRY_AFTER,
                    header::HeaderName::from_static("x-ratelimit-limit"),
                    header::HeaderName::from_static("x-ratelimit-remaining"),
                ])
                .allow_credentials(true)
                .max_age(std::time::Duration::from_secs(3600))
        }
        _ if config.is_production() => {
            tracing::warn!(
                "CORS_ORIGINS not configured in production mode. \
                 CORS requests will be rejected. Set CORS_ORIGINS to allow cross-origin requests."
            );
            CorsLayer::new()
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

async fn root() -> &'static str {
    "TrainHub API"
}
