use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trainhub_payments_client::PaymentsClient;

use trainhub_api::config::Config;
use trainhub_api::error::set_expose_internal_errors;
use trainhub_api::middleware::{AuthGate, SessionCookie, TrustedProxies};
use trainhub_api::repositories::{PlanRepository, PurchaseRepository, UserRepository};
use trainhub_api::services::{
    AttemptStore, AuthService, CheckoutService, CheckoutSettings, HealthService,
    InMemoryAttemptStore, LoginAttemptTracker, Passwords, PgCredentialStore, RedisAttemptStore,
    TokenCodec,
};
use trainhub_api::{build_cors_layer, build_router, AppContext};

/// Connect to Redis and confirm it answers PING
async fn connect_redis(config: &Config) -> Option<redis::Client> {
    let url = config.redis.as_ref()?.connection_url();

    let client = match redis::Client::open(url.as_str()) {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!(error = %e, "Redis client creation failed, using in-memory attempt store");
            return None;
        }
    };

    match client.get_multiplexed_async_connection().await {
        Ok(mut conn) => {
            let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
            if pong.is_ok() {
                tracing::info!("Redis connected for login attempt tracking");
                Some(client)
            } else {
                tracing::warn!("Redis ping failed, using in-memory attempt store");
                None
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis connection failed, using in-memory attempt store");
            None
        }
    }
}

fn build_payments_client(config: &Config) -> anyhow::Result<Option<PaymentsClient>> {
    let Some(key) = config.payments.secret_key.as_deref() else {
        tracing::warn!("STRIPE_SECRET_KEY not set, checkout is disabled");
        return Ok(None);
    };

    let client = match config.payments.api_base.as_deref() {
        Some(base) => PaymentsClient::with_base_url(key, base)?,
        None => PaymentsClient::new(key)?,
    };
    Ok(Some(client))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trainhub_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    set_expose_internal_errors(!config.is_production());

    tracing::info!(
        environment = %config.environment,
        "Starting TrainHub API server on port {}",
        config.port
    );

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(config.database.idle_timeout_secs))
        .connect(&config.database.url)
        .await?;
    tracing::info!("Database connection established");

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Migrations completed successfully");

    let redis_client = connect_redis(&config).await;
    let attempt_store: Arc<dyn AttemptStore> = match &redis_client {
        Some(client) => Arc::new(RedisAttemptStore::new(client.clone())),
        None => Arc::new(InMemoryAttemptStore::new()),
    };
    let tracker = LoginAttemptTracker::new(attempt_store, config.attempt_policy);
    let _sweeper = tracker.spawn_sweeper(config.attempt_sweep_interval);
    tracing::info!(
        max_attempts = config.attempt_policy.max_attempts,
        window_secs = config.attempt_policy.window.as_secs(),
        block_secs = config.attempt_policy.block_duration.as_secs(),
        "Login attempt tracking enabled"
    );
    if config.trusted_proxies.is_empty() {
        tracing::info!("No trusted proxies, client IPs come from the socket address");
    } else {
        tracing::info!(
            proxies = ?config.trusted_proxies,
            "Forwarding headers trusted from configured proxies"
        );
    }

    let codec = Arc::new(TokenCodec::new(&config.jwt_secret)?);
    let passwords = Passwords::new().map_err(|e| anyhow::anyhow!("password hasher: {e}"))?;

    let users = UserRepository::new(pool.clone());
    let credentials = Arc::new(PgCredentialStore::new(users.clone(), passwords));
    let auth_service = AuthService::new(
        credentials,
        codec.clone(),
        tracker,
        config.token_lifetime,
    );

    let checkout = CheckoutService::new(
        build_payments_client(&config)?,
        CheckoutSettings {
            success_url: config.payments.success_url.clone(),
            cancel_url: config.payments.cancel_url.clone(),
            currency: config.payments.currency.clone(),
            webhook_secret: config.payments.webhook_secret.clone(),
        },
        users,
        PlanRepository::new(pool.clone()),
        PurchaseRepository::new(pool.clone()),
    );

    let ctx = AppContext {
        gate: AuthGate::new(codec, config.admin_wallet.clone()),
        auth_service,
        cookie: SessionCookie::new(
            config.cookie_domain.clone(),
            config.cookie_max_age,
            config.cookie_secure,
        ),
        health: HealthService::new(pool.clone(), redis_client),
        checkout: Arc::new(checkout),
        trusted_proxies: TrustedProxies::new(config.trusted_proxies.iter().copied()),
        pool,
    };

    let app = build_router(ctx, build_cors_layer(&config));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // ConnectInfo feeds client IP extraction when no proxy header is present
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
