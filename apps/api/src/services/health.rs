//! Health checks for the API's backing services
//!
//! - PostgreSQL (required)
//! - Redis (optional, only when a shared attempt store is configured)

use serde::Serialize;
use sqlx::PgPool;
use std::time::{Duration, Instant};

/// Status of an individual dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    /// Optional dependency that is not configured
    Skipped,
}

/// Result of a single dependency check
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: &'static str,
    pub status: ServiceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceHealth {
    pub fn healthy(name: &'static str, response_time: Duration) -> Self {
        Self {
            name,
            status: ServiceStatus::Healthy,
            response_time_ms: Some(response_time.as_millis() as u64),
            error: None,
            details: None,
        }
    }

    pub fn healthy_with_details(
        name: &'static str,
        response_time: Duration,
        details: serde_json::Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::healthy(name, response_time)
        }
    }

    pub fn unhealthy(name: &'static str, error: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Unhealthy,
            response_time_ms: None,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn unhealthy_with_time(
        name: &'static str,
        error: impl Into<String>,
        response_time: Duration,
    ) -> Self {
        Self {
            response_time_ms: Some(response_time.as_millis() as u64),
            ..Self::unhealthy(name, error)
        }
    }

    pub fn skipped(name: &'static str, reason: impl Into<String>) -> Self {
        Self {
            name,
            status: ServiceStatus::Skipped,
            response_time_ms: None,
            error: None,
            details: Some(serde_json::json!({ "reason": reason.into() })),
        }
    }
}

/// Aggregated readiness response
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResponse {
    /// Healthy only if every non-skipped dependency is healthy
    pub status: ServiceStatus,
    pub services: Vec<ServiceHealth>,
    pub total_time_ms: u64,
    pub version: &'static str,
}

impl HealthCheckResponse {
    pub fn new(services: Vec<ServiceHealth>, total_time: Duration) -> Self {
        let status = if services
            .iter()
            .all(|s| s.status != ServiceStatus::Unhealthy)
        {
            ServiceStatus::Healthy
        } else {
            ServiceStatus::Unhealthy
        };

        Self {
            status,
            services,
            total_time_ms: total_time.as_millis() as u64,
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == ServiceStatus::Healthy
    }
}

/// Checks the dependencies the running server actually holds handles to
#[derive(Clone)]
pub struct HealthService {
    pool: PgPool,
    redis: Option<redis::Client>,
}

impl HealthService {
    pub fn new(pool: PgPool, redis: Option<redis::Client>) -> Self {
        Self { pool, redis }
    }

    /// Run `SELECT 1` on a pooled connection
    pub async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => {
                let elapsed = start.elapsed();
                let version = sqlx::query_scalar::<_, String>("SELECT version()")
                    .fetch_optional(&self.pool)
                    .await
                    .ok()
                    .flatten();

                match version {
                    Some(v) => ServiceHealth::healthy_with_details(
                        "database",
                        elapsed,
                        serde_json::json!({ "version": v, "pool_size": self.pool.size() }),
                    ),
                    None => ServiceHealth::healthy("database", elapsed),
                }
            }
            Err(e) => ServiceHealth::unhealthy_with_time(
                "database",
                format!("Query failed: {}", e),
                start.elapsed(),
            ),
        }
    }

    /// PING Redis if a client is configured
    pub async fn check_redis(&self) -> ServiceHealth {
        let Some(client) = &self.redis else {
            return ServiceHealth::skipped("redis", "REDIS_URL not set, using in-memory store");
        };

        let start = Instant::now();
        let mut conn = match client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => return ServiceHealth::unhealthy("redis", format!("Connection failed: {}", e)),
        };

        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) if response == "PONG" => ServiceHealth::healthy("redis", start.elapsed()),
            Ok(response) => ServiceHealth::unhealthy_with_time(
                "redis",
                format!("Unexpected PING response: {}", response),
                start.elapsed(),
            ),
            Err(e) => ServiceHealth::unhealthy_with_time(
                "redis",
                format!("PING failed: {}", e),
                start.elapsed(),
            ),
        }
    }

    /// Run all checks concurrently
    pub async fn check_all(&self) -> HealthCheckResponse {
        let start = Instant::now();
        let (db_health, redis_health) = tokio::join!(self.check_database(), self.check_redis());
        HealthCheckResponse::new(vec![db_health, redis_health], start.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_health_healthy() {
        let health = ServiceHealth::healthy("test", Duration::from_millis(50));
        assert_eq!(health.status, ServiceStatus::Healthy);
        assert_eq!(health.response_time_ms, Some(50));
        assert!(health.error.is_none());
    }

    #[test]
    fn test_service_health_unhealthy_with_time() {
        let health =
            ServiceHealth::unhealthy_with_time("test", "Connection refused", Duration::from_millis(7));
        assert_eq!(health.status, ServiceStatus::Unhealthy);
        assert_eq!(health.response_time_ms, Some(7));
        assert_eq!(health.error.as_deref(), Some("Connection refused"));
    }

    #[test]
    fn test_response_ignores_skipped() {
        let services = vec![
            ServiceHealth::healthy("database", Duration::from_millis(10)),
            ServiceHealth::skipped("redis", "Not configured"),
        ];
        let response = HealthCheckResponse::new(services, Duration::from_millis(15));
        assert!(response.is_healthy());
    }

    #[test]
    fn test_response_one_unhealthy() {
        let services = vec![
            ServiceHealth::healthy("database", Duration::from_millis(10)),
            ServiceHealth::unhealthy("redis", "Connection refused"),
        ];
        let response = HealthCheckResponse::new(services, Duration::from_millis(15));
        assert!(!response.is_healthy());
    }

    #[tokio::test]
    async fn test_redis_skipped_when_unconfigured() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let service = HealthService::new(pool, None);
        let health = service.check_redis().await;
        assert_eq!(health.status, ServiceStatus::Skipped);
    }
}
