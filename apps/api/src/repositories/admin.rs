//! Admin repository for dashboard statistics, user management and audit logs
//!
//! This module provides admin-only database operations including:
//! - Dashboard statistics aggregation
//! - User listing with pagination and search
//! - Account activation and transactional deletion
//! - The admin audit log

use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};

use super::utils::contains_pattern;
use crate::models::admin::{AdminLogEntry, AdminUserRow, DashboardStats, NewAdminLog};

/// Filters for the audit log listing
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Row count of one table, for `check_database`
#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct TableCount {
    pub table_name: String,
    pub row_count: i64,
}

#[derive(FromRow)]
struct StatsRow {
    active_users: i64,
    published_plans: i64,
    completed_sales: i64,
    revenue_cents: i64,
    sales_last_30_days: i64,
}

/// Repository for admin database operations
#[derive(Clone)]
pub struct AdminRepository {
    pool: PgPool,
}

impl AdminRepository {
    /// Create a new AdminRepository instance
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Aggregate figures for the admin dashboard
    pub async fn stats(&self) -> Result<DashboardStats, sqlx::Error> {
        let row = sqlx::query_as::<_, StatsRow>(
            r#"
            SELECT
                (SELECT COUNT(*) FROM users WHERE is_active = true) AS active_users,
                (SELECT COUNT(*) FROM training_plans
                    WHERE status = 'published' AND is_active = true) AS published_plans,
                (SELECT COUNT(*) FROM purchases WHERE status = 'completed') AS completed_sales,
                (SELECT COALESCE(SUM(amount_cents), 0)::bigint FROM purchases
                    WHERE status = 'completed') AS revenue_cents,
                (SELECT COUNT(*) FROM purchases
                    WHERE status = 'completed'
                      AND purchase_date > NOW() - INTERVAL '30 days') AS sales_last_30_days
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DashboardStats {
            active_users: row.active_users,
            published_plans: row.published_plans,
            completed_sales: row.completed_sales,
            revenue_cents: row.revenue_cents,
            sales_last_30_days: row.sales_last_30_days,
        })
    }

    /// List users with their completed purchase count
    ///
    /// Uses a LEFT JOIN for purchase counts to avoid an N+1 query pattern.
    pub async fn list_users(
        &self,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AdminUserRow>, sqlx::Error> {
        sqlx::query_as::<_, AdminUserRow>(
            r#"
            SELECT
                u.id,
                u.username,
                u.email,
                u.display_name,
                u.is_admin,
                u.is_active,
                u.is_verified,
                u.last_login,
                u.created_at,
                COALESCE(pc.purchase_count, 0) AS purchase_count
            FROM users u
            LEFT JOIN (
                SELECT user_id, COUNT(*) AS purchase_count
                FROM purchases
                WHERE status = 'completed'
                GROUP BY user_id
            ) pc ON pc.user_id = u.id
            WHERE $1::text IS NULL
               OR u.username ILIKE $1
               OR u.email ILIKE $1
               OR u.display_name ILIKE $1
            ORDER BY u.created_at DESC, u.id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(contains_pattern(search))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn count_users(&self, search: Option<&str>) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM users u
            WHERE $1::text IS NULL
               OR u.username ILIKE $1
               OR u.email ILIKE $1
               OR u.display_name ILIKE $1
            "#,
        )
        .bind(contains_pattern(search))
        .fetch_one(&self.pool)
        .await
    }

    /// Returns false when the user does not exist
    pub async fn set_user_active(&self, user_id: i64, active: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .bind(active)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user and every row that references them
    ///
    /// Returns false when the user does not exist; nothing is deleted then.
    pub async fn delete_user(&self, user_id: i64) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        for statement in [
            "DELETE FROM user_goals WHERE user_id = $1",
            "DELETE FROM weight_logs WHERE user_id = $1",
            "DELETE FROM body_measurements WHERE user_id = $1",
            "DELETE FROM progress_photos WHERE user_id = $1",
            "DELETE FROM purchases WHERE user_id = $1",
            "DELETE FROM activity_logs WHERE user_id = $1",
            "DELETE FROM user_profiles WHERE user_id = $1",
        ] {
            sqlx::query(statement)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    // ==================== Audit log ====================

    pub async fn insert_log(&self, entry: &NewAdminLog) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            INSERT INTO admin_logs (user_id, action, method, ip_address, user_agent, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&entry.user_id)
        .bind(&entry.action)
        .bind(&entry.method)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_logs(
        &self,
        filter: &LogFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<AdminLogEntry>, sqlx::Error> {
        sqlx::query_as::<_, AdminLogEntry>(
            r#"
            SELECT id, user_id, action, method, ip_address, user_agent, details, created_at
            FROM admin_logs
            WHERE ($1::text IS NULL OR action = $1)
              AND ($2::text IS NULL OR user_id = $2)
              AND ($3::date IS NULL OR created_at >= $3)
              AND ($4::date IS NULL OR created_at < $4 + 1)
            ORDER BY created_at DESC, id DESC
            LIMIT $5 OFFSET $6
            "#,
        )
        .bind(&filter.action)
        .bind(&filter.user_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete audit entries older than `days_to_keep` days
    pub async fn clear_logs(&self, days_to_keep: i32) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM admin_logs WHERE created_at < NOW() - make_interval(days => $1)",
        )
        .bind(days_to_keep)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Row counts of the main tables
    pub async fn table_counts(&self) -> Result<Vec<TableCount>, sqlx::Error> {
        sqlx::query_as::<_, TableCount>(
            r#"
            SELECT 'users' AS table_name, COUNT(*) AS row_count FROM users
            UNION ALL SELECT 'training_plans', COUNT(*) FROM training_plans
            UNION ALL SELECT 'plan_variants', COUNT(*) FROM plan_variants
            UNION ALL SELECT 'purchases', COUNT(*) FROM purchases
            UNION ALL SELECT 'weight_logs', COUNT(*) FROM weight_logs
            UNION ALL SELECT 'body_measurements', COUNT(*) FROM body_measurements
            UNION ALL SELECT 'progress_photos', COUNT(*) FROM progress_photos
            UNION ALL SELECT 'user_goals', COUNT(*) FROM user_goals
            UNION ALL SELECT 'admin_logs', COUNT(*) FROM admin_logs
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }
}
