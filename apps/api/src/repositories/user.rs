//! User repository for centralized database operations

use sqlx::PgPool;

use super::utils::USER_COLUMNS;
use crate::models::progress::WeightLog;
use crate::models::user::{NewAccount, ProfileUpdate, User, UserProfile};

/// Repository for user database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Find a user by their unique ID
    pub async fn find_by_id(&self, user_id: i64) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Find a user whose username or email matches `identifier` (case-insensitive)
    pub async fn find_by_username_or_email(
        &self,
        identifier: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($1) LIMIT 1",
            USER_COLUMNS
        ))
        .bind(identifier.trim())
        .fetch_optional(&self.pool)
        .await
    }

    /// Whether the username or the email is already registered
    pub async fn username_or_email_exists(
        &self,
        username: &str,
        email: &str,
    ) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM users
                WHERE LOWER(username) = LOWER($1) OR LOWER(email) = LOWER($2)
            )
            "#,
        )
        .bind(username.trim())
        .bind(email.trim())
        .fetch_one(&self.pool)
        .await
    }

    pub async fn update_last_login(&self, user_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Create the user with its profile, initial measurements and goal
    ///
    /// All rows are written in one transaction.
    pub async fn create_account(&self, account: &NewAccount) -> Result<User, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (
                username, email, password_hash, first_name, last_name,
                display_name, phone, birth_date
            )
            VALUES ($1, LOWER($2), $3, $4, $5, $6, $7, $8)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(account.username.trim())
        .bind(account.email.trim())
        .bind(&account.password_hash)
        .bind(&account.first_name)
        .bind(&account.last_name)
        .bind(account.display_name())
        .bind(&account.phone)
        .bind(account.birth_date)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, height_cm, current_weight, fitness_level, health_conditions)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(user.id)
        .bind(account.height_cm)
        .bind(account.initial_weight)
        .bind(&account.fitness_level)
        .bind(&account.health_conditions)
        .execute(&mut *tx)
        .await?;

        for (measurement_type, value) in [
            ("height", account.height_cm),
            ("weight", account.initial_weight),
        ] {
            if let Some(value) = value {
                sqlx::query(
                    "INSERT INTO body_measurements (user_id, measurement_type, value) VALUES ($1, $2, $3)",
                )
                .bind(user.id)
                .bind(measurement_type)
                .bind(value)
                .execute(&mut *tx)
                .await?;
            }
        }

        if let Some(goals) = account
            .fitness_goals
            .as_deref()
            .map(str::trim)
            .filter(|g| !g.is_empty())
        {
            sqlx::query(
                "INSERT INTO user_goals (user_id, goal_type, description) VALUES ($1, 'general', $2)",
            )
            .bind(user.id)
            .bind(goals)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(user)
    }

    pub async fn set_payment_customer_id(
        &self,
        user_id: i64,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE users SET payment_customer_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn email_taken_by_other(&self, email: &str, user_id: i64) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1) AND id <> $2)",
        )
        .bind(email.trim())
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Apply a partial profile update to users and user_profiles together
    ///
    /// The display name follows the resulting first and last name. The
    /// profile row is created if registration never wrote one. Returns
    /// `None` for an unknown user.
    pub async fn update_profile(
        &self,
        user_id: i64,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, sqlx::Error> {
        let trimmed = |v: &Option<String>| v.as_deref().map(str::trim).map(str::to_string);
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE(LOWER($4), email),
                phone = COALESCE($5, phone),
                birth_date = COALESCE($6, birth_date),
                display_name = COALESCE(
                    NULLIF(TRIM(CONCAT_WS(' ',
                        NULLIF(COALESCE($2, first_name), ''),
                        NULLIF(COALESCE($3, last_name), ''))), ''),
                    username),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user_id)
        .bind(trimmed(&update.first_name))
        .bind(trimmed(&update.last_name))
        .bind(trimmed(&update.email))
        .bind(trimmed(&update.phone))
        .bind(update.birth_date)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user) = user else {
            return Ok(None);
        };

        if update.touches_profile() {
            sqlx::query(
                r#"
                INSERT INTO user_profiles (user_id, height_cm, current_weight, fitness_level, health_conditions)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (user_id) DO UPDATE SET
                    height_cm = COALESCE(EXCLUDED.height_cm, user_profiles.height_cm),
                    current_weight = COALESCE(EXCLUDED.current_weight, user_profiles.current_weight),
                    fitness_level = COALESCE(EXCLUDED.fitness_level, user_profiles.fitness_level),
                    health_conditions = COALESCE(EXCLUDED.health_conditions, user_profiles.health_conditions),
                    updated_at = NOW()
                "#,
            )
            .bind(user_id)
            .bind(update.height)
            .bind(update.current_weight)
            .bind(trimmed(&update.fitness_level))
            .bind(trimmed(&update.health_conditions))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some(user))
    }

    pub async fn find_profile(&self, user_id: i64) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT user_id, height_cm, current_weight, fitness_level, health_conditions, updated_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn recent_weight_logs(
        &self,
        user_id: i64,
        limit: i64,
    ) -> Result<Vec<WeightLog>, sqlx::Error> {
        sqlx::query_as::<_, WeightLog>(
            r#"
            SELECT id, user_id, weight, log_date, notes, created_at
            FROM weight_logs
            WHERE user_id = $1
            ORDER BY log_date DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}
