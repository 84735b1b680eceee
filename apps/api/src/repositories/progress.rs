//! Progress tracking repository: weight logs, body measurements, photos and goals
//!
//! Every read and delete is scoped to the owning user.

use chrono::NaiveDate;
use sqlx::PgPool;

use super::utils::GOAL_COLUMNS;
use crate::models::progress::{
    BodyMeasurement, Goal, GoalUpdate, NewGoal, NewMeasurement, NewProgressPhoto, NewWeightLog,
    PhotoType, PhotoUpdate, ProgressPhoto, WeightLog,
};

const PHOTO_COLUMNS: &str =
    "id, user_id, photo_path, photo_date, photo_type, notes, is_private, created_at";

/// Optional date range for weight log and photo listings
#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Clone)]
pub struct ProgressRepository {
    pool: PgPool,
}

impl ProgressRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ==================== Weight ====================

    /// Log a weight and make it the profile's current weight
    pub async fn insert_weight(
        &self,
        user_id: i64,
        entry: &NewWeightLog,
    ) -> Result<WeightLog, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let log = sqlx::query_as::<_, WeightLog>(
            r#"
            INSERT INTO weight_logs (user_id, weight, log_date, notes)
            VALUES ($1, $2, COALESCE($3, CURRENT_DATE), $4)
            RETURNING id, user_id, weight, log_date, notes, created_at
            "#,
        )
        .bind(user_id)
        .bind(entry.weight)
        .bind(entry.log_date)
        .bind(&entry.notes)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, current_weight)
            VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET current_weight = EXCLUDED.current_weight, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(entry.weight)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(log)
    }

    pub async fn list_weights(
        &self,
        user_id: i64,
        range: DateRange,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<WeightLog>, sqlx::Error> {
        sqlx::query_as::<_, WeightLog>(
            r#"
            SELECT id, user_id, weight, log_date, notes, created_at
            FROM weight_logs
            WHERE user_id = $1
              AND ($2::date IS NULL OR log_date >= $2)
              AND ($3::date IS NULL OR log_date <= $3)
            ORDER BY log_date DESC, id DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(user_id)
        .bind(range.from)
        .bind(range.to)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// Returns false when the log does not exist or belongs to someone else
    pub async fn delete_weight(&self, user_id: i64, log_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM weight_logs WHERE id = $1 AND user_id = $2")
            .bind(log_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Measurements ====================

    pub async fn insert_measurement(
        &self,
        user_id: i64,
        entry: &NewMeasurement,
    ) -> Result<BodyMeasurement, sqlx::Error> {
        sqlx::query_as::<_, BodyMeasurement>(
            r#"
            INSERT INTO body_measurements (user_id, measurement_type, value, notes)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, measurement_type, value, notes, measured_at
            "#,
        )
        .bind(user_id)
        .bind(entry.measurement_type.as_str())
        .bind(entry.value)
        .bind(&entry.notes)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_measurements(
        &self,
        user_id: i64,
        measurement_type: Option<&str>,
    ) -> Result<Vec<BodyMeasurement>, sqlx::Error> {
        sqlx::query_as::<_, BodyMeasurement>(
            r#"
            SELECT id, user_id, measurement_type, value, notes, measured_at
            FROM body_measurements
            WHERE user_id = $1 AND ($2::text IS NULL OR measurement_type = $2)
            ORDER BY measured_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .bind(measurement_type)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn delete_measurement(
        &self,
        user_id: i64,
        measurement_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM body_measurements WHERE id = $1 AND user_id = $2")
            .bind(measurement_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ==================== Photos ====================

    pub async fn insert_photo(
        &self,
        user_id: i64,
        photo: &NewProgressPhoto,
    ) -> Result<ProgressPhoto, sqlx::Error> {
        sqlx::query_as::<_, ProgressPhoto>(&format!(
            r#"
            INSERT INTO progress_photos (user_id, photo_path, photo_date, photo_type, notes, is_private)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            PHOTO_COLUMNS
        ))
        .bind(user_id)
        .bind(photo.photo_path.trim())
        .bind(photo.photo_date)
        .bind(photo.photo_type.as_str())
        .bind(&photo.notes)
        .bind(photo.is_private)
        .fetch_one(&self.pool)
        .await
    }

    /// One page of photos, newest first, with the total matching the filters
    pub async fn list_photos(
        &self,
        user_id: i64,
        range: DateRange,
        photo_type: Option<PhotoType>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ProgressPhoto>, i64), sqlx::Error> {
        const FILTER: &str = r#"
            WHERE user_id = $1
              AND ($2::date IS NULL OR photo_date >= $2)
              AND ($3::date IS NULL OR photo_date <= $3)
              AND ($4::text IS NULL OR photo_type = $4)
        "#;
        let photo_type = photo_type.map(PhotoType::as_str);

        let photos = sqlx::query_as::<_, ProgressPhoto>(&format!(
            "SELECT {} FROM progress_photos {} ORDER BY photo_date DESC, id DESC LIMIT $5 OFFSET $6",
            PHOTO_COLUMNS, FILTER
        ))
        .bind(user_id)
        .bind(range.from)
        .bind(range.to)
        .bind(photo_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let total = sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COUNT(*) FROM progress_photos {}",
            FILTER
        ))
        .bind(user_id)
        .bind(range.from)
        .bind(range.to)
        .bind(photo_type)
        .fetch_one(&self.pool)
        .await?;

        Ok((photos, total))
    }

    pub async fn update_photo(
        &self,
        user_id: i64,
        photo_id: i64,
        update: &PhotoUpdate,
    ) -> Result<Option<ProgressPhoto>, sqlx::Error> {
        sqlx::query_as::<_, ProgressPhoto>(&format!(
            r#"
            UPDATE progress_photos
            SET photo_type = COALESCE($3, photo_type),
                notes = COALESCE($4, notes),
                is_private = COALESCE($5, is_private)
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            PHOTO_COLUMNS
        ))
        .bind(photo_id)
        .bind(user_id)
        .bind(update.photo_type.map(PhotoType::as_str))
        .bind(&update.notes)
        .bind(update.is_private)
        .fetch_optional(&self.pool)
        .await
    }

    /// Returns the deleted photo's path so the caller can remove the file
    pub async fn delete_photo(
        &self,
        user_id: i64,
        photo_id: i64,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar(
            "DELETE FROM progress_photos WHERE id = $1 AND user_id = $2 RETURNING photo_path",
        )
        .bind(photo_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    // ==================== Goals ====================

    pub async fn insert_goal(&self, user_id: i64, goal: &NewGoal) -> Result<Goal, sqlx::Error> {
        sqlx::query_as::<_, Goal>(&format!(
            r#"
            INSERT INTO user_goals (
                user_id, goal_type, target_value, current_value,
                start_date, target_date, notes, status
            )
            VALUES ($1, $2, $3, $4, COALESCE($5, CURRENT_DATE), $6, $7, 'in_progress')
            RETURNING {}
            "#,
            GOAL_COLUMNS
        ))
        .bind(user_id)
        .bind(goal.goal_type.trim())
        .bind(goal.target_value)
        .bind(goal.current_value)
        .bind(goal.start_date)
        .bind(goal.target_date)
        .bind(&goal.notes)
        .fetch_one(&self.pool)
        .await
    }

    pub async fn list_goals(&self, user_id: i64) -> Result<Vec<Goal>, sqlx::Error> {
        sqlx::query_as::<_, Goal>(&format!(
            "SELECT {} FROM user_goals WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            GOAL_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Apply the fields present in `update`; `None` when the goal is not the user's
    pub async fn update_goal(
        &self,
        user_id: i64,
        goal_id: i64,
        update: &GoalUpdate,
    ) -> Result<Option<Goal>, sqlx::Error> {
        sqlx::query_as::<_, Goal>(&format!(
            r#"
            UPDATE user_goals
            SET current_value = COALESCE($3, current_value),
                target_value = COALESCE($4, target_value),
                target_date = COALESCE($5, target_date),
                notes = COALESCE($6, notes),
                status = COALESCE($7, status)
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            GOAL_COLUMNS
        ))
        .bind(goal_id)
        .bind(user_id)
        .bind(update.current_value)
        .bind(update.target_value)
        .bind(update.target_date)
        .bind(&update.notes)
        .bind(update.status)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn delete_goal(&self, user_id: i64, goal_id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_goals WHERE id = $1 AND user_id = $2")
            .bind(goal_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
