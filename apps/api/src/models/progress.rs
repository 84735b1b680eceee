//! Progress tracking models: weight logs, body measurements, photos and goals

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Upper bound accepted for a weight entry, in kilograms
pub const MAX_WEIGHT_KG: f64 = 500.0;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WeightLog {
    pub id: i64,
    pub user_id: i64,
    pub weight: f64,
    pub log_date: NaiveDate,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewWeightLog {
    pub weight: f64,
    pub log_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Body part a measurement refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementType {
    Chest,
    Waist,
    Hips,
    Arms,
    Thighs,
    Calves,
}

impl MeasurementType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chest => "chest",
            Self::Waist => "waist",
            Self::Hips => "hips",
            Self::Arms => "arms",
            Self::Thighs => "thighs",
            Self::Calves => "calves",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BodyMeasurement {
    pub id: i64,
    pub user_id: i64,
    pub measurement_type: String,
    pub value: f64,
    pub notes: Option<String>,
    pub measured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMeasurement {
    pub measurement_type: MeasurementType,
    pub value: f64,
    pub notes: Option<String>,
}

/// Longest accepted photo reference
pub const MAX_PHOTO_PATH_LEN: usize = 1024;

/// Which angle a progress photo shows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoType {
    Front,
    Back,
    Side,
    #[default]
    Other,
}

impl PhotoType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
            Self::Side => "side",
            Self::Other => "other",
        }
    }
}

/// Reference to an uploaded progress photo
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProgressPhoto {
    pub id: i64,
    pub user_id: i64,
    pub photo_path: String,
    pub photo_date: NaiveDate,
    pub photo_type: String,
    pub notes: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProgressPhoto {
    pub photo_path: String,
    pub photo_date: NaiveDate,
    #[serde(default)]
    pub photo_type: PhotoType,
    pub notes: Option<String>,
    /// Photos are private unless explicitly shared
    #[serde(default = "private_by_default")]
    pub is_private: bool,
}

fn private_by_default() -> bool {
    true
}

/// Partial photo update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PhotoUpdate {
    pub photo_type: Option<PhotoType>,
    pub notes: Option<String>,
    pub is_private: Option<bool>,
}

impl PhotoUpdate {
    pub fn is_empty(&self) -> bool {
        self.photo_type.is_none() && self.notes.is_none() && self.is_private.is_none()
    }
}

/// Goal state matching PostgreSQL goal_status type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "goal_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    InProgress,
    Completed,
    Abandoned,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Goal {
    pub id: i64,
    pub user_id: i64,
    pub goal_type: String,
    pub description: Option<String>,
    pub target_value: Option<f64>,
    pub current_value: Option<f64>,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewGoal {
    pub goal_type: String,
    pub target_value: Option<f64>,
    pub current_value: Option<f64>,
    pub start_date: Option<NaiveDate>,
    pub target_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Partial goal update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GoalUpdate {
    pub current_value: Option<f64>,
    pub target_value: Option<f64>,
    pub target_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<GoalStatus>,
}

impl GoalUpdate {
    pub fn is_empty(&self) -> bool {
        self.current_value.is_none()
            && self.target_value.is_none()
            && self.target_date.is_none()
            && self.notes.is_none()
            && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_type_rejects_unknown() {
        let ok: NewMeasurement =
            serde_json::from_str(r#"{"measurement_type":"waist","value":80.5}"#).unwrap();
        assert_eq!(ok.measurement_type, MeasurementType::Waist);
        assert!(serde_json::from_str::<NewMeasurement>(
            r#"{"measurement_type":"neck","value":40}"#
        )
        .is_err());
    }

    #[test]
    fn test_new_photo_defaults() {
        let photo: NewProgressPhoto =
            serde_json::from_str(r#"{"photo_path":"u/1/front.jpg","photo_date":"2024-05-01"}"#)
                .unwrap();
        assert_eq!(photo.photo_type, PhotoType::Other);
        assert!(photo.is_private);

        let photo: NewProgressPhoto = serde_json::from_str(
            r#"{"photo_path":"p.jpg","photo_date":"2024-05-01","photo_type":"side","is_private":false}"#,
        )
        .unwrap();
        assert_eq!(photo.photo_type, PhotoType::Side);
        assert!(!photo.is_private);
    }

    #[test]
    fn test_photo_type_rejects_unknown_and_bad_dates() {
        assert!(serde_json::from_str::<PhotoType>("\"top\"").is_err());
        assert!(serde_json::from_str::<NewProgressPhoto>(
            r#"{"photo_path":"p.jpg","photo_date":"01/05/2024"}"#
        )
        .is_err());
    }

    #[test]
    fn test_photo_update_empty() {
        assert!(PhotoUpdate::default().is_empty());
        let update: PhotoUpdate = serde_json::from_str(r#"{"is_private":false}"#).unwrap();
        assert!(!update.is_empty());
    }

    #[test]
    fn test_goal_status_snake_case() {
        let status: GoalStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, GoalStatus::InProgress);
    }

    #[test]
    fn test_goal_update_empty() {
        assert!(GoalUpdate::default().is_empty());
        let update: GoalUpdate = serde_json::from_str(r#"{"current_value":72.0}"#).unwrap();
        assert!(!update.is_empty());
    }
}
