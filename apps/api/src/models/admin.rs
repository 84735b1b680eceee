//! Admin dashboard and audit log models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from admin_logs
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdminLogEntry {
    pub id: i64,
    pub user_id: Option<String>,
    pub action: String,
    pub method: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audit entry to append
#[derive(Debug, Clone)]
pub struct NewAdminLog {
    pub user_id: Option<String>,
    pub action: String,
    pub method: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub details: serde_json::Value,
}

/// Dashboard totals
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardStats {
    pub active_users: i64,
    pub published_plans: i64,
    pub completed_sales: i64,
    pub revenue_cents: i64,
    pub sales_last_30_days: i64,
}

/// Admin user listing row
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AdminUserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub is_admin: bool,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub purchase_count: i64,
}

/// Maintenance actions an administrator can trigger
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    /// Delete admin log entries older than `days_to_keep`
    ClearLogs {
        #[serde(default = "default_days_to_keep")]
        days_to_keep: i32,
    },
    /// Round-trip the database and report table counts
    CheckDatabase,
}

fn default_days_to_keep() -> i32 {
    30
}

impl AdminAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ClearLogs { .. } => "clear_logs",
            Self::CheckDatabase => "check_database",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_admin_action_parse() {
        let action: AdminAction = serde_json::from_str(r#"{"action":"clear_logs"}"#).unwrap();
        assert_matches!(action, AdminAction::ClearLogs { days_to_keep: 30 });

        let action: AdminAction =
            serde_json::from_str(r#"{"action":"clear_logs","days_to_keep":7}"#).unwrap();
        assert_matches!(action, AdminAction::ClearLogs { days_to_keep: 7 });

        let action: AdminAction =
            serde_json::from_str(r#"{"action":"check_database"}"#).unwrap();
        assert_eq!(action.name(), "check_database");

        assert!(serde_json::from_str::<AdminAction>(r#"{"action":"drop_tables"}"#).is_err());
    }
}
