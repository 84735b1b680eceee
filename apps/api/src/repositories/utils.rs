//! Shared utility functions for repositories
//!
//! This module provides common functions and column lists used across repositories.

/// Escape special characters in ILIKE patterns to prevent pattern injection.
///
/// ILIKE uses `%` for any sequence and `_` for single character wildcards.
/// If user input contains these characters, they must be escaped to match literally.
///
/// # Example
/// ```
/// use trainhub_api::repositories::utils::escape_ilike;
///
/// let input = "100%";
/// let escaped = escape_ilike(input);
/// assert_eq!(escaped, r"100\%");
/// ```
pub fn escape_ilike(pattern: &str) -> String {
    pattern
        .replace('\\', r"\\")
        .replace('%', r"\%")
        .replace('_', r"\_")
}

/// `%term%` pattern for a trimmed, non-empty search term
pub fn contains_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{}%", escape_ilike(t)))
}

// ============================================================================
// SQL Column Constants
// ============================================================================

/// SQL columns for user queries
pub const USER_COLUMNS: &str = r#"
    id, username, email, password_hash,
    first_name, last_name, display_name, phone, birth_date,
    wallet_address, is_admin, is_super_admin, is_active, is_verified,
    payment_customer_id, last_login, created_at, updated_at
"#;

/// SQL columns for plan queries, table aliased as `p`
pub const PLAN_COLUMNS: &str = r#"
    p.id, p.name, p.description, p.short_description,
    p.base_price_cents, p.discount_price_cents,
    p.status, p.is_active, p.created_at, p.updated_at
"#;

/// SQL columns for plan variant queries
pub const VARIANT_COLUMNS: &str = r#"
    id, plan_id, name, duration_days, price_cents,
    training_frequency, experience_level, is_active
"#;

/// SQL columns for purchase queries
pub const PURCHASE_COLUMNS: &str = r#"
    id, user_id, plan_id, variant_id, amount_cents, status,
    checkout_session_id, payment_intent_id,
    access_granted, access_granted_at, purchase_date, updated_at
"#;

/// SQL columns for goal queries
pub const GOAL_COLUMNS: &str = r#"
    id, user_id, goal_type, description, target_value, current_value,
    start_date, target_date, notes, status, created_at
"#;
