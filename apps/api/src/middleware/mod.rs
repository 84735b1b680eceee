//! Middleware components for TrainHub API
//!
//! Authentication:
//! - `require_auth`: verifies the identity token and attaches a `RequestIdentity`
//! - `AuthUser`, `AdminUser`, `SuperAdminUser`: role extractors for handlers
//!
//! Login protection:
//! - `attempt_guard`: refuses blocked IPs on login/register and adds rate limit headers
//!
//! And the session cookie helpers shared by the auth routes.

pub mod auth;
pub mod cookie;
pub mod rate_limit;

pub use auth::{
    extract_token, require_auth, AdminUser, AuthGate, AuthRejection, AuthUser, RequestIdentity,
    SuperAdminUser, TokenSource, DEFAULT_TOKEN_SOURCES,
};
pub use cookie::{read_cookie, SessionCookie, SESSION_COOKIE_NAME};
pub use rate_limit::{attempt_guard, blocked_error, extract_client_ip, ClientIp, TrustedProxies};
