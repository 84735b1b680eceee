//! Login attempt guard for credential endpoints
//!
//! `attempt_guard` wraps the login and register routes. It refuses a blocked
//! client IP before the request body is even parsed, and stamps every
//! response with `X-RateLimit-Limit` / `X-RateLimit-Remaining`.
//!
//! Handlers that know the username (login) refine the remaining count by
//! putting an [`AttemptSnapshot`] into the response extensions.

use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::services::login_attempts::{AttemptSnapshot, BlockStatus, LoginAttemptTracker};

/// Peers whose forwarding headers are believed
///
/// Installed as a request extension; without it no peer is trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies(Arc<[IpAddr]>);

impl TrustedProxies {
    pub fn new(proxies: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(proxies.into_iter().collect())
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Extract the client IP for attempt tracking
///
/// The socket address is authoritative unless it belongs to a trusted
/// proxy. Behind one, `X-Forwarded-For` is walked from the right, skipping
/// trusted hops, and the first other address wins; `X-Real-IP` is the
/// fallback. Entries that do not parse as an IP end the walk.
pub fn extract_client_ip(
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
    trusted: &TrustedProxies,
) -> String {
    let Some(peer) = connect_info.map(|info| info.0.ip()) else {
        warn!("Could not determine client IP for login attempt tracking");
        return "unknown".to_string();
    };

    if !trusted.contains(&peer) {
        return peer.to_string();
    }

    if let Some(ip) = forwarded_client(headers, trusted) {
        return ip.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    peer.to_string()
}

fn forwarded_client(headers: &HeaderMap, trusted: &TrustedProxies) -> Option<IpAddr> {
    let hops: Vec<&str> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .collect();

    for hop in hops.into_iter().rev() {
        let ip = hop.parse::<IpAddr>().ok()?;
        if !trusted.contains(&ip) {
            return Some(ip);
        }
    }
    None
}

fn client_ip_from(extensions: &Extensions, headers: &HeaderMap) -> String {
    let none = TrustedProxies::default();
    let trusted = extensions.get::<TrustedProxies>().unwrap_or(&none);
    extract_client_ip(headers, extensions.get::<ConnectInfo<SocketAddr>>(), trusted)
}

/// Client IP as seen by [`extract_client_ip`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip_from(&parts.extensions, &parts.headers)))
    }
}

/// The 429 for a blocked caller
pub fn blocked_error(status: &BlockStatus) -> ApiError {
    let reason = status.reason.map(|r| r.as_str()).unwrap_or("ip");
    let message = status
        .reason
        .map(|r| r.message(status.retry_after_secs))
        .unwrap_or_else(|| "Too many login attempts.".to_string());

    ApiError::RateLimited {
        retry_after: status.retry_after_secs,
        reason,
        message,
    }
}

/// Middleware refusing blocked IPs on credential endpoints
pub async fn attempt_guard(
    State(tracker): State<LoginAttemptTracker>,
    request: Request,
    next: Next,
) -> Response {
    let client_ip = client_ip_from(request.extensions(), request.headers());

    let status = tracker.check_blocked(&client_ip, None).await;
    if status.blocked {
        warn!(
            ip = %client_ip,
            retry_after = status.retry_after_secs,
            "Blocked client refused before credential check"
        );
        return blocked_error(&status).into_response();
    }

    let mut response = next.run(request).await;

    let snapshot = match response.extensions().get::<AttemptSnapshot>() {
        Some(snapshot) => *snapshot,
        None => tracker.attempts(&client_ip, None).await,
    };

    let headers = response.headers_mut();
    headers.insert("x-ratelimit-limit", HeaderValue::from(snapshot.max_attempts));
    headers.insert("x-ratelimit-remaining", HeaderValue::from(snapshot.remaining));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::attempt_store::AttemptPolicy;
    use crate::services::login_attempts::BlockReason;
    use axum::http::StatusCode;

    fn peer(addr: &str) -> ConnectInfo<SocketAddr> {
        ConnectInfo(addr.parse().unwrap())
    }

    fn proxies() -> TrustedProxies {
        TrustedProxies::new(["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()])
    }

    #[test]
    fn test_untrusted_peer_ignores_forwarding_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.42"));

        let info = peer("192.0.2.7:4321");
        assert_eq!(extract_client_ip(&headers, Some(&info), &proxies()), "192.0.2.7");
        assert_eq!(
            extract_client_ip(&headers, Some(&info), &TrustedProxies::default()),
            "192.0.2.7"
        );
    }

    #[test]
    fn test_trusted_peer_uses_rightmost_untrusted_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("6.6.6.6, 203.0.113.1, 10.0.0.2"),
        );

        let info = peer("10.0.0.1:443");
        assert_eq!(extract_client_ip(&headers, Some(&info), &proxies()), "203.0.113.1");
    }

    #[test]
    fn test_trusted_peer_falls_back_to_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("not-an-ip"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.42"));

        let info = peer("10.0.0.1:443");
        assert_eq!(extract_client_ip(&headers, Some(&info), &proxies()), "198.51.100.42");
    }

    #[test]
    fn test_trusted_peer_without_headers_is_the_client() {
        let info = peer("10.0.0.1:443");
        assert_eq!(extract_client_ip(&HeaderMap::new(), Some(&info), &proxies()), "10.0.0.1");
        assert_eq!(extract_client_ip(&HeaderMap::new(), None, &proxies()), "unknown");
    }

    #[test]
    fn test_blocked_error_for_username() {
        let status = BlockStatus {
            blocked: true,
            reason: Some(BlockReason::Username),
            retry_after_secs: 90,
        };
        let error = blocked_error(&status);
        assert_eq!(error.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert!(error.to_string().contains("90 seconds or reset your password"));
    }

    #[tokio::test]
    async fn test_client_ip_extractor() {
        let (mut parts, _) = axum::http::Request::builder()
            .header("x-real-ip", "198.51.100.9")
            .extension(peer("10.0.0.1:443"))
            .body(())
            .unwrap()
            .into_parts();

        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip, "10.0.0.1");

        parts.extensions.insert(proxies());
        let ClientIp(ip) = ClientIp::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ip, "198.51.100.9");
    }

    #[tokio::test]
    async fn test_guard_rejects_blocked_ip() {
        use axum::{body::Body, middleware, routing::post, Router};
        use tower::ServiceExt;

        let tracker = LoginAttemptTracker::in_memory(AttemptPolicy {
            max_attempts: 1,
            ..AttemptPolicy::default()
        });
        tracker.record_failure("1.2.3.4", None).await;

        let app = Router::new()
            .route("/login", post(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(tracker, attempt_guard));

        let blocked = app
            .clone()
            .oneshot(
                axum::http::Request::post("/login")
                    .extension(peer("1.2.3.4:5000"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(blocked.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(blocked.headers().contains_key("retry-after"));

        let allowed = app
            .oneshot(
                axum::http::Request::post("/login")
                    .extension(peer("5.6.7.8:5000"))
                    .header("x-forwarded-for", "1.2.3.4")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(allowed.headers()["x-ratelimit-limit"], "1");
        assert_eq!(allowed.headers()["x-ratelimit-remaining"], "1");
    }
}
