//! Integration tests for the auth gate on the assembled router
//!
//! None of these reach the database: the gate (or the role extractor)
//! answers before any repository call, and `/api/admin/verify` only echoes
//! the attached identity.

mod common;

use axum::http::{header, Request, StatusCode};
use axum::body::Body;
use chrono::Utc;
use rstest::rstest;
use tower::ServiceExt;

use common::{authed_get, body_json, get, identity, TestApp, ADMIN_WALLET, TEST_JWT_SECRET};
use trainhub_api::services::TokenCodec;

#[tokio::test]
async fn test_missing_token_is_rejected() {
    let app = TestApp::new(vec![]);

    let response = app.router.oneshot(get("/api/profile")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "missing_token");
}

#[tokio::test]
async fn test_token_past_lifetime_is_expired() {
    let app = TestApp::new(vec![]);
    // 2h lifetime, issued 3h ago
    let issued_at = Utc::now().timestamp() - 3 * 3600;
    let token = app.token_issued_at(&identity(7, "alice"), issued_at);

    let response = app
        .router
        .oneshot(authed_get("/api/profile", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "expired_token");
}

#[rstest]
#[case::garbage("not.a.token")]
#[case::empty_segments("..")]
#[tokio::test]
async fn test_malformed_token_is_invalid(#[case] token: &str) {
    let app = TestApp::new(vec![]);

    let response = app
        .router
        .oneshot(authed_get("/api/profile", token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_token");
}

#[tokio::test]
async fn test_token_from_another_secret_is_invalid() {
    let app = TestApp::new(vec![]);
    let other = TokenCodec::new(&TEST_JWT_SECRET.chars().rev().collect::<String>()).unwrap();
    let token = other
        .issue(&identity(7, "alice"), common::TOKEN_LIFETIME)
        .unwrap();

    let response = app
        .router
        .oneshot(authed_get("/api/admin/verify", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "invalid_token");
}

#[tokio::test]
async fn test_non_admin_is_forbidden_on_admin_route() {
    let app = TestApp::new(vec![]);
    let token = app.token_for(&identity(7, "alice"));

    let response = app
        .router
        .oneshot(authed_get("/api/admin/verify", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "forbidden");
}

#[tokio::test]
async fn test_admin_is_dispatched_with_identity() {
    let app = TestApp::new(vec![]);
    let mut admin = identity(42, "coach");
    admin.is_admin = true;
    let token = app.token_for(&admin);

    let response = app
        .router
        .oneshot(authed_get("/api/admin/verify", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"], 42);
    assert_eq!(body["is_admin"], true);
    assert_eq!(body["is_super_admin"], false);
}

#[tokio::test]
async fn test_admin_wallet_grants_super_admin() {
    let app = TestApp::new(vec![]);
    let mut owner = identity(1, "owner");
    owner.is_admin = true;
    owner.wallet_address = Some(ADMIN_WALLET.to_lowercase());
    let token = app.token_for(&owner);

    let response = app
        .router
        .oneshot(authed_get("/api/admin/verify", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["is_super_admin"], true);
}

#[tokio::test]
async fn test_plain_admin_is_forbidden_on_super_admin_route() {
    let app = TestApp::new(vec![]);
    let mut admin = identity(42, "coach");
    admin.is_admin = true;
    let token = app.token_for(&admin);

    let response = app
        .router
        .oneshot(authed_get("/api/admin/users", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_token_is_read_from_cookie() {
    let app = TestApp::new(vec![]);
    let mut admin = identity(42, "coach");
    admin.is_admin = true;
    let token = app.token_for(&admin);

    let request = Request::builder()
        .uri("/api/admin/verify")
        .header(header::COOKIE, format!("theme=dark; token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_bearer_header_wins_over_cookie() {
    let app = TestApp::new(vec![]);
    let mut admin = identity(42, "coach");
    admin.is_admin = true;
    let token = app.token_for(&admin);

    let request = Request::builder()
        .uri("/api/admin/verify")
        .header(header::AUTHORIZATION, "Bearer broken")
        .header(header::COOKIE, format!("token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["code"], "invalid_token");
}

#[tokio::test]
async fn test_public_routes_skip_the_gate() {
    let app = TestApp::new(vec![]);

    let response = app.router.oneshot(get("/health/live")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_not_found_without_token() {
    let app = TestApp::new(vec![]);

    let response = app
        .router
        .oneshot(get("/api/does-not-exist"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
