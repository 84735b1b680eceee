//! Integration tests for login, registration and attempt tracking
//!
//! Credentials come from the in-memory store in `common`, so these run
//! without PostgreSQL.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{
    authed_get, body_json, json_post, lazy_pool, sample_user, with_peer, MockCredentialStore,
    TestApp,
};
use trainhub_api::services::AttemptPolicy;

fn alice_app() -> TestApp {
    TestApp::new(vec![sample_user(7, "alice", "correct-password")])
}

#[tokio::test]
async fn test_login_success_sets_cookie_and_headers() {
    let app = alice_app();

    let response = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "alice", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");
    assert_eq!(response.headers()["x-ratelimit-remaining"], "5");

    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    assert!(cookie.starts_with("token="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=None"));
    assert!(cookie.contains("Domain=example.com"));
    assert!(cookie.contains("Max-Age=7200"));

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["id"], 7);
    assert_eq!(body["user"]["username"], "alice");

    let claims = app.codec.verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.id, 7);
    assert_eq!(claims.exp - claims.iat, 2 * 3600);
}

#[tokio::test]
async fn test_login_accepts_email_case_insensitively() {
    let app = alice_app();

    let response = app
        .router
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "ALICE@example.com", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_issued_token_opens_gated_routes() {
    let mut owner = sample_user(1, "owner", "correct-password");
    owner.is_admin = true;
    let app = TestApp::new(vec![owner]);

    let response = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "owner", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();
    let token = body_json(response).await["token"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .router
        .oneshot(authed_get("/api/admin/verify", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_wrong_password_and_unknown_user_look_the_same() {
    let app = alice_app();

    let wrong_password = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "alice", "password": "nope" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();
    let unknown_user = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "mallory", "password": "nope" }),
            "5.6.7.8",
        ))
        .await
        .unwrap();

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_user.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.headers()["x-ratelimit-remaining"], "4");
    assert_eq!(unknown_user.headers()["x-ratelimit-remaining"], "4");

    let a = body_json(wrong_password).await;
    let b = body_json(unknown_user).await;
    assert_eq!(a["code"], "invalid_credentials");
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_fifth_failure_blocks_even_the_correct_password() {
    let app = alice_app();

    for _ in 0..5 {
        let response = app
            .router
            .clone()
            .oneshot(json_post(
                "/api/login",
                &json!({ "username": "alice", "password": "wrong" }),
                "1.2.3.4",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "alice", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response.headers()[header::RETRY_AFTER]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0);

    let body = body_json(response).await;
    assert_eq!(body["code"], "rate_limited");
    assert!(body["details"]["retry_after_seconds"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_username_block_follows_the_account_across_ips() {
    let app = alice_app();

    for i in 0..5 {
        let ip = format!("10.0.0.{}", i + 1);
        app.router
            .clone()
            .oneshot(json_post(
                "/api/login",
                &json!({ "username": "alice", "password": "wrong" }),
                &ip,
            ))
            .await
            .unwrap();
    }

    let response = app
        .router
        .clone()
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "Alice", "password": "correct-password" }),
            "10.0.0.99",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(response).await;
    assert_eq!(body["details"]["reason"], "username");
}

#[tokio::test]
async fn test_blocked_ip_is_refused_on_register_too() {
    let app = TestApp::with_policy(
        vec![],
        AttemptPolicy {
            max_attempts: 2,
            window: Duration::from_secs(60),
            block_duration: Duration::from_secs(120),
        },
    );
    app.tracker.record_failure("1.2.3.4", None).await;
    app.tracker.record_failure("1.2.3.4", None).await;

    let response = app
        .router
        .oneshot(json_post(
            "/api/register",
            &json!({
                "username": "newbie",
                "email": "newbie@example.com",
                "password": "long-enough-password"
            }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()[header::RETRY_AFTER], "120");
    assert_eq!(body_json(response).await["details"]["reason"], "ip");
}

#[tokio::test]
async fn test_socket_address_is_used_without_proxy_headers() {
    let app = alice_app();
    app.tracker.record_failure("192.0.2.10", None).await;

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(
            json!({ "username": "alice", "password": "wrong" }).to_string(),
        ))
        .unwrap();
    let response = app
        .router
        .oneshot(with_peer(request, "192.0.2.10:55000"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "3");
}

#[tokio::test]
async fn test_success_clears_earlier_failures() {
    let app = alice_app();
    for _ in 0..3 {
        app.tracker.record_failure("1.2.3.4", Some("alice")).await;
    }

    let response = app
        .router
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "alice", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let snapshot = app.tracker.attempts("1.2.3.4", Some("alice")).await;
    assert_eq!(snapshot.ip_attempts, 0);
    assert_eq!(snapshot.user_attempts, 0);
}

#[tokio::test]
async fn test_disabled_account_is_forbidden_and_not_counted() {
    let mut user = sample_user(7, "alice", "correct-password");
    user.is_active = false;
    let app = TestApp::new(vec![user]);

    let response = app
        .router
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "alice", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "account_disabled");
    assert_eq!(app.tracker.attempts("1.2.3.4", Some("alice")).await.ip_attempts, 0);
}

#[tokio::test]
async fn test_missing_password_is_a_client_error() {
    let app = alice_app();

    let response = app
        .router
        .oneshot(json_post("/api/login", &json!({ "username": "alice" }), "1.2.3.4"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "missing_field");
}

#[tokio::test]
async fn test_malformed_body_is_invalid_body() {
    let app = alice_app();

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/api/login")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", "1.2.3.4")
        .body(axum::body::Body::from("{not json"))
        .unwrap();
    let response = app.router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "invalid_body");
}

#[tokio::test]
async fn test_register_creates_account_and_logs_in() {
    let app = TestApp::new(vec![]);

    let response = app
        .router
        .oneshot(json_post(
            "/api/register",
            &json!({
                "username": "newbie",
                "email": "Newbie@Example.com",
                "password": "long-enough-password",
                "first_name": "New",
                "height": 180.0,
                "initial_weight": 82.5
            }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key(header::SET_COOKIE));
    assert_eq!(response.headers()["x-ratelimit-limit"], "5");

    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"], 1);
    let claims = app.codec.verify(body["token"].as_str().unwrap()).unwrap();
    assert_eq!(claims.username, "newbie");
}

#[tokio::test]
async fn test_register_duplicate_is_conflict() {
    let app = alice_app();

    let response = app
        .router
        .oneshot(json_post(
            "/api/register",
            &json!({
                "username": "someone",
                "email": "ALICE@example.com",
                "password": "long-enough-password"
            }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_register_rejects_short_password() {
    let app = TestApp::new(vec![]);

    let response = app
        .router
        .oneshot(json_post(
            "/api/register",
            &json!({
                "username": "newbie",
                "email": "newbie@example.com",
                "password": "short"
            }),
            "1.2.3.4",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "validation_error");
}

#[tokio::test]
async fn test_logout_expires_cookie() {
    let app = TestApp::new(vec![]);

    let response = app
        .router
        .oneshot(json_post("/api/logout", &json!({}), "1.2.3.4"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("token=;"));
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_guesses_cannot_outrun_the_limit() {
    let store = Arc::new(
        MockCredentialStore::with_users(vec![sample_user(7, "alice", "correct-password")])
            .with_compare_delay(Duration::from_millis(50)),
    );
    let app = TestApp::build(lazy_pool(), store.clone(), AttemptPolicy::default());

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let router = app.router.clone();
            tokio::spawn(async move {
                router
                    .oneshot(json_post(
                        "/api/login",
                        &json!({ "username": "alice", "password": "wrong" }),
                        "1.2.3.4",
                    ))
                    .await
                    .unwrap()
                    .status()
            })
        })
        .collect();

    let mut unauthorized = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::UNAUTHORIZED => unauthorized += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }

    assert!(unauthorized <= 5, "{unauthorized} guesses were evaluated");
    assert_eq!(unauthorized + limited, 50);
    assert_eq!(store.comparisons(), unauthorized);

    let response = app
        .router
        .oneshot(json_post(
            "/api/login",
            &json!({ "username": "alice", "password": "correct-password" }),
            "1.2.3.4",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_spoofed_forwarding_headers_do_not_reset_the_ip_counter() {
    let app = TestApp::new(vec![]);

    let mut statuses = Vec::new();
    for i in 0..6 {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/api/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", format!("172.16.0.{}", i + 1))
            .body(axum::body::Body::from(
                json!({ "username": format!("victim{i}"), "password": "guess" }).to_string(),
            ))
            .unwrap();
        let response = app
            .router
            .clone()
            .oneshot(with_peer(request, "203.0.113.50:40000"))
            .await
            .unwrap();
        statuses.push(response.status());
    }

    assert_eq!(&statuses[..5], &[StatusCode::UNAUTHORIZED; 5]);
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);

    let snapshot = app.tracker.attempts("172.16.0.1", None).await;
    assert_eq!(snapshot.ip_attempts, 0);
}
