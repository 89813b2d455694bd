// ABOUTME: Auth gate integration tests over the real router
// ABOUTME: Header/cookie extraction, live role resolution, and login round trips
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chatbox_server::router;
use http_body_util::BodyExt;
use tower::ServiceExt;

const DUMMY_UPSTREAM: &str = "http://127.0.0.1:9/generate";

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn create_request() -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/api/conversations/create")
        .header(header::CONTENT_TYPE, "application/json")
}

fn create_body(owner: &str) -> Body {
    Body::from(format!(r#"{{"username":"{owner}"}}"#))
}

#[tokio::test]
async fn test_request_without_token_is_rejected() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    let app = router(resources);

    let response = app
        .oneshot(create_request().body(create_body("alice")).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"]["code"], "AUTH_REQUIRED");
}

#[tokio::test]
async fn test_bearer_token_authenticates() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    common::create_user(&resources, "alice", "pw", "USER").await;
    let token = resources.token_codec.issue("alice", Some("USER")).unwrap();
    let app = router(resources);

    let response = app
        .oneshot(
            create_request()
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(create_body("alice"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["username"], "alice");
    assert_eq!(json["title"], "");
}

#[tokio::test]
async fn test_cookie_fallback_authenticates() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    common::create_user(&resources, "alice", "pw", "USER").await;
    let token = resources.token_codec.issue("alice", None).unwrap();
    let app = router(resources);

    let response = app
        .oneshot(
            create_request()
                .header(header::COOKIE, format!("theme=dark; JWT_TOKEN={token}"))
                .body(create_body("alice"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_live_role_beats_stale_claim() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    // The account was promoted after this token was issued.
    common::create_user(&resources, "alice", "pw", "ADMIN").await;
    let stale = resources.token_codec.issue("alice", Some("USER")).unwrap();
    let app = router(resources);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/conversations/analytics")
                .header(header::AUTHORIZATION, format!("Bearer {stale}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_claim_role_survives_missing_user_record() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    // No user record exists; the claim role is all the gate has.
    let token = resources.token_codec.issue("ghost", Some("USER")).unwrap();

    let create = router(resources.clone())
        .oneshot(
            create_request()
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(create_body("ghost"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::CREATED);

    let analytics = router(resources)
        .oneshot(
            Request::builder()
                .uri("/api/conversations/analytics")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(analytics.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_expired_and_garbage_tokens_are_rejected() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    common::create_user(&resources, "alice", "pw", "USER").await;
    let expired = resources
        .token_codec
        .issue_with_expiry("alice", None, chrono::Duration::hours(-1))
        .unwrap();

    for token in [expired.as_str(), "garbage.token.value"] {
        let response = router(resources.clone())
            .oneshot(
                create_request()
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(create_body("alice"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_login_round_trip() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    common::create_user(&resources, "alice", "correct-horse", "USER").await;
    let app = router(resources.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    r#"{"username":"alice","password":"correct-horse"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("JWT_TOKEN="));
    assert!(cookie.contains("HttpOnly"));

    let json = body_json(response).await;
    assert_eq!(json["username"], "alice");
    assert_eq!(json["role"], "USER");
    let token = json["token"].as_str().unwrap();
    let claims = resources.token_codec.validate(token).unwrap();
    assert_eq!(claims.sub, "alice");
}

#[tokio::test]
async fn test_login_with_wrong_password_fails() {
    let (resources, _dir) = common::test_resources(DUMMY_UPSTREAM, false).await;
    common::create_user(&resources, "alice", "correct-horse", "USER").await;

    let response = router(resources)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"username":"alice","password":"wrong"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
