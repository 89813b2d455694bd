// ABOUTME: Gateway integration tests against a local mock upstream
// ABOUTME: Exercises retry counts, transience classification, and error mapping over real HTTP
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chatbox_server::config::{GeminiConfig, GenerationParams, RetryConfig};
use chatbox_server::context::ContextTurn;
use chatbox_server::llm::GeminiGateway;
use chatbox_server::ErrorCode;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn gateway_config(url: &str) -> GeminiConfig {
    let params = GenerationParams {
        temperature: 0.7,
        top_p: 0.8,
        top_k: 40,
        max_output_tokens: 2048,
    };
    GeminiConfig {
        api_url: url.to_string(),
        api_key: "test-api-key".to_string(),
        text_params: params,
        image_params: params,
        request_timeout: Duration::from_secs(5),
        retry: RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
        },
    }
}

/// Upstream that fails with the given status until `succeed_after` calls
fn flaky_upstream(counter: Arc<AtomicU32>, fail_status: StatusCode, succeed_after: u32) -> Router {
    Router::new().route(
        "/generate",
        post(move |State(counter): State<Arc<AtomicU32>>| async move {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= succeed_after {
                fail_status.into_response()
            } else {
                Json(common::gemini_reply("Hello from upstream")).into_response()
            }
        }),
    )
    .with_state(counter)
}

fn turns() -> Vec<ContextTurn> {
    vec![ContextTurn::system("persona"), ContextTurn::user("hi")]
}

#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let counter = Arc::new(AtomicU32::new(0));
    let url = common::spawn_upstream(flaky_upstream(
        counter.clone(),
        StatusCode::INTERNAL_SERVER_ERROR,
        2,
    ))
    .await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let reply = gateway.send(&turns()).await.unwrap();

    assert_eq!(reply, "Hello from upstream");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_exhausts_after_exactly_three_attempts() {
    let counter = Arc::new(AtomicU32::new(0));
    let url = common::spawn_upstream(flaky_upstream(
        counter.clone(),
        StatusCode::SERVICE_UNAVAILABLE,
        u32::MAX,
    ))
    .await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let err = gateway.send(&turns()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::UpstreamExhausted);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_client_error_does_not_retry() {
    let counter = Arc::new(AtomicU32::new(0));
    let url = common::spawn_upstream(flaky_upstream(
        counter.clone(),
        StatusCode::BAD_REQUEST,
        u32::MAX,
    ))
    .await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let err = gateway.send(&turns()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::InvalidInput);
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_persistent_rate_limit_maps_to_rate_limited() {
    let counter = Arc::new(AtomicU32::new(0));
    let url = common::spawn_upstream(flaky_upstream(
        counter.clone(),
        StatusCode::TOO_MANY_REQUESTS,
        u32::MAX,
    ))
    .await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let err = gateway.send(&turns()).await.unwrap_err();

    assert_eq!(err.code, ErrorCode::ExternalRateLimited);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_empty_candidates_is_empty_response() {
    let upstream = Router::new().route(
        "/generate",
        post(|| async { Json(serde_json::json!({ "candidates": [] })) }),
    );
    let url = common::spawn_upstream(upstream).await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let err = gateway.send(&turns()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::EmptyResponse);
}

#[tokio::test]
async fn test_unparseable_body_is_parse_error() {
    let upstream = Router::new().route("/generate", post(|| async { "this is not json" }));
    let url = common::spawn_upstream(upstream).await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let err = gateway.send(&turns()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ParseError);
}

#[tokio::test]
async fn test_image_request_reaches_upstream() {
    let upstream = Router::new().route(
        "/generate",
        post(|Json(body): Json<serde_json::Value>| async move {
            // The image travels as inline_data next to the text prompt.
            let parts = &body["contents"][0]["parts"];
            assert_eq!(parts[1]["inline_data"]["mime_type"], "image/png");
            Json(common::gemini_reply("A small test image"))
        }),
    );
    let url = common::spawn_upstream(upstream).await;

    let gateway = GeminiGateway::new(gateway_config(&url)).unwrap();
    let reply = gateway
        .send_with_image(&[0x89, 0x50, 0x4e, 0x47], "image/png")
        .await
        .unwrap();
    assert_eq!(reply, "A small test image");
}
