// ABOUTME: Shared test fixtures: temp databases, server resources, mock upstream servers
// ABOUTME: Every integration test builds its world through these helpers
//
// SPDX-License-Identifier: MIT OR Apache-2.0

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use axum::Router;
use chatbox_server::config::{
    AuthConfig, ContextConfig, GeminiConfig, GenerationParams, RetryConfig, ServerConfig,
    StorageConfig,
};
use chatbox_server::crypto::generate_field_key;
use chatbox_server::models::User;
use chatbox_server::ServerResources;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_JWT_SECRET: &str = "integration-test-signing-secret";

fn generation_params() -> GenerationParams {
    GenerationParams {
        temperature: 0.7,
        top_p: 0.8,
        top_k: 40,
        max_output_tokens: 2048,
    }
}

/// Build a full config pointing at a temp database and the given upstream URL
pub fn test_config(database_url: &str, upstream_url: &str, encrypt: bool) -> ServerConfig {
    ServerConfig {
        http_port: 0,
        database_url: database_url.to_string(),
        auth: AuthConfig {
            jwt_secret: TEST_JWT_SECRET.to_string(),
            token_expiry_hours: 1,
            cookie_name: "JWT_TOKEN".to_string(),
        },
        gemini: GeminiConfig {
            api_url: upstream_url.to_string(),
            api_key: "test-api-key".to_string(),
            text_params: generation_params(),
            image_params: generation_params(),
            request_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
            },
        },
        context: ContextConfig {
            max_token_budget: 30720,
            estimated_tokens_per_turn: 150,
            system_prompt: "You are Cherry, a helpful assistant.".to_string(),
        },
        storage: StorageConfig {
            encrypt_at_rest: encrypt,
            field_key: encrypt.then(generate_field_key),
        },
    }
}

/// Spin up server resources over a fresh temp database
///
/// The returned `TempDir` must stay alive for the database to exist.
pub async fn test_resources(upstream_url: &str, encrypt: bool) -> (Arc<ServerResources>, TempDir) {
    let dir = TempDir::new().unwrap();
    let database_url = format!("sqlite:{}/test.db", dir.path().display());
    let config = test_config(&database_url, upstream_url, encrypt);
    let resources = ServerResources::new(config).await.unwrap();
    (Arc::new(resources), dir)
}

/// Create a user account for test logins and role lookups
pub async fn create_user(
    resources: &ServerResources,
    username: &str,
    password: &str,
    role: &str,
) -> User {
    resources.users.create(username, password, role).await.unwrap()
}

/// Serve a router on an ephemeral local port, returning its base URL
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/generate")
}

/// JSON body a healthy upstream returns for the given reply text
pub fn gemini_reply(text: &str) -> serde_json::Value {
    serde_json::json!({
        "candidates": [
            { "content": { "parts": [ { "text": text } ] } }
        ]
    })
}
