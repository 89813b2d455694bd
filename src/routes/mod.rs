// ABOUTME: HTTP route handlers for the conversation API
// ABOUTME: Split by concern: auth, conversations, image uploads
//
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod auth;
pub mod conversations;
pub mod images;

use axum::Json;
use serde_json::{json, Value};

/// Liveness probe
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
