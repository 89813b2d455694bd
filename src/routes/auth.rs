// ABOUTME: Login endpoint: verifies credentials, issues a JWT, and sets the session cookie
// ABOUTME: The cookie carries the same token the response body returns
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::database::UserStore;
use crate::errors::{AppError, AppResult};
use crate::server::ServerResources;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginResponse {
    token: String,
    username: String,
    role: String,
}

/// POST /api/auth/login
///
/// Bad username and bad password produce the same rejection.
#[tracing::instrument(skip_all, fields(username = %request.username))]
pub(crate) async fn login(
    State(resources): State<Arc<ServerResources>>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Response> {
    let user = resources
        .users
        .find_by_username(&request.username)
        .await?
        .ok_or_else(|| AppError::auth_invalid("Invalid username or password"))?;

    if !UserStore::verify_password(&user, &request.password)? {
        return Err(AppError::auth_invalid("Invalid username or password"));
    }

    let token = resources.token_codec.issue(&user.username, Some(&user.role))?;

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}",
        resources.config.auth.cookie_name,
        token,
        resources.config.auth.token_expiry_hours * 3600,
    );

    tracing::info!("login succeeded");
    let body = Json(LoginResponse {
        token,
        username: user.username,
        role: user.role,
    });
    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}
