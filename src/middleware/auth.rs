// ABOUTME: Per-request authentication gate: Bearer header first, JWT_TOKEN cookie fallback
// ABOUTME: Live role lookup beats the token's role claim; gate failures never abort the request
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Auth Gate
//!
//! Runs on every request outside the allow-list. A valid token attaches
//! an [`AuthContext`] extension; anything else (no token, expired,
//! forged, malformed) leaves the request unauthenticated and lets it
//! proceed, so the decision to reject belongs to each handler via
//! [`require_auth`]. The role on the context comes from a live user
//! lookup when possible, so a role change takes effect before old
//! tokens expire; the claim's role is only a fallback when the lookup
//! fails.

use crate::errors::{AppError, AppResult};
use crate::server::ServerResources;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use axum::Extension;
use std::sync::Arc;

/// Paths reachable without a token
const PUBLIC_PREFIXES: &[&str] = &["/api/auth", "/api/docs", "/health"];

/// Identity attached to an authenticated request
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub username: String,
    /// Live role when the lookup succeeded, claim role otherwise
    pub role: String,
}

/// Authentication middleware
///
/// Never rejects by itself: requests without a usable token simply
/// carry no [`AuthContext`].
#[tracing::instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn authenticate(
    State(resources): State<Arc<ServerResources>>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    if let Some(token) = extract_token(&request, &resources.config.auth.cookie_name) {
        match resources.token_codec.validate(&token) {
            Ok(claims) => {
                let role = resolve_role(&resources, &claims.sub, &claims.role).await;
                tracing::debug!(username = %claims.sub, %role, "request authenticated");
                request
                    .extensions_mut()
                    .insert(AuthContext {
                        username: claims.sub,
                        role,
                    });
            }
            Err(error) => {
                tracing::debug!("token rejected: {error}");
            }
        }
    }

    next.run(request).await
}

/// Match allow-list entries on whole path segments, so `/api/auth/login`
/// is public but `/api/authors` is not
fn is_public_path(path: &str) -> bool {
    PUBLIC_PREFIXES.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Prefer the live role; degrade to the claim when the lookup fails
async fn resolve_role(resources: &ServerResources, username: &str, claim_role: &str) -> String {
    match resources.users.find_by_username(username).await {
        Ok(Some(user)) => user.role,
        Ok(None) => {
            tracing::debug!(%username, "no user record, keeping claim role");
            claim_role.to_string()
        }
        Err(error) => {
            tracing::warn!(%username, "role lookup failed, keeping claim role: {error}");
            claim_role.to_string()
        }
    }
}

/// Pull the token from the Authorization header or the session cookie
fn extract_token(request: &Request, cookie_name: &str) -> Option<String> {
    if let Some(value) = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    request
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| get_cookie_value(cookies, cookie_name))
}

/// Find a named cookie in a Cookie header value
fn get_cookie_value(cookies: &str, name: &str) -> Option<String> {
    cookies.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// Unwrap the auth extension or reject with 401
///
/// # Errors
///
/// Returns `AuthRequired` when the request carried no valid token.
pub fn require_auth(auth: Option<Extension<AuthContext>>) -> AppResult<AuthContext> {
    auth.map(|Extension(context)| context)
        .ok_or_else(AppError::auth_required)
}
