// ABOUTME: Conversation endpoints: create, exchange messages, read, retitle, delete, analytics
// ABOUTME: Every handler enforces ownership; admins may act on other users' conversations
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use crate::middleware::{require_auth, AuthContext};
use crate::models::{ContentType, Message, AI_SENTINEL};
use crate::server::ServerResources;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub(crate) struct CreateConversationRequest {
    username: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SendMessageRequest {
    username: String,
    message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerQuery {
    username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExchangeResponse {
    user_message: Message,
    ai_message: Message,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpdateTitleRequest {
    title: String,
}

/// POST /api/conversations/create — create an empty conversation
///
/// The body names the owner; users may only create for themselves,
/// admins for anyone.
pub(crate) async fn create(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Json(request): Json<CreateConversationRequest>,
) -> AppResult<Response> {
    let auth = require_auth(auth)?;
    let owner = request.username.trim();
    if owner.is_empty() {
        return Err(AppError::missing_field("username"));
    }
    check_ownership(&auth, owner)?;

    let conversation = resources.conversations.create(owner, "").await?;
    tracing::info!(conversation_id = %conversation.id, username = %owner, "conversation created");
    Ok((StatusCode::CREATED, Json(conversation)).into_response())
}

/// POST /api/conversations/:id/messages — one full user/AI exchange
///
/// Appends the user message and the AI reply, records the exchange
/// latency, and returns both persisted messages. The upstream call and
/// the appends run on a spawned task, so a client that disconnects
/// mid-exchange does not abort persistence.
#[tracing::instrument(skip(resources, auth, request), fields(conversation_id = %id))]
pub(crate) async fn send_message(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SendMessageRequest>,
) -> AppResult<Json<ExchangeResponse>> {
    let auth = require_auth(auth)?;
    let sender = request.username.trim().to_string();
    if sender.is_empty() {
        return Err(AppError::missing_field("username"));
    }
    check_ownership(&auth, &sender)?;
    let content = request.message.trim().to_string();
    if content.is_empty() {
        return Err(AppError::missing_field("message"));
    }

    let conversation = resources
        .conversations
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Conversation {id}")))?;
    check_ownership(&auth, &conversation.username)?;

    let turns = resources.context_builder.build(&conversation.messages, &content);

    let resources = resources.clone();
    let exchange = tokio::spawn(async move {
        let started = Instant::now();
        let reply = resources.gateway.send(&turns).await?;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let user_message = resources
            .conversations
            .append_message(id, &sender, &content, ContentType::Text)
            .await?;
        let ai_message = resources
            .conversations
            .append_message(id, AI_SENTINEL, &reply, ContentType::Text)
            .await?;
        resources.analytics.record_exchange(id, elapsed_ms).await?;

        tracing::info!(elapsed_ms, "exchange completed");
        Ok::<_, AppError>((user_message, ai_message))
    });

    let (user_message, ai_message) = exchange
        .await
        .map_err(|e| AppError::internal(format!("Exchange task failed: {e}")))??;
    Ok(Json(ExchangeResponse {
        user_message,
        ai_message,
    }))
}

/// GET /api/conversations/:id
pub(crate) async fn get_by_id(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Path(id): Path<Uuid>,
) -> AppResult<Response> {
    let auth = require_auth(auth)?;
    let conversation = resources
        .conversations
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Conversation {id}")))?;
    check_ownership(&auth, &conversation.username)?;
    Ok(Json(conversation).into_response())
}

/// GET /api/conversations/by-username?username=
///
/// An empty result is a 404 with a `message` body rather than an empty
/// list, which is what existing clients expect.
pub(crate) async fn list_by_username(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Query(OwnerQuery { username }): Query<OwnerQuery>,
) -> AppResult<Response> {
    let auth = require_auth(auth)?;
    check_ownership(&auth, &username)?;

    let conversations = resources.conversations.list_by_owner(&username).await?;
    if conversations.is_empty() {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "message": format!("No conversations found for user: {username}") })),
        )
            .into_response());
    }
    Ok(Json(conversations).into_response())
}

/// DELETE /api/conversations/:id
pub(crate) async fn delete_by_id(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let auth = require_auth(auth)?;
    let conversation = resources
        .conversations
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Conversation {id}")))?;
    check_ownership(&auth, &conversation.username)?;

    resources.conversations.delete(id).await?;
    tracing::info!(conversation_id = %id, "conversation deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/conversations/by-username?username=
pub(crate) async fn delete_by_username(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Query(OwnerQuery { username }): Query<OwnerQuery>,
) -> AppResult<Json<serde_json::Value>> {
    let auth = require_auth(auth)?;
    check_ownership(&auth, &username)?;

    let deleted = resources.conversations.delete_by_owner(&username).await?;
    tracing::info!(%username, deleted, "conversations deleted by owner");
    Ok(Json(json!({ "deleted": deleted })))
}

/// PUT /api/conversations/:id/title
pub(crate) async fn update_title(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTitleRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let auth = require_auth(auth)?;
    let title = request.title.trim();
    if title.is_empty() {
        return Err(AppError::invalid_input("Title must not be blank"));
    }

    let conversation = resources
        .conversations
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Conversation {id}")))?;
    check_ownership(&auth, &conversation.username)?;

    resources.conversations.set_title(id, title).await?;
    Ok(Json(json!({ "title": title })))
}

/// GET /api/conversations/analytics — admin-only aggregate usage numbers
pub(crate) async fn analytics(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
) -> AppResult<Response> {
    let auth = require_auth(auth)?;
    if auth.role != "ADMIN" {
        return Err(AppError::permission_denied(
            "Analytics requires the ADMIN role",
        ));
    }
    let summary = resources.analytics.overall().await?;
    Ok(Json(summary).into_response())
}

/// Owners act on their own data; admins act on anyone's
pub(crate) fn check_ownership(auth: &AuthContext, owner: &str) -> AppResult<()> {
    if auth.username == owner || auth.role == "ADMIN" {
        Ok(())
    } else {
        Err(AppError::permission_denied(
            "You may only access your own conversations",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_ownership() {
        let user = AuthContext {
            username: "alice".to_string(),
            role: "USER".to_string(),
        };
        assert!(check_ownership(&user, "alice").is_ok());
        assert!(check_ownership(&user, "bob").is_err());

        let admin = AuthContext {
            username: "root".to_string(),
            role: "ADMIN".to_string(),
        };
        assert!(check_ownership(&admin, "bob").is_ok());
    }
}
