// ABOUTME: Image upload endpoint: validates the file, asks the AI to describe it, persists both sides
// ABOUTME: 5 MB cap and a fixed mime allow-list; image content is stored base64-encoded
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use crate::middleware::{require_auth, AuthContext};
use crate::models::{ContentType, AI_SENTINEL};
use crate::routes::conversations::check_ownership;
use crate::server::ServerResources;
use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Largest accepted image, in bytes
const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Accepted image content types
const ALLOWED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

#[derive(Debug, Serialize)]
pub(crate) struct ImageUploadResponse {
    /// AI-generated description of the uploaded image
    message: String,
}

/// POST /api/images/upload
///
/// Multipart fields: `file` (the image), `username`, `conversationId`.
/// The image is sent upstream for description; the stored user message
/// holds the base64 image data with the `IMAGE` content type. Like the
/// text exchange, the upstream call and the appends run on a spawned
/// task so a dropped connection does not lose the exchange.
#[tracing::instrument(skip_all)]
pub(crate) async fn upload(
    State(resources): State<Arc<ServerResources>>,
    auth: Option<Extension<AuthContext>>,
    mut multipart: Multipart,
) -> AppResult<Json<ImageUploadResponse>> {
    let auth = require_auth(auth)?;

    let mut image: Option<(Vec<u8>, String)> = None;
    let mut username: Option<String> = None;
    let mut conversation_id: Option<Uuid> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid_input(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let mime = field
                    .content_type()
                    .ok_or_else(|| AppError::invalid_input("Image file has no content type"))?
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("Failed to read image: {e}")))?;
                image = Some((bytes.to_vec(), mime));
            }
            Some("username") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("Malformed field: {e}")))?;
                username = Some(raw.trim().to_string());
            }
            Some("conversationId") => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| AppError::invalid_input(format!("Malformed field: {e}")))?;
                conversation_id = Some(
                    Uuid::parse_str(raw.trim())
                        .map_err(|_| AppError::invalid_input("conversationId is not a UUID"))?,
                );
            }
            _ => {}
        }
    }

    let (bytes, mime) = image.ok_or_else(|| AppError::missing_field("file"))?;
    let username = username.ok_or_else(|| AppError::missing_field("username"))?;
    let conversation_id = conversation_id.ok_or_else(|| AppError::missing_field("conversationId"))?;
    if username.is_empty() {
        return Err(AppError::missing_field("username"));
    }
    // The declared uploader must be who the token says it is.
    check_ownership(&auth, &username)?;

    validate_image(&bytes, &mime)?;

    let conversation = resources
        .conversations
        .get(conversation_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Conversation {conversation_id}")))?;
    check_ownership(&auth, &conversation.username)?;

    let resources = resources.clone();
    let exchange = tokio::spawn(async move {
        let started = Instant::now();
        let description = resources.gateway.send_with_image(&bytes, &mime).await?;
        let elapsed_ms = started.elapsed().as_millis() as i64;

        let encoded = general_purpose::STANDARD.encode(&bytes);
        resources
            .conversations
            .append_message(conversation_id, &username, &encoded, ContentType::Image)
            .await?;
        resources
            .conversations
            .append_message(conversation_id, AI_SENTINEL, &description, ContentType::Text)
            .await?;
        resources
            .analytics
            .record_exchange(conversation_id, elapsed_ms)
            .await?;

        tracing::info!(%conversation_id, image_bytes = bytes.len(), elapsed_ms, "image exchange completed");
        Ok::<_, AppError>(description)
    });

    let description = exchange
        .await
        .map_err(|e| AppError::internal(format!("Image exchange task failed: {e}")))??;
    Ok(Json(ImageUploadResponse {
        message: description,
    }))
}

fn validate_image(bytes: &[u8], mime: &str) -> AppResult<()> {
    if bytes.is_empty() {
        return Err(AppError::invalid_input("Image file is empty"));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(AppError::invalid_input(format!(
            "Image exceeds the {} MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    if !ALLOWED_MIME_TYPES.contains(&mime) {
        return Err(AppError::unsupported(format!(
            "Unsupported image type: {mime}"
        )));
    }
    Ok(())
}
