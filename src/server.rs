// ABOUTME: Shared resource wiring, router assembly, and the HTTP serve loop
// ABOUTME: All handlers and middleware see one Arc<ServerResources>
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::analytics::AnalyticsService;
use crate::auth::TokenCodec;
use crate::config::ServerConfig;
use crate::context::ContextBuilder;
use crate::crypto::FieldCipher;
use crate::database::{ConversationStore, Database, UserStore};
use crate::errors::{AppError, AppResult};
use crate::llm::GeminiGateway;
use crate::middleware::authenticate;
use crate::routes;
use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Request body cap, sized for the 5 MB image limit plus multipart overhead
const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Everything handlers and middleware share
pub struct ServerResources {
    pub config: ServerConfig,
    pub conversations: ConversationStore,
    pub users: UserStore,
    pub analytics: AnalyticsService,
    pub gateway: GeminiGateway,
    pub context_builder: ContextBuilder,
    pub token_codec: TokenCodec,
}

impl ServerResources {
    /// Connect the database and construct every shared component
    ///
    /// # Errors
    ///
    /// Returns config or database errors from component construction.
    pub async fn new(config: ServerConfig) -> AppResult<Self> {
        let database = Database::connect(&config.database_url).await?;

        let cipher = if config.storage.encrypt_at_rest {
            let key = config
                .storage
                .field_key
                .as_ref()
                .ok_or_else(|| AppError::config("Encryption enabled without a field key"))?;
            Some(Arc::new(FieldCipher::new(key)))
        } else {
            None
        };

        let conversations = ConversationStore::new(database.pool(), cipher);
        let users = UserStore::new(database.pool());
        let analytics = AnalyticsService::new(conversations.clone());
        let gateway = GeminiGateway::new(config.gemini.clone())?;
        let context_builder = ContextBuilder::new(
            config.context.max_turns(),
            config.context.system_prompt.clone(),
        );
        let token_codec = TokenCodec::new(&config.auth.jwt_secret, config.auth.token_expiry_hours);

        Ok(Self {
            config,
            conversations,
            users,
            analytics,
            gateway,
            context_builder,
            token_codec,
        })
    }
}

/// Build the API router with all middleware attached
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/auth/login", post(routes::auth::login))
        .route(
            "/api/conversations/create",
            post(routes::conversations::create),
        )
        .route(
            "/api/conversations/by-username",
            get(routes::conversations::list_by_username)
                .delete(routes::conversations::delete_by_username),
        )
        .route(
            "/api/conversations/analytics",
            get(routes::conversations::analytics),
        )
        .route(
            "/api/conversations/:id",
            get(routes::conversations::get_by_id).delete(routes::conversations::delete_by_id),
        )
        .route(
            "/api/conversations/:id/messages",
            post(routes::conversations::send_message),
        )
        .route(
            "/api/conversations/:id/title",
            put(routes::conversations::update_title),
        )
        .route("/api/images/upload", post(routes::images::upload))
        .layer(from_fn_with_state(resources.clone(), authenticate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(resources)
}

/// Bind the configured port and serve until shutdown
///
/// # Errors
///
/// Returns an internal error when binding or serving fails.
pub async fn serve(resources: Arc<ServerResources>) -> AppResult<()> {
    let port = resources.config.http_port;
    let app = router(resources);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind port {port}: {e}")))?;

    tracing::info!(port, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {error}");
        return;
    }
    tracing::info!("shutdown signal received");
}
