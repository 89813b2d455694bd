// ABOUTME: Environment-driven server configuration loaded once at startup
// ABOUTME: Covers HTTP, database, auth, upstream AI, context budget, and at-rest encryption settings
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Server Configuration
//!
//! All configuration comes from environment variables, parsed once at
//! startup into an immutable [`ServerConfig`]. Missing optional values
//! fall back to documented defaults; a missing required value (the JWT
//! secret, the AI API key) is a startup error rather than a latent
//! runtime failure.

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose, Engine as _};
use std::env;
use std::time::Duration;

/// Default system persona prepended to every upstream context.
const DEFAULT_SYSTEM_PROMPT: &str = "You are Cherry, a friendly and helpful AI assistant. \
     Keep your answers concise and conversational.";

/// Complete server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the API server
    pub http_port: u16,
    /// SQLite database URL
    pub database_url: String,
    /// Authentication settings
    pub auth: AuthConfig,
    /// Upstream AI service settings
    pub gemini: GeminiConfig,
    /// Context window settings
    pub context: ContextConfig,
    /// At-rest storage settings
    pub storage: StorageConfig,
}

/// JWT issuance and validation settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Symmetric signing secret shared by issuance and validation
    pub jwt_secret: String,
    /// Token lifetime in hours
    pub token_expiry_hours: i64,
    /// Cookie consulted when no Authorization header is present
    pub cookie_name: String,
}

/// Generation parameters sent with every upstream request
#[derive(Debug, Clone, Copy)]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

/// Retry policy for transient upstream failures
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Total attempts including the first (not extra retries)
    pub max_attempts: u32,
    /// Base delay; attempt N waits N * base before retrying
    pub base_delay: Duration,
}

/// Upstream Gemini-style AI service settings
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// Full URL of the generateContent endpoint
    pub api_url: String,
    /// API key appended as a query parameter
    pub api_key: String,
    /// Parameters for text-only exchanges
    pub text_params: GenerationParams,
    /// Parameters for image analysis (lower temperature, shorter output)
    pub image_params: GenerationParams,
    /// Per-attempt request timeout
    pub request_timeout: Duration,
    /// Retry policy
    pub retry: RetryConfig,
}

/// Context window budget settings
#[derive(Debug, Clone)]
pub struct ContextConfig {
    /// Total token budget for one upstream request
    pub max_token_budget: u32,
    /// Flat per-turn token estimate used to derive the turn cap
    pub estimated_tokens_per_turn: u32,
    /// Persona instruction placed first in every context
    pub system_prompt: String,
}

impl ContextConfig {
    /// Maximum number of turns that fit the token budget
    #[must_use]
    pub fn max_turns(&self) -> usize {
        (self.max_token_budget / self.estimated_tokens_per_turn.max(1)) as usize
    }
}

/// At-rest encryption settings for stored conversation content
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// When true, message and conversation text fields are encrypted
    pub encrypt_at_rest: bool,
    /// 256-bit field encryption key, required when `encrypt_at_rest` is set
    pub field_key: Option<[u8; 32]>,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is absent or a value
    /// fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let config = Self {
            http_port: env_parse("HTTP_PORT", 8081)?,
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./data/chatbox.db".to_string()),
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET")
                    .map_err(|_| AppError::config("JWT_SECRET must be set"))?,
                token_expiry_hours: env_parse("JWT_EXPIRY_HOURS", 24)?,
                cookie_name: env::var("JWT_COOKIE_NAME")
                    .unwrap_or_else(|_| "JWT_TOKEN".to_string()),
            },
            gemini: GeminiConfig {
                api_url: env::var("GEMINI_API_URL").map_err(|_| {
                    AppError::config("GEMINI_API_URL must be set to the generateContent endpoint")
                })?,
                api_key: env::var("GEMINI_API_KEY")
                    .map_err(|_| AppError::config("GEMINI_API_KEY must be set"))?,
                text_params: GenerationParams {
                    temperature: env_parse("GEMINI_TEXT_TEMPERATURE", 0.7)?,
                    top_p: env_parse("GEMINI_TOP_P", 0.8)?,
                    top_k: env_parse("GEMINI_TOP_K", 40)?,
                    max_output_tokens: env_parse("GEMINI_TEXT_MAX_TOKENS", 2048)?,
                },
                image_params: GenerationParams {
                    temperature: env_parse("GEMINI_IMAGE_TEMPERATURE", 0.4)?,
                    top_p: env_parse("GEMINI_TOP_P", 0.8)?,
                    top_k: env_parse("GEMINI_TOP_K", 40)?,
                    max_output_tokens: env_parse("GEMINI_IMAGE_MAX_TOKENS", 1024)?,
                },
                request_timeout: Duration::from_secs(env_parse("GEMINI_TIMEOUT_SECS", 30)?),
                retry: RetryConfig {
                    max_attempts: env_parse("GEMINI_RETRY_ATTEMPTS", 3)?,
                    base_delay: Duration::from_millis(env_parse("GEMINI_RETRY_DELAY_MS", 1000)?),
                },
            },
            context: ContextConfig {
                max_token_budget: env_parse("CONTEXT_MAX_TOKENS", 30720)?,
                estimated_tokens_per_turn: env_parse("CONTEXT_TOKENS_PER_TURN", 150)?,
                system_prompt: env::var("SYSTEM_PROMPT")
                    .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.to_string()),
            },
            storage: StorageConfig {
                encrypt_at_rest: env::var("ENCRYPT_AT_REST")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
                field_key: load_field_key()?,
            },
        };

        if config.storage.encrypt_at_rest && config.storage.field_key.is_none() {
            return Err(AppError::config(
                "ENCRYPT_AT_REST is enabled but FIELD_ENCRYPTION_KEY is not set",
            ));
        }
        if config.gemini.retry.max_attempts == 0 {
            return Err(AppError::config("GEMINI_RETRY_ATTEMPTS must be at least 1"));
        }

        tracing::info!(
            port = config.http_port,
            encrypt_at_rest = config.storage.encrypt_at_rest,
            max_turns = config.context.max_turns(),
            "configuration loaded"
        );

        Ok(config)
    }
}

/// Parse an env var with a default, failing loudly on malformed values
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> AppResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::config(format!("{name} has an invalid value: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Load the optional base64-encoded 256-bit field encryption key
fn load_field_key() -> AppResult<Option<[u8; 32]>> {
    let Ok(encoded) = env::var("FIELD_ENCRYPTION_KEY") else {
        return Ok(None);
    };
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::config(format!("FIELD_ENCRYPTION_KEY is not valid base64: {e}")))?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AppError::config("FIELD_ENCRYPTION_KEY must decode to exactly 32 bytes"))?;
    Ok(Some(key))
}
