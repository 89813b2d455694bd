// ABOUTME: Gemini-style generateContent client: wire types, transport, and error mapping
// ABOUTME: Text and image exchanges share one retried request path with per-attempt timeouts
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Gemini Gateway
//!
//! Speaks the `generateContent` wire format: a `contents` array of
//! role-tagged turns plus a `generationConfig`, answered by a
//! `candidates` array. The upstream only distinguishes `"user"` and
//! `"model"` roles, so the system turn travels as a `"model"` turn.
//! Upstream failures never leak raw bodies to clients; the mapping at
//! the bottom of this file produces the stable user-facing messages.

use crate::config::{GeminiConfig, GenerationParams};
use crate::context::{ContextTurn, Role};
use crate::errors::{AppError, AppResult};
use crate::llm::{retry_with_backoff, RetryOutcome, RetryPolicy, Transient};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// Prompt sent alongside an uploaded image
const IMAGE_PROMPT: &str = "What's in this image?";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "topP")]
    top_p: f64,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

impl From<GenerationParams> for GenerationConfig {
    fn from(params: GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            max_output_tokens: params.max_output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Wire role for a context turn
///
/// The upstream accepts only `"user"` and `"model"`; system and model
/// turns both travel on the model side.
const fn wire_role(role: Role) -> &'static str {
    match role {
        Role::System | Role::Model => "model",
        Role::User => "user",
    }
}

// ---------------------------------------------------------------------------
// Internal error classification
// ---------------------------------------------------------------------------

/// Failure of one upstream attempt
#[derive(Debug)]
enum GatewayError {
    /// Network-level failure (connect, timeout, broken stream)
    Transport(reqwest::Error),
    /// Upstream answered with a non-success status
    Status { status: u16 },
    /// Well-formed reply with no usable candidate text
    Empty,
    /// Reply body did not match the expected envelope
    Parse(String),
}

impl std::fmt::Display for GatewayError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport failure: {e}"),
            Self::Status { status } => write!(f, "upstream returned status {status}"),
            Self::Empty => write!(f, "upstream returned no candidates"),
            Self::Parse(details) => write!(f, "unparseable upstream reply: {details}"),
        }
    }
}

impl Transient for GatewayError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::Empty | Self::Parse(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway
// ---------------------------------------------------------------------------

/// Client for the upstream generateContent endpoint
pub struct GeminiGateway {
    client: reqwest::Client,
    config: GeminiConfig,
}

impl std::fmt::Debug for GeminiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiGateway")
            .field("api_url", &self.config.api_url)
            .field("api_key", &"***")
            .finish_non_exhaustive()
    }
}

impl GeminiGateway {
    /// Create a gateway with a per-attempt timeout baked into the client
    ///
    /// # Errors
    ///
    /// Returns a config error if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// Send a text context and return the AI reply text
    ///
    /// # Errors
    ///
    /// Maps upstream failures to `EmptyResponse`, `ParseError`,
    /// `UpstreamExhausted`, `ExternalRateLimited`, or `InvalidInput`.
    #[tracing::instrument(skip(self, turns), fields(turn_count = turns.len()))]
    pub async fn send(&self, turns: &[ContextTurn]) -> AppResult<String> {
        let contents = turns
            .iter()
            .map(|turn| Content {
                role: wire_role(turn.role),
                parts: vec![Part::Text {
                    text: turn.text.clone(),
                }],
            })
            .collect();

        let request = GenerateRequest {
            contents,
            generation_config: self.config.text_params.into(),
        };
        self.send_retried(&request).await
    }

    /// Send an image for analysis and return the AI description
    ///
    /// # Errors
    ///
    /// Same mapping as [`send`](Self::send).
    #[tracing::instrument(skip(self, image_bytes), fields(image_len = image_bytes.len(), mime_type))]
    pub async fn send_with_image(&self, image_bytes: &[u8], mime_type: &str) -> AppResult<String> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text {
                        text: IMAGE_PROMPT.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: mime_type.to_string(),
                            data: general_purpose::STANDARD.encode(image_bytes),
                        },
                    },
                ],
            }],
            generation_config: self.config.image_params.into(),
        };
        self.send_retried(&request).await
    }

    async fn send_retried(&self, request: &GenerateRequest) -> AppResult<String> {
        let policy = RetryPolicy::new(
            self.config.retry.max_attempts,
            self.config.retry.base_delay,
        );

        let outcome = retry_with_backoff(policy, || self.attempt(request)).await;
        match outcome {
            RetryOutcome::Ok(text) => Ok(text),
            RetryOutcome::Exhausted(last) => Err(map_exhausted(&last, policy.max_attempts)),
            RetryOutcome::Fatal(error) => Err(map_fatal(error)),
        }
    }

    /// One upstream attempt: post, check status, extract text
    async fn attempt(&self, request: &GenerateRequest) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(&self.config.api_url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(request)
            .send()
            .await
            .map_err(GatewayError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.map_err(GatewayError::Transport)?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))?;

        extract_text(&parsed)
    }
}

/// Pull the reply text out of the first candidate's first text part
fn extract_text(response: &GenerateResponse) -> Result<String, GatewayError> {
    response
        .candidates
        .first()
        .and_then(|candidate| candidate.content.as_ref())
        .and_then(|content| content.parts.first())
        .and_then(|part| part.text.clone())
        .filter(|text| !text.is_empty())
        .ok_or(GatewayError::Empty)
}

fn map_fatal(error: GatewayError) -> AppError {
    match error {
        GatewayError::Empty => AppError::empty_response(),
        GatewayError::Parse(details) => {
            AppError::parse_error(format!("AI service reply could not be parsed: {details}"))
        }
        // Non-transient status means a 4xx other than 429.
        GatewayError::Status { status } => {
            tracing::warn!(status, "upstream rejected the request");
            AppError::invalid_input(
                "I couldn't process that request. Please try rephrasing your message.",
            )
        }
        GatewayError::Transport(e) => {
            AppError::internal("AI service request failed").with_source(e)
        }
    }
}

fn map_exhausted(last: &GatewayError, attempts: u32) -> AppError {
    if let GatewayError::Status { status: 429 } = last {
        return AppError::external_rate_limited(
            "I'm receiving too many requests right now. Please try again in a moment.",
        );
    }
    AppError::upstream_exhausted(format!(
        "The AI service did not respond after {attempts} attempts. Please try again later."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_role_mapping() {
        assert_eq!(wire_role(Role::System), "model");
        assert_eq!(wire_role(Role::Model), "model");
        assert_eq!(wire_role(Role::User), "user");
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![Part::Text {
                    text: "hello".to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: 2048,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["topP"], 0.8);
        assert_eq!(json["generationConfig"]["topK"], 40);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
    }

    #[test]
    fn test_inline_data_part_shape() {
        let part = Part::InlineData {
            inline_data: InlineData {
                mime_type: "image/png".to_string(),
                data: "YWJj".to_string(),
            },
        };
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["inline_data"]["mime_type"], "image/png");
        assert_eq!(json["inline_data"]["data"], "YWJj");
    }

    #[test]
    fn test_extract_text_happy_path() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hi there!"}]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(extract_text(&parsed).unwrap(), "Hi there!");
    }

    #[test]
    fn test_extract_text_no_candidates_is_empty() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(matches!(extract_text(&parsed), Err(GatewayError::Empty)));

        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(extract_text(&parsed), Err(GatewayError::Empty)));
    }

    #[test]
    fn test_extract_text_missing_parts_is_empty() {
        let body = r#"{"candidates":[{"content":{"parts":[]}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(extract_text(&parsed), Err(GatewayError::Empty)));
    }

    #[test]
    fn test_status_transience() {
        assert!(GatewayError::Status { status: 429 }.is_transient());
        assert!(GatewayError::Status { status: 500 }.is_transient());
        assert!(GatewayError::Status { status: 503 }.is_transient());
        assert!(!GatewayError::Status { status: 400 }.is_transient());
        assert!(!GatewayError::Status { status: 404 }.is_transient());
        assert!(!GatewayError::Empty.is_transient());
        assert!(!GatewayError::Parse("bad".to_string()).is_transient());
    }

    #[test]
    fn test_exhausted_rate_limit_mapping() {
        let error = map_exhausted(&GatewayError::Status { status: 429 }, 3);
        assert_eq!(error.code, crate::errors::ErrorCode::ExternalRateLimited);

        let error = map_exhausted(&GatewayError::Status { status: 503 }, 3);
        assert_eq!(error.code, crate::errors::ErrorCode::UpstreamExhausted);
    }

    #[test]
    fn test_fatal_mapping() {
        assert_eq!(
            map_fatal(GatewayError::Empty).code,
            crate::errors::ErrorCode::EmptyResponse
        );
        assert_eq!(
            map_fatal(GatewayError::Parse("x".to_string())).code,
            crate::errors::ErrorCode::ParseError
        );
        assert_eq!(
            map_fatal(GatewayError::Status { status: 400 }).code,
            crate::errors::ErrorCode::InvalidInput
        );
    }
}
