// ABOUTME: Core domain types shared across storage, routes, and the AI gateway
// ABOUTME: Serde names follow the camelCase wire format expected by existing clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sender name used for every AI-authored message
pub const AI_SENTINEL: &str = "Cherry";

/// Kind of content a message carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "TEXT")]
    Text,
    #[serde(rename = "IMAGE")]
    Image,
}

impl ContentType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
        }
    }

    /// Parse a stored content type tag
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for tags this server does not handle.
    pub fn parse(value: &str) -> Result<Self, AppError> {
        match value {
            "TEXT" => Ok(Self::Text),
            "IMAGE" => Ok(Self::Image),
            other => Err(AppError::unsupported(format!(
                "Unsupported content type: {other}"
            ))),
        }
    }
}

/// A single message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    /// Username of the author, or [`AI_SENTINEL`] for AI replies
    pub sender: String,
    pub content: String,
    pub content_type: ContentType,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Whether this message was authored by the AI
    #[must_use]
    pub fn is_ai(&self) -> bool {
        self.sender == AI_SENTINEL
    }
}

/// A conversation with its full ordered message history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    /// Owning username
    pub username: String,
    /// Empty until the first human message sets it
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub messages: Vec<Message>,
    /// Completed user/AI exchanges recorded against this conversation
    pub processed_exchanges: i64,
    #[serde(rename = "totalResponseTimeMillis")]
    pub total_response_time_ms: i64,
}

/// Access role carried in tokens and on user records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserRole {
    #[serde(rename = "USER")]
    User,
    #[serde(rename = "ADMIN")]
    Admin,
}

impl UserRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

/// A registered user account
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_round_trip() {
        assert_eq!(ContentType::parse("TEXT").unwrap(), ContentType::Text);
        assert_eq!(ContentType::parse("IMAGE").unwrap(), ContentType::Image);
        assert!(ContentType::parse("AUDIO").is_err());
    }

    #[test]
    fn test_message_wire_names() {
        let message = Message {
            id: Uuid::new_v4(),
            sender: AI_SENTINEL.to_string(),
            content: "hello".to_string(),
            content_type: ContentType::Text,
            timestamp: Utc::now(),
        };
        assert!(message.is_ai());

        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"contentType\":\"TEXT\""));
        assert!(json.contains("\"sender\":\"Cherry\""));
    }

    #[test]
    fn test_conversation_wire_names() {
        let conversation = Conversation {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            title: String::new(),
            timestamp: Utc::now(),
            messages: vec![],
            processed_exchanges: 2,
            total_response_time_ms: 840,
        };
        let json = serde_json::to_string(&conversation).unwrap();
        assert!(json.contains("\"processedExchanges\":2"));
        assert!(json.contains("\"totalResponseTimeMillis\":840"));
    }
}
