// ABOUTME: Append-only conversation store with atomic title-from-first-message handling
// ABOUTME: Optional field-level encryption is applied on write and removed on read, one code path
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Conversation Store
//!
//! Messages are append-only: each insert takes the next per-conversation
//! sequence number inside a transaction, so concurrent appends serialize
//! and history order never depends on wall clocks. The conversation
//! title is derived from the first human message in the same
//! transaction as its insert.
//!
//! When at-rest encryption is on, every textual field (owner, title,
//! sender, content, content type, timestamps) is stored through the
//! [`FieldCipher`]; only ids, sequence numbers, and the numeric
//! counters stay readable. Ciphertexts are non-deterministic, so owner
//! lookups scan and decrypt instead of matching in SQL, and ordering
//! relies on the sequence column rather than stored timestamps. Empty
//! strings stay empty in both modes, which keeps the unset-title check
//! a plain SQL predicate.

use crate::crypto::FieldCipher;
use crate::errors::{AppError, AppResult};
use crate::models::{ContentType, Conversation, Message, AI_SENTINEL};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

/// Longest title derived from a first message, in characters
const MAX_TITLE_CHARS: usize = 80;

/// Per-conversation exchange counters used by analytics
#[derive(Debug, Clone)]
pub struct ExchangeCounters {
    pub username: String,
    pub processed_exchanges: i64,
    pub total_response_time_ms: i64,
}

/// Conversation and message persistence
#[derive(Clone)]
pub struct ConversationStore {
    pool: SqlitePool,
    cipher: Option<Arc<FieldCipher>>,
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("encrypted", &self.cipher.is_some())
            .finish_non_exhaustive()
    }
}

impl ConversationStore {
    #[must_use]
    pub fn new(pool: SqlitePool, cipher: Option<Arc<FieldCipher>>) -> Self {
        Self { pool, cipher }
    }

    /// Create a conversation owned by `username`
    ///
    /// The title is usually empty at creation and filled in by the
    /// first human message.
    ///
    /// # Errors
    ///
    /// Returns a database error on write failure.
    #[tracing::instrument(skip(self, title))]
    pub async fn create(&self, username: &str, title: &str) -> AppResult<Conversation> {
        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r"
            INSERT INTO conversations (id, username, title, created_at)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(id.to_string())
        .bind(self.enc(username)?)
        .bind(self.enc(title)?)
        .bind(self.enc(&now.to_rfc3339())?)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to create conversation: {e}")))?;

        Ok(Conversation {
            id,
            username: username.to_string(),
            title: title.to_string(),
            timestamp: now,
            messages: vec![],
            processed_exchanges: 0,
            total_response_time_ms: 0,
        })
    }

    /// Load a conversation with its full ordered history
    ///
    /// # Errors
    ///
    /// Returns a database error on read failure or `CorruptedRecord`
    /// when a stored field cannot be decrypted.
    pub async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        let row = sqlx::query(
            r"
            SELECT id, username, title, created_at, processed_exchanges, total_response_time_ms
            FROM conversations WHERE id = ?
            ",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to load conversation: {e}")))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut conversation = self.conversation_from_row(&row)?;
        conversation.messages = self.messages_for(id).await?;
        Ok(Some(conversation))
    }

    /// Load every conversation owned by `username`, newest first
    ///
    /// With encryption on, ownership cannot be matched in SQL, so all
    /// conversation rows are scanned and filtered after decryption.
    /// Timestamps are encrypted alongside the other fields, so ordering
    /// happens here rather than in the query.
    ///
    /// # Errors
    ///
    /// Returns database or `CorruptedRecord` errors.
    pub async fn list_by_owner(&self, username: &str) -> AppResult<Vec<Conversation>> {
        let rows = if self.cipher.is_some() {
            sqlx::query(
                r"
                SELECT id, username, title, created_at, processed_exchanges, total_response_time_ms
                FROM conversations
                ",
            )
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(
                r"
                SELECT id, username, title, created_at, processed_exchanges, total_response_time_ms
                FROM conversations WHERE username = ?
                ",
            )
            .bind(username)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::database(format!("Failed to list conversations: {e}")))?;

        let mut conversations = Vec::new();
        for row in &rows {
            let conversation = self.conversation_from_row(row)?;
            if conversation.username == username {
                conversations.push(conversation);
            }
        }
        conversations.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for conversation in &mut conversations {
            conversation.messages = self.messages_for(conversation.id).await?;
        }
        Ok(conversations)
    }

    /// Append a message, assigning the next sequence number
    ///
    /// Runs in one transaction: the sequence read, the insert, and the
    /// first-human-message title update commit together or not at all.
    /// Only human text messages set a title; AI replies and image
    /// payloads never do.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown conversation, or a
    /// database error on write failure.
    #[tracing::instrument(skip(self, content))]
    pub async fn append_message(
        &self,
        conversation_id: Uuid,
        sender: &str,
        content: &str,
        content_type: ContentType,
    ) -> AppResult<Message> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database(format!("Failed to start transaction: {e}")))?;

        let exists = sqlx::query("SELECT 1 FROM conversations WHERE id = ?")
            .bind(conversation_id.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to check conversation: {e}")))?;
        if exists.is_none() {
            return Err(AppError::not_found(format!(
                "Conversation {conversation_id}"
            )));
        }

        let seq: i64 =
            sqlx::query("SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE conversation_id = ?")
                .bind(conversation_id.to_string())
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| AppError::database(format!("Failed to assign sequence: {e}")))?
                .get(0);

        let message = Message {
            id: Uuid::new_v4(),
            sender: sender.to_string(),
            content: content.to_string(),
            content_type,
            timestamp: Utc::now(),
        };

        sqlx::query(
            r"
            INSERT INTO messages (id, conversation_id, seq, sender, content, content_type, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(message.id.to_string())
        .bind(conversation_id.to_string())
        .bind(seq)
        .bind(self.enc(sender)?)
        .bind(self.enc(content)?)
        .bind(self.enc(content_type.as_str())?)
        .bind(self.enc(&message.timestamp.to_rfc3339())?)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::database(format!("Failed to append message: {e}")))?;

        if sender != AI_SENTINEL && content_type == ContentType::Text {
            let title = derive_title(content);
            sqlx::query(
                r"
                UPDATE conversations SET title = ?
                WHERE id = ? AND title = ''
                  AND (SELECT COUNT(*) FROM messages WHERE conversation_id = ?) = 1
                ",
            )
            .bind(self.enc(&title)?)
            .bind(conversation_id.to_string())
            .bind(conversation_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database(format!("Failed to set title: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database(format!("Failed to commit append: {e}")))?;

        Ok(message)
    }

    /// Replace a conversation's title
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown conversation.
    pub async fn set_title(&self, id: Uuid, title: &str) -> AppResult<()> {
        let result = sqlx::query("UPDATE conversations SET title = ? WHERE id = ?")
            .bind(self.enc(title)?)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to update title: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Conversation {id}")));
        }
        Ok(())
    }

    /// Delete a conversation and, via cascade, its messages
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for an unknown conversation.
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to delete conversation: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Conversation {id}")));
        }
        Ok(())
    }

    /// Delete every conversation owned by `username`, returning the count
    ///
    /// # Errors
    ///
    /// Returns database or `CorruptedRecord` errors.
    pub async fn delete_by_owner(&self, username: &str) -> AppResult<u64> {
        if self.cipher.is_none() {
            let result = sqlx::query("DELETE FROM conversations WHERE username = ?")
                .bind(username)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to delete conversations: {e}")))?;
            return Ok(result.rows_affected());
        }

        let rows = sqlx::query("SELECT id, username FROM conversations")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::database(format!("Failed to scan conversations: {e}")))?;

        let mut deleted = 0;
        for row in &rows {
            let owner = self.dec(row.get::<String, _>("username").as_str())?;
            if owner == username {
                let id: String = row.get("id");
                sqlx::query("DELETE FROM conversations WHERE id = ?")
                    .bind(&id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        AppError::database(format!("Failed to delete conversation: {e}"))
                    })?;
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    /// Record one completed exchange against a conversation
    ///
    /// # Errors
    ///
    /// Returns a database error on write failure.
    pub async fn record_exchange(&self, id: Uuid, response_time_ms: i64) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE conversations
            SET processed_exchanges = processed_exchanges + 1,
                total_response_time_ms = total_response_time_ms + ?
            WHERE id = ?
            ",
        )
        .bind(response_time_ms)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to record exchange: {e}")))?;
        Ok(())
    }

    /// All per-conversation counters, owners decrypted
    ///
    /// # Errors
    ///
    /// Returns database or `CorruptedRecord` errors.
    pub async fn exchange_counters(&self) -> AppResult<Vec<ExchangeCounters>> {
        let rows = sqlx::query(
            "SELECT username, processed_exchanges, total_response_time_ms FROM conversations",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to load counters: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(ExchangeCounters {
                    username: self.dec(row.get::<String, _>("username").as_str())?,
                    processed_exchanges: row.get("processed_exchanges"),
                    total_response_time_ms: row.get("total_response_time_ms"),
                })
            })
            .collect()
    }

    async fn messages_for(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let rows = sqlx::query(
            r"
            SELECT id, sender, content, content_type, created_at
            FROM messages WHERE conversation_id = ? ORDER BY seq
            ",
        )
        .bind(conversation_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to load messages: {e}")))?;

        rows.iter()
            .map(|row| {
                Ok(Message {
                    id: parse_uuid(row.get::<String, _>("id").as_str())?,
                    sender: self.dec(row.get::<String, _>("sender").as_str())?,
                    content: self.dec(row.get::<String, _>("content").as_str())?,
                    content_type: ContentType::parse(
                        self.dec(row.get::<String, _>("content_type").as_str())?.as_str(),
                    )?,
                    timestamp: parse_timestamp(
                        self.dec(row.get::<String, _>("created_at").as_str())?.as_str(),
                    )?,
                })
            })
            .collect()
    }

    fn conversation_from_row(&self, row: &sqlx::sqlite::SqliteRow) -> AppResult<Conversation> {
        Ok(Conversation {
            id: parse_uuid(row.get::<String, _>("id").as_str())?,
            username: self.dec(row.get::<String, _>("username").as_str())?,
            title: self.dec(row.get::<String, _>("title").as_str())?,
            timestamp: parse_timestamp(
                self.dec(row.get::<String, _>("created_at").as_str())?.as_str(),
            )?,
            messages: vec![],
            processed_exchanges: row.get("processed_exchanges"),
            total_response_time_ms: row.get("total_response_time_ms"),
        })
    }

    /// Encrypt a field when the cipher is active; empty stays empty
    fn enc(&self, value: &str) -> AppResult<String> {
        match &self.cipher {
            Some(cipher) if !value.is_empty() => cipher.encrypt_str(value),
            _ => Ok(value.to_string()),
        }
    }

    /// Decrypt a field when the cipher is active; empty stays empty
    fn dec(&self, value: &str) -> AppResult<String> {
        match &self.cipher {
            Some(cipher) if !value.is_empty() => cipher.decrypt_str(value),
            _ => Ok(value.to_string()),
        }
    }
}

fn parse_uuid(value: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| AppError::corrupted_record(format!("Stored id is not a UUID: {value}")))
}

fn parse_timestamp(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| AppError::corrupted_record("Stored timestamp is not RFC 3339"))
}

/// Derive a conversation title from the first human message
fn derive_title(content: &str) -> String {
    content.chars().take(MAX_TITLE_CHARS).collect()
}
