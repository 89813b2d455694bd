// ABOUTME: SQLite pool setup and schema bootstrap for the conversation backend
// ABOUTME: Owns the shared pool handed to the conversation and user stores
//
// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod conversations;
pub mod users;

pub use conversations::ConversationStore;
pub use users::UserStore;

use crate::errors::{AppError, AppResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database handle wrapping the shared connection pool
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect to SQLite and bring the schema up to date
    ///
    /// The database file is created if missing; foreign keys are
    /// enforced so conversation deletes cascade to messages.
    ///
    /// # Errors
    ///
    /// Returns a database error when the URL is invalid or the schema
    /// cannot be created.
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::database(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // SQLite allows a single writer; one pooled connection keeps
        // read-then-write transactions from racing on lock upgrades.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| AppError::database(format!("Failed to connect to database: {e}")))?;

        let database = Self { pool };
        database.migrate().await?;
        Ok(database)
    }

    /// Shared connection pool
    #[must_use]
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                processed_exchanges INTEGER NOT NULL DEFAULT 0,
                total_response_time_ms INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_migrate_error)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL
                    REFERENCES conversations(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL,
                sender TEXT NOT NULL,
                content TEXT NOT NULL,
                content_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(conversation_id, seq)
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_migrate_error)?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
                ON messages(conversation_id, seq)
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_migrate_error)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'USER',
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await
        .map_err(map_migrate_error)?;

        tracing::debug!("database schema ready");
        Ok(())
    }
}

fn map_migrate_error(error: sqlx::Error) -> AppError {
    AppError::database(format!("Schema migration failed: {error}"))
}
