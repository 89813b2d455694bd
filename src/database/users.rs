// ABOUTME: User account store backing login and the auth gate's live role lookup
// ABOUTME: Passwords are bcrypt-hashed before they reach the database
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use crate::models::User;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Work factor for bcrypt password hashing
const BCRYPT_COST: u32 = 12;

/// User account persistence
#[derive(Debug, Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user with a freshly hashed password
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the username is already taken, or a
    /// database error on write failure.
    #[tracing::instrument(skip(self, password))]
    pub async fn create(&self, username: &str, password: &str, role: &str) -> AppResult<User> {
        let password_hash = bcrypt::hash(password, BCRYPT_COST)
            .map_err(|e| AppError::internal(format!("Password hashing failed: {e}")))?;

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash,
            role: role.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r"
            INSERT INTO users (id, username, password_hash, role, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.role)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::invalid_input(format!("Username already taken: {username}"))
            }
            _ => AppError::database(format!("Failed to create user: {e}")),
        })?;

        Ok(user)
    }

    /// Look up a user by username
    ///
    /// # Errors
    ///
    /// Returns a database error on read failure.
    pub async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to load user: {e}")))?;

        row.map(|row| {
            Ok(User {
                id: Uuid::parse_str(row.get::<String, _>("id").as_str())
                    .map_err(|_| AppError::corrupted_record("Stored user id is not a UUID"))?,
                username: row.get("username"),
                password_hash: row.get("password_hash"),
                role: row.get("role"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
        })
        .transpose()
    }

    /// Check a candidate password against the stored hash
    ///
    /// # Errors
    ///
    /// Returns an internal error when the stored hash is unreadable.
    pub fn verify_password(user: &User, candidate: &str) -> AppResult<bool> {
        bcrypt::verify(candidate, &user.password_hash)
            .map_err(|e| AppError::internal(format!("Password verification failed: {e}")))
    }
}
