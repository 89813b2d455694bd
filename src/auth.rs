// ABOUTME: JWT token codec: HS256 issuance and validation with detailed failure classification
// ABOUTME: Role defaulting happens once at issuance; validation returns claims exactly as signed
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Token Codec
//!
//! Signed, expiring JWTs carrying the subject username and an access
//! role. A single symmetric secret covers the whole process, so any
//! component can validate what any other issued. Validation reports
//! *why* a token failed ([`JwtValidationError`]) for logging; the HTTP
//! layer collapses all variants to one 401.

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};

/// Role granted when issuance is asked for a token without one
pub const DEFAULT_ROLE: &str = "USER";

/// Claims carried in every issued token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject username
    pub sub: String,
    /// Access role at issuance time (may be stale by validation time)
    pub role: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

/// Why a token failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JwtValidationError {
    /// Signature checked out but the token is past its expiry
    Expired { expired_at: i64 },
    /// Well-formed token with a bad signature or claims
    Invalid { reason: String },
    /// Not a JWT at all
    Malformed { details: String },
}

impl std::fmt::Display for JwtValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired { expired_at } => write!(f, "token expired at {expired_at}"),
            Self::Invalid { reason } => write!(f, "invalid token: {reason}"),
            Self::Malformed { details } => write!(f, "malformed token: {details}"),
        }
    }
}

impl std::error::Error for JwtValidationError {}

impl From<JwtValidationError> for AppError {
    fn from(error: JwtValidationError) -> Self {
        AppError::auth_invalid(error.to_string())
    }
}

/// Issues and validates HS256 tokens with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry: Duration,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Create a codec from the shared signing secret
    #[must_use]
    pub fn new(secret: &str, expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiry: Duration::hours(expiry_hours),
        }
    }

    /// Issue a signed token for the given username
    ///
    /// When `role` is `None` the token carries [`DEFAULT_ROLE`]; this
    /// is the only place defaulting happens.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue(&self, username: &str, role: Option<&str>) -> AppResult<String> {
        self.issue_with_expiry(username, role, self.expiry)
    }

    /// Issue a token with an explicit lifetime
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn issue_with_expiry(
        &self,
        username: &str,
        role: Option<&str>,
        expiry: Duration,
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: username.to_string(),
            role: role.unwrap_or(DEFAULT_ROLE).to_string(),
            iat: now.timestamp(),
            exp: (now + expiry).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::internal(format!("Failed to sign token: {e}")))
    }

    /// Validate a token and return its claims
    ///
    /// Expiry is checked manually after signature verification so the
    /// caller can distinguish an expired token from a forged one.
    ///
    /// # Errors
    ///
    /// Returns a [`JwtValidationError`] describing the failure.
    pub fn validate(&self, token: &str) -> Result<Claims, JwtValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(convert_jwt_error)?;

        let claims = data.claims;
        if claims.exp < Utc::now().timestamp() {
            return Err(JwtValidationError::Expired {
                expired_at: claims.exp,
            });
        }

        Ok(claims)
    }
}

fn convert_jwt_error(error: jsonwebtoken::errors::Error) -> JwtValidationError {
    use jsonwebtoken::errors::ErrorKind;
    match error.kind() {
        ErrorKind::ExpiredSignature => JwtValidationError::Expired { expired_at: 0 },
        ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => JwtValidationError::Malformed {
            details: error.to_string(),
        },
        _ => JwtValidationError::Invalid {
            reason: error.to_string(),
        },
    }
}

/// Generate a random base64 signing secret suitable for `JWT_SECRET`
///
/// # Errors
///
/// Returns an error if the system RNG fails.
pub fn generate_signing_secret() -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 64];
    rng.fill(&mut bytes)
        .map_err(|_| AppError::internal("System RNG failed to produce a signing secret"))?;
    Ok(general_purpose::STANDARD.encode(bytes))
}
