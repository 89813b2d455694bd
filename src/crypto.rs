// ABOUTME: AES-256-GCM field-level encryption for conversation content at rest
// ABOUTME: Each value gets a fresh random nonce, stored as base64(nonce || ciphertext)
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::errors::{AppError, AppResult};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};
use rand::RngCore;

/// AES-GCM nonce size in bytes
const NONCE_SIZE: usize = 12;

/// Encrypts and decrypts individual stored string fields
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}

impl FieldCipher {
    /// Create a cipher from a 256-bit key
    #[must_use]
    pub fn new(key: &[u8; 32]) -> Self {
        let cipher = Aes256Gcm::new(GenericArray::from_slice(key));
        Self { cipher }
    }

    /// Encrypt a plaintext field value
    ///
    /// Output is base64 of a random 12-byte nonce followed by the
    /// ciphertext, so every call produces a distinct value even for
    /// identical plaintexts.
    ///
    /// # Errors
    ///
    /// Returns an internal error if encryption fails.
    pub fn encrypt_str(&self, plaintext: &str) -> AppResult<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::internal(format!("Field encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        combined.extend_from_slice(&nonce_bytes);
        combined.extend_from_slice(&ciphertext);

        Ok(general_purpose::STANDARD.encode(combined))
    }

    /// Decrypt a previously encrypted field value
    ///
    /// # Errors
    ///
    /// Any failure (bad base64, truncated data, wrong key, tampered
    /// ciphertext) surfaces as `CorruptedRecord`.
    pub fn decrypt_str(&self, encoded: &str) -> AppResult<String> {
        let combined = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| AppError::corrupted_record("Stored field is not valid base64"))?;

        if combined.len() < NONCE_SIZE {
            return Err(AppError::corrupted_record(
                "Stored field is shorter than the cipher nonce",
            ));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| AppError::corrupted_record("Stored field failed authentication"))?;

        String::from_utf8(plaintext)
            .map_err(|_| AppError::corrupted_record("Decrypted field is not valid UTF-8"))
    }
}

/// Generate a random 256-bit field encryption key
#[must_use]
pub fn generate_field_key() -> [u8; 32] {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}
