//! AES-256-GCM encryption for credential records.
//!
//! The whole credential is serialized to JSON and sealed as one blob under a
//! fresh random nonce (the record's IV). The master key must be 32 bytes
//! (256 bits) and is provided from an environment variable.

use super::Credential;
use crate::error::{BrokerError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Environment variable holding the base64-encoded master key.
pub const ENCRYPTION_KEY_VAR: &str = "BROKER_ENCRYPTION_KEY";

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Ciphertext plus the IV it was sealed under, both base64-encoded.
///
/// This is the only form of a credential that is ever persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedRecord {
    pub iv: String,
    pub ciphertext: String,
}

/// Validates that the master key is exactly 32 bytes when base64 decoded.
///
/// # Returns
/// * `Ok(Vec<u8>)` - Decoded key bytes (32 bytes)
/// * `Err(BrokerError::Configuration)` - Invalid length or invalid base64
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>> {
    let key_bytes = BASE64
        .decode(key_base64.trim())
        .map_err(|e| BrokerError::Configuration(format!("encryption key is not valid base64: {}", e)))?;

    if key_bytes.len() != KEY_SIZE {
        return Err(BrokerError::Configuration(format!(
            "encryption key must be {} bytes (256 bits), got {} bytes",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Process-wide credential cipher.
///
/// Immutable once built, so it is shared behind an `Arc` without locking.
pub struct Cipher {
    cipher: Aes256Gcm,
}

impl Cipher {
    /// Builds a cipher from raw key bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(BrokerError::Configuration(format!(
                "encryption key must be {} bytes",
                KEY_SIZE
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| BrokerError::Configuration(format!("failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Builds a cipher from a base64-encoded key.
    pub fn from_base64(key_base64: &str) -> Result<Self> {
        let key = validate_key(key_base64)?;
        Self::new(&key)
    }

    /// Loads the key from `BROKER_ENCRYPTION_KEY`.
    ///
    /// A missing variable is a configuration error; there is no fallback key.
    pub fn from_env() -> Result<Self> {
        Self::from_optional(std::env::var(ENCRYPTION_KEY_VAR).ok().as_deref())
    }

    fn from_optional(key_base64: Option<&str>) -> Result<Self> {
        match key_base64 {
            Some(key) if !key.trim().is_empty() => Self::from_base64(key),
            _ => Err(BrokerError::Configuration(format!(
                "{} is not set",
                ENCRYPTION_KEY_VAR
            ))),
        }
    }

    /// Serializes and encrypts a credential under a fresh random IV.
    pub fn encrypt(&self, credential: &Credential) -> Result<EncryptedRecord> {
        let plaintext = serde_json::to_vec(credential)
            .map_err(|e| BrokerError::InvalidCredential(format!("failed to serialize credential: {}", e)))?;

        // Generate random nonce (never reuse!)
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_ref())
            .map_err(|e| BrokerError::Storage(format!("encryption failed: {}", e)))?;

        Ok(EncryptedRecord {
            iv: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypts a record back into a credential.
    ///
    /// Fails with [`BrokerError::Decryption`] on wrong key, corruption,
    /// truncation or tampering; partial data is never returned.
    pub fn decrypt(&self, record: &EncryptedRecord) -> Result<Credential> {
        let ciphertext = BASE64
            .decode(&record.ciphertext)
            .map_err(|e| BrokerError::Decryption(format!("ciphertext is not valid base64: {}", e)))?;
        let iv = BASE64
            .decode(&record.iv)
            .map_err(|e| BrokerError::Decryption(format!("iv is not valid base64: {}", e)))?;

        if iv.len() != NONCE_SIZE {
            return Err(BrokerError::Decryption(format!(
                "invalid iv size: expected {}, got {}",
                NONCE_SIZE,
                iv.len()
            )));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
            .map_err(|_| BrokerError::Decryption("wrong key or corrupted data".to_string()))?;

        serde_json::from_slice(&plaintext)
            .map_err(|e| BrokerError::Decryption(format!("decrypted payload is not a credential: {}", e)))
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Cipher(AES-256-GCM)")
    }
}
