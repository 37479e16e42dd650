//! Encrypted credential storage for per-user OAuth tokens.
//!
//! Credentials are serialized and sealed as a single blob with AES-256-GCM; the
//! granted scope set is kept beside the ciphertext so scope checks never need
//! the key.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       CredentialStore                    │
//! │  - put / get / has_scopes / remove       │
//! │  - Transparent encryption/decryption     │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (encrypt)            (decrypt)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       Cipher                             │
//! │  - AES-256-GCM                           │
//! │  - Fresh random IV per record            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       StorageBackend                     │
//! │  - MemoryBackend (DashMap)               │
//! │  - SqliteBackend (rusqlite)              │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use oauth_broker::credentials::{Cipher, Credential, CredentialStore};
//! use chrono::{Duration, Utc};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cipher = Arc::new(Cipher::from_env()?);
//! let store = CredentialStore::in_memory(cipher);
//!
//! let credential = Credential {
//!     access_token: "ya29.access".to_string(),
//!     refresh_token: Some("1//refresh".to_string()),
//!     token_type: "Bearer".to_string(),
//!     scope: "https://www.googleapis.com/auth/gmail.readonly".to_string(),
//!     expires_at: Utc::now() + Duration::hours(1),
//! };
//! store.put("user1", &credential).await?;
//!
//! assert!(store.has_scopes("user1", &["https://www.googleapis.com/auth/gmail.readonly"])?);
//! # Ok(())
//! # }
//! ```
//!
//! # Security
//!
//! - The whole credential is encrypted as one authenticated blob
//! - Each record has a unique IV (never reused)
//! - Master key must be 32 bytes and comes from the environment only
//! - Tampered or foreign-key records fail to decrypt instead of returning data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

mod encryption;
mod sqlite;
mod storage;

pub use encryption::{validate_key, Cipher, EncryptedRecord, ENCRYPTION_KEY_VAR};
pub use sqlite::SqliteBackend;
pub use storage::{CredentialStore, MemoryBackend, StorageBackend, StoredEntry};
pub(crate) use storage::WriteGuard;

/// Decrypted OAuth credential for one user.
///
/// Only ever held transiently: the store persists it as an [`EncryptedRecord`].
/// `Debug` output redacts the tokens.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// OAuth access token (used for API requests)
    pub access_token: String,

    /// OAuth refresh token; absent when offline access was never granted
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token type, normally "Bearer"
    pub token_type: String,

    /// Space-delimited list of granted scope URIs
    pub scope: String,

    /// When the access token expires (UTC)
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
