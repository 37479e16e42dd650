//! Encrypted credential storage keyed by user.
//!
//! The store knows nothing about the persistence engine; it talks to a
//! [`StorageBackend`] that saves and loads whole [`StoredEntry`] values.

use super::{Cipher, Credential, EncryptedRecord, SqliteBackend};
use crate::error::{BrokerError, Result};
use crate::scope::{self, ScopeSet};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info};

/// One persisted record per user.
///
/// Scopes are duplicated outside the ciphertext so that scope checks do not
/// require decryption. Entries are replaced wholesale, never patched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntry {
    pub user_id: String,
    #[serde(flatten)]
    pub record: EncryptedRecord,
    pub scopes: ScopeSet,
    pub updated_at: DateTime<Utc>,
}

/// Persistence engine behind the credential store.
///
/// Every operation is atomic per entry: a reader never sees a half-written
/// record. Implementations may block on I/O.
pub trait StorageBackend: Send + Sync {
    /// Inserts or replaces the entry for `entry.user_id`.
    fn save(&self, entry: StoredEntry) -> anyhow::Result<()>;

    /// Loads the entry for a user, if any.
    fn load(&self, user_id: &str) -> anyhow::Result<Option<StoredEntry>>;

    /// Deletes the entry for a user. Returns false if none existed.
    fn delete(&self, user_id: &str) -> anyhow::Result<bool>;

    /// All user ids with a stored entry, sorted.
    fn list_users(&self) -> anyhow::Result<Vec<String>>;
}

/// Process-local backend. Entries live until removal or shutdown.
#[derive(Default)]
pub struct MemoryBackend {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn save(&self, entry: StoredEntry) -> anyhow::Result<()> {
        self.entries.insert(entry.user_id.clone(), entry);
        Ok(())
    }

    fn load(&self, user_id: &str) -> anyhow::Result<Option<StoredEntry>> {
        Ok(self.entries.get(user_id).map(|e| e.value().clone()))
    }

    fn delete(&self, user_id: &str) -> anyhow::Result<bool> {
        Ok(self.entries.remove(user_id).is_some())
    }

    fn list_users(&self) -> anyhow::Result<Vec<String>> {
        let mut users: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        users.sort();
        Ok(users)
    }
}

/// Exclusive write access to one user's entry.
///
/// Holding the guard is the only way to write, so writes for a user are
/// serialized while different users never contend.
pub(crate) struct WriteGuard {
    user_id: String,
    _guard: OwnedMutexGuard<()>,
}

impl WriteGuard {
    pub(crate) fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// Encrypted credential store.
///
/// # Thread Safety
/// - Reads go straight to the backend and never wait on writers
/// - Writes for the same user are serialized through a per-user async mutex
/// - The cipher is immutable and shared without locking
pub struct CredentialStore {
    backend: Box<dyn StorageBackend>,
    cipher: Arc<Cipher>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialStore {
    /// Creates a store over an arbitrary backend.
    pub fn new(backend: Box<dyn StorageBackend>, cipher: Arc<Cipher>) -> Self {
        Self {
            backend,
            cipher,
            write_locks: DashMap::new(),
        }
    }

    /// Store backed by [`MemoryBackend`].
    pub fn in_memory(cipher: Arc<Cipher>) -> Self {
        Self::new(Box::new(MemoryBackend::new()), cipher)
    }

    /// Store backed by a SQLite database file.
    pub fn sqlite<P: AsRef<Path>>(db_path: P, cipher: Arc<Cipher>) -> Result<Self> {
        let backend = SqliteBackend::open(db_path).map_err(storage_error)?;
        Ok(Self::new(Box::new(backend), cipher))
    }

    /// Acquires the write lock for a user, waiting for any writer in flight.
    pub(crate) async fn lock(&self, user_id: &str) -> WriteGuard {
        let lock = self
            .write_locks
            .entry(user_id.to_string())
            .or_default()
            .clone();
        WriteGuard {
            user_id: user_id.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    /// Encrypts and stores a credential, replacing any existing entry.
    ///
    /// Only usable credentials are accepted: the access token must be
    /// non-empty and the expiry in the future.
    pub async fn put(&self, user_id: &str, credential: &Credential) -> Result<()> {
        if credential.access_token.trim().is_empty() {
            return Err(BrokerError::InvalidCredential(
                "access token is empty".to_string(),
            ));
        }
        if credential.expires_at <= Utc::now() {
            return Err(BrokerError::InvalidCredential(format!(
                "credential already expired at {}",
                credential.expires_at
            )));
        }

        let guard = self.lock(user_id).await;
        self.put_locked(&guard, credential)
    }

    /// Writes while the caller already holds the user's write lock.
    pub(crate) fn put_locked(&self, guard: &WriteGuard, credential: &Credential) -> Result<()> {
        let record = self.cipher.encrypt(credential)?;
        let scopes = scope::parse_scopes(&credential.scope);
        let scope_count = scopes.len();

        self.backend
            .save(StoredEntry {
                user_id: guard.user_id().to_string(),
                record,
                scopes,
                updated_at: Utc::now(),
            })
            .map_err(storage_error)?;

        debug!(
            user_id = %guard.user_id(),
            scope_count,
            has_refresh_token = credential.refresh_token.is_some(),
            "Stored encrypted credential"
        );
        Ok(())
    }

    /// Retrieves and decrypts the credential for a user.
    ///
    /// # Returns
    /// * `Ok(Some(Credential))` - Credential found and decrypted
    /// * `Ok(None)` - User never authenticated
    /// * `Err` - Decryption or backend failure
    pub fn get(&self, user_id: &str) -> Result<Option<Credential>> {
        let Some(entry) = self.backend.load(user_id).map_err(storage_error)? else {
            return Ok(None);
        };

        self.cipher.decrypt(&entry.record).map(Some).map_err(|e| {
            error!(user_id = %user_id, error = %e, "Stored credential failed to decrypt");
            e
        })
    }

    /// Whether an entry exists for the user. Does not decrypt.
    pub fn contains(&self, user_id: &str) -> Result<bool> {
        Ok(self.backend.load(user_id).map_err(storage_error)?.is_some())
    }

    /// True iff the user has an entry granting every required scope.
    ///
    /// Never decrypts; a missing entry yields `Ok(false)`.
    pub fn has_scopes<S: AsRef<str>>(&self, user_id: &str, required: &[S]) -> Result<bool> {
        Ok(match self.backend.load(user_id).map_err(storage_error)? {
            Some(entry) => scope::has_scopes(&entry.scopes, required),
            None => false,
        })
    }

    /// Deletes a user's entry. Returns false if there was none.
    pub async fn remove(&self, user_id: &str) -> Result<bool> {
        let _guard = self.lock(user_id).await;
        let removed = self.backend.delete(user_id).map_err(storage_error)?;
        if removed {
            info!(user_id = %user_id, "Removed stored credential");
        }
        Ok(removed)
    }

    /// All users with a stored entry.
    pub fn users(&self) -> Result<Vec<String>> {
        self.backend.list_users().map_err(storage_error)
    }
}

fn storage_error(err: anyhow::Error) -> BrokerError {
    BrokerError::Storage(format!("{:#}", err))
}
