//! SQLite persistence for encrypted credential entries.
//!
//! Entries are already encrypted when they reach this layer; the table only
//! ever sees base64 ciphertext, IV and the plaintext scope list.

use super::{EncryptedRecord, StorageBackend, StoredEntry};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Encrypted credential storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE credentials (
///     user_id    TEXT PRIMARY KEY,
///     iv         TEXT NOT NULL,   -- base64 nonce
///     ciphertext TEXT NOT NULL,   -- base64 AES-256-GCM output
///     scopes     TEXT NOT NULL,   -- JSON array of scope URIs
///     created_at TEXT NOT NULL,   -- ISO 8601 timestamp
///     updated_at TEXT NOT NULL    -- ISO 8601 timestamp
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in Mutex for safe concurrent access
/// - Upserts replace the whole row in one statement
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Creates or opens the database and ensures the table exists.
    ///
    /// `":memory:"` gives a private in-memory database.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open credential DB at {}", path.display()))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS credentials (
                user_id    TEXT PRIMARY KEY,
                iv         TEXT NOT NULL,
                ciphertext TEXT NOT NULL,
                scopes     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .context("Failed to create credentials table")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Credential DB connection mutex poisoned"))
    }
}

impl StorageBackend for SqliteBackend {
    fn save(&self, entry: StoredEntry) -> Result<()> {
        let scopes = serde_json::to_string(&entry.scopes).context("Failed to encode scopes")?;
        let now = entry.updated_at.to_rfc3339();

        self.conn()?
            .execute(
                r#"
                INSERT INTO credentials (user_id, iv, ciphertext, scopes, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(user_id) DO UPDATE SET
                    iv = excluded.iv,
                    ciphertext = excluded.ciphertext,
                    scopes = excluded.scopes,
                    updated_at = excluded.updated_at
                "#,
                params![
                    entry.user_id,
                    entry.record.iv,
                    entry.record.ciphertext,
                    scopes,
                    now,
                    now,
                ],
            )
            .context("Failed to store credentials")?;

        Ok(())
    }

    fn load(&self, user_id: &str) -> Result<Option<StoredEntry>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT iv, ciphertext, scopes, updated_at FROM credentials WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .context("Failed to query credentials")?;

        let Some((iv, ciphertext, scopes, updated_at)) = row else {
            return Ok(None);
        };

        let scopes = serde_json::from_str(&scopes)
            .with_context(|| format!("Failed to parse scopes for user {}", user_id))?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .context("Failed to parse updated_at timestamp")?;

        Ok(Some(StoredEntry {
            user_id: user_id.to_string(),
            record: EncryptedRecord { iv, ciphertext },
            scopes,
            updated_at,
        }))
    }

    fn delete(&self, user_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()?
            .execute("DELETE FROM credentials WHERE user_id = ?1", params![user_id])
            .context("Failed to delete credentials")?;

        Ok(rows_affected > 0)
    }

    fn list_users(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT user_id FROM credentials ORDER BY user_id")
            .context("Failed to prepare query")?;

        let users = stmt
            .query_map([], |row| row.get(0))
            .context("Failed to execute query")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to read results")?;

        Ok(users)
    }
}
