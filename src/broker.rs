//! Credential facade.
//!
//! [`CredentialBroker`] is what the route layer and downstream API clients
//! talk to. It composes the store, the cipher behind it and the refresh
//! coordinator, and it is the last place an internal condition is translated
//! into a [`BrokerError`].

use crate::credentials::{Credential, CredentialStore};
use crate::error::{BrokerError, Result};
use crate::exchange::{RawCredentials, TokenExchange};
use crate::refresh::RefreshCoordinator;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Guarantees callers a valid, decrypted credential per user.
pub struct CredentialBroker {
    store: Arc<CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    coordinator: RefreshCoordinator,
}

impl CredentialBroker {
    pub fn new(
        store: Arc<CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        default_lifetime: Duration,
    ) -> Self {
        let coordinator =
            RefreshCoordinator::new(Arc::clone(&store), Arc::clone(&exchange), default_lifetime);
        Self {
            store,
            exchange,
            coordinator,
        }
    }

    pub fn store_handle(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Returns a credential with at least the refresh threshold of validity left.
    ///
    /// # Errors
    /// - `AuthenticationRequired` - unknown user, or expiring without a refresh token
    /// - `RefreshFailed` - the provider rejected or failed the refresh
    /// - `Decryption` / `Storage` - the stored entry is unusable
    pub async fn resolve(&self, user_id: &str) -> Result<Credential> {
        if !self.store.contains(user_id)? {
            return Err(BrokerError::auth_required(user_id));
        }
        self.coordinator.ensure_fresh(user_id).await
    }

    /// Normalizes and persists a freshly obtained provider bundle.
    ///
    /// Replaces whatever was on file for the user.
    pub async fn store(&self, user_id: &str, raw: RawCredentials) -> Result<()> {
        let credential = self.normalize(raw)?;
        self.store.put(user_id, &credential).await?;

        info!(
            user_id = %user_id,
            has_refresh_token = credential.refresh_token.is_some(),
            expires_at = %credential.expires_at,
            "Stored token for user"
        );
        Ok(())
    }

    /// Exchanges an authorization code and stores the resulting credential.
    pub async fn authorize(&self, user_id: &str, code: &str) -> Result<()> {
        let raw = self.exchange.exchange_code(code).await.map_err(|e| {
            warn!(user_id = %user_id, error = %e, "Authorization code exchange failed");
            BrokerError::ExchangeFailed(e)
        })?;
        self.store(user_id, raw).await
    }

    /// True iff the user has a stored credential granting every required scope.
    pub fn has_scopes<S: AsRef<str>>(&self, user_id: &str, required: &[S]) -> Result<bool> {
        self.store.has_scopes(user_id, required)
    }

    /// Drops the stored credential; the user must authorize again.
    pub async fn revoke(&self, user_id: &str) -> Result<bool> {
        self.store.remove(user_id).await
    }

    fn normalize(&self, raw: RawCredentials) -> Result<Credential> {
        if raw.access_token.trim().is_empty() {
            return Err(BrokerError::InvalidCredential(
                "access token is empty".to_string(),
            ));
        }

        let now = Utc::now();
        let expires_at = raw
            .expires_at
            .unwrap_or(now + self.coordinator.default_lifetime());
        if expires_at <= now {
            return Err(BrokerError::InvalidCredential(format!(
                "credential already expired at {}",
                expires_at
            )));
        }

        let scope = raw.scope.unwrap_or_else(|| {
            warn!("Provider bundle carries no scope; no scopes recorded");
            String::new()
        });

        Ok(Credential {
            access_token: raw.access_token,
            refresh_token: raw.refresh_token,
            token_type: raw
                .token_type
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            scope,
            expires_at,
        })
    }
}
