//! Expiry-driven credential refresh.
//!
//! Staleness is evaluated on every access; there is no background timer.
//! A credential is:
//! - `Fresh` while at least [`REFRESH_THRESHOLD_SECS`] of validity remain
//! - `Stale` inside that window when a refresh token is on file
//! - `Unrefreshable` inside that window without one
//!
//! Refreshes run under the user's write lock. Callers queued behind an
//! in-flight exchange take its outcome when it completes, so concurrent
//! callers share a single exchange whether it succeeds or fails.

use crate::credentials::{Credential, CredentialStore, WriteGuard};
use crate::error::{BrokerError, ExchangeError, Result};
use crate::exchange::{RawCredentials, TokenExchange};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Refresh when fewer than this many seconds of validity remain.
pub const REFRESH_THRESHOLD_SECS: i64 = 300;

pub fn refresh_threshold() -> Duration {
    Duration::seconds(REFRESH_THRESHOLD_SECS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Unrefreshable,
}

/// Classifies a credential against `now`.
pub fn classify(credential: &Credential, now: DateTime<Utc>) -> Freshness {
    if credential.expires_at - now >= refresh_threshold() {
        Freshness::Fresh
    } else if credential.refresh_token.is_some() {
        Freshness::Stale
    } else {
        Freshness::Unrefreshable
    }
}

/// Builds the replacement credential from a refresh response.
///
/// Providers need not return a new refresh token or scope on every refresh;
/// omitted fields fall back to the previous credential's values.
pub fn merge_refreshed(
    previous: &Credential,
    response: RawCredentials,
    default_lifetime: Duration,
    now: DateTime<Utc>,
) -> Credential {
    Credential {
        access_token: response.access_token,
        refresh_token: response.refresh_token.or_else(|| previous.refresh_token.clone()),
        token_type: response
            .token_type
            .unwrap_or_else(|| previous.token_type.clone()),
        scope: response.scope.unwrap_or_else(|| previous.scope.clone()),
        expires_at: response.expires_at.unwrap_or(now + default_lifetime),
    }
}

/// Refresh attempts for one user.
///
/// `generation` is bumped, under `last_failure`'s lock, each time an exchange
/// completes. A caller that saw generation N before queueing and finds N+1
/// after acquiring the lock waited on that attempt and takes its outcome.
#[derive(Default)]
struct Flight {
    generation: AtomicU64,
    last_failure: Mutex<Option<BrokerError>>,
}

/// Decides when a stored credential needs renewing and renews it.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    default_lifetime: Duration,
    flights: DashMap<String, Arc<Flight>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        default_lifetime: Duration,
    ) -> Self {
        Self {
            store,
            exchange,
            default_lifetime,
            flights: DashMap::new(),
        }
    }

    pub fn default_lifetime(&self) -> Duration {
        self.default_lifetime
    }

    fn flight(&self, user_id: &str) -> Arc<Flight> {
        self.flights
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// Returns the user's credential, refreshing it first when stale.
    ///
    /// Idempotent: a fresh credential is returned without any exchange.
    /// Callers that arrive while an exchange is in flight share its outcome,
    /// success or failure, instead of starting their own.
    ///
    /// # Errors
    /// - `AuthenticationRequired` - nothing on file, or stale without a refresh token
    /// - `RefreshFailed` - exchange failed; the stored entry is left as it was
    pub async fn ensure_fresh(&self, user_id: &str) -> Result<Credential> {
        // Fast path: fresh credentials never touch a lock
        let current = self
            .store
            .get(user_id)?
            .ok_or_else(|| BrokerError::auth_required(user_id))?;
        if classify(&current, Utc::now()) == Freshness::Fresh {
            return Ok(current);
        }

        let flight = self.flight(user_id);
        let seen = flight.generation.load(Ordering::Acquire);
        let mut last_failure = flight.last_failure.lock().await;

        if flight.generation.load(Ordering::Acquire) != seen {
            debug!(user_id = %user_id, "Joined refresh completed by concurrent caller");
            if let Some(err) = last_failure.as_ref() {
                return Err(err.clone());
            }
            return self
                .store
                .get(user_id)?
                .ok_or_else(|| BrokerError::auth_required(user_id));
        }

        let guard = self.store.lock(user_id).await;

        // Another writer may have replaced the entry while we waited
        let current = self
            .store
            .get(user_id)?
            .ok_or_else(|| BrokerError::auth_required(user_id))?;
        let now = Utc::now();

        match classify(&current, now) {
            Freshness::Fresh => {
                debug!(user_id = %user_id, "Credential replaced by concurrent writer");
                Ok(current)
            }
            Freshness::Unrefreshable => {
                warn!(
                    user_id = %user_id,
                    expires_at = %current.expires_at,
                    "Credential near expiry and no refresh token on file"
                );
                Err(BrokerError::auth_required(user_id))
            }
            Freshness::Stale => {
                let outcome = self.refresh_locked(&guard, &current, now).await;
                *last_failure = outcome.as_ref().err().cloned();
                flight.generation.fetch_add(1, Ordering::Release);
                outcome
            }
        }
    }

    /// One exchange for a stale credential. The caller holds the write lock.
    async fn refresh_locked(
        &self,
        guard: &WriteGuard,
        current: &Credential,
        now: DateTime<Utc>,
    ) -> Result<Credential> {
        let user_id = guard.user_id();
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| BrokerError::auth_required(user_id))?;

        info!(user_id = %user_id, expires_at = %current.expires_at, "Refreshing OAuth token");

        let response = self.exchange.refresh(refresh_token).await.map_err(|source| {
            warn!(user_id = %user_id, error = %source, "Token refresh failed");
            BrokerError::RefreshFailed {
                user_id: user_id.to_string(),
                source,
            }
        })?;

        let refreshed = merge_refreshed(current, response, self.default_lifetime, now);
        if refreshed.expires_at <= Utc::now() {
            warn!(user_id = %user_id, "Provider returned an already expired token");
            return Err(BrokerError::RefreshFailed {
                user_id: user_id.to_string(),
                source: ExchangeError::MalformedResponse(
                    "refreshed token is already expired".to_string(),
                ),
            });
        }

        self.store.put_locked(guard, &refreshed)?;

        info!(
            user_id = %user_id,
            expires_at = %refreshed.expires_at,
            rotated_refresh_token = refreshed.refresh_token != current.refresh_token,
            "OAuth token refreshed successfully"
        );
        Ok(refreshed)
    }
}
