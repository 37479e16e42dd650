//! OAuth token exchange with the provider.
//!
//! [`TokenExchange`] is the seam between the credential lifecycle and the
//! provider: the broker hands it an authorization code or a refresh token and
//! gets back a [`RawCredentials`] bundle, or an [`ExchangeError`] that has
//! already been classified from the transport status.

mod http;
mod provider;

pub use http::HttpTokenExchange;
pub use provider::{OAuthProviderConfig, CLIENT_ID_VAR, CLIENT_SECRET_VAR};

use crate::error::ExchangeError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Credential bundle as returned by the provider.
///
/// Everything except the access token is optional: refresh responses often
/// omit the refresh token and scope.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RawCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for RawCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawCredentials")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// External token-exchange primitive.
///
/// Implementations must not retry internally; the broker decides what a
/// failure means for the stored credential.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Exchanges an authorization code from the consent redirect.
    async fn exchange_code(&self, code: &str) -> Result<RawCredentials, ExchangeError>;

    /// Exchanges a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &str) -> Result<RawCredentials, ExchangeError>;
}
