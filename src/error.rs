//! Error taxonomy for the credential lifecycle.
//!
//! Provider failures are classified once, at the token-exchange boundary, into
//! [`ExchangeError`]. Everything the broker hands back to callers is a
//! [`BrokerError`].

use thiserror::Error;

/// Failure reported by the external token-exchange primitive.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The grant (code or refresh token) was rejected: expired, revoked or
    /// already used. Provider answered 401, or 400 with `invalid_grant`.
    #[error("grant rejected by provider: {0}")]
    InvalidGrant(String),

    /// Any other 4xx response.
    #[error("provider rejected the request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    /// 5xx responses and transport failures.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// Response could not be parsed or lacked an access token.
    #[error("malformed token response: {0}")]
    MalformedResponse(String),
}

impl ExchangeError {
    /// Classifies a non-success HTTP status and its body.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 => ExchangeError::InvalidGrant(body.to_string()),
            400 if body.contains("invalid_grant") => ExchangeError::InvalidGrant(body.to_string()),
            400..=499 => ExchangeError::BadRequest {
                status,
                message: body.to_string(),
            },
            _ => ExchangeError::Transient(format!("status {}: {}", status, body)),
        }
    }

    /// Whether re-triggering the same exchange later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExchangeError::Transient(_))
    }
}

/// Errors returned by the credential broker.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Missing or malformed encryption key. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Stored ciphertext cannot be decrypted under the current key.
    #[error("failed to decrypt stored credential: {0}")]
    Decryption(String),

    /// No credential on file, or the one on file cannot be refreshed.
    #[error("authentication required for user '{user_id}'")]
    AuthenticationRequired { user_id: String },

    /// The refresh exchange failed; the previous entry is left untouched.
    #[error("token refresh failed for user '{user_id}'")]
    RefreshFailed {
        user_id: String,
        #[source]
        source: ExchangeError,
    },

    /// Authorization-code exchange failed during first-time or re-authentication.
    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(#[from] ExchangeError),

    /// A provider bundle that cannot be accepted into the store.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Durable backend failure.
    #[error("credential storage failure: {0}")]
    Storage(String),
}

impl BrokerError {
    pub(crate) fn auth_required(user_id: &str) -> Self {
        BrokerError::AuthenticationRequired {
            user_id: user_id.to_string(),
        }
    }
}

pub type Result<T, E = BrokerError> = std::result::Result<T, E>;
