//! OAuth provider configuration and consent URL generation.

use crate::config::OAuthConfig;
use crate::error::{BrokerError, Result};

/// Environment variable holding the OAuth client id.
pub const CLIENT_ID_VAR: &str = "BROKER_OAUTH_CLIENT_ID";

/// Environment variable holding the OAuth client secret.
pub const CLIENT_SECRET_VAR: &str = "BROKER_OAUTH_CLIENT_SECRET";

/// OAuth provider configuration
#[derive(Clone)]
pub struct OAuthProviderConfig {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// OAuth token exchange endpoint URL
    pub token_url: String,

    /// Where the provider sends the user back after consent
    pub redirect_uri: String,

    /// Scopes requested by default at consent time
    pub scopes: Vec<String>,

    /// Client ID (from environment variable)
    pub client_id: String,

    /// Client secret (from environment variable)
    pub client_secret: String,
}

impl OAuthProviderConfig {
    /// Combines the file configuration with client credentials from the environment.
    pub fn from_env(config: &OAuthConfig) -> Result<Self> {
        let client_id = std::env::var(CLIENT_ID_VAR)
            .map_err(|_| BrokerError::Configuration(format!("{} is not set", CLIENT_ID_VAR)))?;
        let client_secret = std::env::var(CLIENT_SECRET_VAR)
            .map_err(|_| BrokerError::Configuration(format!("{} is not set", CLIENT_SECRET_VAR)))?;

        Ok(Self::new(config, client_id, client_secret))
    }

    pub fn new(config: &OAuthConfig, client_id: String, client_secret: String) -> Self {
        Self {
            auth_url: config.auth_url.clone(),
            token_url: config.token_url.clone(),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            client_id,
            client_secret,
        }
    }

    /// Build the consent URL for the given scopes and opaque state.
    ///
    /// Requests offline access with a forced consent prompt so the provider
    /// issues a refresh token even for returning users.
    pub fn build_auth_url(&self, scopes: &[String], state: &str) -> String {
        let scopes = scopes.join(" ");
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&state={}&response_type=code&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&scopes),
            urlencoding::encode(state)
        )
    }
}
