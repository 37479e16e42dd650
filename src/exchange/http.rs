//! Token endpoint client.
//!
//! Handles both grants the broker needs (`authorization_code` and
//! `refresh_token`) and classifies failures into [`ExchangeError`].

use super::{OAuthProviderConfig, RawCredentials, TokenExchange};
use crate::error::ExchangeError;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// [`TokenExchange`] against the provider's HTTP token endpoint.
pub struct HttpTokenExchange {
    client: reqwest::Client,
    provider: OAuthProviderConfig,
}

impl HttpTokenExchange {
    pub fn new(provider: OAuthProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider,
        }
    }

    async fn request_token<'a>(
        &'a self,
        mut form: HashMap<&'a str, &'a str>,
    ) -> Result<RawCredentials, ExchangeError> {
        form.insert("client_id", &self.provider.client_id);
        form.insert("client_secret", &self.provider.client_secret);

        tracing::debug!(
            grant_type = form.get("grant_type").copied().unwrap_or_default(),
            "Requesting token from {}",
            self.provider.token_url
        );

        let response = self
            .client
            .post(&self.provider.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| ExchangeError::Transient(format!("failed to send token request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            return Err(ExchangeError::from_status(status.as_u16(), &body));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ExchangeError::MalformedResponse(e.to_string()))?;

        if token_response.access_token.is_empty() {
            return Err(ExchangeError::MalformedResponse(
                "response carries no access_token".to_string(),
            ));
        }

        tracing::debug!(
            has_refresh_token = token_response.refresh_token.is_some(),
            expires_in = ?token_response.expires_in,
            "Token exchange successful"
        );

        into_raw(token_response)
    }
}

fn into_raw(response: TokenResponse) -> Result<RawCredentials, ExchangeError> {
    let expires_at = match response.expires_in {
        Some(seconds) => Some(
            Duration::try_seconds(seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .ok_or_else(|| {
                    ExchangeError::MalformedResponse(format!("expires_in out of range: {}", seconds))
                })?,
        ),
        None => None,
    };

    Ok(RawCredentials {
        access_token: response.access_token,
        refresh_token: response.refresh_token,
        token_type: response.token_type,
        scope: response.scope,
        expires_at,
    })
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn exchange_code(&self, code: &str) -> Result<RawCredentials, ExchangeError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "authorization_code");
        form.insert("code", code);
        form.insert("redirect_uri", self.provider.redirect_uri.as_str());
        self.request_token(form).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RawCredentials, ExchangeError> {
        let mut form = HashMap::new();
        form.insert("grant_type", "refresh_token");
        form.insert("refresh_token", refresh_token);
        self.request_token(form).await
    }
}
