// Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use oauth_broker::{
    Cipher, CredentialBroker, CredentialStore, ExchangeError, RawCredentials, TokenExchange,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Token exchange double that counts calls and answers from a script.
pub struct MockExchange {
    refresh_calls: AtomicUsize,
    code_calls: AtomicUsize,
    delay: std::time::Duration,
    refresh_response: Mutex<Result<RawCredentials, ExchangeError>>,
    code_response: Mutex<Result<RawCredentials, ExchangeError>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            refresh_calls: AtomicUsize::new(0),
            code_calls: AtomicUsize::new(0),
            delay: std::time::Duration::from_millis(0),
            refresh_response: Mutex::new(Ok(refreshed_bundle("a2", None))),
            code_response: Mutex::new(Ok(RawCredentials {
                access_token: "code-access".to_string(),
                refresh_token: Some("code-refresh".to_string()),
                token_type: Some("Bearer".to_string()),
                scope: Some("gmail.readonly calendar.events".to_string()),
                expires_at: Some(Utc::now() + Duration::hours(1)),
            })),
        }
    }

    /// Makes every exchange suspend for `delay` before answering.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_refresh_response(self, response: Result<RawCredentials, ExchangeError>) -> Self {
        *self.refresh_response.lock().unwrap() = response;
        self
    }

    pub fn with_code_response(self, response: Result<RawCredentials, ExchangeError>) -> Self {
        *self.code_response.lock().unwrap() = response;
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn code_calls(&self) -> usize {
        self.code_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenExchange for MockExchange {
    async fn exchange_code(&self, _code: &str) -> Result<RawCredentials, ExchangeError> {
        self.code_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.code_response.lock().unwrap().clone()
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RawCredentials, ExchangeError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.refresh_response.lock().unwrap().clone()
    }
}

/// Refresh response valid for an hour, optionally rotating the refresh token.
pub fn refreshed_bundle(access_token: &str, refresh_token: Option<&str>) -> RawCredentials {
    RawCredentials {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        token_type: None,
        scope: None,
        expires_at: Some(Utc::now() + Duration::hours(1)),
    }
}

/// Provider bundle expiring `expires_in` from now.
pub fn bundle(
    access_token: &str,
    refresh_token: Option<&str>,
    scope: &str,
    expires_in: Duration,
) -> RawCredentials {
    RawCredentials {
        access_token: access_token.to_string(),
        refresh_token: refresh_token.map(str::to_string),
        token_type: Some("Bearer".to_string()),
        scope: Some(scope.to_string()),
        expires_at: Some(Utc::now() + expires_in),
    }
}

pub fn test_cipher() -> Arc<Cipher> {
    Arc::new(Cipher::new(&[42u8; 32]).expect("32-byte key"))
}

pub fn broker_with(exchange: Arc<MockExchange>) -> CredentialBroker {
    let store = Arc::new(CredentialStore::in_memory(test_cipher()));
    CredentialBroker::new(store, exchange, Duration::hours(1))
}
