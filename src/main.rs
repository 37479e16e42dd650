use anyhow::{Context, Result};
use chrono::Duration;
use oauth_broker::api::{create_auth_router, run_state_cleanup, AuthAppState, StateManager};
use oauth_broker::config::{self, BrokerConfig, StorageKind};
use oauth_broker::credentials::{Cipher, CredentialStore};
use oauth_broker::exchange::{HttpTokenExchange, OAuthProviderConfig};
use oauth_broker::CredentialBroker;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oauth_broker=info".into()),
        )
        .init();

    info!("OAuth broker starting...");

    let config = match std::env::var("BROKER_CONFIG") {
        Ok(path) => config::load_config(&path)?,
        Err(_) => BrokerConfig::default(),
    }
    .apply_env();

    // A missing or malformed key must stop the process before serving traffic
    let cipher = Arc::new(Cipher::from_env().context("Encryption key not usable")?);

    let store = match config.storage.backend {
        StorageKind::Memory => CredentialStore::in_memory(Arc::clone(&cipher)),
        StorageKind::Sqlite => CredentialStore::sqlite(&config.storage.path, Arc::clone(&cipher))
            .context("Failed to open credential database")?,
    };
    let users = store.users().context("Failed to list stored users")?;
    info!(
        backend = ?config.storage.backend,
        users = users.len(),
        "Credential store ready"
    );

    let provider = OAuthProviderConfig::from_env(&config.oauth)
        .context("OAuth client credentials not configured")?;
    let exchange = Arc::new(HttpTokenExchange::new(provider.clone()));

    let default_lifetime = Duration::try_seconds(config.tokens.default_lifetime_seconds)
        .context("tokens.default_lifetime_seconds out of range")?;
    let broker = Arc::new(CredentialBroker::new(Arc::new(store), exchange, default_lifetime));

    let state_manager = StateManager::new(config.state.expiry_seconds);
    tokio::spawn(run_state_cleanup(
        state_manager.clone(),
        config.state.cleanup_interval_seconds,
    ));

    let app = create_auth_router(AuthAppState {
        broker,
        provider,
        state_manager,
    })
    .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
