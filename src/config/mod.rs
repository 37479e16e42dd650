use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Complete broker configuration.
///
/// Secrets (encryption key, OAuth client secret) are never read from the file;
/// they come from the environment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// OAuth provider endpoints and requested scopes
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/auth/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    [
        "https://www.googleapis.com/auth/gmail.readonly",
        "https://www.googleapis.com/auth/gmail.send",
        "https://www.googleapis.com/auth/calendar.readonly",
        "https://www.googleapis.com/auth/calendar.events",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

/// Which persistence engine holds the encrypted entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Memory,
    Sqlite,
}

/// Credential storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageKind,
    /// SQLite database path (ignored for the memory backend)
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "credentials.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::default(),
            path: default_db_path(),
        }
    }
}

/// OAuth CSRF state configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    /// How long a consent round-trip may take (seconds)
    #[serde(default = "default_state_expiry")]
    pub expiry_seconds: i64,
    /// How often expired states are purged (seconds)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

fn default_state_expiry() -> i64 {
    600
}

fn default_cleanup_interval() -> u64 {
    60
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            expiry_seconds: default_state_expiry(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

/// Token normalization configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Lifetime assumed when a provider bundle carries no expiry (seconds)
    #[serde(default = "default_token_lifetime")]
    pub default_lifetime_seconds: i64,
}

fn default_token_lifetime() -> i64 {
    3600
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            default_lifetime_seconds: default_token_lifetime(),
        }
    }
}

/// Upper bound for configured durations (one year).
const MAX_CONFIGURED_SECS: i64 = 366 * 24 * 60 * 60;

impl BrokerConfig {
    /// Applies `BROKER_HOST` / `BROKER_PORT` overrides.
    pub fn apply_env(mut self) -> Self {
        if let Ok(host) = std::env::var("BROKER_HOST") {
            self.server.host = host;
        }
        if let Ok(v) = std::env::var("BROKER_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            }
        }
        self
    }

    /// Rejects values the runtime cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.state.cleanup_interval_seconds == 0 {
            bail!("state.cleanup_interval_seconds must be greater than zero");
        }
        if !(1..=MAX_CONFIGURED_SECS).contains(&self.state.expiry_seconds) {
            bail!(
                "state.expiry_seconds must be between 1 and {}, got {}",
                MAX_CONFIGURED_SECS,
                self.state.expiry_seconds
            );
        }
        if !(1..=MAX_CONFIGURED_SECS).contains(&self.tokens.default_lifetime_seconds) {
            bail!(
                "tokens.default_lifetime_seconds must be between 1 and {}, got {}",
                MAX_CONFIGURED_SECS,
                self.tokens.default_lifetime_seconds
            );
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<BrokerConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: BrokerConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    config
        .validate()
        .with_context(|| format!("Invalid config file {}", path))?;
    Ok(config)
}
