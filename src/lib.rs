// Error taxonomy
pub mod error;

// Configuration loading
pub mod config;

// Cipher and encrypted credential store
pub mod credentials;

// Scope parsing and validation
pub mod scope;

// Provider token exchange
pub mod exchange;

// Expiry-driven refresh
pub mod refresh;

// Credential facade
pub mod broker;

// HTTP auth routes
pub mod api;

pub use broker::CredentialBroker;
pub use credentials::{Cipher, Credential, CredentialStore};
pub use error::{BrokerError, ExchangeError};
pub use exchange::{RawCredentials, TokenExchange};
