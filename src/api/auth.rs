//! OAuth 2.0 authorization routes.
//!
//! Implements the authorization code flow for a user:
//! 1. GET /auth/initiate?user_id=.. → JSON with the consent URL
//! 2. User authorizes on the provider's site
//! 3. Provider redirects to /auth/callback?code=..&state=..
//! 4. Exchange code for token, store encrypted credentials
//! 5. Downstream clients call `CredentialBroker::resolve` for the user

use super::state_manager::StateManager;
use crate::broker::CredentialBroker;
use crate::error::BrokerError;
use crate::exchange::OAuthProviderConfig;
use crate::scope::parse_scope_list;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Redirect, Response},
    routing::{delete, get},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for auth endpoints
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

impl From<BrokerError> for AppError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::AuthenticationRequired { .. } => AppError::Unauthorized(err.to_string()),
            BrokerError::RefreshFailed { .. } | BrokerError::ExchangeFailed(_) => {
                AppError::BadGateway(err.to_string())
            }
            BrokerError::InvalidCredential(_) => AppError::BadRequest(err.to_string()),
            BrokerError::Configuration(_) | BrokerError::Decryption(_) | BrokerError::Storage(_) => {
                error!(error = %err, "Credential subsystem failure");
                AppError::ServerError("Internal credential failure".to_string())
            }
        }
    }
}

/// Shared application state for auth API
#[derive(Clone)]
pub struct AuthAppState {
    pub broker: Arc<CredentialBroker>,
    pub provider: OAuthProviderConfig,
    pub state_manager: StateManager,
}

/// Query parameters for /auth/initiate
#[derive(Deserialize)]
pub struct InitiateQuery {
    user_id: String,
    redirect_url: Option<String>,
    /// Comma-separated scopes; defaults to the configured set
    scopes: Option<String>,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Query parameters for /auth/status
#[derive(Deserialize)]
pub struct StatusQuery {
    user_id: String,
    scopes: Option<String>,
}

#[derive(Serialize)]
pub struct InitiateResponse {
    auth_url: String,
}

/// OAuth success response
#[derive(Serialize)]
pub struct OAuthSuccessResponse {
    success: bool,
    message: String,
    user_id: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    user_id: String,
    authenticated: bool,
    has_scopes: bool,
}

#[derive(Serialize)]
pub struct RevokeResponse {
    user_id: String,
    removed: bool,
}

/// Create auth API router
pub fn create_auth_router(state: AuthAppState) -> Router {
    Router::new()
        .route("/auth/initiate", get(initiate))
        .route("/auth/callback", get(callback))
        .route("/auth/status", get(status))
        .route("/auth/credentials/:user_id", delete(revoke))
        .with_state(Arc::new(state))
}

/// Only same-origin relative paths may be used as post-consent redirects.
fn is_safe_redirect(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

/// GET /auth/initiate
///
/// Returns the provider consent URL for a user.
///
/// # Security
/// - Generates a single-use CSRF state bound to the user
/// - Rejects absolute redirect URLs
async fn initiate(
    State(state): State<Arc<AuthAppState>>,
    Query(query): Query<InitiateQuery>,
) -> Result<Json<InitiateResponse>, AppError> {
    if query.user_id.trim().is_empty() {
        return Err(AppError::BadRequest("Missing 'user_id' parameter".to_string()));
    }

    if let Some(url) = &query.redirect_url {
        if !is_safe_redirect(url) {
            warn!(user_id = %query.user_id, "Rejected off-site redirect_url");
            return Err(AppError::BadRequest(
                "redirect_url must be a relative path".to_string(),
            ));
        }
    }

    let scopes = match query.scopes.as_deref().map(parse_scope_list) {
        Some(scopes) if !scopes.is_empty() => scopes,
        _ => state.provider.scopes.clone(),
    };

    let csrf_state = state
        .state_manager
        .create_state(&query.user_id, query.redirect_url);
    let auth_url = state.provider.build_auth_url(&scopes, &csrf_state);

    info!(
        user_id = %query.user_id,
        scope_count = scopes.len(),
        "Issued OAuth consent URL"
    );

    Ok(Json(InitiateResponse { auth_url }))
}

/// GET /auth/callback
///
/// Exchanges the authorization code and stores encrypted credentials.
///
/// # Security
/// - Validates CSRF state parameter
/// - Single-use state (consumed on validation)
/// - The user id comes from the state, never from the query
async fn callback(
    State(state): State<Arc<AuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, AppError> {
    debug!("OAuth callback received");

    // Check for OAuth errors
    if let Some(error) = callback.error {
        let description = callback
            .error_description
            .unwrap_or_else(|| "Unknown error".to_string());
        warn!(error = %error, description = %description, "OAuth authorization failed");
        if let Some(csrf_state) = &callback.state {
            state.state_manager.validate_and_consume(csrf_state);
        }
        return Err(AppError::BadRequest(format!(
            "OAuth authorization failed: {} - {}",
            error, description
        )));
    }

    let code = callback
        .code
        .ok_or_else(|| AppError::BadRequest("Missing 'code' parameter".to_string()))?;
    let csrf_state = callback
        .state
        .ok_or_else(|| AppError::BadRequest("Missing 'state' parameter".to_string()))?;

    let state_entry = state
        .state_manager
        .validate_and_consume(&csrf_state)
        .ok_or_else(|| {
            warn!("Invalid or expired OAuth state");
            AppError::Unauthorized(
                "Invalid or expired OAuth state (possible CSRF attack)".to_string(),
            )
        })?;

    let user_id = state_entry.user_id;
    debug!(user_id = %user_id, "CSRF state validated");

    state.broker.authorize(&user_id, &code).await?;

    info!(user_id = %user_id, "OAuth flow completed successfully");

    match state_entry.redirect_url {
        Some(url) => Ok(Redirect::to(&url).into_response()),
        None => Ok(Json(OAuthSuccessResponse {
            success: true,
            message: "Successfully authenticated".to_string(),
            user_id,
        })
        .into_response()),
    }
}

/// GET /auth/status
///
/// Reports whether a user is authenticated and holds the requested scopes.
/// Reads only the plaintext scope set; never decrypts.
async fn status(
    State(state): State<Arc<AuthAppState>>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, AppError> {
    let store = state.broker.store_handle();
    let required = query
        .scopes
        .as_deref()
        .map(parse_scope_list)
        .unwrap_or_default();

    let authenticated = store.contains(&query.user_id)?;
    let has_scopes = state.broker.has_scopes(&query.user_id, required.as_slice())?;

    Ok(Json(StatusResponse {
        user_id: query.user_id,
        authenticated,
        has_scopes,
    }))
}

/// DELETE /auth/credentials/:user_id
async fn revoke(
    State(state): State<Arc<AuthAppState>>,
    Path(user_id): Path<String>,
) -> Result<Json<RevokeResponse>, AppError> {
    let removed = state.broker.revoke(&user_id).await?;
    Ok(Json(RevokeResponse { user_id, removed }))
}
