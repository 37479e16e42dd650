// Integration tests for the auth routes.
//
// Requests go through tower::ServiceExt::oneshot against the router with a
// mock token exchange, so no network is involved.

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::Duration;
use common::{broker_with, bundle, MockExchange};
use oauth_broker::{
    api::{create_auth_router, AuthAppState, StateManager},
    config::OAuthConfig,
    exchange::OAuthProviderConfig,
    CredentialBroker, ExchangeError,
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn make_router(broker: Arc<CredentialBroker>) -> Router {
    let provider = OAuthProviderConfig::new(
        &OAuthConfig::default(),
        "client-123".to_string(),
        "secret-456".to_string(),
    );
    create_auth_router(AuthAppState {
        broker,
        provider,
        state_manager: StateManager::new(600),
    })
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn state_param(auth_url: &str) -> String {
    auth_url
        .split('&')
        .find_map(|pair| pair.strip_prefix("state="))
        .expect("auth url carries state")
        .to_string()
}

/// Runs /auth/initiate and returns the issued state token.
async fn initiate(app: &Router, query: &str) -> String {
    let response = app
        .clone()
        .oneshot(request("GET", &format!("/auth/initiate?{}", query)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    state_param(body["auth_url"].as_str().unwrap())
}

// ── /auth/initiate ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_initiate_returns_consent_url() {
    let app = make_router(Arc::new(broker_with(Arc::new(MockExchange::new()))));

    let response = app
        .oneshot(request("GET", "/auth/initiate?user_id=test-user"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let url = body["auth_url"].as_str().unwrap();
    assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
    assert!(url.contains("client_id=client-123"));
    assert!(url.contains("access_type=offline"));
    assert!(url.contains("gmail.readonly"));
    assert!(!url.contains("secret-456"));
}

#[tokio::test]
async fn test_initiate_rejects_absolute_redirect() {
    let app = make_router(Arc::new(broker_with(Arc::new(MockExchange::new()))));

    let response = app
        .oneshot(request(
            "GET",
            "/auth/initiate?user_id=u1&redirect_url=https%3A%2F%2Fevil.example.com",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_initiate_requires_user_id() {
    let app = make_router(Arc::new(broker_with(Arc::new(MockExchange::new()))));

    let response = app.oneshot(request("GET", "/auth/initiate")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ── /auth/callback ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_flow_stores_credential() {
    let exchange = Arc::new(MockExchange::new());
    let broker = Arc::new(broker_with(Arc::clone(&exchange)));
    let app = make_router(Arc::clone(&broker));

    let state = initiate(&app, "user_id=u1").await;
    let response = app
        .clone()
        .oneshot(request(
            "GET",
            &format!("/auth/callback?code=4%2F0Ab&state={}", state),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"], "u1");
    assert_eq!(exchange.code_calls(), 1);
    assert_eq!(broker.resolve("u1").await.unwrap().access_token, "code-access");
}

#[tokio::test]
async fn test_callback_redirects_to_saved_url() {
    let app = make_router(Arc::new(broker_with(Arc::new(MockExchange::new()))));

    let state = initiate(&app, "user_id=u1&redirect_url=%2Fauth-success.html").await;
    let response = app
        .oneshot(request("GET", &format!("/auth/callback?code=c&state={}", state)))
        .await
        .unwrap();

    assert!(response.status().is_redirection());
    assert_eq!(response.headers()["location"], "/auth-success.html");
}

#[tokio::test]
async fn test_callback_state_is_single_use() {
    let exchange = Arc::new(MockExchange::new());
    let app = make_router(Arc::new(broker_with(Arc::clone(&exchange))));

    let state = initiate(&app, "user_id=u1").await;
    let uri = format!("/auth/callback?code=c&state={}", state);

    let first = app.clone().oneshot(request("GET", &uri)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let replay = app.oneshot(request("GET", &uri)).await.unwrap();
    assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(exchange.code_calls(), 1);
}

#[tokio::test]
async fn test_callback_with_unknown_state_is_rejected() {
    let exchange = Arc::new(MockExchange::new());
    let app = make_router(Arc::new(broker_with(Arc::clone(&exchange))));

    let response = app
        .oneshot(request("GET", "/auth/callback?code=c&state=forged"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(exchange.code_calls(), 0);
}

#[tokio::test]
async fn test_callback_provider_error() {
    let app = make_router(Arc::new(broker_with(Arc::new(MockExchange::new()))));

    let response = app
        .oneshot(request(
            "GET",
            "/auth/callback?error=access_denied&error_description=User+cancelled",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["error"].as_str().unwrap().contains("access_denied"));
}

#[tokio::test]
async fn test_callback_exchange_failure_is_bad_gateway() {
    let exchange = Arc::new(MockExchange::new().with_code_response(Err(
        ExchangeError::InvalidGrant("Malformed auth code.".to_string()),
    )));
    let broker = Arc::new(broker_with(Arc::clone(&exchange)));
    let app = make_router(Arc::clone(&broker));

    let state = initiate(&app, "user_id=u1").await;
    let response = app
        .oneshot(request("GET", &format!("/auth/callback?code=bad&state={}", state)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(!broker.store_handle().contains("u1").unwrap());
}

// ── /auth/status and revocation ──────────────────────────────────────────────

#[tokio::test]
async fn test_status_reports_scopes() {
    let broker = Arc::new(broker_with(Arc::new(MockExchange::new())));
    broker
        .store(
            "u1",
            bundle("a1", Some("r1"), "gmail.readonly calendar.events", Duration::hours(1)),
        )
        .await
        .unwrap();
    let app = make_router(Arc::clone(&broker));

    let granted = app
        .clone()
        .oneshot(request("GET", "/auth/status?user_id=u1&scopes=gmail.readonly"))
        .await
        .unwrap();
    let body = json_body(granted).await;
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["has_scopes"], true);

    let missing = app
        .clone()
        .oneshot(request(
            "GET",
            "/auth/status?user_id=u1&scopes=gmail.readonly,gmail.send",
        ))
        .await
        .unwrap();
    assert_eq!(json_body(missing).await["has_scopes"], false);

    let unknown = app
        .oneshot(request("GET", "/auth/status?user_id=nobody"))
        .await
        .unwrap();
    let body = json_body(unknown).await;
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["has_scopes"], false);
}

#[tokio::test]
async fn test_revoke_removes_credential() {
    let broker = Arc::new(broker_with(Arc::new(MockExchange::new())));
    broker
        .store("u1", bundle("a1", None, "gmail.readonly", Duration::hours(1)))
        .await
        .unwrap();
    let app = make_router(Arc::clone(&broker));

    let response = app
        .clone()
        .oneshot(request("DELETE", "/auth/credentials/u1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["removed"], true);

    let again = app
        .oneshot(request("DELETE", "/auth/credentials/u1"))
        .await
        .unwrap();
    assert_eq!(json_body(again).await["removed"], false);
    assert!(!broker.store_handle().contains("u1").unwrap());
}
