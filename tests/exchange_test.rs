// Token endpoint client against a local mock provider.

use chrono::{Duration, Utc};
use mockito::Matcher;
use oauth_broker::exchange::{HttpTokenExchange, OAuthProviderConfig};
use oauth_broker::{ExchangeError, TokenExchange};

fn exchange_for(token_url: String) -> HttpTokenExchange {
    HttpTokenExchange::new(OAuthProviderConfig {
        auth_url: "https://accounts.example.com/auth".to_string(),
        token_url,
        redirect_uri: "http://localhost:3000/auth/callback".to_string(),
        scopes: vec!["gmail.readonly".to_string()],
        client_id: "client-123".to_string(),
        client_secret: "secret-456".to_string(),
    })
}

#[tokio::test]
async fn test_exchange_code_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "4/0Ab".into()),
            Matcher::UrlEncoded("client_id".into(), "client-123".into()),
            Matcher::UrlEncoded(
                "redirect_uri".into(),
                "http://localhost:3000/auth/callback".into(),
            ),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"access_token":"a1","refresh_token":"r1","expires_in":3600,
                "token_type":"Bearer","scope":"gmail.readonly calendar.events"}"#,
        )
        .create_async()
        .await;

    let raw = exchange_for(format!("{}/token", server.url()))
        .exchange_code("4/0Ab")
        .await
        .unwrap();

    assert_eq!(raw.access_token, "a1");
    assert_eq!(raw.refresh_token.as_deref(), Some("r1"));
    assert_eq!(raw.scope.as_deref(), Some("gmail.readonly calendar.events"));
    let remaining = raw.expires_at.unwrap() - Utc::now();
    assert!(remaining > Duration::seconds(3500));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_refresh_success_without_rotation() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "r1".into()),
            Matcher::UrlEncoded("client_secret".into(), "secret-456".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"a2","expires_in":3599}"#)
        .create_async()
        .await;

    let raw = exchange_for(format!("{}/token", server.url()))
        .refresh("r1")
        .await
        .unwrap();

    assert_eq!(raw.access_token, "a2");
    assert_eq!(raw.refresh_token, None);
    assert_eq!(raw.scope, None);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_grant_is_classified() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#)
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .refresh("revoked")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::InvalidGrant(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_unauthorized_client_is_invalid_grant() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(401)
        .with_body(r#"{"error":"invalid_client"}"#)
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .exchange_code("c")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::InvalidGrant(_)));
}

#[tokio::test]
async fn test_other_client_error_is_bad_request() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(400)
        .with_body(r#"{"error":"unsupported_grant_type"}"#)
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .refresh("r1")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::BadRequest { status: 400, .. }));
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(503)
        .with_body("backend unavailable")
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .refresh("r1")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Transient(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .refresh("r1")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_missing_access_token_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"expires_in":3600}"#)
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .refresh("r1")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_out_of_range_lifetime_is_rejected() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"t","expires_in":9223372036854775807}"#)
        .create_async()
        .await;

    let err = exchange_for(format!("{}/token", server.url()))
        .refresh("r1")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transient() {
    let err = exchange_for("http://127.0.0.1:1/token".to_string())
        .refresh("r1")
        .await
        .unwrap_err();

    assert!(matches!(err, ExchangeError::Transient(_)));
}
