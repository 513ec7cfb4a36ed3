//! Protocol client and token manager integration tests using wiremock
//!
//! Everything here goes over real HTTP through `ReqwestTransport`:
//!
//! - discovery runs once and its endpoints and auth method are adopted
//! - grant requests carry the negotiated client authentication
//! - error responses map to `OAuth2Error::Http`
//! - the token manager retries an API call once after a 401

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use oauth2_fetch::client::{ClientCredentialsParams, OAuth2Client, PasswordParams};
use oauth2_fetch::config::{AuthMethod, ClientSettings};
use oauth2_fetch::error::OAuth2Error;
use oauth2_fetch::manager::{TokenManager, TokenManagerOptions};
use oauth2_fetch::token::{Token, TokenTypeHint};
use oauth2_fetch::transport::{HttpRequest, ReqwestTransport};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn settings(server: &MockServer) -> ClientSettings {
    ClientSettings::new("my-client")
        .with_server(server.uri())
        .with_client_secret("s3cret")
}

fn client(settings: ClientSettings) -> OAuth2Client {
    OAuth2Client::new(settings, Arc::new(ReqwestTransport::default()))
}

/// base64("my-client:s3cret")
const BASIC: &str = "Basic bXktY2xpZW50OnMzY3JldA==";

async fn mount_discovery(server: &MockServer, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/.well-known/oauth-authorization-server"))
        .and(header("accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Discovery and client authentication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_client_credentials_uses_discovered_endpoint_and_basic_auth() {
    let server = MockServer::start().await;
    mount_discovery(
        &server,
        json!({
            "issuer": server.uri(),
            "token_endpoint": "/oauth/token",
            "token_endpoint_auth_methods_supported": ["client_secret_basic"]
        }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("authorization", BASIC))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("scope=read+write"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client(settings(&server));
    for _ in 0..2 {
        let token = client
            .client_credentials(ClientCredentialsParams {
                scope: Some(vec!["read".to_string(), "write".to_string()]),
                ..ClientCredentialsParams::default()
            })
            .await
            .expect("client_credentials should succeed");
        assert_eq!(token.access_token, "at-1");
        assert!(token.expires_at.is_some(), "expires_in must become an expiry");
    }

    assert!(client.server_metadata().is_some());
}

#[tokio::test]
async fn test_client_secret_post_embeds_credentials_in_body() {
    let server = MockServer::start().await;
    mount_discovery(
        &server,
        json!({
            "token_endpoint": "/oauth/token",
            "token_endpoint_auth_methods_supported": ["client_secret_post", "client_secret_basic"]
        }),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("client_id=my-client"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains("username=alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-2"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(settings(&server));
    let token = client
        .password(PasswordParams {
            username: "alice".to_string(),
            password: "pw".to_string(),
            ..PasswordParams::default()
        })
        .await
        .unwrap();
    assert_eq!(token.access_token, "at-2");
    assert_eq!(
        client.settings().authentication_method.as_deref(),
        Some(AuthMethod::ClientSecretPost.as_str())
    );
}

#[tokio::test]
async fn test_missing_discovery_document_falls_back_to_default_paths() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "at-3"})))
        .expect(1)
        .mount(&server)
        .await;

    let token = client(settings(&server))
        .client_credentials(ClientCredentialsParams::default())
        .await
        .unwrap();
    assert_eq!(token.access_token, "at-3");
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_oauth2_error_body_is_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token expired"
        })))
        .mount(&server)
        .await;

    let client = client(settings(&server).with_token_endpoint("/token"));
    let err = client
        .refresh_token(
            &Token::new("at").with_refresh_token("rt"),
            Default::default(),
        )
        .await
        .unwrap_err();

    let http = err.as_http().expect("should be an HTTP error");
    assert_eq!(http.status, 400);
    assert_eq!(http.oauth2_code.as_deref(), Some("invalid_grant"));
    assert!(http.message.contains("refresh token expired"));
    assert_eq!(http.body.as_ref().unwrap()["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unauthorized_without_body_hints_at_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(settings(&server).with_token_endpoint("/token"))
        .client_credentials(ClientCredentialsParams::default())
        .await
        .unwrap_err();

    let http = err.as_http().unwrap();
    assert_eq!(http.status, 401);
    assert!(http.oauth2_code.is_none());
    assert!(http.body.is_none());
    assert!(http.message.contains("client_secret"), "got: {}", http.message);
}

#[tokio::test]
async fn test_revoke_accepts_empty_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/revoke"))
        .and(body_string_contains("token=at-9"))
        .and(body_string_contains("token_type_hint=access_token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client(settings(&server).with_revocation_endpoint("/revoke"));
    client
        .revoke(&Token::new("at-9"), TokenTypeHint::AccessToken)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_connection_failure_is_a_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = OAuth2Client::new(
        ClientSettings::new("my-client")
            .with_client_secret("s3cret")
            .with_token_endpoint(format!("{}/token", uri)),
        Arc::new(ReqwestTransport::default()),
    )
    .client_credentials(ClientCredentialsParams::default())
    .await
    .unwrap_err();
    assert!(matches!(err, OAuth2Error::Transport(_)), "got {:?}", err);
}

// ---------------------------------------------------------------------------
// Token manager over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_manager_fetch_retries_once_after_401() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", "Bearer old-token"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/me"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "alice"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = Arc::new(client(settings(&server).with_token_endpoint("/token")));
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .token(Token::new("old-token").with_refresh_token("rt-1"))
            .schedule_refresh(false),
    );

    let url = format!("{}/api/me", server.uri()).parse().unwrap();
    let response = manager.fetch(HttpRequest::get(url)).await.unwrap();

    assert!(response.is_success());
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["name"], "alice");

    let token = manager.token().unwrap();
    assert_eq!(token.access_token, "new-token");
    assert_eq!(
        token.refresh_token.as_deref(),
        Some("rt-1"),
        "refresh token must be carried forward"
    );
}
