//! Token lifecycle integration tests against the in-process fake transport
//!
//! The fake records every request, so these tests pin down exactly what
//! goes on the wire:
//!
//! - a valid cached token causes no I/O at all
//! - concurrent callers share one renewal and one discovery
//! - refresh requests authenticate according to the configured secret
//! - renewal strategies are tried in order and failures reach `on_error`
//! - background renewal fires one minute before expiry

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::{Method, StatusCode};
use serde_json::json;
use tokio_test::{assert_err, assert_ok};
use url::Url;

use oauth2_fetch::client::{ClientCredentialsParams, EndpointKind, OAuth2Client};
use oauth2_fetch::config::ClientSettings;
use oauth2_fetch::error::OAuth2Error;
use oauth2_fetch::manager::{MemoryTokenStorage, TokenManager, TokenManagerOptions, TokenStorage};
use oauth2_fetch::token::Token;
use oauth2_fetch::transport::fake::FakeTransport;
use oauth2_fetch::transport::{HttpRequest, HttpResponse};

use common::{fake_client, token_body, SERVER};

fn settings() -> ClientSettings {
    ClientSettings::new("my-client")
        .with_server(SERVER)
        .with_token_endpoint("/token")
}

fn expired_refreshable(refresh_token: &str) -> Token {
    Token::new("stale")
        .with_expires_at(Utc::now() - chrono::Duration::seconds(1))
        .with_refresh_token(refresh_token)
}

fn api_request() -> HttpRequest {
    HttpRequest::get(Url::parse("https://api.example.com/resource").unwrap())
}

// ---------------------------------------------------------------------------
// Freshness and single-flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_valid_token_is_served_without_io() {
    let (client, transport) = fake_client(settings());
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .token(Token::new("cached").with_expires_at(Utc::now() + chrono::Duration::hours(1))),
    );

    for _ in 0..100 {
        assert_eq!(manager.get_access_token().await.unwrap(), "cached");
    }
    assert!(transport.requests().is_empty(), "no request may be sent");
}

#[tokio::test]
async fn test_token_without_expiry_never_goes_stale() {
    let (client, transport) = fake_client(settings());
    let manager = TokenManager::new(TokenManagerOptions::new(client).token(Token::new("forever")));

    assert_eq!(manager.get_access_token().await.unwrap(), "forever");
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_concurrent_callers_trigger_exactly_one_renewal() {
    let transport = Arc::new(FakeTransport::with_latency(Duration::from_millis(50)));
    transport.respond(Method::POST, "/token", token_body("renewed", Some(3600)));
    let client = Arc::new(OAuth2Client::new(settings(), transport.clone()));
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .token(expired_refreshable("rt"))
            .schedule_refresh(false),
    );

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_access_token().await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "renewed");
    }
    assert_eq!(transport.requests_to("/token").len(), 1);

    // Once settled, a forced refresh starts a new operation.
    assert_ok!(manager.refresh_token().await);
    assert_eq!(transport.requests_to("/token").len(), 2);
}

#[tokio::test]
async fn test_discovery_runs_once_under_concurrency() {
    let transport = Arc::new(FakeTransport::with_latency(Duration::from_millis(20)));
    transport.respond(
        Method::GET,
        "/.well-known/oauth-authorization-server",
        HttpResponse::json(
            StatusCode::OK,
            &json!({
                "authorization_endpoint": "/authz",
                "token_endpoint": "/tok",
                "introspection_endpoint": "/intro"
            }),
        ),
    );
    let client = OAuth2Client::new(
        ClientSettings::new("my-client").with_server(SERVER),
        transport.clone(),
    );

    let (authorization, token, introspection, revocation) = tokio::join!(
        client.endpoint(EndpointKind::Authorization),
        client.endpoint(EndpointKind::Token),
        client.endpoint(EndpointKind::Introspection),
        client.endpoint(EndpointKind::Revocation),
    );

    assert_eq!(authorization.unwrap().path(), "/authz");
    assert_eq!(token.unwrap().path(), "/tok");
    assert_eq!(introspection.unwrap().path(), "/intro");
    assert_eq!(revocation.unwrap().path(), "/revoke", "undiscovered endpoints use defaults");
    assert_eq!(
        transport
            .requests_to("/.well-known/oauth-authorization-server")
            .len(),
        1
    );
}

// ---------------------------------------------------------------------------
// Refresh wire format
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_refresh_without_secret_sends_client_id_in_body() {
    let (client, transport) = fake_client(settings());
    transport.respond(Method::POST, "/token", token_body("renewed", None));
    let manager = TokenManager::new(TokenManagerOptions::new(client).token(expired_refreshable("rt")));

    let token = manager.get_token().await.unwrap();
    assert_eq!(token.refresh_token.as_deref(), Some("rt"), "carried forward");

    let sent = &transport.requests_to("/token")[0];
    let body = sent.form_body();
    assert!(body.contains(&("grant_type".to_string(), "refresh_token".to_string())));
    assert!(body.contains(&("refresh_token".to_string(), "rt".to_string())));
    assert!(body.contains(&("client_id".to_string(), "my-client".to_string())));
    assert!(!body.iter().any(|(k, _)| k == "client_secret"));
    assert!(sent.header("authorization").is_none());
}

#[tokio::test]
async fn test_refresh_with_secret_uses_basic_auth() {
    let (client, transport) = fake_client(settings().with_client_secret("s3cret"));
    transport.respond(
        Method::POST,
        "/token",
        HttpResponse::json(
            StatusCode::OK,
            &json!({"access_token": "renewed", "refresh_token": "rotated"}),
        ),
    );
    let manager = TokenManager::new(TokenManagerOptions::new(client).token(expired_refreshable("rt")));

    let token = manager.get_token().await.unwrap();
    assert_eq!(token.refresh_token.as_deref(), Some("rotated"));

    let sent = &transport.requests_to("/token")[0];
    assert_eq!(
        sent.header("authorization"),
        Some("Basic bXktY2xpZW50OnMzY3JldA==")
    );
    let body = sent.form_body();
    assert!(!body.iter().any(|(k, _)| k == "client_id" || k == "client_secret"));
}

// ---------------------------------------------------------------------------
// Strategies, storage and error callback
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_rejected_refresh_falls_through_to_client_credentials_source() {
    let (client, transport) = fake_client(settings().with_client_secret("s3cret"));
    // First call to /token (refresh grant) is rejected, the second
    // (client_credentials) succeeds.
    transport
        .respond(
            Method::POST,
            "/token",
            HttpResponse::json(StatusCode::BAD_REQUEST, &json!({"error": "invalid_grant"})),
        )
        .respond(Method::POST, "/token", token_body("fresh", Some(3600)));

    let storage = Arc::new(MemoryTokenStorage::default());
    let source_client = Arc::clone(&client);
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .token(expired_refreshable("revoked-rt"))
            .storage(storage.clone())
            .schedule_refresh(false)
            .token_source(move || {
                let client = Arc::clone(&source_client);
                async move {
                    let token = client
                        .client_credentials(ClientCredentialsParams::default())
                        .await?;
                    Ok::<_, anyhow::Error>(Some(token))
                }
            }),
    );

    assert_eq!(manager.get_access_token().await.unwrap(), "fresh");

    let grants: Vec<String> = transport
        .requests_to("/token")
        .iter()
        .filter_map(|r| {
            r.form_body()
                .into_iter()
                .find(|(k, _)| k == "grant_type")
                .map(|(_, v)| v)
        })
        .collect();
    assert_eq!(grants, vec!["refresh_token", "client_credentials"]);
    assert_eq!(
        storage.load().await.unwrap().unwrap().access_token,
        "fresh",
        "renewed token must be stored"
    );
}

#[tokio::test]
async fn test_exhausted_strategies_report_unrecoverable() {
    let (client, _transport) = fake_client(settings());
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .token_source(|| async { Ok::<_, anyhow::Error>(None) })
            .on_error(move |err| {
                if matches!(err, OAuth2Error::Unrecoverable) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }),
    );

    let err = assert_err!(manager.fetch(api_request()).await);
    assert!(matches!(err, OAuth2Error::Unrecoverable));
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Request middleware
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_second_401_is_returned_without_further_retries() {
    let (client, transport) = fake_client(settings());
    transport.respond(Method::POST, "/token", token_body("renewed", None));
    transport.respond(
        Method::GET,
        "/resource",
        HttpResponse::new(StatusCode::UNAUTHORIZED),
    );
    let manager = TokenManager::new(
        TokenManagerOptions::new(client).token(Token::new("old").with_refresh_token("rt")),
    );

    let mut request = api_request();
    request
        .set_header(reqwest::header::ACCEPT, "application/json")
        .unwrap();
    let response = manager.fetch(request).await.unwrap();
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    let api_calls = transport.requests_to("/resource");
    assert_eq!(api_calls.len(), 2, "exactly one retry");
    assert_eq!(api_calls[0].header("authorization"), Some("Bearer old"));
    assert_eq!(api_calls[1].header("authorization"), Some("Bearer renewed"));
    assert_eq!(
        api_calls[1].header("accept"),
        Some("application/json"),
        "retry starts from the original request"
    );
    assert_eq!(transport.requests_to("/token").len(), 1);
}

#[tokio::test]
async fn test_post_retry_resends_original_body() {
    let (client, transport) = fake_client(settings());
    transport.respond(Method::POST, "/token", token_body("renewed", None));
    transport
        .respond(
            Method::POST,
            "/resource",
            HttpResponse::new(StatusCode::UNAUTHORIZED),
        )
        .respond(Method::POST, "/resource", HttpResponse::new(StatusCode::OK));
    let manager = TokenManager::new(
        TokenManagerOptions::new(client).token(Token::new("old").with_refresh_token("rt")),
    );

    let mut request = HttpRequest::post(Url::parse("https://api.example.com/resource").unwrap())
        .with_body("a=1&b=2");
    request
        .set_header(
            reqwest::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        )
        .unwrap();
    let response = manager.fetch(request).await.unwrap();
    assert_eq!(response.status, StatusCode::OK);

    let api_calls = transport.requests_to("/resource");
    assert_eq!(api_calls.len(), 2);
    for call in &api_calls {
        assert_eq!(call.method, Method::POST);
        assert_eq!(&call.body[..], b"a=1&b=2");
        assert_eq!(
            call.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }
    assert_eq!(api_calls[0].header("authorization"), Some("Bearer old"));
    assert_eq!(api_calls[1].header("authorization"), Some("Bearer renewed"));
}

#[tokio::test]
async fn test_non_401_errors_are_not_retried() {
    let (client, transport) = fake_client(settings());
    transport.respond(
        Method::GET,
        "/resource",
        HttpResponse::new(StatusCode::FORBIDDEN),
    );
    let manager = TokenManager::new(TokenManagerOptions::new(client).token(Token::new("t")));

    let response = manager.fetch(api_request()).await.unwrap();
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(transport.requests_to("/resource").len(), 1);
    assert!(transport.requests_to("/token").is_empty());
}

// ---------------------------------------------------------------------------
// Background renewal
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_background_renewal_stores_token_before_expiry() {
    let (client, transport) = fake_client(settings());
    transport.respond(Method::POST, "/token", token_body("background", None));
    let storage = Arc::new(MemoryTokenStorage::default());
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .storage(storage.clone())
            .token(
                Token::new("initial")
                    .with_expires_at(Utc::now() + chrono::Duration::minutes(10))
                    .with_refresh_token("rt"),
            ),
    );

    tokio::time::sleep(Duration::from_secs(8 * 60)).await;
    assert!(transport.requests_to("/token").is_empty());

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(transport.requests_to("/token").len(), 1);
    assert_eq!(manager.token().unwrap().access_token, "background");
    assert_eq!(storage.load().await.unwrap().unwrap().access_token, "background");
}

#[tokio::test(start_paused = true)]
async fn test_background_failure_is_contained() {
    let (client, transport) = fake_client(settings());
    transport.respond(
        Method::POST,
        "/token",
        HttpResponse::json(StatusCode::BAD_REQUEST, &json!({"error": "invalid_grant"})),
    );
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reported);
    let manager = TokenManager::new(
        TokenManagerOptions::new(client)
            .on_error(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .token(
                Token::new("initial")
                    .with_expires_at(Utc::now() + chrono::Duration::minutes(5))
                    .with_refresh_token("rt"),
            ),
    );

    tokio::time::sleep(Duration::from_secs(5 * 60)).await;
    assert_eq!(transport.requests_to("/token").len(), 1);
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.token().unwrap().access_token,
        "initial",
        "a failed background renewal leaves the cached token alone"
    );
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_cancels_background_renewal() {
    let (client, transport) = fake_client(settings());
    let manager = TokenManager::new(
        TokenManagerOptions::new(client).token(
            Token::new("initial")
                .with_expires_at(Utc::now() + chrono::Duration::minutes(10))
                .with_refresh_token("rt"),
        ),
    );
    drop(manager);

    tokio::time::sleep(Duration::from_secs(15 * 60)).await;
    assert!(transport.requests().is_empty());
}
