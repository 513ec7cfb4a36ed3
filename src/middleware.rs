//! tower middleware attaching bearer credentials
//!
//! [`BearerAuthLayer`] wraps any `tower::Service<HttpRequest, Response =
//! HttpResponse>` so every request goes through
//! [`TokenManager::fetch_mw`]: a valid access token is attached and a `401`
//! triggers one renewal and one retry.
//!
//! # Example
//!
//! ```no_run
//! use oauth2_fetch::manager::TokenManager;
//! use oauth2_fetch::middleware::BearerAuthLayer;
//! use oauth2_fetch::transport::{HttpRequest, HttpResponse};
//! use tower::{service_fn, Layer, ServiceExt};
//!
//! # async fn example(manager: TokenManager, request: HttpRequest) -> oauth2_fetch::error::Result<()> {
//! let inner = service_fn(|_req: HttpRequest| async {
//!     Ok::<_, anyhow::Error>(HttpResponse::new(reqwest::StatusCode::OK))
//! });
//! let response = BearerAuthLayer::new(manager).layer(inner).oneshot(request).await?;
//! # Ok(())
//! # }
//! ```

use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tower::{Layer, Service, ServiceExt};

use crate::error::{OAuth2Error, Result};
use crate::manager::TokenManager;
use crate::transport::{HttpRequest, HttpResponse};

/// Layer producing [`BearerAuth`] services.
#[derive(Debug, Clone)]
pub struct BearerAuthLayer {
    manager: TokenManager,
}

impl BearerAuthLayer {
    /// Creates a layer that authenticates with `manager`.
    pub fn new(manager: TokenManager) -> Self {
        Self { manager }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            inner,
            manager: self.manager.clone(),
        }
    }
}

/// Service attaching `Authorization: Bearer` and retrying once on `401`.
///
/// Each attempt is sent through its own clone of the inner service, so the
/// inner service must be `Clone`. Readiness is checked per attempt.
#[derive(Debug, Clone)]
pub struct BearerAuth<S> {
    inner: S,
    manager: TokenManager,
}

impl<S> BearerAuth<S> {
    /// The wrapped service.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }
}

impl<S> Service<HttpRequest> for BearerAuth<S>
where
    S: Service<HttpRequest, Response = HttpResponse> + Clone + Send + 'static,
    S::Error: Into<anyhow::Error>,
    S::Future: Send,
{
    type Response = HttpResponse;
    type Error = OAuth2Error;
    type Future = BoxFuture<'static, Result<HttpResponse>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: HttpRequest) -> Self::Future {
        let inner = self.inner.clone();
        let manager = self.manager.clone();
        Box::pin(async move {
            manager
                .fetch_mw(request, move |req| {
                    let svc = inner.clone();
                    async move { svc.oneshot(req).await.map_err(Into::<anyhow::Error>::into) }
                })
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OAuth2Client;
    use crate::config::ClientSettings;
    use crate::manager::TokenManagerOptions;
    use crate::token::Token;
    use crate::transport::fake::FakeTransport;
    use reqwest::{Method, StatusCode};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tower::service_fn;
    use url::Url;

    fn manager(transport: Arc<FakeTransport>, token: Token) -> TokenManager {
        let client = Arc::new(OAuth2Client::new(
            ClientSettings::new("my-client")
                .with_server("https://auth.example.com/")
                .with_token_endpoint("/token"),
            transport,
        ));
        TokenManager::new(TokenManagerOptions::new(client).token(token))
    }

    fn request() -> HttpRequest {
        HttpRequest::get(Url::parse("https://api.example.com/items").unwrap())
    }

    #[tokio::test]
    async fn test_layer_attaches_bearer() {
        let transport = Arc::new(FakeTransport::new());
        let svc = BearerAuthLayer::new(manager(transport, Token::new("abc"))).layer(service_fn(
            |req: HttpRequest| async move {
                let status = if req.header("authorization") == Some("Bearer abc") {
                    StatusCode::OK
                } else {
                    StatusCode::FORBIDDEN
                };
                Ok::<_, anyhow::Error>(HttpResponse::new(status))
            },
        ));

        let response = svc.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_layer_retries_once_on_401() {
        let transport = Arc::new(FakeTransport::new());
        transport.respond(
            Method::POST,
            "/token",
            HttpResponse::json(StatusCode::OK, &json!({"access_token": "renewed"})),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let svc = BearerAuthLayer::new(manager(
            transport.clone(),
            Token::new("stale").with_refresh_token("rt"),
        ))
        .layer(service_fn(move |req: HttpRequest| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let status = match req.header("authorization") {
                    Some("Bearer renewed") => StatusCode::OK,
                    _ => StatusCode::UNAUTHORIZED,
                };
                Ok::<_, anyhow::Error>(HttpResponse::new(status))
            }
        }));

        let response = svc.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(transport.requests_to("/token").len(), 1);
    }

    #[tokio::test]
    async fn test_inner_error_becomes_transport_error() {
        let transport = Arc::new(FakeTransport::new());
        let svc = BearerAuthLayer::new(manager(transport, Token::new("abc"))).layer(service_fn(
            |_req: HttpRequest| async { Err::<HttpResponse, _>(anyhow::anyhow!("connection reset")) },
        ));

        let err = svc.oneshot(request()).await.unwrap_err();
        assert!(matches!(err, OAuth2Error::Transport(_)));
    }
}
