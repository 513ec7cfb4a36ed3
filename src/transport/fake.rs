//! In-process fake transport for unit and integration tests
//!
//! [`FakeTransport`] answers requests from a table of scripted responses
//! keyed by method and URL path, and records every request it receives so
//! tests can assert on exact headers and form bodies.
//!
//! # Scripting
//!
//! Responses registered for the same route are served in order. The last
//! one is sticky: once the queue is down to a single response it is
//! returned for every further request. Requests to unscripted routes get an
//! empty `404 Not Found`.
//!
//! # Example
//!
//! ```
//! use oauth2_fetch::transport::fake::FakeTransport;
//! use oauth2_fetch::transport::{HttpRequest, HttpResponse, HttpTransport};
//! use reqwest::{Method, StatusCode};
//! use url::Url;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let transport = FakeTransport::new();
//! transport.respond(
//!     Method::POST,
//!     "/token",
//!     HttpResponse::json(StatusCode::OK, &serde_json::json!({"access_token": "a"})),
//! );
//!
//! let url = Url::parse("https://auth.example.com/token").unwrap();
//! let response = transport.send(HttpRequest::post(url)).await.unwrap();
//! assert!(response.is_success());
//! assert_eq!(transport.requests_to("/token").len(), 1);
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::{Method, StatusCode};

use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

type Route = (Method, String);

/// Scripted, recording [`HttpTransport`] for tests.
#[derive(Debug, Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<Route, VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
    failures: Mutex<HashMap<Route, String>>,
    latency: Option<Duration>,
}

impl FakeTransport {
    /// Creates a fake with no scripted routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fake that sleeps for `latency` before answering each
    /// request, so concurrent callers genuinely overlap.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Queues a response for `method` + `path`.
    pub fn respond(&self, method: Method, path: &str, response: HttpResponse) -> &Self {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
        self
    }

    /// Makes `method` + `path` fail at the transport level, as if the
    /// connection had been refused.
    pub fn fail(&self, method: Method, path: &str, message: &str) -> &Self {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((method, path.to_string()), message.to_string());
        self
    }

    /// Returns every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the requests whose URL path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.path() == path)
            .collect()
    }

    fn next_response(&self, route: &Route) -> HttpResponse {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        match routes.get_mut(route) {
            Some(queue) if queue.len() > 1 => queue
                .pop_front()
                .unwrap_or_else(|| HttpResponse::new(StatusCode::NOT_FOUND)),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| HttpResponse::new(StatusCode::NOT_FOUND)),
            None => HttpResponse::new(StatusCode::NOT_FOUND),
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for FakeTransport {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let route = (request.method.clone(), request.url.path().to_string());
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&route)
            .cloned();
        if let Some(message) = failure {
            anyhow::bail!(message);
        }

        Ok(self.next_response(&route))
    }
}
