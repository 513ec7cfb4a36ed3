//! `reqwest`-backed [`HttpTransport`]

use std::sync::Arc;
use std::time::Duration;

use crate::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Production transport that sends requests with a shared
/// [`reqwest::Client`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use oauth2_fetch::transport::ReqwestTransport;
///
/// let transport = ReqwestTransport::with_timeout(Duration::from_secs(10)).unwrap();
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    http_client: Arc<reqwest::Client>,
}

impl ReqwestTransport {
    /// Wraps an existing client, e.g. one configured with a proxy.
    pub fn new(http_client: Arc<reqwest::Client>) -> Self {
        Self { http_client }
    }

    /// Builds a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn with_timeout(timeout: Duration) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(Arc::new(http_client)))
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut builder = self.http_client.request(method, url).headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
