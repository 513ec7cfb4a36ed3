//! HTTP transport abstraction and implementations
//!
//! This module defines the [`HttpTransport`] trait through which every
//! network call of the crate is made: token-endpoint POSTs, discovery GETs,
//! and the application requests the token manager decorates with a bearer
//! credential. Concrete implementations live in submodules:
//!
//! - [`http::ReqwestTransport`] -- production transport backed by
//!   `reqwest`.
//! - [`fake::FakeTransport`] -- in-process fake that records requests and
//!   replays scripted responses, used in tests.
//!
//! # Design
//!
//! Requests and responses are plain owned values ([`HttpRequest`] and
//! [`HttpResponse`]) so they can be cloned freely. The request middleware
//! relies on this: a 401 retry is sent from a fresh clone of the caller's
//! original, unmodified request.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::{OAuth2Error, Result};

pub mod fake;
pub mod http;

pub use http::ReqwestTransport;

/// An outbound HTTP request.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::transport::HttpRequest;
/// use url::Url;
///
/// let mut request = HttpRequest::get(Url::parse("https://api.example.com/me").unwrap());
/// request.set_bearer("abc123").unwrap();
/// assert_eq!(request.header("authorization"), Some("Bearer abc123"));
/// ```
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Request body; empty for body-less requests.
    pub body: Bytes,
}

impl HttpRequest {
    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Creates a `POST` request.
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Inserts (or replaces) a header.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::Transport`] if `value` contains characters
    /// that are not allowed in an HTTP header value.
    pub fn set_header(&mut self, name: HeaderName, value: &str) -> Result<()> {
        let value = HeaderValue::from_str(value).map_err(|e| {
            OAuth2Error::transport(anyhow::anyhow!("invalid value for header {name}: {e}"))
        })?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Inserts `Authorization: Bearer <access_token>`, replacing any
    /// existing `Authorization` header.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::Transport`] if the token is not a valid header
    /// value.
    pub fn set_bearer(&mut self, access_token: &str) -> Result<()> {
        self.set_header(AUTHORIZATION, &format!("Bearer {access_token}"))
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Decodes an `application/x-www-form-urlencoded` body into ordered
    /// key/value pairs.
    pub fn form_body(&self) -> Vec<(String, String)> {
        url::form_urlencoded::parse(&self.body)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }
}

/// An HTTP response as seen by the protocol client and the middleware.
#[derive(Clone)]
pub struct HttpResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Fully buffered response body.
    pub body: Bytes,
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl HttpResponse {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Creates an `application/json` response.
    ///
    /// # Examples
    ///
    /// ```
    /// use oauth2_fetch::transport::HttpResponse;
    /// use reqwest::StatusCode;
    ///
    /// let response = HttpResponse::json(StatusCode::OK, &serde_json::json!({"a": 1}));
    /// assert!(response.is_json());
    /// ```
    pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
        let mut response = Self::new(status);
        response.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response.body = Bytes::from(body.to_string());
        response
    }

    /// Creates a response with a plain-text body.
    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        let mut response = Self::new(status);
        response
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        response.body = Bytes::from(body.into());
        response
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns the `Content-Type` header, if present.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Returns `true` when the content type is `application/json` or an
    /// `application/*+json` variant such as `application/problem+json`.
    pub fn is_json(&self) -> bool {
        let Some(content_type) = self.content_type() else {
            return false;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.strip_prefix("application/") {
            Some(subtype) => subtype == "json" || subtype.ends_with("+json"),
            None => false,
        }
    }
}

/// Abstraction over the HTTP request/response primitive.
///
/// Every network call made by the crate goes through an implementation of
/// this trait, which makes the whole protocol engine testable without a
/// network and lets callers add their own middleware (proxies, custom
/// headers, retries) underneath it.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use oauth2_fetch::transport::{HttpTransport, ReqwestTransport};
///
/// let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::default());
/// ```
#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync + fmt::Debug {
    /// Sends a request and buffers the complete response.
    ///
    /// Non-2xx statuses are *not* errors at this layer; an error means no
    /// response was obtained at all.
    async fn send(&self, request: HttpRequest) -> anyhow::Result<HttpResponse>;
}
