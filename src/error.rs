//! Error types for oauth2-fetch
//!
//! This module defines the error taxonomy shared by the protocol client,
//! the authorization-code helper and the token lifecycle manager, using
//! `thiserror` for ergonomic error handling.
//!
//! [`OAuth2Error`] is `Clone` so that the outcome of a single in-flight
//! token refresh can be handed to every caller waiting on it. Sources that
//! are not `Clone` themselves are held behind an [`Arc`].

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::transport::HttpResponse;

/// Main error type for oauth2-fetch operations
#[derive(Error, Debug, Clone)]
pub enum OAuth2Error {
    /// No explicit, discovered or default URL could be determined for an
    /// endpoint
    #[error("Could not determine the location of {endpoint}. Either specify {endpoint} in the settings, or the \"server\" endpoint to let the client discover it.")]
    EndpointUnresolvable {
        /// Settings name of the endpoint that could not be resolved
        endpoint: &'static str,
    },

    /// The configured (or discovered) client authentication method is not
    /// supported by this client
    #[error("Authentication method not supported: {0}")]
    UnsupportedAuthMethod(String),

    /// A grant that requires a client secret was attempted without one
    #[error("A client_secret must be provided to use {0}")]
    MissingSecret(&'static str),

    /// The token carries no refresh credential
    #[error("This token does not have a refresh_token; it cannot be refreshed")]
    NotRefreshable,

    /// The token endpoint answered without an access token
    #[error("Invalid token response from OAuth2 server: {0}")]
    MalformedTokenResponse(String),

    /// Every renewal strategy was exhausted
    #[error("Unable to obtain OAuth2 tokens, a full reauthentication may be needed")]
    Unrecoverable,

    /// Non-2xx response from an OAuth2 endpoint
    #[error("{0}")]
    Http(Box<HttpError>),

    /// No secure random source is reachable
    #[error("Secure random number generator unavailable: {0}")]
    CryptoUnavailable(String),

    /// The authorization server redirected back with an `error` parameter
    #[error("OAuth2 error {code}: {description}")]
    AuthorizationDenied {
        /// OAuth2 error code, e.g. `access_denied`
        code: String,
        /// Value of `error_description`, or a generic message
        description: String,
    },

    /// The redirect-back URL was malformed, lacked a code, or carried the
    /// wrong state
    #[error("Invalid authorization redirect: {0}")]
    InvalidRedirect(String),

    /// A caller-supplied extra parameter would overwrite a standard one
    #[error("The following parameter is reserved and cannot be passed as an extra parameter: {0}")]
    ReservedParameter(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The HTTP transport failed before a response was received
    #[error("Transport error: {0}")]
    Transport(Arc<anyhow::Error>),

    /// A caller-supplied callback (token source, storage) failed
    #[error("Callback error: {0}")]
    Callback(Arc<anyhow::Error>),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),
}

impl OAuth2Error {
    /// Wraps a transport failure.
    pub fn transport(err: impl Into<anyhow::Error>) -> Self {
        Self::Transport(Arc::new(err.into()))
    }

    /// Wraps a failure reported by a caller-supplied callback.
    pub fn callback(err: impl Into<anyhow::Error>) -> Self {
        Self::Callback(Arc::new(err.into()))
    }

    /// Returns the HTTP error details when this is an [`OAuth2Error::Http`].
    pub fn as_http(&self) -> Option<&HttpError> {
        match self {
            Self::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for OAuth2Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(Arc::new(err))
    }
}

impl From<HttpError> for OAuth2Error {
    fn from(err: HttpError) -> Self {
        Self::Http(Box::new(err))
    }
}

/// Details of a non-2xx response from an OAuth2 endpoint.
///
/// When the body parsed as `{ "error": ..., "error_description": ... }`,
/// `oauth2_code` carries the OAuth2 error code; otherwise it is `None` and
/// the message describes the HTTP status instead.
#[derive(Debug, Clone)]
pub struct HttpError {
    /// Human-readable description
    pub message: String,
    /// OAuth2 error code such as `invalid_grant`, if the server sent one
    pub oauth2_code: Option<String>,
    /// HTTP status code
    pub status: u16,
    /// The raw response
    pub response: HttpResponse,
    /// The parsed JSON body, if the response carried one
    pub body: Option<serde_json::Value>,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

/// Result type alias for oauth2-fetch operations
pub type Result<T> = std::result::Result<T, OAuth2Error>;
