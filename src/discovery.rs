//! Authorization server metadata discovery (RFC 8414 / OIDC Discovery)
//!
//! [`fetch_server_metadata`] retrieves the discovery document through the
//! injected [`HttpTransport`]. Discovery is best-effort: every failure is
//! logged at `warn` level and reported as `None`, letting endpoint
//! resolution fall back to explicit settings or default paths.

use std::collections::HashMap;

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::pkce::S256;
use crate::transport::{HttpRequest, HttpTransport};

/// Default discovery path for plain OAuth2 servers.
pub const OAUTH_DISCOVERY_PATH: &str = "/.well-known/oauth-authorization-server";

/// Default discovery path for OpenID Connect providers.
pub const OPENID_DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

// ---------------------------------------------------------------------------
// ServerMetadata
// ---------------------------------------------------------------------------

/// Metadata document describing an OAuth2 / OIDC authorization server.
///
/// Only the fields this crate acts on are modelled explicitly; everything
/// else is kept in [`ServerMetadata::extra`]. All fields are optional so a
/// sparse document from a non-conforming server still parses.
///
/// # References
///
/// - RFC 8414 <https://www.rfc-editor.org/rfc/rfc8414>
/// - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>
///
/// # Examples
///
/// ```
/// use oauth2_fetch::discovery::ServerMetadata;
///
/// let json = r#"{
///     "issuer": "https://auth.example.com",
///     "authorization_endpoint": "https://auth.example.com/authorize",
///     "token_endpoint": "https://auth.example.com/token",
///     "response_types_supported": ["code"]
/// }"#;
///
/// let meta: ServerMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.issuer.as_deref(), Some("https://auth.example.com"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerMetadata {
    /// The issuer identifier URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// URL of the authorization endpoint (RFC 6749 section 3.1).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// URL of the token endpoint (RFC 6749 section 3.2).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// URL of the introspection endpoint (RFC 7662).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    /// URL of the revocation endpoint (RFC 7009).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    /// URL of the JWK Set document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// URL of the Dynamic Client Registration endpoint (RFC 7591).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// OAuth scopes the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// `response_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// `response_mode` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_modes_supported: Option<Vec<String>>,

    /// `grant_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// Client authentication methods accepted at the token endpoint, in the
    /// server's order of preference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_methods_supported: Option<Vec<String>>,

    /// PKCE challenge methods the server supports (e.g. `["S256"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Additional server metadata fields not modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ServerMetadata {
    /// Returns `true` when the server advertises the PKCE `S256` method.
    ///
    /// The comparison is case-sensitive.
    pub fn supports_s256(&self) -> bool {
        self.code_challenge_methods_supported
            .as_deref()
            .unwrap_or(&[])
            .iter()
            .any(|m| m == S256)
    }

    /// The server's preferred token-endpoint authentication method.
    pub fn preferred_auth_method(&self) -> Option<&str> {
        self.token_endpoint_auth_methods_supported
            .as_deref()
            .and_then(|methods| methods.first())
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetches the discovery document at `url`.
///
/// Sends a `GET` with `Accept: application/json`. Returns `None` when the
/// request fails, the status is not 2xx, the response is not
/// `application/json`, or the body does not parse.
///
/// # Examples
///
/// ```no_run
/// use oauth2_fetch::discovery::fetch_server_metadata;
/// use oauth2_fetch::transport::ReqwestTransport;
/// use url::Url;
///
/// # async fn example() {
/// let transport = ReqwestTransport::default();
/// let url = Url::parse("https://auth.example.com/.well-known/oauth-authorization-server").unwrap();
/// if let Some(meta) = fetch_server_metadata(&transport, &url).await {
///     println!("token endpoint: {:?}", meta.token_endpoint);
/// }
/// # }
/// ```
pub async fn fetch_server_metadata(
    transport: &dyn HttpTransport,
    url: &Url,
) -> Option<ServerMetadata> {
    let mut request = HttpRequest::get(url.clone());
    request
        .headers
        .insert(ACCEPT, reqwest::header::HeaderValue::from_static("application/json"));

    let response = match transport.send(request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "OAuth2 discovery request failed");
            return None;
        }
    };

    if !response.is_success() {
        tracing::debug!(
            url = %url,
            status = response.status.as_u16(),
            "OAuth2 discovery endpoint returned a non-success status"
        );
        return None;
    }

    let is_json = response
        .content_type()
        .is_some_and(|ct| ct.starts_with("application/json"));
    if !is_json {
        tracing::warn!(
            url = %url,
            "OAuth2 discovery endpoint was not a JSON response. Response is ignored"
        );
        return None;
    }

    match serde_json::from_slice::<ServerMetadata>(&response.body) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "OAuth2 discovery document did not parse");
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
