//! OAuth2 protocol client
//!
//! [`OAuth2Client`] owns one OAuth2 client relationship: its settings, the
//! injected transport and the once-only discovery latch. It resolves
//! endpoint URLs, negotiates client authentication, sends grant requests
//! to the token endpoint and maps the responses to [`Token`]s or to
//! [`HttpError`]s.
//!
//! # Endpoint resolution
//!
//! For each endpoint the client tries, in order:
//!
//! 1. the explicit setting, resolved against `server`;
//! 2. the value found by discovery (the discovery endpoint itself skips
//!    this step);
//! 3. a conventional default path under `server`.
//!
//! # Example
//!
//! ```no_run
//! use oauth2_fetch::client::{ClientCredentialsParams, OAuth2Client};
//! use oauth2_fetch::config::ClientSettings;
//!
//! # async fn example() -> oauth2_fetch::error::Result<()> {
//! let client = OAuth2Client::with_default_transport(
//!     ClientSettings::new("my-client")
//!         .with_server("https://auth.example.com/")
//!         .with_client_secret("s3cret"),
//! );
//! let token = client
//!     .client_credentials(ClientCredentialsParams::default())
//!     .await?;
//! println!("expires at {:?}", token.expires_at);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use base64::Engine as _;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use tokio::sync::OnceCell;
use url::Url;

use crate::config::{AuthMethod, ClientSettings};
use crate::discovery::{
    fetch_server_metadata, ServerMetadata, OAUTH_DISCOVERY_PATH, OPENID_DISCOVERY_PATH,
};
use crate::error::{HttpError, OAuth2Error, Result};
use crate::grant::GrantRequest;
use crate::query::QueryParams;
use crate::token::{IntrospectionResponse, Token, TokenResponse, TokenTypeHint};
use crate::transport::{HttpRequest, HttpTransport, ReqwestTransport};

pub mod authorization_code;

pub use authorization_code::{
    AuthorizationCodeClient, AuthorizationResponse, AuthorizeParams, CodeExchangeParams,
    RedirectExchangeParams, ResponseMode,
};

/// Body fields the caller may not set through `extra_params` for the
/// client credentials grant.
pub const RESERVED_CLIENT_CREDENTIALS_PARAMS: [&str; 5] =
    ["client_id", "client_secret", "grant_type", "scope", "resource"];

// ---------------------------------------------------------------------------
// EndpointKind
// ---------------------------------------------------------------------------

/// The endpoints an OAuth2 client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Authorization endpoint (browser redirect target)
    Authorization,
    /// Token endpoint
    Token,
    /// Discovery document
    Discovery,
    /// Token introspection endpoint (RFC 7662)
    Introspection,
    /// Token revocation endpoint (RFC 7009)
    Revocation,
}

impl EndpointKind {
    /// Name of the corresponding setting.
    pub fn setting_name(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization_endpoint",
            Self::Token => "token_endpoint",
            Self::Discovery => "discovery_endpoint",
            Self::Introspection => "introspection_endpoint",
            Self::Revocation => "revocation_endpoint",
        }
    }

    fn configured(self, settings: &ClientSettings) -> Option<&str> {
        match self {
            Self::Authorization => settings.authorization_endpoint.as_deref(),
            Self::Token => settings.token_endpoint.as_deref(),
            Self::Discovery => settings.discovery_endpoint.as_deref(),
            Self::Introspection => settings.introspection_endpoint.as_deref(),
            Self::Revocation => settings.revocation_endpoint.as_deref(),
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.setting_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    OAuth2,
    OpenId,
}

// ---------------------------------------------------------------------------
// Grant parameters
// ---------------------------------------------------------------------------

/// Parameters for [`OAuth2Client::client_credentials`].
#[derive(Debug, Clone, Default)]
pub struct ClientCredentialsParams {
    /// Requested scopes
    pub scope: Option<Vec<String>>,
    /// RFC 8707 resource indicators
    pub resource: Vec<String>,
    /// Additional body parameters
    pub extra_params: Vec<(String, String)>,
}

/// Parameters for [`OAuth2Client::password`].
#[derive(Clone, Default)]
pub struct PasswordParams {
    /// Resource owner username
    pub username: String,
    /// Resource owner password
    pub password: String,
    /// Requested scopes
    pub scope: Option<Vec<String>>,
    /// RFC 8707 resource indicators
    pub resource: Vec<String>,
}

impl fmt::Debug for PasswordParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordParams")
            .field("username", &self.username)
            .field("scope", &self.scope)
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

/// Optional parameters for [`OAuth2Client::refresh_token`].
#[derive(Debug, Clone, Default)]
pub struct RefreshParams {
    /// Narrowed scopes
    pub scope: Option<Vec<String>>,
    /// RFC 8707 resource indicators
    pub resource: Vec<String>,
}

// ---------------------------------------------------------------------------
// OAuth2Client
// ---------------------------------------------------------------------------

/// Client for one OAuth2 authorization server relationship.
pub struct OAuth2Client {
    settings: RwLock<ClientSettings>,
    transport: Arc<dyn HttpTransport>,
    discovery: OnceCell<Option<ServerMetadata>>,
    flavor: Flavor,
}

impl fmt::Debug for OAuth2Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Client")
            .field("settings", &self.settings())
            .field("transport", &self.transport)
            .field("discovered", &self.discovery.initialized())
            .field("flavor", &self.flavor)
            .finish()
    }
}

impl OAuth2Client {
    /// Creates a client that sends requests through `transport`.
    pub fn new(settings: ClientSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings: RwLock::new(settings),
            transport,
            discovery: OnceCell::new(),
            flavor: Flavor::OAuth2,
        }
    }

    /// Creates a client backed by a default [`ReqwestTransport`].
    pub fn with_default_transport(settings: ClientSettings) -> Self {
        Self::new(settings, Arc::new(ReqwestTransport::default()))
    }

    /// Creates an OpenID Connect client.
    ///
    /// It discovers from `/.well-known/openid-configuration` by default and
    /// requires every token response to carry an `id_token`.
    pub fn openid(settings: ClientSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            flavor: Flavor::OpenId,
            ..Self::new(settings, transport)
        }
    }

    /// Snapshot of the current settings, including anything discovery
    /// filled in.
    pub fn settings(&self) -> ClientSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The transport this client sends requests through.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        Arc::clone(&self.transport)
    }

    /// The discovery document, once discovery has run and succeeded.
    pub fn server_metadata(&self) -> Option<ServerMetadata> {
        self.discovery.get().cloned().flatten()
    }

    /// Helper for the `authorization_code` grant.
    pub fn authorization_code(&self) -> AuthorizationCodeClient<'_> {
        AuthorizationCodeClient::new(self)
    }

    // -----------------------------------------------------------------------
    // Endpoint resolution and discovery
    // -----------------------------------------------------------------------

    /// Resolves the URL of an endpoint, running discovery first if the
    /// endpoint is not configured explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::EndpointUnresolvable`] when nothing is
    /// configured or discovered and no `server` is set to derive a default
    /// from, and [`OAuth2Error::Config`] when a configured URL is invalid.
    pub async fn endpoint(&self, kind: EndpointKind) -> Result<Url> {
        if let Some(url) = self.configured_endpoint(kind)? {
            return Ok(url);
        }

        if kind != EndpointKind::Discovery {
            self.discover().await;
            if let Some(url) = self.configured_endpoint(kind)? {
                return Ok(url);
            }
        }

        self.default_endpoint(kind)
    }

    /// Runs discovery if it has not run yet.
    ///
    /// Concurrent callers wait for the same single discovery request. Every
    /// failure is logged and swallowed.
    pub async fn discover(&self) {
        self.discovery
            .get_or_init(|| async { self.run_discovery().await })
            .await;
    }

    fn configured_endpoint(&self, kind: EndpointKind) -> Result<Option<Url>> {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        kind.configured(&settings)
            .map(|uri| resolve(uri, settings.server.as_deref()))
            .transpose()
    }

    fn default_endpoint(&self, kind: EndpointKind) -> Result<Url> {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        let Some(server) = settings.server.as_deref() else {
            return Err(OAuth2Error::EndpointUnresolvable {
                endpoint: kind.setting_name(),
            });
        };

        let path = match kind {
            EndpointKind::Authorization => "/authorize",
            EndpointKind::Token => "/token",
            EndpointKind::Introspection => "/introspect",
            EndpointKind::Revocation => "/revoke",
            EndpointKind::Discovery => match self.flavor {
                Flavor::OAuth2 => OAUTH_DISCOVERY_PATH,
                Flavor::OpenId => OPENID_DISCOVERY_PATH,
            },
        };
        resolve(path, Some(server))
    }

    async fn run_discovery(&self) -> Option<ServerMetadata> {
        let discovery_url = match self
            .configured_endpoint(EndpointKind::Discovery)
            .and_then(|url| match url {
                Some(url) => Ok(url),
                None => self.default_endpoint(EndpointKind::Discovery),
            }) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "OAuth2 discovery endpoint could not be determined. Either specify the \"server\" or \"discovery_endpoint\""
                );
                return None;
            }
        };

        tracing::debug!(url = %discovery_url, "Running OAuth2 discovery");
        let metadata = fetch_server_metadata(self.transport.as_ref(), &discovery_url).await?;

        let mut guard = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        let settings = &mut *guard;
        let discovered = [
            (
                &metadata.authorization_endpoint,
                &mut settings.authorization_endpoint,
            ),
            (&metadata.token_endpoint, &mut settings.token_endpoint),
            (
                &metadata.introspection_endpoint,
                &mut settings.introspection_endpoint,
            ),
            (
                &metadata.revocation_endpoint,
                &mut settings.revocation_endpoint,
            ),
        ];
        for (found, slot) in discovered {
            let Some(found) = found.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            if slot.is_some() {
                continue;
            }
            match discovery_url.join(found) {
                Ok(url) => *slot = Some(url.to_string()),
                Err(e) => tracing::warn!(value = %found, error = %e, "Ignoring invalid discovered endpoint"),
            }
        }

        if settings.authentication_method.is_none() {
            if let Some(method) = metadata.preferred_auth_method() {
                tracing::debug!(method = %method, "Adopting discovered authentication method");
                settings.authentication_method = Some(method.to_string());
            }
        }

        Some(metadata)
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    /// Sends a form-encoded `POST` to an endpoint with client
    /// authentication applied.
    ///
    /// Without a client secret the client id is always embedded in the
    /// body. With a secret, the configured method is used, defaulting to
    /// HTTP Basic.
    ///
    /// # Returns
    ///
    /// The parsed JSON body, or `None` for `204 No Content` and non-JSON
    /// responses.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::UnsupportedAuthMethod`] for an unknown
    /// configured method, [`OAuth2Error::Transport`] when no response was
    /// received, and [`OAuth2Error::Http`] for non-2xx responses.
    pub async fn request(
        &self,
        kind: EndpointKind,
        mut params: QueryParams,
    ) -> Result<Option<serde_json::Value>> {
        let url = self.endpoint(kind).await?;
        let settings = self.settings();
        let has_secret = settings.has_secret();

        let auth_method = if !has_secret {
            AuthMethod::ClientSecretPost
        } else {
            match settings.authentication_method.as_deref() {
                Some(method) => method.parse::<AuthMethod>()?,
                None => AuthMethod::ClientSecretBasic,
            }
        };
        tracing::debug!(endpoint = %kind, url = %url, method = %auth_method, "Sending OAuth2 request");

        let mut request = HttpRequest::post(url);
        request.set_header(CONTENT_TYPE, "application/x-www-form-urlencoded")?;
        request.set_header(ACCEPT, "application/json")?;

        match auth_method {
            AuthMethod::ClientSecretBasic => {
                let secret = settings.client_secret.as_deref().unwrap_or_default();
                request.set_header(
                    AUTHORIZATION,
                    &basic_credentials(&settings.client_id, secret),
                )?;
            }
            AuthMethod::ClientSecretPost => {
                params.set("client_id", settings.client_id.as_str());
                if has_secret {
                    params.set_opt("client_secret", settings.client_secret.clone());
                }
            }
        }

        let request = request.with_body(params.encode());
        let response = self
            .transport
            .send(request)
            .await
            .map_err(OAuth2Error::transport)?;

        let body = if response.status != StatusCode::NO_CONTENT && response.is_json() {
            match serde_json::from_slice::<serde_json::Value>(&response.body) {
                Ok(value) => Some(value),
                Err(e) if response.is_success() => return Err(e.into()),
                Err(_) => None,
            }
        } else {
            None
        };

        if response.is_success() {
            return Ok(body);
        }

        let oauth2_code = body
            .as_ref()
            .and_then(|b| b.get("error"))
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        let message = match &oauth2_code {
            Some(code) => {
                let mut message = format!("OAuth2 error {code}.");
                if let Some(description) = body
                    .as_ref()
                    .and_then(|b| b.get("error_description"))
                    .and_then(|d| d.as_str())
                {
                    message.push(' ');
                    message.push_str(description);
                }
                message
            }
            None => {
                let mut message = format!(
                    "HTTP Error {} {}",
                    response.status.as_u16(),
                    response.status.canonical_reason().unwrap_or_default()
                );
                if response.status == StatusCode::UNAUTHORIZED && has_secret {
                    message.push_str(". It's likely that the client_id and/or client_secret was incorrect");
                }
                message
            }
        };

        tracing::debug!(endpoint = %kind, status = response.status.as_u16(), "OAuth2 request failed");
        Err(HttpError {
            message,
            oauth2_code,
            status: response.status.as_u16(),
            response,
            body,
        }
        .into())
    }

    /// Sends a grant request to the token endpoint and maps the response.
    ///
    /// # Errors
    ///
    /// Everything [`OAuth2Client::request`] returns, plus
    /// [`OAuth2Error::MalformedTokenResponse`] when the response carries no
    /// access token (or, for OpenID clients, no ID token).
    pub async fn token_request(&self, grant: GrantRequest) -> Result<Token> {
        let body = self.request(EndpointKind::Token, grant.to_params()).await?;
        let token = TokenResponse::from_body(body)?.into_token()?;

        if self.flavor == Flavor::OpenId && token.id_token.is_none() {
            return Err(OAuth2Error::MalformedTokenResponse(
                "missing id_token".to_string(),
            ));
        }
        Ok(token)
    }

    // -----------------------------------------------------------------------
    // Grants
    // -----------------------------------------------------------------------

    /// Obtains a token with the `client_credentials` grant.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::ReservedParameter`] if an extra parameter
    /// collides with a reserved body field and
    /// [`OAuth2Error::MissingSecret`] if no client secret is configured.
    pub async fn client_credentials(&self, params: ClientCredentialsParams) -> Result<Token> {
        if let Some((key, _)) = params
            .extra_params
            .iter()
            .find(|(k, _)| RESERVED_CLIENT_CREDENTIALS_PARAMS.contains(&k.as_str()))
        {
            return Err(OAuth2Error::ReservedParameter(key.clone()));
        }

        if !self.settings().has_secret() {
            return Err(OAuth2Error::MissingSecret("client_credentials"));
        }

        self.token_request(GrantRequest::ClientCredentials {
            scope: params.scope,
            resource: params.resource,
            extra: params.extra_params,
        })
        .await
    }

    /// Obtains a token with the resource owner `password` grant.
    pub async fn password(&self, params: PasswordParams) -> Result<Token> {
        self.token_request(GrantRequest::Password {
            username: params.username,
            password: params.password,
            scope: params.scope,
            resource: params.resource,
        })
        .await
    }

    /// Exchanges a token's refresh credential for a new token.
    ///
    /// If the server does not issue a new refresh token, the existing one
    /// is carried over to the result.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::NotRefreshable`] if `token` has no refresh
    /// credential.
    pub async fn refresh_token(&self, token: &Token, params: RefreshParams) -> Result<Token> {
        let Some(refresh_token) = token.refresh_token.clone() else {
            return Err(OAuth2Error::NotRefreshable);
        };

        let mut new_token = self
            .token_request(GrantRequest::RefreshToken {
                refresh_token: refresh_token.clone(),
                scope: params.scope,
                resource: params.resource,
            })
            .await?;

        if new_token.refresh_token.is_none() {
            new_token.refresh_token = Some(refresh_token);
        }
        Ok(new_token)
    }

    /// Obtains a token with the JWT bearer grant (RFC 7523).
    pub async fn jwt_bearer(&self, assertion: &str, scope: Option<Vec<String>>) -> Result<Token> {
        self.token_request(GrantRequest::JwtBearer {
            assertion: assertion.to_string(),
            scope,
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Introspection and revocation
    // -----------------------------------------------------------------------

    /// Introspects a token's access credential (RFC 7662).
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::MalformedTokenResponse`] when the server
    /// answers without a JSON body.
    pub async fn introspect(&self, token: &Token) -> Result<IntrospectionResponse> {
        let mut params = QueryParams::new();
        params
            .set("token", token.access_token.as_str())
            .set("token_type_hint", TokenTypeHint::AccessToken.as_str());

        let body = self
            .request(EndpointKind::Introspection, params)
            .await?
            .ok_or_else(|| {
                OAuth2Error::MalformedTokenResponse("empty introspection response".to_string())
            })?;
        Ok(serde_json::from_value(body)?)
    }

    /// Revokes one of a token's credentials (RFC 7009).
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::NotRefreshable`] when asked to revoke a
    /// refresh credential the token does not have.
    pub async fn revoke(&self, token: &Token, hint: TokenTypeHint) -> Result<()> {
        let value = match hint {
            TokenTypeHint::AccessToken => token.access_token.clone(),
            TokenTypeHint::RefreshToken => token
                .refresh_token
                .clone()
                .ok_or(OAuth2Error::NotRefreshable)?,
        };

        let mut params = QueryParams::new();
        params
            .set("token", value)
            .set("token_type_hint", hint.as_str());
        self.request(EndpointKind::Revocation, params).await?;
        Ok(())
    }
}

/// Resolves `uri` against `base` the way a browser resolves a link.
fn resolve(uri: &str, base: Option<&str>) -> Result<Url> {
    let resolved = match base {
        Some(base) => Url::parse(base).and_then(|b| b.join(uri)),
        None => Url::parse(uri),
    };
    resolved.map_err(|e| OAuth2Error::Config(format!("Invalid endpoint URL {uri}: {e}")))
}

/// `Basic` credentials per RFC 6749 section 2.3.1: id and secret are each
/// form-urlencoded before being joined and base64-encoded.
fn basic_credentials(client_id: &str, client_secret: &str) -> String {
    let id: String = url::form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
    let secret: String = url::form_urlencoded::byte_serialize(client_secret.as_bytes()).collect();
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
    format!("Basic {encoded}")
}
