//! Authorization code grant helper
//!
//! Builds the authorization-endpoint redirect URL (with PKCE), validates
//! the redirect back to the application, and exchanges the code for a
//! token through the owning [`OAuth2Client`].
//!
//! # Example
//!
//! ```no_run
//! use oauth2_fetch::client::{AuthorizeParams, OAuth2Client, RedirectExchangeParams};
//! use oauth2_fetch::config::ClientSettings;
//! use oauth2_fetch::pkce::generate_verifier;
//!
//! # async fn example() -> oauth2_fetch::error::Result<()> {
//! let client = OAuth2Client::with_default_transport(
//!     ClientSettings::new("my-app").with_server("https://auth.example.com/"),
//! );
//! let verifier = generate_verifier()?;
//!
//! let url = client
//!     .authorization_code()
//!     .get_authorize_uri(AuthorizeParams {
//!         redirect_uri: "https://app.example.com/callback".to_string(),
//!         state: Some("some-state".to_string()),
//!         code_verifier: Some(verifier.clone()),
//!         scope: Some(vec!["openid".to_string()]),
//!         ..AuthorizeParams::default()
//!     })
//!     .await?;
//! println!("send the user to {url}");
//!
//! // ... later, when the browser comes back:
//! let token = client
//!     .authorization_code()
//!     .get_token_from_code_redirect(
//!         "https://app.example.com/callback?code=abc&state=some-state",
//!         RedirectExchangeParams {
//!             redirect_uri: "https://app.example.com/callback".to_string(),
//!             state: Some("some-state".to_string()),
//!             code_verifier: Some(verifier),
//!             resource: vec![],
//!         },
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{EndpointKind, OAuth2Client};
use crate::error::{OAuth2Error, Result};
use crate::grant::GrantRequest;
use crate::pkce::code_challenge;
use crate::query::QueryParams;
use crate::token::Token;

/// How the authorization server should return the response parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// In the redirect URL's query string (the protocol default).
    #[default]
    Query,
    /// In the redirect URL's fragment.
    Fragment,
}

/// Parameters for [`AuthorizationCodeClient::get_authorize_uri`].
#[derive(Debug, Clone, Default)]
pub struct AuthorizeParams {
    /// Where the server sends the user back to.
    pub redirect_uri: String,
    /// Opaque value echoed back in the redirect.
    pub state: Option<String>,
    /// PKCE verifier; its S256 challenge is added to the URL.
    pub code_verifier: Option<String>,
    /// Requested scopes.
    pub scope: Option<Vec<String>>,
    /// RFC 8707 resource indicators.
    pub resource: Vec<String>,
    /// Additional query parameters. They may not replace standard ones.
    pub extra_params: Vec<(String, String)>,
    /// Response mode; `response_mode` is only sent for non-default modes.
    pub response_mode: ResponseMode,
}

/// Parameters for [`AuthorizationCodeClient::get_token`].
#[derive(Debug, Clone, Default)]
pub struct CodeExchangeParams {
    /// The authorization code.
    pub code: String,
    /// Must equal the `redirect_uri` of the authorization request.
    pub redirect_uri: String,
    /// PKCE verifier used in the authorization request.
    pub code_verifier: Option<String>,
    /// RFC 8707 resource indicators.
    pub resource: Vec<String>,
}

/// Parameters for [`AuthorizationCodeClient::get_token_from_code_redirect`].
#[derive(Debug, Clone, Default)]
pub struct RedirectExchangeParams {
    /// Must equal the `redirect_uri` of the authorization request.
    pub redirect_uri: String,
    /// Expected `state`; checked when set.
    pub state: Option<String>,
    /// PKCE verifier used in the authorization request.
    pub code_verifier: Option<String>,
    /// RFC 8707 resource indicators.
    pub resource: Vec<String>,
}

/// What a successful redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    /// The authorization code.
    pub code: String,
    /// Granted scopes, if the server echoed them.
    pub scope: Option<Vec<String>>,
}

/// Helper for the `authorization_code` grant.
///
/// Obtained from [`OAuth2Client::authorization_code`].
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationCodeClient<'a> {
    client: &'a OAuth2Client,
}

impl<'a> AuthorizationCodeClient<'a> {
    pub(crate) fn new(client: &'a OAuth2Client) -> Self {
        Self { client }
    }

    /// Builds the URL to send the user to.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::ReservedParameter`] if an extra parameter
    /// would overwrite a standard one, or any error of endpoint resolution.
    pub async fn get_authorize_uri(&self, params: AuthorizeParams) -> Result<Url> {
        let mut url = self.client.endpoint(EndpointKind::Authorization).await?;
        let client_id = self.client.settings().client_id;

        let mut query = QueryParams::new();
        query
            .set("client_id", client_id)
            .set("response_type", "code")
            .set("redirect_uri", params.redirect_uri);

        if let Some(verifier) = params.code_verifier.as_deref() {
            let (method, challenge) = code_challenge(verifier);
            query
                .set("code_challenge_method", method)
                .set("code_challenge", challenge);
        }

        query
            .set_opt("state", params.state.filter(|s| !s.is_empty()))
            .set_opt("scope", params.scope.map(|s| s.join(" ")));

        if !params.resource.is_empty() {
            query.set("resource", params.resource);
        }

        if params.response_mode == ResponseMode::Fragment {
            query.set("response_mode", "fragment");
        }

        for (key, value) in params.extra_params {
            if query.contains_key(&key) {
                return Err(OAuth2Error::ReservedParameter(key));
            }
            query.set(&key, value);
        }

        url.query_pairs_mut().extend_pairs(query.pairs());
        Ok(url)
    }

    /// Validates the URL the user was redirected back to.
    ///
    /// Parameters are read from the query string, or from the fragment when
    /// the query has neither `code` nor `error`.
    ///
    /// # Errors
    ///
    /// - [`OAuth2Error::AuthorizationDenied`] if the redirect carries an
    ///   `error` parameter.
    /// - [`OAuth2Error::InvalidRedirect`] if the URL does not parse, has no
    ///   `code`, or `expected_state` is set and does not match.
    pub fn validate_response(
        &self,
        url: &str,
        expected_state: Option<&str>,
    ) -> Result<AuthorizationResponse> {
        validate_response(url, expected_state)
    }

    /// Exchanges an authorization code for a token.
    pub async fn get_token(&self, params: CodeExchangeParams) -> Result<Token> {
        self.client
            .token_request(GrantRequest::AuthorizationCode {
                code: params.code,
                redirect_uri: params.redirect_uri,
                code_verifier: params.code_verifier,
                resource: params.resource,
            })
            .await
    }

    /// Validates a redirect and exchanges its code for a token.
    ///
    /// # Errors
    ///
    /// See [`AuthorizationCodeClient::validate_response`] and
    /// [`OAuth2Client::token_request`].
    pub async fn get_token_from_code_redirect(
        &self,
        url: &str,
        params: RedirectExchangeParams,
    ) -> Result<Token> {
        let response = validate_response(url, params.state.as_deref())?;
        self.get_token(CodeExchangeParams {
            code: response.code,
            redirect_uri: params.redirect_uri,
            code_verifier: params.code_verifier,
            resource: params.resource,
        })
        .await
    }
}

fn validate_response(url: &str, expected_state: Option<&str>) -> Result<AuthorizationResponse> {
    let parsed = Url::parse(url)
        .map_err(|e| OAuth2Error::InvalidRedirect(format!("could not parse {url}: {e}")))?;

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let has = |params: &[(String, String)], key: &str| params.iter().any(|(k, _)| k == key);
    if !has(&params, "code") && !has(&params, "error") {
        if let Some(fragment) = parsed.fragment().filter(|f| !f.is_empty()) {
            params = url::form_urlencoded::parse(fragment.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
        }
    }

    let get = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };

    if let Some(error) = get("error") {
        return Err(OAuth2Error::AuthorizationDenied {
            code: error.to_string(),
            description: get("error_description")
                .unwrap_or("OAuth2 error")
                .to_string(),
        });
    }

    let Some(code) = get("code") else {
        return Err(OAuth2Error::InvalidRedirect(format!(
            "The url did not contain a code parameter {url}"
        )));
    };

    if let Some(expected) = expected_state.filter(|s| !s.is_empty()) {
        if get("state") != Some(expected) {
            return Err(OAuth2Error::InvalidRedirect(format!(
                "The \"state\" parameter in the url did not match the expected value of {expected}"
            )));
        }
    }

    Ok(AuthorizationResponse {
        code: code.to_string(),
        scope: get("scope").map(|s| s.split(' ').map(str::to_string).collect()),
    })
}
