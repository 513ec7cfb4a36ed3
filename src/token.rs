//! Token data model and token-endpoint response mapping
//!
//! [`Token`] is the normalized, immutable snapshot the rest of the crate
//! passes around. It is produced from a raw [`TokenResponse`] by
//! [`TokenResponse::into_token`], which computes the absolute expiry from
//! the server-reported lifetime.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OAuth2Error, Result};

// ---------------------------------------------------------------------------
// Token
// ---------------------------------------------------------------------------

/// A bearer credential and everything the server told us about it.
///
/// Tokens are never mutated in place; a refresh produces a whole new value.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::token::Token;
///
/// let token = Token::new("my_access_token");
/// // A token with no expiry is never considered expired.
/// assert!(!token.is_expired());
/// assert!(!token.is_refreshable());
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The access token string issued by the authorization server.
    pub access_token: String,

    /// OpenID Connect ID token, when the server issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// UTC instant at which the access token expires.
    ///
    /// `None` means the server did not report a lifetime and the token is
    /// treated as non-expiring.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Refresh credential; `None` means the token cannot be refreshed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Scopes granted by the server, if it reported them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Vec<String>>,

    /// Any further fields from the token response (e.g. `token_type`).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("scope", &self.scope)
            .finish()
    }
}

impl Token {
    /// Creates a non-expiring, non-refreshable token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: None,
            expires_at: None,
            refresh_token: None,
            scope: None,
            extra: HashMap::new(),
        }
    }

    /// Sets the expiry instant.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the refresh credential.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Returns `true` once the expiry instant has been reached.
    ///
    /// Tokens without an expiry never expire. No early-expiry buffer is
    /// applied; proactive background renewal covers the gap.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Same as [`Token::is_expired`], evaluated at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Returns `true` if the token carries a refresh credential.
    pub fn is_refreshable(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Time left until expiry, or `None` for non-expiring tokens.
    ///
    /// Negative once expired.
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_at.map(|at| at - Utc::now())
    }
}

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// Raw token-endpoint success body (RFC 6749 section 5.1).
///
/// Every field is optional at this level so that a missing `access_token`
/// surfaces as [`OAuth2Error::MalformedTokenResponse`] rather than a JSON
/// error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The issued access token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Usually `"Bearer"`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds. Integers, floats and numeric strings are
    /// accepted; anything else is treated as unknown.
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    /// Refresh credential.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Space-separated granted scopes. A JSON array of scopes is joined.
    #[serde(default, deserialize_with = "lenient_scope")]
    pub scope: Option<String>,
    /// OpenID Connect ID token.
    #[serde(default)]
    pub id_token: Option<String>,
    /// Server-defined extras.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn lenient_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let seconds = match &value {
        None | Some(serde_json::Value::Null) => return Ok(None),
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        Some(serde_json::Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f as i64)
            })
        }
        Some(_) => None,
    };

    if seconds.is_none() {
        tracing::warn!(expires_in = ?value, "Ignoring unparseable expires_in in token response");
    }
    Ok(seconds)
}

fn lenient_scope<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(serde_json::Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Some(other) => {
            tracing::warn!(scope = %other, "Ignoring unparseable scope in token response");
            None
        }
    })
}

impl TokenResponse {
    /// Parses a token-endpoint body. An absent body is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::MalformedTokenResponse`] when the body is not
    /// a JSON object of the expected shape.
    pub fn from_body(body: Option<serde_json::Value>) -> Result<Self> {
        match body {
            None => Ok(Self::default()),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| OAuth2Error::MalformedTokenResponse(e.to_string())),
        }
    }

    /// Normalizes into a [`Token`], computing expiry against `now`.
    ///
    /// A non-positive `expires_in` is treated as absent so that a non-null
    /// expiry always lies in the future at creation time. A lifetime too
    /// large to represent as a date is treated as absent too.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::MalformedTokenResponse`] when `access_token` is
    /// missing or empty.
    pub fn into_token_at(self, now: DateTime<Utc>) -> Result<Token> {
        let access_token = match self.access_token {
            Some(token) if !token.is_empty() => token,
            _ => {
                tracing::warn!("Token response did not contain an access_token");
                return Err(OAuth2Error::MalformedTokenResponse(
                    "missing access_token".to_string(),
                ));
            }
        };

        let expires_at = self
            .expires_in
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime));

        let scope = self
            .scope
            .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>());

        let mut extra = self.extra;
        if let Some(token_type) = self.token_type {
            extra.insert(
                "token_type".to_string(),
                serde_json::Value::String(token_type),
            );
        }

        Ok(Token {
            access_token,
            id_token: self.id_token,
            expires_at,
            refresh_token: self.refresh_token.filter(|t| !t.is_empty()),
            scope,
            extra,
        })
    }

    /// Normalizes into a [`Token`] using the current time.
    ///
    /// # Errors
    ///
    /// See [`TokenResponse::into_token_at`].
    pub fn into_token(self) -> Result<Token> {
        self.into_token_at(Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Introspection
// ---------------------------------------------------------------------------

/// Token introspection response (RFC 7662 section 2.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently active.
    pub active: bool,
    /// Space-separated scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Client the token was issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Human-readable resource owner identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Token type, e.g. `"bearer"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiry as a Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issue time as a Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not-before time as a Unix timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Audience; a string or an array of strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<serde_json::Value>,
    /// Issuer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Token identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Server-defined extras.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// TokenTypeHint
// ---------------------------------------------------------------------------

/// Which credential of a [`Token`] a revocation or introspection targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The access token.
    #[default]
    AccessToken,
    /// The refresh token.
    RefreshToken,
}

impl TokenTypeHint {
    /// Wire name of the hint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for TokenTypeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenTypeHint {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "access_token" => Ok(Self::AccessToken),
            "refresh_token" => Ok(Self::RefreshToken),
            other => Err(OAuth2Error::Config(format!(
                "unknown token type hint: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
