//! Token-endpoint request bodies, one variant per grant type
//!
//! Each [`GrantRequest`] variant holds exactly the fields its grant type
//! sends on the wire, so fields of one grant can never leak into another.
//! Client authentication fields (`client_id`, `client_secret`) are added
//! later by the protocol client according to the negotiated method.

use crate::query::QueryParams;

/// `grant_type` value for the JWT bearer grant (RFC 7523).
pub const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// A token-endpoint request body.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::grant::GrantRequest;
///
/// let grant = GrantRequest::Password {
///     username: "alice".to_string(),
///     password: "s3cret".to_string(),
///     scope: Some(vec!["read".to_string(), "write".to_string()]),
///     resource: vec![],
/// };
/// assert_eq!(
///     grant.to_params().encode(),
///     "grant_type=password&username=alice&password=s3cret&scope=read+write"
/// );
/// ```
#[derive(Clone, PartialEq, Eq)]
pub enum GrantRequest {
    /// `client_credentials`
    ClientCredentials {
        /// Requested scopes, space-joined on the wire.
        scope: Option<Vec<String>>,
        /// RFC 8707 resource indicators.
        resource: Vec<String>,
        /// Caller-supplied extra body parameters, already checked against
        /// the reserved names.
        extra: Vec<(String, String)>,
    },
    /// `password`
    Password {
        /// Resource owner username.
        username: String,
        /// Resource owner password.
        password: String,
        /// Requested scopes.
        scope: Option<Vec<String>>,
        /// RFC 8707 resource indicators.
        resource: Vec<String>,
    },
    /// `authorization_code`
    AuthorizationCode {
        /// Code from the redirect.
        code: String,
        /// The redirect URI used in the authorization request.
        redirect_uri: String,
        /// PKCE verifier, when the flow used PKCE.
        code_verifier: Option<String>,
        /// RFC 8707 resource indicators.
        resource: Vec<String>,
    },
    /// `refresh_token`
    RefreshToken {
        /// The refresh credential.
        refresh_token: String,
        /// Narrowed scopes, if any.
        scope: Option<Vec<String>>,
        /// RFC 8707 resource indicators.
        resource: Vec<String>,
    },
    /// `urn:ietf:params:oauth:grant-type:jwt-bearer`
    JwtBearer {
        /// Signed JWT assertion.
        assertion: String,
        /// Requested scopes.
        scope: Option<Vec<String>>,
    },
}

impl std::fmt::Debug for GrantRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrantRequest")
            .field("grant_type", &self.grant_type())
            .finish_non_exhaustive()
    }
}

impl GrantRequest {
    /// The `grant_type` wire value.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::Password { .. } => "password",
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
            Self::JwtBearer { .. } => JWT_BEARER_GRANT_TYPE,
        }
    }

    /// Builds the form body. Absent optional fields are omitted and
    /// resource indicators repeat the `resource` key.
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::new();
        params.set("grant_type", self.grant_type());

        match self {
            Self::ClientCredentials {
                scope,
                resource,
                extra,
            } => {
                params.set_opt("scope", join_scope(scope));
                set_resource(&mut params, resource);
                for (key, value) in extra {
                    params.set(key, value.as_str());
                }
            }
            Self::Password {
                username,
                password,
                scope,
                resource,
            } => {
                params
                    .set("username", username.as_str())
                    .set("password", password.as_str())
                    .set_opt("scope", join_scope(scope));
                set_resource(&mut params, resource);
            }
            Self::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
                resource,
            } => {
                params
                    .set("code", code.as_str())
                    .set("redirect_uri", redirect_uri.as_str())
                    .set_opt("code_verifier", code_verifier.as_deref());
                set_resource(&mut params, resource);
            }
            Self::RefreshToken {
                refresh_token,
                scope,
                resource,
            } => {
                params
                    .set("refresh_token", refresh_token.as_str())
                    .set_opt("scope", join_scope(scope));
                set_resource(&mut params, resource);
            }
            Self::JwtBearer { assertion, scope } => {
                params
                    .set("assertion", assertion.as_str())
                    .set_opt("scope", join_scope(scope));
            }
        }

        params
    }
}

fn join_scope(scope: &Option<Vec<String>>) -> Option<String> {
    scope.as_ref().map(|s| s.join(" "))
}

fn set_resource(params: &mut QueryParams, resource: &[String]) {
    if !resource.is_empty() {
        params.set("resource", resource.to_vec());
    }
}
