//! Command-line interface definition for oauth2-fetch
//!
//! This module defines the CLI structure using clap's derive API. Global
//! flags override values from the configuration file and `OAUTH2_*`
//! environment variables; each subcommand runs one OAuth2 operation and
//! prints its result as JSON.

use clap::{Parser, Subcommand};

use crate::config::AuthMethod;
use crate::token::TokenTypeHint;

/// oauth2-fetch - OAuth2 client command line tool
///
/// Obtain, refresh, introspect and revoke OAuth2 tokens, and build
/// authorization-code redirect URLs.
#[derive(Parser, Debug, Clone)]
#[command(name = "oauth2-fetch")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value = "config/oauth2.yaml")]
    pub config: Option<String>,

    /// Authorization server base URL
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// OAuth2 client identifier
    #[arg(long, global = true)]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[arg(long, global = true)]
    pub client_secret: Option<String>,

    /// Token endpoint (absolute, or relative to --server)
    #[arg(long, global = true)]
    pub token_endpoint: Option<String>,

    /// Client authentication method (client_secret_basic, client_secret_post)
    #[arg(long, global = true, value_parser = parse_auth_method)]
    pub auth_method: Option<AuthMethod>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for oauth2-fetch
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Obtain a token with the client_credentials grant
    ClientCredentials {
        /// Requested scope (repeatable)
        #[arg(short, long)]
        scope: Vec<String>,

        /// Resource indicator (repeatable)
        #[arg(short, long)]
        resource: Vec<String>,

        /// Extra body parameter as KEY=VALUE (repeatable)
        #[arg(short = 'p', long = "param", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },

    /// Obtain a token with the password grant
    Password {
        /// Resource owner username
        #[arg(short, long)]
        username: String,

        /// Resource owner password
        #[arg(short, long, env = "OAUTH2_PASSWORD", hide_env_values = true)]
        password: String,

        /// Requested scope (repeatable)
        #[arg(short, long)]
        scope: Vec<String>,
    },

    /// Exchange a refresh token for a new token
    Refresh {
        /// The refresh token
        #[arg(long)]
        refresh_token: String,

        /// Requested scope (repeatable)
        #[arg(short, long)]
        scope: Vec<String>,
    },

    /// Print the authorization endpoint URL for the authorization_code flow
    AuthorizeUrl {
        /// Where the server should redirect back to
        #[arg(long)]
        redirect_uri: String,

        /// Opaque state value echoed back in the redirect
        #[arg(long)]
        state: Option<String>,

        /// PKCE code verifier; the challenge is derived from it
        #[arg(long)]
        code_verifier: Option<String>,

        /// Requested scope (repeatable)
        #[arg(short, long)]
        scope: Vec<String>,

        /// Ask for the response in the URL fragment instead of the query
        #[arg(long)]
        fragment: bool,
    },

    /// Exchange the redirect URL of an authorization_code flow for a token
    ExchangeCode {
        /// Full URL the browser was redirected to
        #[arg(long)]
        redirect_url: String,

        /// Redirect URI used in the authorization request
        #[arg(long)]
        redirect_uri: String,

        /// Expected state value
        #[arg(long)]
        state: Option<String>,

        /// PKCE code verifier used in the authorization request
        #[arg(long)]
        code_verifier: Option<String>,
    },

    /// Introspect a token (RFC 7662)
    Introspect {
        /// The access token to introspect
        #[arg(long)]
        token: String,
    },

    /// Revoke a token (RFC 7009)
    Revoke {
        /// The token to revoke
        #[arg(long)]
        token: String,

        /// Which kind of token is being revoked (access_token, refresh_token)
        #[arg(long, default_value = "access_token", value_parser = parse_token_type_hint)]
        hint: TokenTypeHint,
    },

    /// Generate a PKCE code verifier and S256 challenge
    Pkce,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_auth_method(value: &str) -> Result<AuthMethod, String> {
    value.parse::<AuthMethod>().map_err(|e| e.to_string())
}

fn parse_token_type_hint(value: &str) -> Result<TokenTypeHint, String> {
    value.parse::<TokenTypeHint>().map_err(|e| e.to_string())
}

fn parse_key_value(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", value))
}
