//! oauth2-fetch - OAuth2 client command line tool
//!
//! Main entry point. Every command prints its result as pretty JSON on
//! stdout; logs go to stderr.

use anyhow::Result;
use serde::Serialize;
use serde_json::json;

use oauth2_fetch::cli::{Cli, Commands};
use oauth2_fetch::client::{
    AuthorizeParams, ClientCredentialsParams, OAuth2Client, PasswordParams,
    RedirectExchangeParams, RefreshParams, ResponseMode,
};
use oauth2_fetch::config::AppConfig;
use oauth2_fetch::logging::init_logging;
use oauth2_fetch::pkce::PkceChallenge;
use oauth2_fetch::token::{Token, TokenTypeHint};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli.config.as_deref().unwrap_or("config/oauth2.yaml");
    let config = AppConfig::load(config_path, &cli)?;

    init_logging(&config.logging)?;

    // PKCE generation is purely local and needs no client settings.
    if let Commands::Pkce = cli.command {
        let pkce = PkceChallenge::generate()?;
        return print_json(&json!({
            "code_verifier": pkce.verifier,
            "code_challenge": pkce.challenge,
            "code_challenge_method": pkce.method,
        }));
    }

    config.validate()?;
    let client = OAuth2Client::with_default_transport(config.client.clone());

    match cli.command {
        Commands::ClientCredentials {
            scope,
            resource,
            params,
        } => {
            tracing::info!("Requesting token with client_credentials grant");
            let token = client
                .client_credentials(ClientCredentialsParams {
                    scope: non_empty(scope),
                    resource,
                    extra_params: params,
                })
                .await?;
            print_json(&token)
        }
        Commands::Password {
            username,
            password,
            scope,
        } => {
            tracing::info!(username = %username, "Requesting token with password grant");
            let token = client
                .password(PasswordParams {
                    username,
                    password,
                    scope: non_empty(scope),
                    resource: Vec::new(),
                })
                .await?;
            print_json(&token)
        }
        Commands::Refresh {
            refresh_token,
            scope,
        } => {
            tracing::info!("Refreshing token");
            // The access token is irrelevant to the refresh grant.
            let current = Token::new(String::new()).with_refresh_token(refresh_token);
            let token = client
                .refresh_token(
                    &current,
                    RefreshParams {
                        scope: non_empty(scope),
                        resource: Vec::new(),
                    },
                )
                .await?;
            print_json(&token)
        }
        Commands::AuthorizeUrl {
            redirect_uri,
            state,
            code_verifier,
            scope,
            fragment,
        } => {
            let url = client
                .authorization_code()
                .get_authorize_uri(AuthorizeParams {
                    redirect_uri,
                    state,
                    code_verifier,
                    scope: non_empty(scope),
                    response_mode: if fragment {
                        ResponseMode::Fragment
                    } else {
                        ResponseMode::Query
                    },
                    ..AuthorizeParams::default()
                })
                .await?;
            print_json(&json!({ "authorize_url": url.as_str() }))
        }
        Commands::ExchangeCode {
            redirect_url,
            redirect_uri,
            state,
            code_verifier,
        } => {
            tracing::info!("Exchanging authorization code");
            let token = client
                .authorization_code()
                .get_token_from_code_redirect(
                    &redirect_url,
                    RedirectExchangeParams {
                        redirect_uri,
                        state,
                        code_verifier,
                        resource: Vec::new(),
                    },
                )
                .await?;
            print_json(&token)
        }
        Commands::Introspect { token } => {
            let info = client.introspect(&Token::new(token)).await?;
            print_json(&info)
        }
        Commands::Revoke { token, hint } => {
            let token = match hint {
                TokenTypeHint::AccessToken => Token::new(token),
                TokenTypeHint::RefreshToken => {
                    Token::new(String::new()).with_refresh_token(token)
                }
            };
            client.revoke(&token, hint).await?;
            print_json(&json!({ "revoked": true, "token_type_hint": hint.as_str() }))
        }
        Commands::Pkce => Ok(()),
    }
}

fn non_empty(scope: Vec<String>) -> Option<Vec<String>> {
    (!scope.is_empty()).then_some(scope)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
