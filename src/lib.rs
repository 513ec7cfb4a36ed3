//! oauth2-fetch - OAuth2 client library
//!
//! Obtains, caches, renews and attaches OAuth2 bearer credentials to
//! outbound HTTP requests.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `client`: Protocol client (endpoint resolution, discovery, grants,
//!   introspection, revocation) and the authorization-code helper
//! - `manager`: Token lifecycle manager (caching, single-flight renewal,
//!   background renewal, 401 retry)
//! - `middleware`: tower layer around the token manager
//! - `transport`: Injectable HTTP primitive with reqwest and fake implementations
//! - `token`, `grant`, `discovery`: Wire data models
//! - `pkce`, `query`: PKCE and form/query encoding helpers
//! - `config`: Client settings and configuration loading
//! - `error`: Error types and result aliases
//! - `cli`, `logging`: Support for the `oauth2-fetch` binary
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use oauth2_fetch::{ClientSettings, OAuth2Client, TokenManager, TokenManagerOptions};
//! use oauth2_fetch::transport::HttpRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(OAuth2Client::with_default_transport(
//!         ClientSettings::new("my-client").with_server("https://auth.example.com/"),
//!     ));
//!     let manager = TokenManager::new(TokenManagerOptions::new(client));
//!
//!     let request = HttpRequest::get("https://api.example.com/me".parse()?);
//!     let response = manager.fetch(request).await?;
//!     println!("{}", response.status);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod discovery;
pub mod error;
pub mod grant;
pub mod logging;
pub mod manager;
pub mod middleware;
pub mod pkce;
pub mod query;
pub mod token;
pub mod transport;

// Re-export commonly used types
pub use client::OAuth2Client;
pub use config::{AuthMethod, ClientSettings};
pub use error::{OAuth2Error, Result};
pub use manager::{TokenManager, TokenManagerOptions, TokenSource, TokenStorage};
pub use middleware::BearerAuthLayer;
pub use token::Token;
