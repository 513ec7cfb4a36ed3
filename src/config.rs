//! Configuration management for oauth2-fetch
//!
//! This module defines [`ClientSettings`], the per-relationship settings
//! snapshot consumed by the protocol client, and [`AppConfig`], which the
//! command line tool loads from a YAML file, environment variables and CLI
//! overrides.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{OAuth2Error, Result};

// ---------------------------------------------------------------------------
// ClientSettings
// ---------------------------------------------------------------------------

/// Settings for one OAuth2 client relationship.
///
/// Every endpoint may be given explicitly (absolute, or relative to
/// `server`). Endpoints left unset are filled in by discovery or fall back
/// to conventional default paths under `server`.
///
/// # Examples
///
/// ```
/// use oauth2_fetch::config::ClientSettings;
///
/// let settings = ClientSettings::new("my-client")
///     .with_server("https://auth.example.com/")
///     .with_client_secret("s3cret");
/// assert!(settings.validate().is_ok());
/// ```
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ClientSettings {
    /// Base URL of the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    /// OAuth2 client identifier.
    #[serde(default)]
    pub client_id: String,

    /// Client secret; absent for public clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Authorization endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// Token endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// Introspection endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub introspection_endpoint: Option<String>,

    /// Revocation endpoint URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revocation_endpoint: Option<String>,

    /// Discovery document URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_endpoint: Option<String>,

    /// Client authentication method at the token endpoint
    /// (`client_secret_basic` or `client_secret_post`).
    ///
    /// Kept as a string because discovery may adopt whatever the server
    /// advertises; unsupported values are rejected when a request is made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_method: Option<String>,
}

impl fmt::Debug for ClientSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSettings")
            .field("server", &self.server)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("introspection_endpoint", &self.introspection_endpoint)
            .field("revocation_endpoint", &self.revocation_endpoint)
            .field("discovery_endpoint", &self.discovery_endpoint)
            .field("authentication_method", &self.authentication_method)
            .finish()
    }
}

impl ClientSettings {
    /// Creates settings with only a client identifier.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Sets the base server URL.
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    /// Sets the client secret.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.token_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the authorization endpoint.
    pub fn with_authorization_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.authorization_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the introspection endpoint.
    pub fn with_introspection_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.introspection_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the revocation endpoint.
    pub fn with_revocation_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.revocation_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the discovery endpoint.
    pub fn with_discovery_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.discovery_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the preferred authentication method.
    pub fn with_authentication_method(mut self, method: AuthMethod) -> Self {
        self.authentication_method = Some(method.as_str().to_string());
        self
    }

    /// Returns `true` when a non-empty client secret is configured.
    pub fn has_secret(&self) -> bool {
        self.client_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::Config`] when `client_id` is empty, when the
    /// authentication method is not one this client supports, or when a
    /// configured URL does not parse (relative URLs require `server`).
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(OAuth2Error::Config("client_id cannot be empty".to_string()));
        }

        if let Some(method) = &self.authentication_method {
            method.parse::<AuthMethod>().map_err(|_| {
                OAuth2Error::Config(format!(
                    "Invalid authentication_method: {}. Must be one of: {}",
                    method,
                    AuthMethod::ALL
                        .iter()
                        .map(AuthMethod::as_str)
                        .collect::<Vec<_>>()
                        .join(", ")
                ))
            })?;
        }

        let server = match &self.server {
            Some(server) => Some(Url::parse(server).map_err(|e| {
                OAuth2Error::Config(format!("Invalid server URL {server}: {e}"))
            })?),
            None => None,
        };

        for (name, value) in [
            ("authorization_endpoint", &self.authorization_endpoint),
            ("token_endpoint", &self.token_endpoint),
            ("introspection_endpoint", &self.introspection_endpoint),
            ("revocation_endpoint", &self.revocation_endpoint),
            ("discovery_endpoint", &self.discovery_endpoint),
        ] {
            let Some(value) = value else { continue };
            let parsed = match &server {
                Some(base) => base.join(value),
                None => Url::parse(value),
            };
            parsed.map_err(|e| OAuth2Error::Config(format!("Invalid {name} {value}: {e}")))?;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AuthMethod
// ---------------------------------------------------------------------------

/// Client authentication methods supported at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// `Authorization: Basic base64(id:secret)`
    ClientSecretBasic,
    /// `client_id` / `client_secret` in the request body
    ClientSecretPost,
}

impl AuthMethod {
    /// All supported methods.
    pub const ALL: [AuthMethod; 2] = [Self::ClientSecretBasic, Self::ClientSecretPost];

    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = OAuth2Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "client_secret_basic" => Ok(Self::ClientSecretBasic),
            "client_secret_post" => Ok(Self::ClientSecretPost),
            other => Err(OAuth2Error::UnsupportedAuthMethod(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// LoggingConfig
// ---------------------------------------------------------------------------

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Enable JSON-formatted logs
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

/// Configuration for the `oauth2-fetch` command line tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// OAuth2 client settings
    #[serde(default)]
    pub client: ClientSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error; defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OAuth2Error::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| OAuth2Error::Config(format!("Failed to parse config: {}", e)))
    }

    fn apply_env_vars(&mut self) {
        let client = &mut self.client;
        let string_overrides: [(&str, &mut Option<String>); 6] = [
            ("OAUTH2_SERVER", &mut client.server),
            ("OAUTH2_CLIENT_SECRET", &mut client.client_secret),
            ("OAUTH2_TOKEN_ENDPOINT", &mut client.token_endpoint),
            (
                "OAUTH2_AUTHORIZATION_ENDPOINT",
                &mut client.authorization_endpoint,
            ),
            ("OAUTH2_DISCOVERY_ENDPOINT", &mut client.discovery_endpoint),
            (
                "OAUTH2_INTROSPECTION_ENDPOINT",
                &mut client.introspection_endpoint,
            ),
        ];
        for (var, slot) in string_overrides {
            if let Ok(value) = std::env::var(var) {
                *slot = Some(value);
                tracing::debug!("Env override: {}", var);
            }
        }

        if let Ok(client_id) = std::env::var("OAUTH2_CLIENT_ID") {
            client.client_id = client_id;
            tracing::debug!("Env override: OAUTH2_CLIENT_ID");
        }

        if let Ok(method) = std::env::var("OAUTH2_AUTHENTICATION_METHOD") {
            match method.parse::<AuthMethod>() {
                Ok(m) => {
                    client.authentication_method = Some(m.as_str().to_string());
                    tracing::debug!(method = %m, "Env override: OAUTH2_AUTHENTICATION_METHOD");
                }
                Err(_) => {
                    tracing::warn!("Invalid OAUTH2_AUTHENTICATION_METHOD: {}", method);
                }
            }
        }

        if let Ok(level) = std::env::var("OAUTH2_LOG_LEVEL") {
            self.logging.level = level.clone();
            tracing::debug!(level = %level, "Env override: OAUTH2_LOG_LEVEL");
        }

        if let Ok(json_logs) = std::env::var("OAUTH2_JSON_LOGS") {
            match json_logs.parse::<bool>() {
                Ok(v) => self.logging.json_format = v,
                Err(_) => {
                    tracing::warn!("Invalid value for OAUTH2_JSON_LOGS: {}", json_logs);
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if let Some(server) = &cli.server {
            self.client.server = Some(server.clone());
        }
        if let Some(client_id) = &cli.client_id {
            self.client.client_id = client_id.clone();
        }
        if let Some(secret) = &cli.client_secret {
            self.client.client_secret = Some(secret.clone());
        }
        if let Some(endpoint) = &cli.token_endpoint {
            self.client.token_endpoint = Some(endpoint.clone());
        }
        if let Some(method) = cli.auth_method {
            self.client.authentication_method = Some(method.as_str().to_string());
        }
        if cli.verbose {
            self.logging.level = "debug".to_string();
            tracing::debug!("Verbose mode enabled");
        }
        if cli.json_logs {
            self.logging.json_format = true;
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`OAuth2Error::Config`] if the client settings are invalid
    /// or the log level is empty.
    pub fn validate(&self) -> Result<()> {
        if self.logging.level.trim().is_empty() {
            return Err(OAuth2Error::Config("logging.level cannot be empty".to_string()));
        }
        self.client.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use serial_test::serial;
    use std::io::Write;

    const ENV_VARS: [&str; 10] = [
        "OAUTH2_SERVER",
        "OAUTH2_CLIENT_ID",
        "OAUTH2_CLIENT_SECRET",
        "OAUTH2_TOKEN_ENDPOINT",
        "OAUTH2_AUTHORIZATION_ENDPOINT",
        "OAUTH2_DISCOVERY_ENDPOINT",
        "OAUTH2_INTROSPECTION_ENDPOINT",
        "OAUTH2_AUTHENTICATION_METHOD",
        "OAUTH2_LOG_LEVEL",
        "OAUTH2_JSON_LOGS",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            std::env::remove_var(var);
        }
    }

    fn cli(args: &[&str]) -> crate::cli::Cli {
        let mut full = vec!["oauth2-fetch"];
        full.extend_from_slice(args);
        full.push("pkce");
        crate::cli::Cli::parse_from(full)
    }

    #[test]
    fn test_client_settings_validation_success() {
        let settings = ClientSettings::new("id")
            .with_server("https://auth.example.com")
            .with_token_endpoint("/oauth/token");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_client_settings_validation_empty_client_id() {
        let settings = ClientSettings::new("  ");
        assert!(matches!(settings.validate(), Err(OAuth2Error::Config(_))));
    }

    #[test]
    fn test_client_settings_validation_invalid_method() {
        let mut settings = ClientSettings::new("id");
        settings.authentication_method = Some("private_key_jwt".to_string());
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("client_secret_basic"));
    }

    #[test]
    fn test_client_settings_relative_endpoint_requires_server() {
        let settings = ClientSettings::new("id").with_token_endpoint("/token");
        assert!(settings.validate().is_err());

        let settings = settings.with_server("https://auth.example.com");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_client_settings_debug_redacts_secret() {
        let settings = ClientSettings::new("id").with_client_secret("hunter2");
        assert!(!format!("{settings:?}").contains("hunter2"));
    }

    #[test]
    fn test_has_secret_ignores_empty() {
        assert!(!ClientSettings::new("id").has_secret());
        assert!(!ClientSettings::new("id").with_client_secret("").has_secret());
        assert!(ClientSettings::new("id").with_client_secret("x").has_secret());
    }

    #[test]
    fn test_auth_method_parse() {
        assert_eq!(
            "client_secret_post".parse::<AuthMethod>().unwrap(),
            AuthMethod::ClientSecretPost
        );
        assert!(matches!(
            "none".parse::<AuthMethod>(),
            Err(OAuth2Error::UnsupportedAuthMethod(m)) if m == "none"
        ));
    }

    #[test]
    fn test_app_config_from_yaml() {
        let yaml = r#"
client:
  server: https://auth.example.com
  client_id: my-client
  client_secret: s3cret
  authentication_method: client_secret_post
logging:
  level: debug
  json_format: true
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.client.client_id, "my-client");
        assert_eq!(
            config.client.authentication_method.as_deref(),
            Some("client_secret_post")
        );
        assert!(config.logging.json_format);
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_load_reads_file_and_applies_env_then_cli() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "client:\n  server: https://file.example.com\n  client_id: from-file\n"
        )
        .unwrap();

        std::env::set_var("OAUTH2_CLIENT_ID", "from-env");
        std::env::set_var("OAUTH2_CLIENT_SECRET", "env-secret");

        let cli = cli(&["--client-id", "from-cli"]);
        let config = AppConfig::load(file.path().to_str().unwrap(), &cli).unwrap();
        clear_env();

        assert_eq!(config.client.server.as_deref(), Some("https://file.example.com"));
        assert_eq!(config.client.client_secret.as_deref(), Some("env-secret"));
        assert_eq!(config.client.client_id, "from-cli", "CLI wins over env");
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        clear_env();
        let config = AppConfig::load("/nonexistent/oauth2-fetch.yaml", &cli(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    #[serial]
    fn test_invalid_env_auth_method_is_ignored() {
        clear_env();
        std::env::set_var("OAUTH2_AUTHENTICATION_METHOD", "bogus");
        let config = AppConfig::load("/nonexistent/oauth2-fetch.yaml", &cli(&[])).unwrap();
        clear_env();
        assert_eq!(config.client.authentication_method, None);
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "client: [not, a, map]").unwrap();
        let err = AppConfig::from_file(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_cli_verbose_sets_debug_level() {
        let mut config = AppConfig::default();
        config.apply_cli_overrides(&cli(&["--verbose"]));
        assert_eq!(config.logging.level, "debug");
    }
}
