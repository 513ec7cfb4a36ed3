//! Tracing subscriber setup for the `oauth2-fetch` binary
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Output goes to stderr so
/// it never mixes with JSON results printed on stdout.
///
/// # Arguments
///
/// * `config` - Logging configuration
///
/// # Errors
///
/// Returns an error if the level is not a valid filter directive or a
/// global subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use oauth2_fetch::config::LoggingConfig;
/// use oauth2_fetch::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     json_format: false,
/// };
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_format {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()?;
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_invalid_level_is_rejected() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "oauth2_fetch=loud".to_string(),
            json_format: false,
        };
        assert!(init_logging(&config).is_err());
    }
}
