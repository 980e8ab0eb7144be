//! Tracing subscriber setup for applications embedding indirector.
//!
//! The library only emits `tracing` events; installing a subscriber is left
//! to the application, which may call [`init_tracing`] once at startup.

use indirector_core::{ConfigError, IndirectorResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log filter environment variable.
pub const LOG_ENV: &str = "INDIRECTOR_LOG";

/// Log format environment variable (`json` or `text`).
pub const LOG_FORMAT_ENV: &str = "INDIRECTOR_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directives, e.g. `info,indirector_rest=debug`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string()),
            json: std::env::var(LOG_FORMAT_ENV)
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

impl TelemetryConfig {
    pub fn env_filter(&self) -> Result<EnvFilter, ConfigError> {
        EnvFilter::try_new(&self.filter).map_err(|e| ConfigError::InvalidValue {
            field: LOG_ENV.to_string(),
            value: self.filter.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> IndirectorResult<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter()?);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|e| ConfigError::InvalidValue {
        field: "subscriber".to_string(),
        value: "global".to_string(),
        reason: e.to_string(),
    })?;

    tracing::info!(filter = %config.filter, json = config.json, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_filter_is_a_config_error() {
        let config = TelemetryConfig {
            filter: "indirector=[".to_string(),
            json: false,
        };
        assert!(matches!(
            config.env_filter(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_second_init_fails() {
        let config = TelemetryConfig {
            filter: "warn".to_string(),
            json: true,
        };
        // Another test may have installed one first; either way the
        // second call in this process must fail.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
