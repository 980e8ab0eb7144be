//! Process-wide settings.
//!
//! One [`Settings`] is built at startup and shared through `Arc`. Termini read
//! it when they are constructed; changing a value through [`Settings::set`]
//! expires the settings clock so that indirections rebuild their termini.
//!
//! File layout (TOML):
//!
//! ```toml
//! [main]
//! server = "puppet.example.com"
//! masterport = 8140
//! report_server = "reports.example.com"
//!
//! [http]
//! scheme = "https"
//! connect_timeout_ms = 5000
//! request_timeout_ms = 30000
//! ```

use crate::{ConfigError, ExpirationClock, Expirer};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Setting naming the default server when an indirection does not pick one.
pub const DEFAULT_SERVER_SETTING: &str = "server";

/// Setting naming the default port when an indirection does not pick one.
pub const DEFAULT_PORT_SETTING: &str = "masterport";

/// Setting naming the default request environment.
pub const ENVIRONMENT_SETTING: &str = "environment";

/// HTTP transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_pool_idle_timeout_ms")]
    pub pool_idle_timeout_ms: u64,
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_pool_idle_timeout_ms() -> u64 {
    90_000
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_idle_timeout_ms: default_pool_idle_timeout_ms(),
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.pool_idle_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheme != "http" && self.scheme != "https" {
            return Err(ConfigError::InvalidValue {
                field: "http.scheme".to_string(),
                value: self.scheme.clone(),
                reason: "must be http or https".to_string(),
            });
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http.connect_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "http.request_timeout_ms".to_string(),
                value: "0".to_string(),
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    #[serde(default)]
    main: BTreeMap<String, toml::Value>,
    #[serde(default)]
    http: HttpConfig,
}

/// Named configuration values plus typed transport settings.
#[derive(Debug)]
pub struct Settings {
    values: RwLock<BTreeMap<String, String>>,
    http: HttpConfig,
    clock: Arc<ExpirationClock>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Settings holding only the built-in defaults.
    pub fn new() -> Self {
        let values = BTreeMap::from([
            (DEFAULT_SERVER_SETTING.to_string(), "puppet".to_string()),
            (DEFAULT_PORT_SETTING.to_string(), "8140".to_string()),
            (ENVIRONMENT_SETTING.to_string(), "production".to_string()),
        ]);
        Self {
            values: RwLock::new(values),
            http: HttpConfig::default(),
            clock: Arc::new(ExpirationClock::new()),
        }
    }

    pub fn with_http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn with_value(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.write().insert(name.into(), value.into());
        self
    }

    /// Load from the path given by `--config` or `INDIRECTOR_CONFIG`.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or(ConfigError::MissingConfigPath)?;
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            reason: format!("{}: {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse TOML settings over the built-in defaults and validate them.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let file: SettingsFile = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;

        let mut settings = Self::new().with_http(file.http);
        {
            let values = settings.values.get_mut().unwrap_or_else(PoisonError::into_inner);
            for (name, value) in file.main {
                let value = match value {
                    toml::Value::String(s) => s,
                    other => other.to_string(),
                };
                values.insert(name, value);
            }
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http.validate()?;
        self.port(DEFAULT_PORT_SETTING)?;
        if self
            .get(DEFAULT_SERVER_SETTING)
            .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                field: DEFAULT_SERVER_SETTING.to_string(),
                value: String::new(),
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.read().get(name).cloned()
    }

    pub fn require(&self, name: &str) -> Result<String, ConfigError> {
        self.get(name).ok_or_else(|| ConfigError::MissingSetting {
            name: name.to_string(),
        })
    }

    /// A setting parsed as a TCP port.
    pub fn port(&self, name: &str) -> Result<u16, ConfigError> {
        let raw = self.require(name)?;
        raw.trim()
            .parse::<u16>()
            .ok()
            .filter(|port| *port > 0)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: name.to_string(),
                value: raw.clone(),
                reason: "must be a port number".to_string(),
            })
    }

    /// Change a value and expire everything cached against these settings.
    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.write().insert(name.clone(), value.into());
        tracing::debug!(setting = %name, "Setting changed, expiring dependent caches");
        self.clock.expire();
    }

    pub fn environment(&self) -> String {
        self.get(ENVIRONMENT_SETTING)
            .unwrap_or_else(|| "production".to_string())
    }

    pub fn http(&self) -> &HttpConfig {
        &self.http
    }

    /// The clock expired by every [`Settings::set`].
    pub fn expirer(&self) -> Arc<dyn Expirer> {
        self.clock.clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, String>> {
        self.values.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, String>> {
        self.values.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var("INDIRECTOR_CONFIG").ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Watermark;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.get("server").as_deref(), Some("puppet"));
        assert_eq!(settings.port("masterport").unwrap(), 8140);
        assert_eq!(settings.environment(), "production");
        assert_eq!(settings.http().scheme, "https");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_toml_overrides_defaults() {
        let settings = Settings::from_toml_str(
            r#"
            [main]
            server = "master.example.com"
            masterport = 8141
            report_server = "reports.example.com"

            [http]
            scheme = "http"
            connect_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(settings.get("server").as_deref(), Some("master.example.com"));
        assert_eq!(settings.port("masterport").unwrap(), 8141);
        assert_eq!(
            settings.get("report_server").as_deref(),
            Some("reports.example.com")
        );
        assert_eq!(settings.http().connect_timeout(), Duration::from_millis(250));
        assert_eq!(settings.http().request_timeout_ms, 60_000);
    }

    #[test]
    fn test_unknown_http_field_is_rejected() {
        let err = Settings::from_toml_str("[http]\nretries = 3\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let err = Settings::from_toml_str("[http]\nrequest_timeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field, .. } if field == "http.request_timeout_ms"));
    }

    #[test]
    fn test_bad_port_is_rejected() {
        let settings = Settings::new().with_value("masterport", "eighty");
        let err = settings.port("masterport").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_setting() {
        let settings = Settings::new();
        let err = settings.require("ca_server").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingSetting {
                name: "ca_server".to_string()
            }
        );
    }

    #[test]
    fn test_set_expires_clock() {
        let settings = Settings::new();
        let before = Watermark::now();
        assert!(!settings.expirer().is_expired(&before));

        settings.set("server", "other.example.com");

        assert!(settings.expirer().is_expired(&before));
        assert_eq!(settings.get("server").as_deref(), Some("other.example.com"));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[main]\nserver = \"from-file\"").unwrap();

        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.get("server").as_deref(), Some("from-file"));

        let err = Settings::from_path(Path::new("/nonexistent/indirector.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
