//! Configuration for the application engine.
//!
//! Settings can be built programmatically with [`Config::builder`] or loaded
//! with figment from serialized defaults merged with `APP_`-prefixed
//! environment variables (`APP_NAME`, `APP_VERSION`, `APP_ENV`, `APP_DEBUG`).
//! Identity defaults are applied after every source has been merged, so an
//! empty value behaves the same as a missing one.

use figment::providers::{Env, Serialized};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default application name.
pub const DEFAULT_APP_NAME: &str = "application";

/// Default application version.
pub const DEFAULT_APP_VERSION: &str = "0.1.0";

/// Default environment tag.
pub const DEFAULT_APP_ENV: &str = "development";

/// Environment variable holding the application name.
pub const APP_NAME_ENV: &str = "APP_NAME";

/// Environment variable holding the application version.
pub const APP_VERSION_ENV: &str = "APP_VERSION";

/// Environment variable holding the environment tag.
pub const APP_ENV_ENV: &str = "APP_ENV";

/// Environment variable holding the debug flag.
pub const APP_DEBUG_ENV: &str = "APP_DEBUG";

/// Log level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level logging (most verbose)
    Trace,
    /// Debug level logging
    Debug,
    /// Info level logging (default)
    #[default]
    Info,
    /// Warning level logging
    Warn,
    /// Error level logging
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

/// Application identity: immutable once the engine is built.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Application name
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
    /// Application version
    #[serde(deserialize_with = "lenient_string")]
    pub version: String,
    /// Environment tag (development, staging, production, ...)
    #[serde(deserialize_with = "lenient_string")]
    pub env: String,
    /// Debug mode
    pub debug: bool,
}

impl Identity {
    /// Create an identity; call [`Identity::with_defaults`] to fill empty fields.
    pub fn new<N: Into<String>, V: Into<String>, E: Into<String>>(
        name: N,
        version: V,
        env: E,
        debug: bool,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            env: env.into(),
            debug,
        }
    }

    /// Replace empty fields with their defaults.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = DEFAULT_APP_NAME.to_string();
        }
        if self.version.trim().is_empty() {
            self.version = DEFAULT_APP_VERSION.to_string();
        }
        if self.env.trim().is_empty() {
            self.env = DEFAULT_APP_ENV.to_string();
        }
        self
    }

    /// Whether the environment tag denotes a development setup.
    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(
            self.env.to_ascii_lowercase().as_str(),
            "" | "dev" | "development" | "local" | "test"
        )
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Logging level (raised to `debug` when the identity has debug enabled)
    pub level: LogLevel,
    /// Force JSON output on or off; `None` picks JSON outside development
    pub json: Option<bool>,
    /// Enable colored output (ignored for JSON logs)
    pub color: bool,
    /// Log file path (optional, stdout otherwise)
    pub file: Option<PathBuf>,
    /// Maximum log file size in bytes before rotation
    pub max_file_size: Option<u64>,
    /// Number of rotated log files to keep
    pub max_files: Option<u32>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            json: None,
            color: true,
            file: None,
            max_file_size: Some(100 * 1024 * 1024), // 100MB
            max_files: Some(5),
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Per-hook deadline in milliseconds; `None` waits for every hook
    pub hook_timeout_ms: Option<u64>,
    /// Disable listening for SIGINT/SIGTERM
    pub disable_signals: bool,
}

/// Main engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Application identity
    pub identity: Identity,
    /// Run in CLI mode (terse logger, no timestamps)
    pub cli_mode: bool,
    /// Logging configuration
    pub logging: LogConfig,
    /// Shutdown configuration
    pub shutdown: ShutdownConfig,
}

impl Config {
    /// Create a new config with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from defaults merged with `APP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Will return an error if an environment variable holds a value of the wrong type.
    pub fn from_env() -> Result<Self> {
        Self::figment().extract::<Self>().map_err(Error::from)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default())).merge(
            Env::prefixed("APP_")
                .only(&["name", "version", "env", "debug"])
                .map(|key| format!("identity.{}", key.as_str().to_ascii_lowercase()).into()),
        )
    }

    /// Get the per-hook deadline as a Duration.
    #[must_use]
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.shutdown.hook_timeout_ms.map(Duration::from_millis)
    }

    /// Whether JSON log output should be used.
    #[must_use]
    pub fn is_json_logging(&self) -> bool {
        self.logging
            .json
            .unwrap_or_else(|| !self.cli_mode && !self.identity.is_development())
    }

    /// Check if colored logging is enabled.
    #[must_use]
    pub fn is_colored_logging(&self) -> bool {
        self.logging.color && !self.is_json_logging()
    }

    /// Effective log level, taking the debug flag into account.
    #[must_use]
    pub fn effective_log_level(&self) -> LogLevel {
        if self.identity.debug && self.logging.level != LogLevel::Trace {
            LogLevel::Debug
        } else {
            self.logging.level
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.shutdown.hook_timeout_ms == Some(0) {
            return Err(Error::config("Hook timeout must be greater than 0"));
        }

        if self.logging.max_file_size == Some(0) {
            return Err(Error::config("Maximum log file size must be greater than 0"));
        }

        if let Some(ref log_file) = self.logging.file {
            if let Some(parent) = log_file.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(Error::config(format!(
                        "Log file directory does not exist: {}",
                        parent.display()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Create a builder for this configuration.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for creating configurations programmatically.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the application name.
    #[must_use]
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.identity.name = name.into();
        self
    }

    /// Set the application version.
    #[must_use]
    pub fn version<S: Into<String>>(mut self, version: S) -> Self {
        self.config.identity.version = version.into();
        self
    }

    /// Set the environment tag.
    #[must_use]
    pub fn env<S: Into<String>>(mut self, env: S) -> Self {
        self.config.identity.env = env.into();
        self
    }

    /// Enable or disable debug mode.
    #[must_use]
    pub const fn debug(mut self, enabled: bool) -> Self {
        self.config.identity.debug = enabled;
        self
    }

    /// Enable CLI mode.
    #[must_use]
    pub const fn cli_mode(mut self, enabled: bool) -> Self {
        self.config.cli_mode = enabled;
        self
    }

    /// Set the log level.
    #[must_use]
    pub const fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Force JSON logging on or off.
    #[must_use]
    pub const fn json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = Some(enabled);
        self
    }

    /// Write logs to a file instead of stdout.
    #[must_use]
    pub fn log_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.logging.file = Some(path.into());
        self
    }

    /// Set the per-hook shutdown deadline.
    ///
    /// # Errors
    ///
    /// Will return an error if the duration exceeds `u64::MAX` milliseconds
    pub fn hook_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.config.shutdown.hook_timeout_ms =
            Some(whole_millis(timeout).ok_or_else(|| Error::config("Hook timeout too large"))?);
        Ok(self)
    }

    /// Disable OS signal handling.
    #[must_use]
    pub const fn without_signals(mut self) -> Self {
        self.config.shutdown.disable_signals = true;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// Will return an error if validation fails.
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Whole milliseconds in `timeout`, rounding a non-zero sub-millisecond value up to 1.
pub fn whole_millis(timeout: Duration) -> Option<u64> {
    let millis = u64::try_from(timeout.as_millis()).ok()?;
    Some(if timeout.is_zero() { 0 } else { millis.max(1) })
}

/// Accept strings as well as scalars that environment parsing turned into numbers or booleans.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct Lenient;

    impl serde::de::Visitor<'_> for Lenient {
        type Value = String;

        fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("a string or scalar value")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_string<E: serde::de::Error>(self, v: String) -> std::result::Result<String, E> {
            Ok(v)
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_bool<E: serde::de::Error>(self, v: bool) -> std::result::Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(Lenient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.identity.name.is_empty());
        assert_eq!(config.logging.level, LogLevel::Info);
        assert!(config.logging.color);
        assert!(config.hook_timeout().is_none());
    }

    #[test]
    fn test_identity_defaults() {
        let identity = Identity::default().with_defaults();
        assert_eq!(identity.name, "application");
        assert_eq!(identity.version, "0.1.0");
        assert_eq!(identity.env, "development");
        assert!(!identity.debug);

        let identity = Identity::new("svc", "2.0.0", "production", true).with_defaults();
        assert_eq!(identity.name, "svc");
        assert_eq!(identity.env, "production");
        assert!(!identity.is_development());
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .name("test-app")
            .version("1.2.3")
            .env("staging")
            .debug(true)
            .log_level(LogLevel::Warn)
            .hook_timeout(Duration::from_secs(3))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(config.identity.name, "test-app");
        assert_eq!(config.identity.version, "1.2.3");
        assert_eq!(config.hook_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(config.effective_log_level(), LogLevel::Debug);
        assert!(config.is_json_logging());
    }

    #[test]
    fn test_sub_millisecond_hook_timeout_rounds_up() {
        let config = Config::builder()
            .hook_timeout(Duration::from_micros(10))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.hook_timeout(), Some(Duration::from_millis(1)));

        assert_eq!(whole_millis(Duration::ZERO), Some(0));
        assert_eq!(whole_millis(Duration::from_micros(1500)), Some(1));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.shutdown.hook_timeout_ms = Some(0);
        assert!(config.validate().is_err());

        config.shutdown.hook_timeout_ms = Some(100);
        assert!(config.validate().is_ok());

        config.logging.file = Some(PathBuf::from("/definitely/not/here/app.log"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_selection() {
        let mut config = Config::default();
        config.identity = Identity::default().with_defaults();
        assert!(!config.is_json_logging());
        assert!(config.is_colored_logging());

        config.identity.env = "production".into();
        assert!(config.is_json_logging());

        config.cli_mode = true;
        assert!(!config.is_json_logging());

        config.logging.json = Some(true);
        assert!(config.is_json_logging());
        assert!(!config.is_colored_logging());
    }

    #[test]
    fn test_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env(APP_NAME_ENV, "billing");
            jail.set_env(APP_VERSION_ENV, "2");
            jail.set_env(APP_ENV_ENV, "production");
            jail.set_env(APP_DEBUG_ENV, "true");

            let config = Config::from_env().expect("config");
            assert_eq!(config.identity.name, "billing");
            assert_eq!(config.identity.version, "2");
            assert_eq!(config.identity.env, "production");
            assert!(config.identity.debug);
            Ok(())
        });
    }

    #[test]
    fn test_from_env_missing_uses_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::from_env().expect("config");
            let identity = config.identity.with_defaults();
            assert_eq!(identity.name, DEFAULT_APP_NAME);
            assert_eq!(identity.version, DEFAULT_APP_VERSION);
            assert_eq!(identity.env, DEFAULT_APP_ENV);
            Ok(())
        });
    }

    #[test]
    fn test_log_level_conversion() {
        assert_eq!(tracing::Level::from(LogLevel::Info), tracing::Level::INFO);
        assert_eq!(tracing::Level::from(LogLevel::Error), tracing::Level::ERROR);
    }
}
