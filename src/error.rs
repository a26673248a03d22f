//! Error handling for the application lifecycle engine.
//!
//! Every variant carries an [`ErrorCode`] so callers can branch on the
//! failure programmatically and log it with a stable identifier.
//!
//! # Error Taxonomy
//!
//! * **Construction errors** (`Config`, `Logging`, `Signal`, `Runtime`) are
//!   returned from [`EngineBuilder::build`](crate::EngineBuilder::build) and
//!   abort startup.
//! * **Registration errors** (`Shutdown` with
//!   [`ErrorCode::ShutdownAlreadyInProgress`]) are returned when a hook is
//!   registered after the shutdown round began.
//! * **Hook execution errors** are whatever a hook returns. They are logged
//!   by the registry and never propagated past it.
//!
//! # Usage
//!
//! ```no_run
//! use app_lifecycle::{Error, Result};
//!
//! fn close_database() -> Result<()> {
//!     let flushed = false;
//!     if !flushed {
//!         return Err(Error::io("database journal was not flushed"));
//!     }
//!     Ok(())
//! }
//! ```

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error code enum for categorizing and identifying errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    // Configuration errors: 1000-1999
    /// Configuration value failed validation
    ConfigInvalid = 1000,
    /// Configuration source could not be parsed
    ConfigParse = 1001,

    // Signal handling errors: 2000-2999
    /// OS signal stream could not be registered
    SignalRegisterFailed = 2000,

    // Shutdown errors: 3000-3999
    /// Shutdown round did not finish in time
    ShutdownTimeout = 3000,
    /// Shutdown round already started
    ShutdownAlreadyInProgress = 3001,
    /// Generic shutdown failure
    ShutdownFailed = 3002,
    /// Hook could not be registered
    HookRegistrationFailed = 3003,

    // Logging errors: 4000-4999
    /// Logger backend failed to initialize
    LoggerInitFailed = 4000,
    /// A global subscriber is already installed
    LoggerAlreadyInstalled = 4001,
    /// Logger was used after close
    LoggerClosed = 4002,

    // IO errors: 5000-5999
    /// Generic I/O failure
    IoError = 5000,

    // Runtime errors: 6000-6999
    /// No async runtime available
    MissingRuntime = 6004,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.as_str(), *self as i32)
    }
}

impl ErrorCode {
    /// Convert error code to string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::ConfigParse => "CONFIG_PARSE",

            Self::SignalRegisterFailed => "SIGNAL_REGISTER_FAILED",

            Self::ShutdownTimeout => "SHUTDOWN_TIMEOUT",
            Self::ShutdownAlreadyInProgress => "SHUTDOWN_ALREADY_IN_PROGRESS",
            Self::ShutdownFailed => "SHUTDOWN_FAILED",
            Self::HookRegistrationFailed => "HOOK_REGISTRATION_FAILED",

            Self::LoggerInitFailed => "LOGGER_INIT_FAILED",
            Self::LoggerAlreadyInstalled => "LOGGER_ALREADY_INSTALLED",
            Self::LoggerClosed => "LOGGER_CLOSED",

            Self::IoError => "IO_ERROR",

            Self::MissingRuntime => "MISSING_RUNTIME",
        }
    }
}

/// Error type for all engine operations.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration-related errors
    #[error("Configuration error [{code}]: {message}")]
    Config {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Signal handling errors
    #[error("Signal handling error [{code}]: {message}")]
    Signal {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Signal number if applicable
        signal: Option<i32>,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Shutdown coordination and hook errors
    #[error("Shutdown error [{code}]: {message}")]
    Shutdown {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Hook the error relates to, if any
        hook: Option<String>,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Logger construction and lifecycle errors
    #[error("Logging error [{code}]: {message}")]
    Logging {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// I/O operation errors
    #[error("I/O error [{code}]: {message}")]
    Io {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// Timeout errors
    #[error("Operation timed out [{code}] after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Operation that timed out
        operation: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Runtime errors
    #[error("Runtime error [{code}]: {message}")]
    Runtime {
        /// Error code for structured error handling
        code: ErrorCode,
        /// Human-readable error message
        message: String,
        /// Optional source error for better context
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
    },
}

impl Error {
    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            code: ErrorCode::ConfigInvalid,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new configuration error with specific code.
    pub fn config_with_code<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Config {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new signal error for a failed handler registration.
    pub fn signal_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        signal: i32,
        source: E,
    ) -> Self {
        Self::Signal {
            code: ErrorCode::SignalRegisterFailed,
            message: message.into(),
            signal: Some(signal),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new shutdown error.
    pub fn shutdown<S: Into<String>>(message: S) -> Self {
        Self::Shutdown {
            code: ErrorCode::ShutdownFailed,
            message: message.into(),
            hook: None,
            source: None,
        }
    }

    /// Create a new shutdown error attributed to a hook.
    pub fn hook<N: Into<String>, S: Into<String>>(code: ErrorCode, hook: N, message: S) -> Self {
        Self::Shutdown {
            code,
            message: message.into(),
            hook: Some(hook.into()),
            source: None,
        }
    }

    /// Create a new logging error.
    pub fn logging<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Logging {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new logging error with source error.
    pub fn logging_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Logging {
            code: ErrorCode::LoggerInitFailed,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new I/O error.
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            code: ErrorCode::IoError,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new I/O error with source error.
    pub fn io_with_source<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        message: S,
        source: E,
    ) -> Self {
        Self::Io {
            code: ErrorCode::IoError,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new runtime error with specific code.
    pub fn runtime_with_code<S: Into<String>>(code: ErrorCode, message: S) -> Self {
        Self::Runtime {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Create a new timeout error for a shutdown round that outlived its deadline.
    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            code: ErrorCode::ShutdownTimeout,
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Get the error code.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Config { code, .. }
            | Self::Signal { code, .. }
            | Self::Shutdown { code, .. }
            | Self::Logging { code, .. }
            | Self::Io { code, .. }
            | Self::Timeout { code, .. }
            | Self::Runtime { code, .. } => *code,
        }
    }

    /// Check if this error is a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if this error is configuration-related.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Get the error category for logging.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Signal { .. } => "signal",
            Self::Shutdown { .. } => "shutdown",
            Self::Logging { .. } => "logging",
            Self::Io { .. } => "io",
            Self::Runtime { .. } => "runtime",
            Self::Timeout { .. } => "timeout",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::io_with_source("I/O operation failed", err)
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::config_with_code(
            ErrorCode::ConfigParse,
            format!("Configuration loading failed: {err}"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::config("test message");
        assert!(err.is_config_error());
        assert_eq!(err.category(), "config");
        assert_eq!(err.code(), ErrorCode::ConfigInvalid);
    }

    #[test]
    fn test_timeout_error() {
        let err = Error::timeout("completion", 5000);
        assert!(err.is_timeout());
        assert_eq!(err.category(), "timeout");
        assert_eq!(err.code(), ErrorCode::ShutdownTimeout);
        assert_eq!(
            err.to_string(),
            "Operation timed out [SHUTDOWN_TIMEOUT(3000)] after 5000ms: completion"
        );
    }

    #[test]
    fn test_hook_error_carries_name() {
        let err = Error::hook(ErrorCode::ShutdownAlreadyInProgress, "db", "too late");
        match err {
            Error::Shutdown { hook, code, .. } => {
                assert_eq!(hook.as_deref(), Some("db"));
                assert_eq!(code, ErrorCode::ShutdownAlreadyInProgress);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        use std::error::Error as _;
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        assert_eq!(err.category(), "io");
        assert!(err.source().is_some());
    }
}
