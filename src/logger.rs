//! Structured logger adapter.
//!
//! [`TracingLogger`] owns a `tracing` [`Dispatch`] built with
//! `tracing-subscriber`. Events are written to stdout or to a size-rotated
//! file, and the logger is closed as a shutdown hook so buffered output is
//! flushed before the process exits. After close, writes are dropped.

use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{Dispatch, Span};
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{Config, LogConfig, LogLevel};
use crate::error::{Error, ErrorCode, Result};

/// Hook name of the default logger.
pub const DEFAULT_LOGGER_HOOK: &str = "logger";

/// Hook name of the CLI logger.
pub const CLI_LOGGER_HOOK: &str = "logger-cli";

/// A structured logger the engine can own and close during shutdown.
pub trait Logger: Send + Sync + fmt::Debug {
    /// Name under which the logger's close hook is registered.
    fn hook_name(&self) -> &str;

    /// Dispatcher that events should be routed through.
    fn dispatch(&self) -> &Dispatch;

    /// Span carrying the application identity; `Span::none()` if unused.
    fn root_span(&self) -> &Span;

    /// Flush buffered output.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer cannot be flushed.
    fn flush(&self) -> Result<()>;

    /// Flush and close the output. Further events are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&self) -> Result<()>;

    /// Install the dispatcher as the process-wide default subscriber.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if a global subscriber is already set.
    fn install_global(&self) -> Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch().clone()).map_err(|e| {
            Error::config_with_code(
                ErrorCode::LoggerAlreadyInstalled,
                format!("Failed to install global logger: {e}"),
            )
        })
    }
}

#[derive(Debug)]
struct RotatingFileInner {
    file: File,
    path: PathBuf,
    max_size: u64,
    max_files: u32,
    size: u64,
}

/// Append-only log file rotated to `<path>.1 .. <path>.N` once it grows past
/// `max_size` bytes.
#[derive(Debug, Clone)]
struct RotatingFileWriter {
    inner: Arc<Mutex<RotatingFileInner>>,
}

impl RotatingFileWriter {
    fn new(path: PathBuf, max_size: Option<u64>, max_files: Option<u32>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFileInner {
                file,
                path,
                max_size: max_size.unwrap_or(u64::MAX),
                max_files: max_files.unwrap_or(0),
                size,
            })),
        })
    }

    fn rotate_locked(inner: &mut RotatingFileInner) -> io::Result<()> {
        if inner.max_files == 0 {
            return Ok(());
        }

        for idx in (1..=inner.max_files).rev() {
            let from = Self::rotated_path(&inner.path, idx - 1);
            let to = Self::rotated_path(&inner.path, idx);
            if from.exists() {
                let _ = std::fs::remove_file(&to);
                std::fs::rename(&from, &to)?;
            }
        }
        inner.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.path)?;
        inner.size = 0;
        Ok(())
    }

    fn rotated_path(path: &Path, idx: u32) -> PathBuf {
        if idx == 0 {
            return path.to_path_buf();
        }
        PathBuf::from(format!("{}.{idx}", path.display()))
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        // An empty file is never rotated, however large the record
        if inner.size > 0 && inner.size.saturating_add(buf.len() as u64) > inner.max_size {
            Self::rotate_locked(&mut inner)?;
        }

        let written = inner.file.write(buf)?;
        inner.size = inner.size.saturating_add(written as u64);
        Ok(written)
    }

    fn flush(&self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

#[derive(Debug, Clone)]
enum Target {
    Stdout,
    File(RotatingFileWriter),
}

/// `MakeWriter` that stops producing output once the logger is closed.
#[derive(Debug, Clone)]
struct LogSink {
    target: Target,
    closed: Arc<AtomicBool>,
}

impl LogSink {
    const fn is_terminal(&self) -> bool {
        matches!(self.target, Target::Stdout)
    }

    fn flush(&self) -> io::Result<()> {
        match &self.target {
            Target::Stdout => io::stdout().flush(),
            Target::File(file) => file.flush(),
        }
    }
}

enum SinkWriter {
    Stdout(io::Stdout),
    File(RotatingFileWriter),
    Closed,
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::File(file) => file.write(buf),
            Self::Closed => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::File(file) => file.flush(),
            Self::Closed => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = SinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        if self.closed.load(Ordering::Acquire) {
            return SinkWriter::Closed;
        }
        match &self.target {
            Target::Stdout => SinkWriter::Stdout(io::stdout()),
            Target::File(file) => SinkWriter::File(file.clone()),
        }
    }
}

/// [`Logger`] backed by a `tracing-subscriber` fmt subscriber.
#[derive(Debug)]
pub struct TracingLogger {
    hook_name: &'static str,
    dispatch: Dispatch,
    root_span: Span,
    sink: LogSink,
}

impl TracingLogger {
    /// Build the default logger for an application.
    ///
    /// Format, colors and level follow [`Config::is_json_logging`],
    /// [`Config::is_colored_logging`] and [`Config::effective_log_level`]:
    /// JSON outside development unless in CLI mode or `logging.json` says
    /// otherwise, and DEBUG when the debug flag is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened, or JSON output is
    /// requested without the `json-logs` feature.
    pub fn new(config: &Config) -> Result<Self> {
        let sink = Self::sink(&config.logging)?;
        let level = config.effective_log_level();
        let identity = &config.identity;

        let dispatch = if config.is_json_logging() {
            Self::json_dispatch(level, sink.clone())?
        } else {
            let subscriber = FmtSubscriber::builder()
                .with_env_filter(Self::filter(level))
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(sink.clone())
                .with_ansi(config.is_colored_logging() && sink.is_terminal())
                .compact()
                .finish();
            Dispatch::new(subscriber)
        };

        let root_span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!(
                "app",
                app = %identity.name,
                version = %identity.version,
                env = %identity.env,
            )
        });

        Ok(Self {
            hook_name: DEFAULT_LOGGER_HOOK,
            dispatch,
            root_span,
            sink,
        })
    }

    /// Build a terse logger for command line tools: no timestamps, no
    /// targets, no span context.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be opened.
    pub fn for_cli(config: &Config) -> Result<Self> {
        let sink = Self::sink(&config.logging)?;
        let level = config.effective_log_level();

        let subscriber = FmtSubscriber::builder()
            .with_env_filter(Self::filter(level))
            .with_target(false)
            .without_time()
            .with_writer(sink.clone())
            .with_ansi(config.logging.color && sink.is_terminal())
            .compact()
            .finish();

        Ok(Self {
            hook_name: CLI_LOGGER_HOOK,
            dispatch: Dispatch::new(subscriber),
            root_span: Span::none(),
            sink,
        })
    }

    /// Check if the logger has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sink.closed.load(Ordering::Acquire)
    }

    fn sink(config: &LogConfig) -> Result<LogSink> {
        let target = match &config.file {
            Some(path) => Target::File(
                RotatingFileWriter::new(path.clone(), config.max_file_size, config.max_files)
                    .map_err(|e| {
                        Error::logging_with_source(
                            format!("Failed to initialize log file at {}", path.display()),
                            e,
                        )
                    })?,
            ),
            None => Target::Stdout,
        };
        Ok(LogSink {
            target,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn filter(level: LogLevel) -> EnvFilter {
        let level: tracing::Level = level.into();
        EnvFilter::from_default_env().add_directive(level.into())
    }

    #[cfg(feature = "json-logs")]
    fn json_dispatch(level: LogLevel, sink: LogSink) -> Result<Dispatch> {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(Self::filter(level))
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(sink)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .finish();
        Ok(Dispatch::new(subscriber))
    }

    #[cfg(not(feature = "json-logs"))]
    fn json_dispatch(_level: LogLevel, _sink: LogSink) -> Result<Dispatch> {
        Err(Error::logging(
            ErrorCode::LoggerInitFailed,
            "JSON logging requested but feature not enabled",
        ))
    }
}

impl Logger for TracingLogger {
    fn hook_name(&self) -> &str {
        self.hook_name
    }

    fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    fn root_span(&self) -> &Span {
        &self.root_span
    }

    fn flush(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::logging(ErrorCode::LoggerClosed, "Logger is closed"));
        }
        self.sink
            .flush()
            .map_err(|e| Error::io_with_source("Failed to flush log output", e))
    }

    fn close(&self) -> Result<()> {
        if self.sink.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.sink
            .flush()
            .map_err(|e| Error::io_with_source("Failed to flush log output on close", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Identity;

    fn file_config(path: &Path, env: &str, debug: bool) -> Config {
        Config {
            identity: Identity::new("svc", "1.2.3", env, debug),
            logging: LogConfig {
                file: Some(path.to_path_buf()),
                color: false,
                ..LogConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_hook_names() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir.path().join("app.log"), "development", false);

        let logger = TracingLogger::new(&config).unwrap();
        assert_eq!(logger.hook_name(), DEFAULT_LOGGER_HOOK);

        let cli = TracingLogger::for_cli(&config).unwrap();
        assert_eq!(cli.hook_name(), CLI_LOGGER_HOOK);
        assert!(cli.root_span().is_none());
    }

    #[cfg(feature = "json-logs")]
    #[test]
    fn test_json_events_carry_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = TracingLogger::new(&file_config(&path, "production", false)).unwrap();

        tracing::dispatcher::with_default(logger.dispatch(), || {
            logger.root_span().in_scope(|| {
                tracing::info!(answer = 42, "service started");
                tracing::debug!("filtered out at info");
            });
        });
        logger.flush().unwrap();

        let output = std::fs::read_to_string(&path).unwrap();
        assert!(output.contains("service started"));
        assert!(output.contains("\"app\":\"svc\""));
        assert!(output.contains("\"version\":\"1.2.3\""));
        assert!(output.contains("\"env\":\"production\""));
        assert!(!output.contains("filtered out"));
    }

    #[test]
    fn test_debug_flag_raises_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = TracingLogger::new(&file_config(&path, "development", true)).unwrap();

        tracing::dispatcher::with_default(logger.dispatch(), || {
            tracing::debug!("visible in debug mode");
        });
        logger.flush().unwrap();

        let output = std::fs::read_to_string(&path).unwrap();
        assert!(output.contains("visible in debug mode"));
    }

    #[test]
    fn test_close_drops_further_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = TracingLogger::new(&file_config(&path, "development", false)).unwrap();

        tracing::dispatcher::with_default(logger.dispatch(), || {
            tracing::info!("before close");
        });
        logger.close().unwrap();
        assert!(logger.is_closed());
        // Closing twice is harmless
        logger.close().unwrap();

        tracing::dispatcher::with_default(logger.dispatch(), || {
            tracing::info!("after close");
        });

        let output = std::fs::read_to_string(&path).unwrap();
        assert!(output.contains("before close"));
        assert!(!output.contains("after close"));

        let err = logger.flush().unwrap_err();
        assert_eq!(err.code(), ErrorCode::LoggerClosed);
    }

    #[test]
    fn test_file_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rotate.log");
        let writer = RotatingFileWriter::new(path.clone(), Some(16), Some(2)).unwrap();

        writer.write(b"0123456789").unwrap();
        writer.write(b"0123456789").unwrap();
        writer.write(b"abcdefghij").unwrap();
        writer.flush().unwrap();

        assert!(path.exists());
        assert!(RotatingFileWriter::rotated_path(&path, 1).exists());
        assert!(RotatingFileWriter::rotated_path(&path, 2).exists());
        assert!(!RotatingFileWriter::rotated_path(&path, 3).exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "abcdefghij");
    }

    #[test]
    fn test_oversized_record_not_rotated_from_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.log");
        let writer = RotatingFileWriter::new(path.clone(), Some(8), Some(3)).unwrap();

        writer.write(b"a record longer than the limit").unwrap();
        writer.flush().unwrap();

        assert!(!RotatingFileWriter::rotated_path(&path, 1).exists());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "a record longer than the limit"
        );

        // The next write rotates the full file away
        writer.write(b"next").unwrap();
        assert!(RotatingFileWriter::rotated_path(&path, 1).exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "next");
    }

    #[test]
    fn test_cli_mode_keeps_text_output_outside_development() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.log");
        let mut config = file_config(&path, "production", false);
        config.cli_mode = true;
        assert!(!config.is_json_logging());

        let logger = TracingLogger::new(&config).unwrap();
        tracing::dispatcher::with_default(logger.dispatch(), || {
            logger.root_span().in_scope(|| tracing::info!("plain text line"));
        });
        logger.flush().unwrap();

        let output = std::fs::read_to_string(&path).unwrap();
        assert!(output.contains("plain text line"));
        assert!(!output.trim_start().starts_with('{'));
        assert!(!output.contains("\"app\":"));
    }

    #[test]
    fn test_explicit_json_setting_wins_over_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("text.log");
        let mut config = file_config(&path, "production", false);
        config.logging.json = Some(false);

        let logger = TracingLogger::new(&config).unwrap();
        tracing::dispatcher::with_default(logger.dispatch(), || tracing::warn!("forced text"));
        logger.flush().unwrap();

        let output = std::fs::read_to_string(&path).unwrap();
        assert!(output.contains("forced text"));
        assert!(!output.trim_start().starts_with('{'));
    }

    #[test]
    fn test_missing_log_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir.path().join("missing").join("app.log"), "development", false);

        let err = TracingLogger::new(&config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::LoggerInitFailed);
    }

    #[test]
    fn test_install_global_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(&dir.path().join("global.log"), "development", false);
        let first = TracingLogger::new(&config).unwrap();
        let second = TracingLogger::new(&config).unwrap();

        assert!(first.install_global().is_ok());
        let err = second.install_global().unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(err.code(), ErrorCode::LoggerAlreadyInstalled);
    }
}
