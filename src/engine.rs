//! Runtime engine: identity, logger, cancellation and shutdown wired together.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, Instrument};

use crate::config::{whole_millis, Config, Identity};
use crate::error::{Error, ErrorCode, Result};
use crate::logger::{Logger, TracingLogger};
use crate::shutdown::{Hook, Lifecycle, ShutdownRegistry};
use crate::signal::{CancellationSource, ShutdownReason};

/// Fallback when no user can be read from the environment.
const DEFAULT_USER: &str = "default-user";

/// Application engine owning the identity, logger, cancellation source and
/// shutdown lifecycle.
#[derive(Debug, Clone)]
pub struct Engine {
    config: Arc<Config>,
    cancellation: CancellationSource,
    lifecycle: Arc<dyn Lifecycle>,
    logger: Option<Arc<dyn Logger>>,
    started_at: Instant,
}

impl Engine {
    /// Create a new engine builder with default configuration.
    #[must_use]
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a builder seeded from `APP_NAME`, `APP_VERSION`, `APP_ENV` and `APP_DEBUG`.
    ///
    /// # Errors
    ///
    /// Will return an error if an environment variable cannot be parsed.
    pub fn from_env() -> Result<EngineBuilder> {
        EngineBuilder::from_env()
    }

    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.identity.name
    }

    /// Application version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.config.identity.version
    }

    /// Environment tag.
    #[must_use]
    pub fn env(&self) -> &str {
        &self.config.identity.env
    }

    /// Whether debug mode is enabled.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.config.identity.debug
    }

    /// Whether the engine runs as a command line tool.
    #[must_use]
    pub fn cli_mode(&self) -> bool {
        self.config.cli_mode
    }

    /// Application identity.
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.config.identity
    }

    /// Get the engine configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token cancelled when the application should stop.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.token()
    }

    /// Reason recorded by the first cancellation, if any.
    #[must_use]
    pub fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.cancellation.reason()
    }

    /// Shutdown lifecycle used to register hooks.
    #[must_use]
    pub fn lifecycle(&self) -> &Arc<dyn Lifecycle> {
        &self.lifecycle
    }

    /// Logger owned by the engine, if one was configured.
    #[must_use]
    pub fn logger(&self) -> Option<&Arc<dyn Logger>> {
        self.logger.as_ref()
    }

    /// Replace the logger. The new logger's close hook is not registered.
    pub fn set_logger(&mut self, logger: Arc<dyn Logger>) {
        self.logger = Some(logger);
    }

    /// Replace the shutdown lifecycle.
    pub fn set_lifecycle(&mut self, lifecycle: Arc<dyn Lifecycle>) {
        self.lifecycle = lifecycle;
    }

    /// User running the process, read from `USER` or `USERNAME`.
    #[must_use]
    pub fn current_user(&self) -> String {
        ["USER", "USERNAME"]
            .iter()
            .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| DEFAULT_USER.to_string())
    }

    /// User agent string, `<name>/<version>`.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.name(), self.version())
    }

    /// Time since the engine was built.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Check if the engine is still running (not yet cancelled).
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancellation.is_cancelled()
    }

    /// Request graceful shutdown programmatically.
    ///
    /// Returns true if this call triggered the shutdown.
    pub fn shutdown(&self) -> bool {
        self.cancellation.cancel()
    }

    /// Wait until cancellation has been triggered.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Wait for cancellation, then for every shutdown hook to finish.
    pub async fn wait(&self) {
        let wait = async {
            self.cancellation.cancelled().await;
            let reason = self
                .cancellation
                .reason()
                .map_or_else(|| "unknown".to_string(), |r| r.to_string());
            info!(%reason, "Stop requested, waiting for shutdown hooks");

            self.lifecycle.done().wait().await;
            debug!(uptime = ?self.uptime(), "Shutdown complete");
        };

        match &self.logger {
            Some(logger) => {
                wait.instrument(logger.root_span().clone())
                    .with_subscriber(logger.dispatch().clone())
                    .await;
            }
            None => wait.await,
        }
    }
}

/// Which logger the builder should attach.
#[derive(Debug, Clone, Default)]
enum LoggerChoice {
    #[default]
    None,
    Default,
    Cli,
    Custom(Arc<dyn Logger>),
}

/// Builder for creating engine instances with a fluent API.
///
/// Options apply in call order; identity defaults are filled in by
/// [`EngineBuilder::build`] after every option.
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    config: Config,
    logger: LoggerChoice,
    lifecycle: Option<Arc<dyn Lifecycle>>,
}

impl EngineBuilder {
    /// Create a new engine builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a builder seeded from the `APP_*` environment variables.
    ///
    /// # Errors
    ///
    /// Will return an error if an environment variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new().with_config(Config::from_env()?))
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

    /// Mark the engine as a command line tool.
    #[must_use]
    pub const fn cli_mode(mut self, enabled: bool) -> Self {
        self.config.cli_mode = enabled;
        self
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Use a custom logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = LoggerChoice::Custom(logger);
        self
    }

    /// Build the default [`TracingLogger`] from the identity and logging settings.
    #[must_use]
    pub fn with_default_logger(mut self) -> Self {
        self.logger = LoggerChoice::Default;
        self
    }

    /// Build the terse CLI [`TracingLogger`] and switch on CLI mode.
    #[must_use]
    pub fn with_cli_logger(mut self) -> Self {
        self.config.cli_mode = true;
        self.logger = LoggerChoice::Cli;
        self
    }

    /// Use a custom shutdown lifecycle instead of the built-in registry.
    ///
    /// The custom lifecycle is responsible for observing cancellation itself,
    /// for instance through [`Engine::cancellation_token`].
    #[must_use]
    pub fn with_lifecycle(mut self, lifecycle: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    /// Abandon any shutdown hook running longer than `timeout`.
    #[must_use]
    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown.hook_timeout_ms = Some(whole_millis(timeout).unwrap_or(u64::MAX));
        self
    }

    /// Disable SIGINT/SIGTERM handling; only [`Engine::shutdown`] stops the engine.
    #[must_use]
    pub const fn without_signals(mut self) -> Self {
        self.config.shutdown.disable_signals = true;
        self
    }

    /// Build the engine.
    ///
    /// Must be called inside a tokio runtime. Does not block.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the logger cannot be
    /// created, signal handlers cannot be installed, or the logger's close
    /// hook is rejected by the lifecycle.
    pub fn build(self) -> Result<Engine> {
        tokio::runtime::Handle::try_current().map_err(|_| {
            Error::runtime_with_code(ErrorCode::MissingRuntime, "Engine requires a tokio runtime")
        })?;

        let mut config = self.config;
        config.identity = config.identity.with_defaults();
        config.validate()?;

        let logger: Option<Arc<dyn Logger>> = match self.logger {
            LoggerChoice::None => None,
            LoggerChoice::Default => Some(Arc::new(TracingLogger::new(&config)?)),
            LoggerChoice::Cli => Some(Arc::new(TracingLogger::for_cli(&config)?)),
            LoggerChoice::Custom(logger) => Some(logger),
        };

        let custom_lifecycle = self.lifecycle;
        let (cancellation, lifecycle) = match &logger {
            Some(logger) => tracing::dispatcher::with_default(logger.dispatch(), || {
                logger
                    .root_span()
                    .in_scope(|| Self::wire(&config, custom_lifecycle))
            }),
            None => Self::wire(&config, custom_lifecycle),
        }?;

        if let Some(logger) = &logger {
            let closing = Arc::clone(logger);
            if let Err(err) =
                lifecycle.register(logger.hook_name(), Hook::blocking(move || closing.close()))
            {
                // Stop the signal listener and orchestrator spawned by wire
                tracing::dispatcher::with_default(logger.dispatch(), || cancellation.cancel());
                return Err(err);
            }
        }

        Ok(Engine {
            config: Arc::new(config),
            cancellation,
            lifecycle,
            logger,
            started_at: Instant::now(),
        })
    }

    /// Build and wait until the engine has shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be built.
    pub async fn run(self) -> Result<()> {
        let engine = self.build()?;
        engine.wait().await;
        Ok(())
    }

    fn wire(
        config: &Config,
        lifecycle: Option<Arc<dyn Lifecycle>>,
    ) -> Result<(CancellationSource, Arc<dyn Lifecycle>)> {
        let cancellation = if config.shutdown.disable_signals {
            debug!("Signal handling disabled");
            CancellationSource::new()
        } else {
            CancellationSource::with_signals()?
        };

        let lifecycle: Arc<dyn Lifecycle> = match lifecycle {
            Some(lifecycle) => lifecycle,
            None => Arc::new(ShutdownRegistry::with_token(
                cancellation.token(),
                config.hook_timeout(),
            )?),
        };

        info!(
            app = %config.identity.name,
            version = %config.identity.version,
            env = %config.identity.env,
            debug = config.identity.debug,
            "Engine initialized"
        );
        Ok((cancellation, lifecycle))
    }
}
