#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
//! # app-lifecycle: Application Bootstrap Engine
//!
//! A small runtime engine for services and command line tools: an
//! application identity, a structured logger, cancellation driven by
//! SIGINT/SIGTERM, and a registry of shutdown hooks that run concurrently
//! when the application is asked to stop.
//!
//! ## Key Features
//!
//! - **Graceful Shutdown**: named hooks fan out in parallel, a barrier waits for all of them,
//!   and a single completion signal is published
//! - **Failure Isolation**: a hook that errors, panics or overruns its deadline never blocks the rest
//! - **Signal Handling**: SIGINT and SIGTERM on Unix, Ctrl+C on Windows
//! - **Structured Logging**: tracing with JSON output outside development and size-rotated log files
//! - **Configuration**: builder API or `APP_*` environment variables through figment
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use app_lifecycle::{Engine, Hook, Lifecycle, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let engine = Engine::from_env()?.with_default_logger().build()?;
//!
//!     engine.lifecycle().register(
//!         "database",
//!         Hook::new(|| async {
//!             // close connections here
//!             Ok(())
//!         }),
//!     )?;
//!
//!     // Start servers and workers, watching engine.cancellation_token()
//!
//!     engine.wait().await;
//!     Ok(())
//! }
//! ```

// Private modules
mod config;
mod engine;
mod error;

// Public modules
pub mod logger;
pub mod shutdown;
pub mod signal;

// Public exports
pub use config::{
    Config, ConfigBuilder, Identity, LogConfig, LogLevel, ShutdownConfig, APP_DEBUG_ENV,
    APP_ENV_ENV, APP_NAME_ENV, APP_VERSION_ENV, DEFAULT_APP_ENV, DEFAULT_APP_NAME,
    DEFAULT_APP_VERSION,
};
pub use engine::{Engine, EngineBuilder};
pub use error::{Error, ErrorCode, Result};
pub use logger::{Logger, TracingLogger};
pub use shutdown::{Completion, Hook, HookOutcome, Lifecycle, ShutdownRegistry, ShutdownStats};
pub use signal::{CancellationSource, ShutdownReason};
pub use tokio_util::sync::CancellationToken;

/// Version of the app-lifecycle library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
