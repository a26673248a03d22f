//! Signal-driven cancellation.
//!
//! A [`CancellationSource`] owns the engine's single [`CancellationToken`].
//! The token is cancelled exactly once, either by an explicit call or by the
//! background listener when the process receives SIGINT or SIGTERM (Ctrl+C on
//! Windows). The listener stops and drops its signal streams as soon as the
//! token is cancelled through any path, so no OS handler is left feeding a
//! dead task.

use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, info, Instrument};

use crate::error::{Error, ErrorCode, Result};

/// SIGINT signal number.
pub const SIGINT: i32 = 2;

/// SIGTERM signal number.
pub const SIGTERM: i32 = 15;

/// Reason for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Cancellation triggered by a signal (SIGTERM, SIGINT)
    Signal(i32),
    /// Cancellation requested programmatically
    Requested,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal(sig) => write!(f, "Signal({sig})"),
            Self::Requested => write!(f, "Requested"),
        }
    }
}

/// Helper function to get a human-readable description of a signal.
#[must_use]
pub const fn signal_description(signal: i32) -> &'static str {
    match signal {
        SIGINT => "SIGINT (Interrupt/Ctrl+C)",
        SIGTERM => "SIGTERM (Terminate)",
        _ => "Unknown signal",
    }
}

#[derive(Debug)]
struct CancellationInner {
    token: CancellationToken,
    fired: AtomicBool,
    reason: ArcSwapOption<ShutdownReason>,
}

impl CancellationInner {
    fn request(&self, reason: ShutdownReason) -> bool {
        if self.token.is_cancelled() {
            // Cancelled through the token, never through this source
            self.fired.store(true, Ordering::Release);
            debug!(%reason, "Token already cancelled, ignoring");
            return false;
        }
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.reason.store(Some(Arc::new(reason)));
            self.token.cancel();
            info!(%reason, "Cancellation requested");
            true
        } else {
            debug!(%reason, "Cancellation already requested, ignoring");
            false
        }
    }
}

/// Single cancellation event per engine, triggerable once, observable by many.
#[derive(Debug, Clone)]
pub struct CancellationSource {
    inner: Arc<CancellationInner>,
}

impl CancellationSource {
    /// Create a source without an OS signal listener.
    ///
    /// Only [`CancellationSource::cancel`] and
    /// [`CancellationSource::request_shutdown`] trigger it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CancellationInner {
                token: CancellationToken::new(),
                fired: AtomicBool::new(false),
                reason: ArcSwapOption::empty(),
            }),
        }
    }

    /// Create a source and spawn the termination signal listener.
    ///
    /// Signal streams are registered before this returns, so a signal
    /// delivered right after construction is not lost.
    ///
    /// # Errors
    ///
    /// Returns `MissingRuntime` when called outside a tokio runtime, or a
    /// `Signal` error if a signal stream cannot be registered.
    pub fn with_signals() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::runtime_with_code(
                ErrorCode::MissingRuntime,
                "Signal listener requires a tokio runtime",
            )
        })?;

        let source = Self::new();
        let listener = SignalListener::register()?;
        let inner = Arc::clone(&source.inner);
        handle.spawn(
            listener
                .run(inner)
                .in_current_span()
                .with_current_subscriber(),
        );
        Ok(source)
    }

    /// Cancel with [`ShutdownReason::Requested`].
    ///
    /// Returns true if this call triggered cancellation.
    pub fn cancel(&self) -> bool {
        self.inner.request(ShutdownReason::Requested)
    }

    /// Cancel with an explicit reason.
    ///
    /// Returns true if this call triggered cancellation, false if it had
    /// already been triggered.
    pub fn request_shutdown(&self, reason: ShutdownReason) -> bool {
        self.inner.request(reason)
    }

    /// Check if cancellation has been triggered.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Wait until cancellation; returns immediately if already cancelled.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }

    /// The reason recorded by the first cancellation.
    #[must_use]
    pub fn reason(&self) -> Option<ShutdownReason> {
        match self.inner.reason.load_full() {
            Some(reason) => Some(*reason),
            // The token itself was cancelled by a collaborator
            None if self.is_cancelled() => Some(ShutdownReason::Requested),
            None => None,
        }
    }

    /// The token collaborators observe to notice shutdown cooperatively.
    ///
    /// Cancelling this token directly also counts as a requested shutdown.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    /// A child token that is cancelled with the source but can also be
    /// cancelled on its own without affecting the engine.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.inner.token.child_token()
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Registered termination signal streams, consumed by the listener task.
struct SignalListener {
    #[cfg(unix)]
    sigterm: tokio::signal::unix::Signal,
    #[cfg(unix)]
    sigint: tokio::signal::unix::Signal,
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl SignalListener {
    #[cfg(unix)]
    fn register() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        let sigterm = signal(SignalKind::terminate()).map_err(|e| {
            Error::signal_with_source("Failed to register SIGTERM handler", SIGTERM, e)
        })?;
        let sigint = signal(SignalKind::interrupt()).map_err(|e| {
            Error::signal_with_source("Failed to register SIGINT handler", SIGINT, e)
        })?;

        debug!("Unix signal handlers registered (SIGTERM, SIGINT)");
        Ok(Self { sigterm, sigint })
    }

    #[cfg(windows)]
    fn register() -> Result<Self> {
        let ctrl_c = tokio::signal::windows::ctrl_c().map_err(|e| {
            Error::signal_with_source("Failed to register Ctrl+C handler", SIGINT, e)
        })?;

        debug!("Windows Ctrl+C handler registered");
        Ok(Self { ctrl_c })
    }

    #[cfg(unix)]
    async fn run(mut self, inner: Arc<CancellationInner>) {
        let token = inner.token.clone();
        tokio::select! {
            _ = self.sigterm.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                inner.request(ShutdownReason::Signal(SIGTERM));
            }
            _ = self.sigint.recv() => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                inner.request(ShutdownReason::Signal(SIGINT));
            }
            () = token.cancelled() => {
                debug!("Cancelled without a signal, stopping signal listener");
            }
        }
        // Dropping the streams here deregisters this listener.
    }

    #[cfg(windows)]
    async fn run(mut self, inner: Arc<CancellationInner>) {
        let token = inner.token.clone();
        tokio::select! {
            _ = self.ctrl_c.recv() => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                inner.request(ShutdownReason::Signal(SIGINT));
            }
            () = token.cancelled() => {
                debug!("Cancelled without a signal, stopping signal listener");
            }
        }
    }
}
