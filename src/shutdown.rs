//! Graceful shutdown orchestration.
//!
//! The [`ShutdownRegistry`] decouples hook registration from hook execution.
//! Producers register named cleanup hooks at any time before shutdown. When
//! the engine's cancellation token fires, the registry takes a snapshot of
//! every registered hook and runs each one in its own task. It waits for all
//! of them (barrier) and then publishes a single completion signal.
//!
//! Hooks are independent teardowns (flush a logger, close a pool, stop a
//! server) and carry no ordering guarantee among each other. A hook that
//! fails, panics or exceeds the optional per-hook deadline is logged and
//! isolated; the round always completes.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{debug, error, info, warn, Instrument};

use crate::error::{Error, ErrorCode, Result};

/// Future returned by an async shutdown hook.
pub type HookFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

enum HookKind {
    Async(Box<dyn FnOnce() -> HookFuture + Send>),
    Blocking(Box<dyn FnOnce() -> Result<()> + Send>),
}

/// A one-shot cleanup callback run during shutdown.
pub struct Hook {
    kind: HookKind,
}

impl Hook {
    /// Wrap an async cleanup operation.
    pub fn new<F, Fut>(hook: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            kind: HookKind::Async(Box::new(move || Box::pin(hook()) as HookFuture)),
        }
    }

    /// Wrap a synchronous cleanup operation. It runs on the blocking pool so
    /// it may block on I/O without stalling other hooks.
    pub fn blocking<F>(hook: F) -> Self
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        Self {
            kind: HookKind::Blocking(Box::new(hook)),
        }
    }

    /// Whether this hook runs on the blocking pool.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        matches!(self.kind, HookKind::Blocking(_))
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_blocking() { "blocking" } else { "async" };
        f.debug_struct("Hook").field("kind", &kind).finish()
    }
}

/// Result of running one hook during a shutdown round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// The hook returned `Ok`
    Completed,
    /// The hook returned an error
    Failed(String),
    /// The hook panicked
    Panicked(String),
    /// The hook exceeded the per-hook deadline and was abandoned
    TimedOut,
}

impl HookOutcome {
    /// Whether the hook finished successfully.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for HookOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(e) => write!(f, "failed: {e}"),
            Self::Panicked(e) => write!(f, "panicked: {e}"),
            Self::TimedOut => write!(f, "timed out"),
        }
    }
}

/// The two operations collaborators need from a shutdown orchestrator.
pub trait Lifecycle: Send + Sync + fmt::Debug {
    /// Register a hook under `name`. Re-registering an existing name keeps
    /// the first hook and still succeeds.
    ///
    /// # Errors
    ///
    /// Implementations may reject registration, for instance once the
    /// shutdown round has started.
    fn register(&self, name: &str, hook: Hook) -> Result<()>;

    /// Handle that resolves once the shutdown round has finished.
    fn done(&self) -> Completion;
}

/// Write-once completion signal; any number of clones can wait on it.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<bool>,
}

impl Completion {
    /// Check, without waiting, if the shutdown round has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the shutdown round has finished.
    ///
    /// Also returns if the orchestrator was dropped without ever running,
    /// since nothing could signal completion afterwards.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|done| *done).await.is_err() {
            debug!("Shutdown orchestrator dropped before completion");
        }
    }

    /// Wait for completion with a deadline.
    ///
    /// # Errors
    ///
    /// Returns a `Timeout` error if the round has not finished in time.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                Error::timeout("Waiting for shutdown completion", timeout_ms)
            })
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    hooks: HashMap<String, Hook>,
    registered: usize,
    started: bool,
}

#[derive(Debug)]
struct RegistryInner {
    state: Mutex<RegistryState>,
    /// Per-hook deadline in milliseconds, 0 when disabled
    hook_timeout_ms: AtomicU64,
    started_at: Mutex<Option<Instant>>,
    finished_at: Mutex<Option<Instant>>,
    outcomes: Mutex<Vec<(String, HookOutcome)>>,
    done_tx: watch::Sender<bool>,
}

impl RegistryInner {
    fn hook_timeout(&self) -> Option<Duration> {
        match self.hook_timeout_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Run every hook from the snapshot and publish completion.
    async fn run_round(self: Arc<Self>) {
        let snapshot: Vec<(String, Hook)> = {
            let mut state = self.state.lock();
            if state.started {
                debug!("Shutdown round already started, ignoring");
                return;
            }
            state.started = true;
            state.hooks.drain().collect()
        };

        let started = Instant::now();
        *self.started_at.lock() = Some(started);
        let timeout = self.hook_timeout();
        info!(hooks = snapshot.len(), timeout = ?timeout, "Shutting down in progress");

        let units = snapshot.into_iter().map(|(name, hook)| async move {
            let outcome = execute(&name, hook, timeout).await;
            (name, outcome)
        });
        let results = join_all(units).await;

        let failed = results.iter().filter(|(_, o)| !o.is_success()).count();
        self.outcomes.lock().extend(results);
        *self.finished_at.lock() = Some(Instant::now());

        info!(elapsed = ?started.elapsed(), failed, "Shutdown is over");
        self.done_tx.send_replace(true);
    }
}

/// Run one hook in its own task and classify how it ended.
async fn execute(name: &str, hook: Hook, timeout: Option<Duration>) -> HookOutcome {
    let started = Instant::now();
    let mut handle = match hook.kind {
        HookKind::Async(hook) => tokio::spawn(
            async move { hook().await }
                .in_current_span()
                .with_current_subscriber(),
        ),
        HookKind::Blocking(hook) => {
            let dispatch = tracing::dispatcher::get_default(Clone::clone);
            let span = tracing::Span::current();
            tokio::task::spawn_blocking(move || {
                tracing::dispatcher::with_default(&dispatch, || span.in_scope(hook))
            })
        }
    };

    let joined = match timeout {
        Some(limit) => {
            let result = tokio::time::timeout(limit, &mut handle).await;
            if let Ok(joined) = result {
                joined
            } else {
                // Blocking hooks cannot be interrupted; they are abandoned.
                handle.abort();
                warn!(hook = %name, timeout = ?limit, "Hook exceeded its deadline and was abandoned");
                return HookOutcome::TimedOut;
            }
        }
        None => handle.await,
    };

    let outcome = match joined {
        Ok(Ok(())) => HookOutcome::Completed,
        Ok(Err(e)) => HookOutcome::Failed(e.to_string()),
        Err(e) if e.is_panic() => HookOutcome::Panicked(panic_message(e.into_panic())),
        Err(e) => HookOutcome::Failed(format!("hook task cancelled: {e}")),
    };

    match &outcome {
        HookOutcome::Completed => {
            info!(hook = %name, elapsed = ?started.elapsed(), "Graceful shutdown of hook completed successfully");
        }
        HookOutcome::Failed(e) => {
            error!(hook = %name, error = %e, "Error during graceful shutdown of hook");
        }
        HookOutcome::Panicked(e) => {
            error!(hook = %name, panic = %e, "Hook panicked during graceful shutdown");
        }
        HookOutcome::TimedOut => {}
    }
    outcome
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Registry of named shutdown hooks, run concurrently once cancellation fires.
#[derive(Debug, Clone)]
pub struct ShutdownRegistry {
    inner: Arc<RegistryInner>,
}

impl ShutdownRegistry {
    /// Create a registry that is only triggered through
    /// [`ShutdownRegistry::shutdown_all`].
    #[must_use]
    pub fn new(hook_timeout: Option<Duration>) -> Self {
        let (done_tx, _) = watch::channel(false);
        let hook_timeout_ms = hook_timeout.map_or(0, |t| {
            u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1)
        });

        Self {
            inner: Arc::new(RegistryInner {
                state: Mutex::new(RegistryState::default()),
                hook_timeout_ms: AtomicU64::new(hook_timeout_ms),
                started_at: Mutex::new(None),
                finished_at: Mutex::new(None),
                outcomes: Mutex::new(Vec::new()),
                done_tx,
            }),
        }
    }

    /// Create a registry whose shutdown round starts when `token` is cancelled.
    ///
    /// The round and its hooks log through the subscriber and span that are
    /// current when this is called.
    ///
    /// # Errors
    ///
    /// Returns `MissingRuntime` when called outside a tokio runtime.
    pub fn with_token(token: CancellationToken, hook_timeout: Option<Duration>) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::runtime_with_code(
                ErrorCode::MissingRuntime,
                "Shutdown registry requires a tokio runtime",
            )
        })?;

        let registry = Self::new(hook_timeout);
        let inner = Arc::clone(&registry.inner);
        handle.spawn(
            async move {
                token.cancelled().await;
                inner.run_round().await;
            }
            .in_current_span()
            .with_current_subscriber(),
        );
        Ok(registry)
    }

    /// Register a hook under `name`.
    ///
    /// A name that is already registered keeps its first hook; the new one
    /// is dropped and the call still succeeds.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownAlreadyInProgress` once the shutdown round has started.
    pub fn register(&self, name: &str, hook: Hook) -> Result<()> {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if state.started {
            warn!(hook = %name, "Rejected hook registration, shutdown already in progress");
            return Err(Error::hook(
                ErrorCode::ShutdownAlreadyInProgress,
                name,
                "Cannot register a hook after shutdown has started",
            ));
        }

        match state.hooks.entry(name.to_string()) {
            Entry::Occupied(_) => {
                debug!(hook = %name, "Hook already registered, keeping the first registration");
            }
            Entry::Vacant(slot) => {
                slot.insert(hook);
                state.registered += 1;
                debug!(hook = %name, "Registered shutdown hook");
            }
        }
        Ok(())
    }

    /// Register an async hook from a closure.
    ///
    /// # Errors
    ///
    /// See [`ShutdownRegistry::register`].
    pub fn register_fn<F, Fut>(&self, name: &str, hook: F) -> Result<()>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.register(name, Hook::new(hook))
    }

    /// Register a synchronous hook from a closure.
    ///
    /// # Errors
    ///
    /// See [`ShutdownRegistry::register`].
    pub fn register_blocking<F>(&self, name: &str, hook: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.register(name, Hook::blocking(hook))
    }

    /// Run the shutdown round now (if it has not started) and wait for completion.
    ///
    /// The round runs in its own task. Dropping this future abandons the
    /// wait, never the round: completion is still published once every
    /// hook has returned.
    pub async fn shutdown_all(&self) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(
            inner
                .run_round()
                .in_current_span()
                .with_current_subscriber(),
        );
        self.done().wait().await;
    }

    /// Handle resolving once every hook of the round has finished.
    #[must_use]
    pub fn done(&self) -> Completion {
        Completion {
            rx: self.inner.done_tx.subscribe(),
        }
    }

    /// Check if the shutdown round has started.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.state.lock().started
    }

    /// Names of hooks waiting for the shutdown round.
    #[must_use]
    pub fn pending_hooks(&self) -> Vec<String> {
        self.inner.state.lock().hooks.keys().cloned().collect()
    }

    /// Update the per-hook deadline; applies to a round that has not started yet.
    pub fn update_hook_timeout(&self, hook_timeout: Option<Duration>) {
        let ms = hook_timeout.map_or(0, |t| {
            u64::try_from(t.as_millis()).unwrap_or(u64::MAX).max(1)
        });
        self.inner.hook_timeout_ms.store(ms, Ordering::Release);
        debug!(timeout = ?hook_timeout, "Updated hook timeout");
    }

    /// Get statistics about the shutdown round.
    #[must_use]
    pub fn get_stats(&self) -> ShutdownStats {
        let (total_hooks, is_started) = {
            let state = self.inner.state.lock();
            (state.registered, state.started)
        };
        let started_at = *self.inner.started_at.lock();
        let finished_at = *self.inner.finished_at.lock();

        ShutdownStats {
            is_started,
            is_complete: self.done().is_done(),
            total_hooks,
            started_at,
            duration: started_at.zip(finished_at).map(|(s, f)| f.duration_since(s)),
            outcomes: self.inner.outcomes.lock().clone(),
        }
    }
}

impl Lifecycle for ShutdownRegistry {
    fn register(&self, name: &str, hook: Hook) -> Result<()> {
        Self::register(self, name, hook)
    }

    fn done(&self) -> Completion {
        Self::done(self)
    }
}

/// Statistics about the shutdown round.
#[derive(Debug, Clone)]
pub struct ShutdownStats {
    /// Whether the round has started
    pub is_started: bool,
    /// Whether the completion signal has been published
    pub is_complete: bool,
    /// Number of distinct hooks registered
    pub total_hooks: usize,
    /// Time when the round started
    pub started_at: Option<Instant>,
    /// Time from round start to completion
    pub duration: Option<Duration>,
    /// Outcome of each hook, in completion order of the join
    pub outcomes: Vec<(String, HookOutcome)>,
}

impl ShutdownStats {
    /// Outcome recorded for the named hook.
    #[must_use]
    pub fn outcome(&self, name: &str) -> Option<&HookOutcome> {
        self.outcomes
            .iter()
            .find(|(hook, _)| hook == name)
            .map(|(_, outcome)| outcome)
    }

    /// Number of hooks that completed successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.is_success()).count()
    }

    /// Number of hooks that failed, panicked or timed out.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}
