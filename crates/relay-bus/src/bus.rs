//! The bus: public API and command dispatch path.
//!
//! [`Bus`] is an explicit value — construct one per process (or per test)
//! and clone it freely; clones share the same underlying state. There is
//! no global singleton.
//!
//! # Command path
//!
//! ```text
//! execute ──► middleware chain ──► resolve ──► CommandStarted ──► breaker
//!                                                                    │
//!                CommandResult event ◄── retry loop ◄── handler ◄────┘
//! ```
//!
//! Command failures never surface as `Err`: every accepted command yields
//! exactly one [`CommandResult`], and callers inspect `success` and the
//! error kind.
//!
//! # Event path
//!
//! `publish` is prompt: the observability hook runs synchronously, the
//! filter chain may drop the event, and the bounded queue admits or
//! rejects it per the overflow policy. A single dispatch worker drains
//! batches and fans out to handlers by priority (see the `worker`
//! module).

use crate::config::BusConfig;
use crate::error::{validate_session_name, ConfigError, RegistryError, SessionError};
use crate::filter::EventFilter;
use crate::handler::{
    priority, CommandHandler, EventHandler, EventPredicate, HandlerKey,
};
use crate::metrics::{Counter, Gauge, MetricsCollector, MetricsSnapshot};
use crate::middleware::{CommandEndpoint, CommandMiddleware, Next};
use crate::observability::ObservabilityHook;
use crate::queue::{BoundedEventQueue, PutOutcome, QueueStats};
use crate::registry::{HandlerRegistry, RegistryStats};
use crate::resilience::{
    retry_delay, BreakerSet, BreakerStateInfo, CircuitState, DeadLetterEntry, DeadLetterQueue,
};
use crate::session::{SessionHandle, SessionManager};
use crate::worker;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use relay_message::{Command, CommandResult, ErrorKind, Event};
use relay_types::{CommandId, HandlerScope, SessionId};
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Why a published event did not reach the queue, without being an
/// admission failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// An event filter returned `false`.
    Filtered,
}

/// Why a published event was refused admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The bounded queue's overflow policy refused the event.
    QueueFull,
    /// The bus is stopping.
    ShuttingDown,
}

/// Outcome of a `publish` call. Always returned promptly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The event was admitted to the queue.
    Accepted,
    /// The event was dropped before enqueue.
    Dropped(DropReason),
    /// The event was refused admission.
    Rejected(RejectReason),
}

impl PublishOutcome {
    /// True when the event was admitted.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Point-in-time bus statistics.
#[derive(Debug, Clone, Serialize)]
pub struct BusStats {
    /// Whether the dispatch worker is running.
    pub running: bool,
    /// Current event queue size.
    pub queue_size: usize,
    /// Configured batch size.
    pub batch_size: usize,
    /// Configured batch timeout in milliseconds.
    pub batch_timeout_ms: u64,
    /// Registered command handlers across all scopes.
    pub command_handlers: usize,
    /// Registered event handlers across all scopes.
    pub event_handlers: usize,
    /// Open sessions.
    pub active_sessions: usize,
    /// Entries in the dead letter queue.
    pub dead_letter_queue_size: usize,
}

/// In-process async message bus.
///
/// Cheap to clone; all clones share the same registry, queue and metrics.
///
/// # Example
///
/// ```no_run
/// use relay_bus::Bus;
/// use relay_message::{Command, Event};
/// use relay_types::HandlerScope;
/// use serde_json::{json, Value};
/// use std::time::Duration;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = Bus::new(relay_bus::BusConfig::default())?;
/// bus.start().await;
///
/// bus.register_command_handler(
///     "Ping",
///     |_command: Command| async move { Ok::<Value, relay_bus::HandlerError>(json!("pong")) },
///     HandlerScope::Bus,
/// )?;
///
/// let result = bus.execute(Command::new("Ping", Value::Null)).await;
/// assert!(result.success);
///
/// bus.publish(Event::new("order.placed", json!({"order": 42})));
/// bus.stop(Duration::from_secs(1)).await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bus {
    inner: Arc<BusInner>,
}

pub(crate) struct BusInner {
    pub(crate) config: BusConfig,
    pub(crate) registry: HandlerRegistry,
    pub(crate) queue: BoundedEventQueue,
    pub(crate) metrics: Arc<MetricsCollector>,
    pub(crate) middleware: RwLock<Vec<Arc<dyn CommandMiddleware>>>,
    pub(crate) filters: RwLock<Vec<Arc<dyn EventFilter>>>,
    pub(crate) hook: RwLock<Option<Arc<dyn ObservabilityHook>>>,
    pub(crate) sessions: SessionManager,
    pub(crate) breakers: BreakerSet,
    pub(crate) dlq: DeadLetterQueue,
    pub(crate) running: AtomicBool,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) shutdown_tx: watch::Sender<bool>,
    pub(crate) shutdown_grace: Mutex<Duration>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Bus {
    /// Creates a bus from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for invalid capacities or water marks.
    pub fn new(config: BusConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let metrics = Arc::new(MetricsCollector::new());
        let queue = BoundedEventQueue::new(
            config.event_queue_size,
            config.high_water_mark_ratio,
            config.low_water_mark_ratio,
            config.overflow_policy,
            metrics.clone(),
        );
        let breakers = BreakerSet::new(config.circuit_breaker.clone(), metrics.clone());
        let dlq = DeadLetterQueue::new(config.dead_letter_queue_capacity, metrics.clone());
        let (shutdown_tx, _) = watch::channel(false);

        info!(
            queue_size = config.event_queue_size,
            policy = ?config.overflow_policy,
            "bus created"
        );
        Ok(Self {
            inner: Arc::new(BusInner {
                config,
                registry: HandlerRegistry::new(),
                queue,
                metrics,
                middleware: RwLock::new(Vec::new()),
                filters: RwLock::new(Vec::new()),
                hook: RwLock::new(None),
                sessions: SessionManager::new(),
                breakers,
                dlq,
                running: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                shutdown_tx,
                shutdown_grace: Mutex::new(Duration::from_secs(2)),
                worker: Mutex::new(None),
            }),
        })
    }

    // --- Lifecycle ---

    /// Starts the dispatch worker. Idempotent while running.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("bus is already running");
            return;
        }
        self.inner.shutting_down.store(false, Ordering::SeqCst);
        let _ = self.inner.shutdown_tx.send(false);
        let handle = tokio::spawn(worker::run(self.inner.clone()));
        *self.inner.worker.lock() = Some(handle);
        info!("bus started");
    }

    /// Stops the dispatch worker, draining the queue for up to `grace`.
    /// Events still queued after the grace period are abandoned and
    /// counted as dropped.
    pub async fn stop(&self, grace: Duration) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("bus is not running");
            return;
        }
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        *self.inner.shutdown_grace.lock() = grace;
        let _ = self.inner.shutdown_tx.send(true);

        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            if handle.await.is_err() {
                error!("dispatch worker panicked");
            }
        }
        info!("bus stopped");
    }

    /// Whether the dispatch worker is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    // --- Publishing ---

    /// Publishes an event.
    ///
    /// Prompt under every policy: the observability hook runs
    /// synchronously, filters may drop the event, and the queue admits
    /// or refuses it without waiting on the consumer.
    pub fn publish(&self, event: Event) -> PublishOutcome {
        self.inner.publish_event(event)
    }

    /// Executes a command without a caller deadline.
    ///
    /// Never returns `Err`: failures become a failed [`CommandResult`].
    pub async fn execute(&self, command: Command) -> CommandResult {
        self.execute_inner(command, None).await
    }

    /// Executes a command with a caller deadline; exceeding it yields a
    /// `Timeout` result and aborts any pending retries.
    pub async fn execute_with_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> CommandResult {
        self.execute_inner(command, Some(timeout)).await
    }

    async fn execute_inner(&self, command: Command, timeout: Option<Duration>) -> CommandResult {
        let inner = &self.inner;
        inner.metrics.inc_counter(Counter::CommandsSent);

        if inner.shutting_down.load(Ordering::SeqCst) {
            inner.metrics.inc_counter(Counter::CommandsFailed);
            return CommandResult::failed(
                command.command_id,
                ErrorKind::ShuttingDown,
                "bus is stopping",
            );
        }

        let command_id = command.command_id;
        let session_id = command.session_id.clone();
        let cancel_rx = inner.sessions.cancel_receiver(&session_id);

        // The whole pipeline (middleware + dispatch) runs in its own task
        // so handler and middleware panics cannot unwind the caller, and
        // so timeout/cancellation can abort pending retries.
        let chain: Vec<Arc<dyn CommandMiddleware>> = inner.middleware.read().clone();
        let task_inner = inner.clone();
        let original = command.clone();
        let mut pipeline = tokio::spawn(async move {
            let endpoint = ExecuteCore {
                bus: task_inner,
                original,
            };
            Next::new(&chain, &endpoint).run(command).await
        });

        let result = tokio::select! {
            joined = &mut pipeline => match joined {
                Ok(result) => result,
                Err(err) if err.is_panic() => CommandResult::failed(
                    command_id,
                    ErrorKind::HandlerFailure,
                    "command pipeline panicked",
                ),
                Err(_) => CommandResult::failed(
                    command_id,
                    ErrorKind::Cancelled,
                    "command pipeline aborted",
                ),
            },
            () = wait_for_deadline(timeout) => {
                pipeline.abort();
                CommandResult::failed(
                    command_id,
                    ErrorKind::Timeout,
                    "command deadline exceeded",
                )
            }
            () = wait_for_cancel(cancel_rx) => {
                pipeline.abort();
                CommandResult::failed(
                    command_id,
                    ErrorKind::Cancelled,
                    "session closed while command was in flight",
                )
            }
        };

        if result.success {
            inner.metrics.inc_counter(Counter::CommandsProcessed);
        } else {
            inner.metrics.inc_counter(Counter::CommandsFailed);
        }

        let outcome = self.publish(Event::command_result(&result, &session_id));
        if !outcome.is_accepted() {
            debug!(%command_id, "command result event not admitted");
        }
        result
    }

    // --- Registration ---

    /// Registers a command handler for `(scope, command_type)`.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateHandler`] if the key is taken,
    /// [`RegistryError::InvalidScope`] for a malformed session scope.
    pub fn register_command_handler<H>(
        &self,
        command_type: impl Into<String>,
        handler: H,
        scope: HandlerScope,
    ) -> Result<HandlerKey, RegistryError>
    where
        H: CommandHandler + 'static,
    {
        let key = self
            .inner
            .registry
            .register_command(command_type, Arc::new(handler), scope)?;
        self.update_handler_gauge();
        Ok(key)
    }

    /// Registers an event handler at default priority with no predicate.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidScope`] for a malformed session scope.
    pub fn register_event_handler<H>(
        &self,
        event_type: impl Into<String>,
        handler: H,
        scope: HandlerScope,
    ) -> Result<HandlerKey, RegistryError>
    where
        H: EventHandler + 'static,
    {
        self.register_event_handler_with(event_type, handler, scope, priority::NORMAL, None)
    }

    /// Registers an event handler with an explicit priority (higher runs
    /// first) and an optional per-handler filter predicate.
    ///
    /// # Errors
    ///
    /// [`RegistryError::InvalidScope`] for a malformed session scope.
    pub fn register_event_handler_with<H>(
        &self,
        event_type: impl Into<String>,
        handler: H,
        scope: HandlerScope,
        handler_priority: u32,
        predicate: Option<EventPredicate>,
    ) -> Result<HandlerKey, RegistryError>
    where
        H: EventHandler + 'static,
    {
        let key = self.inner.registry.register_event(
            event_type,
            Arc::new(handler),
            scope,
            handler_priority,
            predicate,
        )?;
        self.update_handler_gauge();
        Ok(key)
    }

    /// Removes the registration behind `key`. Idempotent.
    pub fn unregister(&self, key: &HandlerKey) {
        self.inner.registry.unregister(key);
        self.update_handler_gauge();
    }

    /// Removes every handler in a session's scope. Returns the number
    /// removed. The bus scope is never touched.
    pub fn unregister_scope(&self, session_id: &SessionId) -> usize {
        let removed = self.inner.registry.unregister_scope(session_id);
        self.update_handler_gauge();
        removed
    }

    fn update_handler_gauge(&self) {
        self.inner.metrics.set_gauge(
            Gauge::RegisteredHandlers,
            self.inner.registry.handler_count() as i64,
        );
    }

    // --- Sessions ---

    /// Opens a session: a scoped handler-registration namespace with
    /// guaranteed cleanup on close (explicit or `Drop`).
    ///
    /// Publishes `bus.session.start` on success.
    ///
    /// # Errors
    ///
    /// [`SessionError::InvalidId`] for empty or reserved names,
    /// [`SessionError::AlreadyActive`] if the id is in use.
    pub fn open_session(&self, id: Option<SessionId>) -> Result<SessionHandle, SessionError> {
        let session_id = id.unwrap_or_else(SessionId::random);
        validate_session_name(&session_id)?;
        let started_at = self.inner.sessions.open(&session_id)?;
        self.inner.metrics.set_gauge(
            Gauge::ActiveSessions,
            self.inner.sessions.count() as i64,
        );
        self.publish(Event::session_started(&session_id, started_at));
        info!(session = %session_id, "session opened");
        Ok(SessionHandle::new(self.clone(), session_id, started_at))
    }

    // --- Middleware, filters, observability ---

    /// Appends a command middleware; the chain runs in registration
    /// order.
    pub fn add_command_middleware<M>(&self, middleware: M)
    where
        M: CommandMiddleware + 'static,
    {
        self.inner.middleware.write().push(Arc::new(middleware));
    }

    /// Appends an event filter; filters run in order before enqueue and
    /// the first `false` drops the event.
    pub fn add_event_filter<F>(&self, filter: F)
    where
        F: EventFilter + 'static,
    {
        self.inner.filters.write().push(Arc::new(filter));
    }

    /// Installs the observability hook, replacing any previous one.
    pub fn set_observability_hook<H>(&self, hook: H)
    where
        H: ObservabilityHook + 'static,
    {
        *self.inner.hook.write() = Some(Arc::new(hook));
    }

    // --- Introspection ---

    /// Deep-copied metrics view for exporters.
    #[must_use]
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Bus-level statistics.
    #[must_use]
    pub fn stats(&self) -> BusStats {
        let registry = self.inner.registry.stats();
        BusStats {
            running: self.is_running(),
            queue_size: self.inner.queue.len(),
            batch_size: self.inner.config.batch_size,
            batch_timeout_ms: self.inner.config.batch_timeout_ms,
            command_handlers: registry.command_handlers,
            event_handlers: registry.event_handlers,
            active_sessions: self.inner.sessions.count(),
            dead_letter_queue_size: self.inner.dlq.len(),
        }
    }

    /// Per-scope handler counts.
    #[must_use]
    pub fn registry_stats(&self) -> RegistryStats {
        self.inner.registry.stats()
    }

    /// Cumulative queue health counters.
    #[must_use]
    pub fn queue_stats(&self) -> QueueStats {
        self.inner.queue.stats()
    }

    /// State info for every circuit breaker created so far.
    #[must_use]
    pub fn circuit_breaker_states(&self) -> BTreeMap<String, BreakerStateInfo> {
        self.inner.breakers.states()
    }

    /// Snapshot of the dead letter queue, oldest first.
    #[must_use]
    pub fn dead_letter_entries(&self) -> Vec<DeadLetterEntry> {
        self.inner.dlq.entries()
    }

    /// Removes a dead-lettered command and executes it again.
    ///
    /// Returns `None` if no entry matches `command_id`.
    pub async fn retry_dead_letter(&self, command_id: CommandId) -> Option<CommandResult> {
        let entry = self.inner.dlq.take(command_id)?;
        info!(command = %entry.command, "redriving dead-lettered command");
        Some(self.execute(entry.command).await)
    }

    /// Waits until the queue is empty and every drained event has been
    /// fully dispatched. Intended for tests and orderly teardown; only
    /// terminates while the dispatch worker is running.
    pub async fn wait_until_idle(&self) {
        loop {
            if self.inner.queue.is_idle() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl Bus {
    pub(crate) fn inner(&self) -> &Arc<BusInner> {
        &self.inner
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("running", &self.is_running())
            .field("queue_size", &self.inner.queue.len())
            .finish_non_exhaustive()
    }
}

impl BusInner {
    /// Publishing path shared by the public API and internal lifecycle
    /// events.
    pub(crate) fn publish_event(&self, event: Event) -> PublishOutcome {
        self.metrics.inc_counter(Counter::EventsPublished);

        if self.shutting_down.load(Ordering::SeqCst) {
            self.metrics.inc_counter(Counter::EventsRejected);
            return PublishOutcome::Rejected(RejectReason::ShuttingDown);
        }

        // The hook observes every published event exactly once, before
        // filters and before enqueue.
        self.observe(&event);

        {
            let filters = self.filters.read();
            for filter in filters.iter() {
                if !filter.should_publish(&event) {
                    self.metrics.inc_counter(Counter::EventsDropped);
                    debug!(event = %event, "event dropped by filter");
                    return PublishOutcome::Dropped(DropReason::Filtered);
                }
            }
        }

        match self.queue.put(event) {
            PutOutcome::Accepted => PublishOutcome::Accepted,
            PutOutcome::RejectedFull => PublishOutcome::Rejected(RejectReason::QueueFull),
        }
    }

    fn observe(&self, event: &Event) {
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            let caught =
                std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook.observe(event)));
            if caught.is_err() {
                self.metrics.inc_counter(Counter::ObservabilityErrors);
                error!(event = %event, "observability hook panicked");
            }
        }
    }

    /// Core command dispatch: resolve, `CommandStarted`, breaker gate,
    /// retry loop, timing.
    async fn dispatch_command(&self, original: &Command, command: Command) -> CommandResult {
        let resolved = match self
            .registry
            .resolve_command(&command.command_type, &command.session_id)
        {
            Some(resolved) => resolved,
            None => {
                warn!(command = %command, "no handler for command");
                return CommandResult::failed(
                    command.command_id,
                    ErrorKind::NoHandler,
                    format!(
                        "no handler registered for command type `{}` in scope of session `{}`",
                        command.command_type, command.session_id
                    ),
                );
            }
        };

        // Observed strictly before the handler runs (and before the
        // resilience wrapper decides anything), carrying the command as
        // the caller submitted it.
        self.publish_event(Event::command_started(original));

        let breaker = self.breakers.breaker_for(&resolved.identity);
        if !breaker.try_acquire() {
            warn!(breaker = %resolved.identity, "circuit breaker rejected command");
            return CommandResult::failed(
                command.command_id,
                ErrorKind::CircuitOpen,
                format!("circuit breaker `{}` is open", resolved.identity),
            )
            .with_metadata("breaker", json!(resolved.identity));
        }

        let started = Instant::now();
        let result = self
            .run_with_retry(command, resolved.handler, &breaker)
            .await;
        self.metrics
            .observe_command_duration(&original.command_type, started.elapsed());
        result
    }

    /// Invokes the handler with retry-with-jitter. The breaker permit for
    /// the first attempt is already held by the caller; each retry
    /// re-acquires.
    async fn run_with_retry(
        &self,
        command: Command,
        handler: Arc<dyn CommandHandler>,
        breaker: &Arc<crate::resilience::CircuitBreaker>,
    ) -> CommandResult {
        let retry = &self.config.retry;
        let max_attempts = retry.max_retries + 1;
        let first_attempted = Utc::now();
        let command_id = command.command_id;
        let mut attempts: u32 = 0;
        let mut last_error = String::new();
        let mut stopped_by_breaker = false;

        loop {
            if attempts > 0 && !breaker.try_acquire() {
                stopped_by_breaker = true;
                break;
            }
            attempts += 1;
            if attempts > 1 {
                info!(command = %command, attempt = attempts, max = max_attempts, "retrying command");
            }

            // Each invocation runs in its own task so a panicking
            // handler is observed as a failure, not an unwind.
            let invocation = {
                let handler = handler.clone();
                let command = command.clone();
                tokio::spawn(async move { handler.handle(command).await })
            };

            let value = match invocation.await {
                Ok(Ok(value)) => Some(value),
                Ok(Err(err)) => {
                    last_error = err.to_string();
                    None
                }
                Err(join_err) => {
                    last_error = if join_err.is_panic() {
                        "handler panicked".to_string()
                    } else {
                        "handler task aborted".to_string()
                    };
                    None
                }
            };

            match value {
                Some(value) => {
                    breaker.on_success();
                    return CommandResult::ok(command_id, value).with_attempts(attempts);
                }
                None => {
                    breaker.on_failure();
                    warn!(
                        command = %command,
                        attempt = attempts,
                        error = %last_error,
                        "command handler failed"
                    );
                    if attempts >= max_attempts {
                        break;
                    }
                    if breaker.state() == CircuitState::Open {
                        stopped_by_breaker = true;
                        break;
                    }
                    tokio::time::sleep(retry_delay(retry, attempts - 1)).await;
                }
            }
        }

        self.dlq.push(DeadLetterEntry {
            command: command.clone(),
            error: last_error.clone(),
            attempts,
            first_attempted,
            last_attempted: Utc::now(),
        });
        self.publish_event(Event::dead_letter(&command, attempts, &last_error));

        let mut result = CommandResult::failed(
            command_id,
            ErrorKind::HandlerFailure,
            format!("command failed after {attempts} attempt(s): {last_error}"),
        )
        .with_attempts(attempts);
        if stopped_by_breaker {
            result = result.with_metadata("circuit_breaker_open", json!(true));
        }
        result
    }
}

/// Terminal stage of the middleware chain: the dispatch core.
struct ExecuteCore {
    bus: Arc<BusInner>,
    original: Command,
}

#[async_trait]
impl CommandEndpoint for ExecuteCore {
    async fn dispatch(&self, command: Command) -> CommandResult {
        self.bus.dispatch_command(&self.original, command).await
    }
}

/// Resolves when the optional deadline expires; never when absent.
async fn wait_for_deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

/// Resolves when the session is cancelled; never for sessionless
/// commands.
async fn wait_for_cancel(rx: Option<watch::Receiver<bool>>) {
    let Some(mut rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Session record dropped without cancelling: nothing to wait
            // for anymore.
            return std::future::pending().await;
        }
    }
}
