//! Session lifecycle.
//!
//! A session is a scoped handler-registration namespace with guaranteed
//! cleanup. Handlers registered *through the handle* are owned by the
//! session and removed on close; registrations made directly on the bus
//! into the session's scope are not owned and survive until removed
//! explicitly (or via `unregister_scope`).
//!
//! Cleanup runs on every exit path: explicit [`SessionHandle::close`] or
//! `Drop` (including unwinds). On close the session's in-flight
//! `execute` calls are cancelled, owned handlers are unregistered, and
//! only then is `bus.session.end` published.

use crate::bus::Bus;
use crate::error::{RegistryError, SessionError};
use crate::handler::{CommandHandler, EventHandler, EventPredicate, HandlerKey};
use crate::metrics::Gauge;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_message::{Command, CommandResult, Event};
use relay_types::{HandlerScope, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::bus::PublishOutcome;

/// Live bookkeeping for one open session.
pub(crate) struct SessionRecord {
    cancel_tx: watch::Sender<bool>,
}

impl SessionRecord {
    /// Signals every in-flight `execute` of this session to abort.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }
}

/// The set of open sessions, guarded by a mutex — open/close are rare
/// relative to publish.
pub(crate) struct SessionManager {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Records a new session. Fails if the id is already open.
    pub fn open(&self, id: &SessionId) -> Result<DateTime<Utc>, SessionError> {
        let mut sessions = self.sessions.lock();
        if sessions.contains_key(id) {
            return Err(SessionError::AlreadyActive(id.clone()));
        }
        let started_at = Utc::now();
        let (cancel_tx, _) = watch::channel(false);
        sessions.insert(id.clone(), SessionRecord { cancel_tx });
        Ok(started_at)
    }

    /// Removes and returns the record for a session.
    pub fn close(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions.lock().remove(id)
    }

    /// A cancellation receiver for the session, if it is open.
    pub fn cancel_receiver(&self, id: &SessionId) -> Option<watch::Receiver<bool>> {
        self.sessions
            .lock()
            .get(id)
            .map(|record| record.cancel_tx.subscribe())
    }

    /// Number of open sessions.
    pub fn count(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// Handle to an open session.
///
/// Registrations made through the handle are owned by the session and
/// removed before `bus.session.end` is published. Dropping the handle
/// closes the session.
///
/// # Example
///
/// ```no_run
/// use relay_bus::Bus;
/// use relay_message::Event;
/// use serde_json::Value;
///
/// # async fn demo(bus: Bus) -> Result<(), Box<dyn std::error::Error>> {
/// let session = bus.open_session(Some("job-1".into()))?;
/// session.register_event_handler("tick", |_event: Event| async move {
///     Ok::<(), relay_bus::HandlerError>(())
/// })?;
///
/// session.publish(Event::new("tick", Value::Null));
/// session.close();
/// // The tick handler is gone; later ticks reach no one.
/// # Ok(())
/// # }
/// ```
pub struct SessionHandle {
    bus: Bus,
    session_id: SessionId,
    started_at: DateTime<Utc>,
    owned: Mutex<Vec<HandlerKey>>,
    active: AtomicBool,
}

impl SessionHandle {
    pub(crate) fn new(bus: Bus, session_id: SessionId, started_at: DateTime<Utc>) -> Self {
        Self {
            bus,
            session_id,
            started_at,
            owned: Mutex::new(Vec::new()),
            active: AtomicBool::new(true),
        }
    }

    /// The session's identifier.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Whether the session is still open.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Number of handlers owned by this session.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.owned.lock().len()
    }

    fn scope(&self) -> HandlerScope {
        HandlerScope::Session(self.session_id.clone())
    }

    fn ensure_active(&self) -> Result<(), RegistryError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(RegistryError::InvalidScope(format!(
                "session `{}` is closed",
                self.session_id
            )))
        }
    }

    /// Registers a session-owned command handler.
    ///
    /// # Errors
    ///
    /// Fails on duplicate registration or when the session is closed.
    pub fn register_command_handler<H>(
        &self,
        command_type: impl Into<String>,
        handler: H,
    ) -> Result<HandlerKey, RegistryError>
    where
        H: CommandHandler + 'static,
    {
        self.ensure_active()?;
        let key = self
            .bus
            .register_command_handler(command_type, handler, self.scope())?;
        self.owned.lock().push(key.clone());
        Ok(key)
    }

    /// Registers a session-owned event handler at default priority.
    ///
    /// # Errors
    ///
    /// Fails when the session is closed.
    pub fn register_event_handler<H>(
        &self,
        event_type: impl Into<String>,
        handler: H,
    ) -> Result<HandlerKey, RegistryError>
    where
        H: EventHandler + 'static,
    {
        self.ensure_active()?;
        let key = self
            .bus
            .register_event_handler(event_type, handler, self.scope())?;
        self.owned.lock().push(key.clone());
        Ok(key)
    }

    /// Registers a session-owned event handler with explicit priority
    /// and optional predicate.
    ///
    /// # Errors
    ///
    /// Fails when the session is closed.
    pub fn register_event_handler_with<H>(
        &self,
        event_type: impl Into<String>,
        handler: H,
        priority: u32,
        predicate: Option<EventPredicate>,
    ) -> Result<HandlerKey, RegistryError>
    where
        H: EventHandler + 'static,
    {
        self.ensure_active()?;
        let key = self.bus.register_event_handler_with(
            event_type,
            handler,
            self.scope(),
            priority,
            predicate,
        )?;
        self.owned.lock().push(key.clone());
        Ok(key)
    }

    /// Executes a command stamped with this session's id.
    pub async fn execute(&self, command: Command) -> CommandResult {
        self.bus
            .execute(command.with_session(self.session_id.clone()))
            .await
    }

    /// Executes with a caller deadline, stamped with this session's id.
    pub async fn execute_with_timeout(
        &self,
        command: Command,
        timeout: Duration,
    ) -> CommandResult {
        self.bus
            .execute_with_timeout(command.with_session(self.session_id.clone()), timeout)
            .await
    }

    /// Publishes an event stamped with this session's id.
    pub fn publish(&self, event: Event) -> PublishOutcome {
        self.bus
            .publish(event.with_session(self.session_id.clone()))
    }

    /// Closes the session: cancels in-flight executes, removes owned
    /// handlers, publishes `bus.session.end`, releases the id.
    pub fn close(self) {
        self.finish();
    }

    fn finish(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }

        let record = self.bus.inner().sessions.close(&self.session_id);
        if let Some(record) = &record {
            record.cancel();
        }

        // Owned handlers are removed before SessionEnd is observable.
        let keys: Vec<HandlerKey> = std::mem::take(&mut *self.owned.lock());
        for key in &keys {
            self.bus.unregister(key);
        }
        debug!(
            session = %self.session_id,
            handlers = keys.len(),
            "session handlers unregistered"
        );

        self.bus.inner().metrics.set_gauge(
            Gauge::ActiveSessions,
            self.bus.inner().sessions.count() as i64,
        );

        let ended_at = Utc::now();
        let duration_ms = (ended_at - self.started_at).num_milliseconds().max(0) as u64;
        self.bus
            .publish(Event::session_ended(&self.session_id, ended_at, duration_ms));
        info!(session = %self.session_id, duration_ms, "session closed");
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("active", &self.is_active())
            .field("handlers", &self.handler_count())
            .finish()
    }
}
