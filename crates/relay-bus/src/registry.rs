//! Scope-aware handler registry.
//!
//! Handlers are stored keyed by `(scope, message_type)` behind a
//! reader-writer lock: the dispatch path is read-heavy and reads never
//! block other reads.
//!
//! # Resolution rules
//!
//! - **Commands**: exactly one handler per key. Resolution prefers the
//!   command's session scope and falls back to the bus scope; a miss in
//!   both is `NoHandler`.
//! - **Events**: any number of handlers per key. Resolution returns the
//!   union of the session-scope and bus-scope handlers, ordered by
//!   `(priority desc, registration order asc)`.
//!
//! Resolution happens at *drain* time, so handlers unregistered before a
//! queued event is drained are not invoked for it.

use crate::error::{validate_session_name, RegistryError};
use crate::handler::{CommandHandler, EventHandler, EventPredicate, HandlerKey, HandlerKind};
use parking_lot::RwLock;
use relay_message::Event;
use relay_types::{HandlerScope, SessionId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct CommandEntry {
    key_id: u64,
    name: String,
    handler: Arc<dyn CommandHandler>,
}

struct EventEntry {
    key_id: u64,
    seq: u64,
    priority: u32,
    name: String,
    handler: Arc<dyn EventHandler>,
    predicate: Option<EventPredicate>,
}

/// A command handler resolved for dispatch.
pub(crate) struct ResolvedCommand {
    pub handler: Arc<dyn CommandHandler>,
    /// Breaker identity: `<scope>::<command_type>`.
    pub identity: String,
    #[allow(dead_code)] // Logged by the dispatch path in debug builds
    pub name: String,
}

/// An event handler resolved for dispatch, predicate included.
#[derive(Clone)]
pub(crate) struct EventBinding {
    pub handler: Arc<dyn EventHandler>,
    pub priority: u32,
    pub name: String,
    predicate: Option<EventPredicate>,
}

impl EventBinding {
    /// Applies the per-handler filter predicate, if any.
    pub fn accepts(&self, event: &Event) -> bool {
        self.predicate.as_ref().map_or(true, |p| p(event))
    }
}

/// Per-scope handler counts, as reported by [`HandlerRegistry::stats`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RegistryStats {
    /// Command handlers across all scopes.
    pub command_handlers: usize,
    /// Event handlers across all scopes.
    pub event_handlers: usize,
    /// Command handlers in the bus scope.
    pub bus_command_handlers: usize,
    /// Event handlers in the bus scope.
    pub bus_event_handlers: usize,
    /// Distinct scopes with at least one handler.
    pub scopes: usize,
}

#[derive(Default)]
struct RegistryInner {
    commands: HashMap<HandlerScope, HashMap<String, CommandEntry>>,
    events: HashMap<HandlerScope, HashMap<String, Vec<EventEntry>>>,
}

/// Thread-safe, scope-aware handler storage.
pub(crate) struct HandlerRegistry {
    inner: RwLock<RegistryInner>,
    next_key: AtomicU64,
    next_seq: AtomicU64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            next_key: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    fn validate_scope(scope: &HandlerScope) -> Result<(), RegistryError> {
        if let HandlerScope::Session(id) = scope {
            validate_session_name(id).map_err(|e| RegistryError::InvalidScope(e.to_string()))?;
        }
        Ok(())
    }

    /// Registers a command handler. Fails if the `(scope, type)` key is
    /// taken.
    pub fn register_command(
        &self,
        command_type: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
        scope: HandlerScope,
    ) -> Result<HandlerKey, RegistryError> {
        let command_type = command_type.into();
        Self::validate_scope(&scope)?;

        let mut inner = self.inner.write();
        let per_scope = inner.commands.entry(scope.clone()).or_default();
        if per_scope.contains_key(&command_type) {
            return Err(RegistryError::DuplicateHandler {
                command_type,
                scope,
            });
        }

        let key_id = self.next_key.fetch_add(1, Ordering::Relaxed);
        let name = handler.name().to_string();
        per_scope.insert(
            command_type.clone(),
            CommandEntry {
                key_id,
                name,
                handler,
            },
        );
        debug!(%scope, command_type, "registered command handler");

        Ok(HandlerKey {
            id: key_id,
            kind: HandlerKind::Command,
            scope,
            message_type: command_type,
        })
    }

    /// Registers an event handler. Multiple handlers per key are allowed;
    /// the list stays sorted by `(priority desc, registration order asc)`.
    pub fn register_event(
        &self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        scope: HandlerScope,
        handler_priority: u32,
        predicate: Option<EventPredicate>,
    ) -> Result<HandlerKey, RegistryError> {
        let event_type = event_type.into();
        Self::validate_scope(&scope)?;

        let key_id = self.next_key.fetch_add(1, Ordering::Relaxed);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let name = handler.name().to_string();

        let mut inner = self.inner.write();
        let handlers = inner
            .events
            .entry(scope.clone())
            .or_default()
            .entry(event_type.clone())
            .or_default();
        handlers.push(EventEntry {
            key_id,
            seq,
            priority: handler_priority,
            name,
            handler,
            predicate,
        });
        handlers.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        debug!(%scope, event_type, priority = handler_priority, "registered event handler");

        Ok(HandlerKey {
            id: key_id,
            kind: HandlerKind::Event,
            scope,
            message_type: event_type,
        })
    }

    /// Removes the registration behind `key`. Idempotent: stale or
    /// already-removed keys are ignored.
    pub fn unregister(&self, key: &HandlerKey) {
        let mut inner = self.inner.write();
        match key.kind {
            HandlerKind::Command => {
                if let Some(per_scope) = inner.commands.get_mut(&key.scope) {
                    let matches = per_scope
                        .get(&key.message_type)
                        .is_some_and(|entry| entry.key_id == key.id);
                    if matches {
                        per_scope.remove(&key.message_type);
                        debug!(key = %key, "unregistered command handler");
                    }
                    if per_scope.is_empty() {
                        inner.commands.remove(&key.scope);
                    }
                }
            }
            HandlerKind::Event => {
                if let Some(per_scope) = inner.events.get_mut(&key.scope) {
                    if let Some(handlers) = per_scope.get_mut(&key.message_type) {
                        handlers.retain(|entry| entry.key_id != key.id);
                        if handlers.is_empty() {
                            per_scope.remove(&key.message_type);
                        }
                    }
                    if per_scope.is_empty() {
                        inner.events.remove(&key.scope);
                    }
                }
            }
        }
    }

    /// Resolves the single handler for a command: session scope first,
    /// bus scope as fallback.
    pub fn resolve_command(
        &self,
        command_type: &str,
        session_id: &SessionId,
    ) -> Option<ResolvedCommand> {
        let inner = self.inner.read();
        let session_scope = HandlerScope::for_session(session_id);

        let lookup = |scope: &HandlerScope| {
            inner
                .commands
                .get(scope)
                .and_then(|per_scope| per_scope.get(command_type))
                .map(|entry| ResolvedCommand {
                    handler: entry.handler.clone(),
                    identity: format!("{scope}::{command_type}"),
                    name: entry.name.clone(),
                })
        };

        if !session_scope.is_bus() {
            if let Some(resolved) = lookup(&session_scope) {
                return Some(resolved);
            }
        }
        lookup(&HandlerScope::Bus)
    }

    /// Resolves all handlers matching an event: the union of the
    /// session-scope and bus-scope lists, ordered by
    /// `(priority desc, registration order asc)`.
    pub fn resolve_event(&self, event_type: &str, session_id: &SessionId) -> Vec<EventBinding> {
        let inner = self.inner.read();
        let session_scope = HandlerScope::for_session(session_id);

        let mut entries: Vec<&EventEntry> = Vec::new();
        let mut collect = |scope: &HandlerScope| {
            if let Some(handlers) = inner
                .events
                .get(scope)
                .and_then(|per_scope| per_scope.get(event_type))
            {
                entries.extend(handlers.iter());
            }
        };

        if !session_scope.is_bus() {
            collect(&session_scope);
        }
        collect(&HandlerScope::Bus);

        entries.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));

        entries
            .into_iter()
            .map(|entry| EventBinding {
                handler: entry.handler.clone(),
                priority: entry.priority,
                name: entry.name.clone(),
                predicate: entry.predicate.clone(),
            })
            .collect()
    }

    /// Removes every handler registered in a session's scope. Returns the
    /// number removed. The bus scope is never touched.
    pub fn unregister_scope(&self, session_id: &SessionId) -> usize {
        if session_id.is_bus() {
            warn!("refusing to bulk-unregister the bus scope");
            return 0;
        }
        let scope = HandlerScope::Session(session_id.clone());
        let mut inner = self.inner.write();

        let commands = inner
            .commands
            .remove(&scope)
            .map(|per_scope| per_scope.len())
            .unwrap_or(0);
        let events = inner
            .events
            .remove(&scope)
            .map(|per_scope| per_scope.values().map(Vec::len).sum())
            .unwrap_or(0);

        if commands + events > 0 {
            debug!(
                session = %session_id,
                commands,
                events,
                "unregistered session scope"
            );
        }
        commands + events
    }

    /// Total handlers across all scopes, both kinds.
    pub fn handler_count(&self) -> usize {
        let inner = self.inner.read();
        let commands: usize = inner.commands.values().map(HashMap::len).sum();
        let events: usize = inner
            .events
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum();
        commands + events
    }

    /// Per-scope handler counts.
    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.read();
        let command_handlers: usize = inner.commands.values().map(HashMap::len).sum();
        let event_handlers: usize = inner
            .events
            .values()
            .flat_map(HashMap::values)
            .map(Vec::len)
            .sum();

        let mut scopes: Vec<&HandlerScope> = inner.commands.keys().collect();
        scopes.extend(inner.events.keys());
        scopes.sort_by_key(|s| s.to_string());
        scopes.dedup();

        RegistryStats {
            command_handlers,
            event_handlers,
            bus_command_handlers: inner
                .commands
                .get(&HandlerScope::Bus)
                .map_or(0, HashMap::len),
            bus_event_handlers: inner
                .events
                .get(&HandlerScope::Bus)
                .map_or(0, |per_scope| per_scope.values().map(Vec::len).sum()),
            scopes: scopes.len(),
        }
    }
}
