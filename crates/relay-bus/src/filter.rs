//! Event filters.
//!
//! Filters run on the publishing path, *before* enqueue, as an ordered
//! AND chain: the first filter to return `false` drops the event. They
//! must be pure — no side effects observable to the rest of the system.
//!
//! Built-in filters cover the common cases: allow/deny by type, by
//! session, by type-name pattern, and boolean composition. Closures
//! `Fn(&Event) -> bool` are filters too.

use regex::Regex;
use relay_message::Event;
use relay_types::SessionId;
use std::collections::HashSet;

/// A pure predicate deciding whether an event is published.
pub trait EventFilter: Send + Sync {
    /// Returns `false` to drop the event before it reaches the queue.
    fn should_publish(&self, event: &Event) -> bool;
}

impl<F> EventFilter for F
where
    F: Fn(&Event) -> bool + Send + Sync,
{
    fn should_publish(&self, event: &Event) -> bool {
        (self)(event)
    }
}

/// Filters events by their type name.
///
/// Exclusions are checked first; when an include set is present, only
/// listed types pass.
///
/// # Example
///
/// ```
/// use relay_bus::{EventFilter, EventTypeFilter};
/// use relay_message::Event;
/// use serde_json::Value;
///
/// let filter = EventTypeFilter::allow(["tick"]);
/// assert!(filter.should_publish(&Event::new("tick", Value::Null)));
/// assert!(!filter.should_publish(&Event::new("tock", Value::Null)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct EventTypeFilter {
    include: Option<HashSet<String>>,
    exclude: HashSet<String>,
}

impl EventTypeFilter {
    /// Only the listed types pass.
    #[must_use]
    pub fn allow<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: Some(types.into_iter().map(Into::into).collect()),
            exclude: HashSet::new(),
        }
    }

    /// The listed types are dropped; everything else passes.
    #[must_use]
    pub fn deny<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: None,
            exclude: types.into_iter().map(Into::into).collect(),
        }
    }
}

impl EventFilter for EventTypeFilter {
    fn should_publish(&self, event: &Event) -> bool {
        if self.exclude.contains(&event.event_type) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(&event.event_type),
            None => true,
        }
    }
}

/// Filters events by session.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    include: Option<HashSet<SessionId>>,
    exclude: HashSet<SessionId>,
}

impl SessionFilter {
    /// Only events of the listed sessions pass.
    #[must_use]
    pub fn allow<I>(sessions: I) -> Self
    where
        I: IntoIterator<Item = SessionId>,
    {
        Self {
            include: Some(sessions.into_iter().collect()),
            exclude: HashSet::new(),
        }
    }

    /// Events of the listed sessions are dropped.
    #[must_use]
    pub fn deny<I>(sessions: I) -> Self
    where
        I: IntoIterator<Item = SessionId>,
    {
        Self {
            include: None,
            exclude: sessions.into_iter().collect(),
        }
    }
}

impl EventFilter for SessionFilter {
    fn should_publish(&self, event: &Event) -> bool {
        if self.exclude.contains(&event.session_id) {
            return false;
        }
        match &self.include {
            Some(include) => include.contains(&event.session_id),
            None => true,
        }
    }
}

/// Filters events by regex patterns over the type name.
///
/// Exclude patterns are checked first; when include patterns exist, at
/// least one must match.
#[derive(Debug, Clone, Default)]
pub struct PatternFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl PatternFilter {
    /// Creates an empty filter that passes everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an include pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex error for an invalid pattern.
    pub fn include(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.include.push(Regex::new(pattern)?);
        Ok(self)
    }

    /// Adds an exclude pattern.
    ///
    /// # Errors
    ///
    /// Returns the regex error for an invalid pattern.
    pub fn exclude(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.exclude.push(Regex::new(pattern)?);
        Ok(self)
    }
}

impl EventFilter for PatternFilter {
    fn should_publish(&self, event: &Event) -> bool {
        let name = &event.event_type;
        if self.exclude.iter().any(|p| p.is_match(name)) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        self.include.iter().any(|p| p.is_match(name))
    }
}

/// Combines filters with AND or OR logic.
pub struct CompositeFilter {
    filters: Vec<Box<dyn EventFilter>>,
    require_all: bool,
}

impl CompositeFilter {
    /// All inner filters must pass.
    #[must_use]
    pub fn all(filters: Vec<Box<dyn EventFilter>>) -> Self {
        Self {
            filters,
            require_all: true,
        }
    }

    /// Any single inner filter passing is enough.
    #[must_use]
    pub fn any(filters: Vec<Box<dyn EventFilter>>) -> Self {
        Self {
            filters,
            require_all: false,
        }
    }
}

impl EventFilter for CompositeFilter {
    fn should_publish(&self, event: &Event) -> bool {
        if self.filters.is_empty() {
            return true;
        }
        if self.require_all {
            self.filters.iter().all(|f| f.should_publish(event))
        } else {
            self.filters.iter().any(|f| f.should_publish(event))
        }
    }
}
