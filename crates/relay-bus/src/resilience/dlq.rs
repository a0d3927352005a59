//! Dead letter queue.
//!
//! Bounded store of commands that exhausted their retry budget. The
//! oldest entry is evicted when full; entries can be inspected or taken
//! back out for redrive.

use crate::metrics::{Gauge, MetricsCollector};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use relay_message::Command;
use relay_types::CommandId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// A command that exhausted its retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    /// The failed command, as the handler saw it.
    pub command: Command,
    /// Last error message observed.
    pub error: String,
    /// Handler invocations performed.
    pub attempts: u32,
    /// When the first attempt started.
    pub first_attempted: DateTime<Utc>,
    /// When the final attempt finished.
    pub last_attempted: DateTime<Utc>,
}

/// Bounded FIFO of dead-lettered commands.
#[derive(Debug)]
pub(crate) struct DeadLetterQueue {
    entries: Mutex<VecDeque<DeadLetterEntry>>,
    capacity: usize,
    metrics: Arc<MetricsCollector>,
}

impl DeadLetterQueue {
    pub fn new(capacity: usize, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            capacity,
            metrics,
        }
    }

    /// Stores an entry, evicting the oldest when full.
    pub fn push(&self, entry: DeadLetterEntry) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            if let Some(evicted) = entries.pop_front() {
                warn!(
                    command = %evicted.command,
                    "dead letter queue full, evicted oldest entry"
                );
            }
        }
        info!(command = %entry.command, attempts = entry.attempts, "command dead-lettered");
        entries.push_back(entry);
        self.metrics
            .set_gauge(Gauge::DeadLetterQueueSize, entries.len() as i64);
    }

    /// Removes and returns the entry for a command id, if present.
    pub fn take(&self, command_id: CommandId) -> Option<DeadLetterEntry> {
        let mut entries = self.entries.lock();
        let index = entries
            .iter()
            .position(|entry| entry.command.command_id == command_id)?;
        let entry = entries.remove(index);
        self.metrics
            .set_gauge(Gauge::DeadLetterQueueSize, entries.len() as i64);
        entry
    }

    /// A snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<DeadLetterEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn entry(command: Command) -> DeadLetterEntry {
        DeadLetterEntry {
            command,
            error: "boom".into(),
            attempts: 4,
            first_attempted: Utc::now(),
            last_attempted: Utc::now(),
        }
    }

    #[test]
    fn push_and_inspect() {
        let dlq = DeadLetterQueue::new(10, Arc::new(MetricsCollector::new()));
        let command = Command::new("Ping", Value::Null);
        dlq.push(entry(command.clone()));

        let entries = dlq.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].command.command_id, command.command_id);
        assert_eq!(entries[0].attempts, 4);
    }

    #[test]
    fn evicts_oldest_when_full() {
        let dlq = DeadLetterQueue::new(2, Arc::new(MetricsCollector::new()));
        let first = Command::new("A", Value::Null);
        dlq.push(entry(first.clone()));
        dlq.push(entry(Command::new("B", Value::Null)));
        dlq.push(entry(Command::new("C", Value::Null)));

        assert_eq!(dlq.len(), 2);
        assert!(dlq.take(first.command_id).is_none());
    }

    #[test]
    fn take_removes_by_command_id() {
        let metrics = Arc::new(MetricsCollector::new());
        let dlq = DeadLetterQueue::new(10, metrics.clone());
        let command = Command::new("Ping", Value::Null);
        dlq.push(entry(command.clone()));
        assert_eq!(metrics.gauge(Gauge::DeadLetterQueueSize), 1);

        let taken = dlq.take(command.command_id).unwrap();
        assert_eq!(taken.command.command_id, command.command_id);
        assert_eq!(dlq.len(), 0);
        assert_eq!(metrics.gauge(Gauge::DeadLetterQueueSize), 0);
        assert!(dlq.take(command.command_id).is_none());
    }
}
