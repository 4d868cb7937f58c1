//! Audit sinks
//!
//! [`AuditBus`] fans entries out to subscribers over a Tokio broadcast
//! channel; [`MemoryAuditLog`] keeps them in memory.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::AuditEntry;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Error type for audit sinks
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("Audit sink rejected entry: {0}")]
    Rejected(String),

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for audit operations
pub type AuditResult<T> = Result<T, AuditError>;

/// External collaborator receiving audit entries
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: AuditEntry) -> AuditResult<()>;
}

/// Shared reference to an audit sink
pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Record an entry, logging instead of failing when the sink refuses it.
///
/// Audit delivery never rolls back a committed mutation.
pub(crate) fn record_or_warn(sink: &dyn AuditSink, entry: AuditEntry) {
    let entity_id = entry.entity_id.clone();
    if let Err(e) = sink.record(entry) {
        warn!(entity_id = %entity_id, "Failed to record audit entry: {}", e);
    }
}

/// Broadcast fan-out for audit entries
pub struct AuditBus {
    sender: broadcast::Sender<AuditEntry>,
}

impl AuditBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this bus
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Subscribe to receive audit entries
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for AuditBus {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditBus {
    fn record(&self, entry: AuditEntry) -> AuditResult<()> {
        let entity = entry.entity;
        match self.sender.send(entry) {
            Ok(count) => {
                debug!(?entity, receivers = count, "Audit entry published");
            }
            Err(_) => {
                // No receivers is OK
                debug!(?entity, "Audit entry published (no receivers)");
            }
        }
        Ok(())
    }
}

/// In-memory audit log
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Copy of every entry recorded so far, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, entry: AuditEntry) -> AuditResult<()> {
        self.entries
            .lock()
            .map_err(|_| AuditError::LockPoisoned)?
            .push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::{AuditAction, AuditActor, Component, EntityKind};

    fn entry(id: &str) -> AuditEntry {
        AuditEntry::new(
            AuditActor::System(Component::BlockingEngine),
            AuditAction::Update,
            EntityKind::Request,
            id,
        )
    }

    #[tokio::test]
    async fn test_bus_delivers_to_subscribers() {
        let bus = AuditBus::new();
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.record(entry("r1")).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.entity_id, "r1");
    }

    #[test]
    fn test_bus_without_subscribers_is_ok() {
        let bus = AuditBus::new();
        assert!(bus.record(entry("r1")).is_ok());
    }

    #[test]
    fn test_memory_log_keeps_order() {
        let log = MemoryAuditLog::new();
        assert!(log.is_empty());
        log.record(entry("r1")).unwrap();
        log.record(entry("r2")).unwrap();

        let ids: Vec<String> = log.entries().into_iter().map(|e| e.entity_id).collect();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert_eq!(log.len(), 2);
    }

    struct Refusing;

    impl AuditSink for Refusing {
        fn record(&self, _entry: AuditEntry) -> AuditResult<()> {
            Err(AuditError::Rejected("closed".to_string()))
        }
    }

    #[test]
    fn test_record_or_warn_swallows_errors() {
        record_or_warn(&Refusing, entry("r1"));
    }
}
