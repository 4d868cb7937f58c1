//! Audit reporting for engine-caused mutations
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Engines    │────▶│  AuditSink   │────▶│ external log │
//! │  (record)    │     │ (bus/memory) │     │  (persist)   │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! This crate produces the entries; persisting them is out of its hands.

pub mod bus;
pub mod types;

pub use bus::{AuditBus, AuditError, AuditResult, AuditSink, MemoryAuditLog, SharedAuditSink};
pub(crate) use bus::record_or_warn;
pub use types::{AuditAction, AuditActor, AuditEntry, Component, EntityKind};
