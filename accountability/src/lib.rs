//! Contract Accountability Library
//!
//! This library provides the policy core of a contract request tracker:
//! - Escalation loop that advances overdue requests one rung at a time
//! - Red-tag blocking engine that holds requests inside a tag's blast radius
//! - Golden Rule validator run before any request is created
//!
//! # Components
//!
//! ## Engines
//! - [`EscalationEngine::run_check`]: one deterministic accountability pass
//! - [`BlockingEngine::apply_blocking`] / [`BlockingEngine::remove_blocking`]:
//!   follow red tag activation
//! - [`golden_rule::validate`]: pure field check
//!
//! ## Lifecycle handlers
//! - [`RequestService`]: create and transition requests
//! - [`RedTagService`]: raise and transition red tags
//!
//! ## Storage
//! - [`MemoryStore`]: in-process tables with JSON snapshots
//! - `RocksStore`: column families on disk (feature `rocksdb-store`)
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use accountability::{AuditBus, BlockingEngine, EscalationEngine, MemoryStore};
//!
//! let store = MemoryStore::new().shared();
//! let audit = AuditBus::new().shared();
//! let engine = EscalationEngine::new(store.clone(), audit.clone());
//! let summary = engine.run_check(chrono::Utc::now())?;
//! println!("{}", serde_json::to_string(&summary)?);
//!
//! let _blocking = Arc::new(BlockingEngine::new(store, audit));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod audit;
pub mod blocking;
pub mod error;
pub mod escalation;
pub mod golden_rule;
pub mod lifecycle;
pub mod model;
pub mod policy;
pub mod store;

// Re-export key engine types
pub use blocking::{BlockScope, BlockingEngine, BlockingOutcome};
pub use escalation::{
    CheckSummary, EscalationConfig, EscalationDeadlines, EscalationEngine, EscalationMode,
    EscalationStep,
};

// Re-export lifecycle handlers
pub use lifecycle::{
    parse_due_date, NewRedTag, NewRequest, RedTagOutcome, RedTagService, RedTagUpdate,
    RequestService,
};

// Re-export validation and errors
pub use error::{ErrorResponse, TrackerError, TrackerResult};
pub use golden_rule::{validate, GoldenRuleInput, GoldenRuleReport, Violation};

// Re-export model, policy and storage types
pub use audit::{
    AuditAction, AuditActor, AuditBus, AuditEntry, AuditSink, Component, EntityKind,
    MemoryAuditLog, SharedAuditSink,
};
pub use model::{
    AccountabilityEvent, AccountabilityEventType, Contract, EscalationLevel, Priority, RedTag,
    RedTagSeverity, RedTagState, Request, RequestState,
};
pub use policy::{AccountabilityPolicy, PolicyFile, PolicyFileError};
#[cfg(feature = "rocksdb-store")]
pub use store::RocksStore;
pub use store::{
    ContractDirectory, MemoryStore, PolicyStore, RedTagRepository, RequestFilter,
    RequestRepository, SharedStore, Store, StoreError, StoreResult,
};
