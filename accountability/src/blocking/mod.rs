//! Red-tag blocking — severity-scoped blocking state machine
//!
//! ```text
//!   OPEN / IN_PROGRESS
//!          │  apply_blocking (scope match, first blocker wins)
//!          ▼
//!       BLOCKED ── blockedByRedTagId = tag
//!          │  remove_blocking (tag resolved or dismissed)
//!          ▼
//!        OPEN
//! ```
//!
//! Severity decides the blast radius:
//! - WARNING  → the linked request (or its milestone)
//! - CRITICAL → the linked milestone (or the contract)
//! - BLOCKER  → the whole contract

pub mod engine;
pub mod scope;

pub use engine::{BlockingEngine, BlockingOutcome};
pub use scope::BlockScope;
