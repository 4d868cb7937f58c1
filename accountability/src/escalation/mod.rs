//! Accountability escalation — deterministic state machine over due dates
//!
//! # Escalation Ladder
//!
//! ```text
//! NONE
//!     │  now ≥ dueAt − reminderHours
//!     ▼
//! REMINDER
//!     │  now ≥ dueAt + warningHours
//!     ▼
//! WARNING
//!     │  now ≥ dueAt + escalationHours
//!     ▼
//! ESCALATED (terminal)
//! ```
//!
//! Each step writes the new level and an AccountabilityEvent in one unit.
//! Requests whose client package has no policy are never escalated.

pub mod engine;
pub mod state;

pub use engine::{CheckSummary, EscalationConfig, EscalationEngine, EscalationMode};
pub use state::{EscalationDeadlines, EscalationStep};
