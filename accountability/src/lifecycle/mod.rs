//! Lifecycle handlers — the callers that wire the engines into mutations
//!
//! - [`RequestService`]: golden rule on create, blocked-start conflict on
//!   transition
//! - [`RedTagService`]: blocking applied on raise/reopen, removed on
//!   resolve/dismiss

pub mod red_tags;
pub mod requests;

pub use red_tags::{NewRedTag, RedTagOutcome, RedTagService, RedTagUpdate};
pub use requests::{parse_due_date, NewRequest, RequestService, BLOCKED_START_REASON};
