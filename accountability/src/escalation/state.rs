//! Escalation deadlines — where a request sits on the ladder at a given time

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AccountabilityEventType, EscalationLevel, Request};
use crate::policy::AccountabilityPolicy;

/// The three instants a policy derives from a due date
///
/// ```text
/// reminder_at ──▶ due_at ──▶ warning_at ──▶ escalate_at
/// ```
///
/// The ordering above is the intent, not a checked invariant: policy
/// configuration is trusted as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationDeadlines {
    pub reminder_at: DateTime<Utc>,
    pub warning_at: DateTime<Utc>,
    pub escalate_at: DateTime<Utc>,
}

impl EscalationDeadlines {
    /// Compute deadlines for a due date under a policy.
    ///
    /// Offsets past the representable range saturate at the earliest or
    /// latest instant chrono supports.
    pub fn compute(due_at: DateTime<Utc>, policy: &AccountabilityPolicy) -> Self {
        let hours = |h: u32| Duration::hours(i64::from(h));
        Self {
            reminder_at: due_at
                .checked_sub_signed(hours(policy.reminder_hours))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            warning_at: due_at
                .checked_add_signed(hours(policy.warning_hours))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            escalate_at: due_at
                .checked_add_signed(hours(policy.escalation_hours))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Deadline that must pass before a request can leave `level`
    pub fn threshold_for(&self, level: EscalationLevel) -> Option<DateTime<Utc>> {
        match level {
            EscalationLevel::None => Some(self.reminder_at),
            EscalationLevel::Reminder => Some(self.warning_at),
            EscalationLevel::Warning => Some(self.escalate_at),
            EscalationLevel::Escalated => None,
        }
    }

    /// The single step due from `level` at `now`, if any
    pub fn next_step(&self, level: EscalationLevel, now: DateTime<Utc>) -> Option<EscalationStep> {
        let threshold = self.threshold_for(level)?;
        if now < threshold {
            return None;
        }
        let to = level.next()?;
        let event_type = to.arrival_event()?;
        Some(EscalationStep {
            from: level,
            to,
            event_type,
        })
    }
}

/// One rung climbed on the escalation ladder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStep {
    pub from: EscalationLevel,
    pub to: EscalationLevel,
    pub event_type: AccountabilityEventType,
}

impl EscalationStep {
    /// Human-readable event message for a request
    pub fn message(&self, request: &Request) -> String {
        match self.event_type {
            AccountabilityEventType::Reminder => {
                format!("Reminder: \"{}\" is due soon", request.title)
            }
            AccountabilityEventType::Warning => {
                format!("Warning: \"{}\" is now due or overdue", request.title)
            }
            AccountabilityEventType::Escalation => format!(
                "Escalated: \"{}\" has exceeded the escalation threshold",
                request.title
            ),
        }
    }
}
