//! Audit entry types
//!
//! Every mutation caused by an engine or lifecycle handler produces one
//! [`AuditEntry`]. The entry only describes the change; persisting it is the
//! job of whatever sink is plugged in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::UserId;

/// Component of this crate that caused a mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    EscalationEngine,
    BlockingEngine,
    RequestService,
    RedTagService,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EscalationEngine => write!(f, "escalation_engine"),
            Self::BlockingEngine => write!(f, "blocking_engine"),
            Self::RequestService => write!(f, "request_service"),
            Self::RedTagService => write!(f, "red_tag_service"),
        }
    }
}

/// Who caused the mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuditActor {
    /// An automated component acting on its own
    System(Component),
    /// A user acting through a component
    User(UserId),
}

impl AuditActor {
    /// User if one is known, otherwise the component itself
    pub fn resolve(user: Option<&str>, component: Component) -> Self {
        match user {
            Some(id) if !id.trim().is_empty() => Self::User(id.to_string()),
            _ => Self::System(component),
        }
    }
}

/// Kind of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    /// Summary of one escalation check run
    AccountabilityCheck,
}

/// Entity the mutation applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Request,
    AccountabilityEvent,
    RedTag,
    System,
}

/// One audit log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub actor: AuditActor,
    pub action: AuditAction,
    pub entity: EntityKind,
    pub entity_id: String,
    pub details: serde_json::Value,
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: AuditActor,
        action: AuditAction,
        entity: EntityKind,
        entity_id: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            action,
            entity,
            entity_id: entity_id.into(),
            details: serde_json::Value::Null,
            at: Utc::now(),
        }
    }

    /// Attach a details payload
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Override the timestamp (engines stamp with their own clock)
    pub fn at(mut self, at: DateTime<Utc>) -> Self {
        self.at = at;
        self
    }
}
