//! Core entity types for request tracking
//!
//! These types are shared by the escalation engine, the blocking engine and
//! the lifecycle handlers. Field and enum names serialize to the same shapes
//! the external API exchanges (`dueAt`, `IN_PROGRESS`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for requests
pub type RequestId = String;

/// Unique identifier for contracts
pub type ContractId = String;

/// Unique identifier for milestones
pub type MilestoneId = String;

/// Unique identifier for users
pub type UserId = String;

/// Unique identifier for red tags
pub type RedTagId = String;

/// Unique identifier for accountability events
pub type EventId = String;

/// Generate a fresh entity identifier
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Request priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "NORMAL" => Ok(Self::Normal),
            "HIGH" => Ok(Self::High),
            "URGENT" => Ok(Self::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Lifecycle state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Accepted, not yet started
    Open,
    /// Work has started
    InProgress,
    /// Held by an active red tag
    Blocked,
    /// Delivered
    Completed,
    /// Withdrawn
    Cancelled,
}

impl RequestState {
    /// States the escalation and blocking engines operate on
    pub const ACTIVE: [RequestState; 2] = [RequestState::Open, RequestState::InProgress];

    /// Whether the request is open or in progress
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::InProgress)
    }

    /// Whether the request has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::InProgress => "IN_PROGRESS",
            Self::Blocked => "BLOCKED",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "OPEN" => Ok(Self::Open),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "BLOCKED" => Ok(Self::Blocked),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(format!("unknown request state: {}", other)),
        }
    }
}

/// Escalation ladder for a request
///
/// ```text
/// NONE ──▶ REMINDER ──▶ WARNING ──▶ ESCALATED
/// ```
///
/// Levels only ever move forward, one rung at a time.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationLevel {
    #[default]
    None,
    Reminder,
    Warning,
    Escalated,
}

impl EscalationLevel {
    /// The next rung on the ladder, `None` once escalated
    pub fn next(&self) -> Option<EscalationLevel> {
        match self {
            Self::None => Some(Self::Reminder),
            Self::Reminder => Some(Self::Warning),
            Self::Warning => Some(Self::Escalated),
            Self::Escalated => None,
        }
    }

    /// Event type recorded when a request arrives at this level
    pub fn arrival_event(&self) -> Option<AccountabilityEventType> {
        match self {
            Self::None => None,
            Self::Reminder => Some(AccountabilityEventType::Reminder),
            Self::Warning => Some(AccountabilityEventType::Warning),
            Self::Escalated => Some(AccountabilityEventType::Escalation),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Reminder => "REMINDER",
            Self::Warning => "WARNING",
            Self::Escalated => "ESCALATED",
        }
    }
}

impl std::fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of accountability event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountabilityEventType {
    Reminder,
    Warning,
    Escalation,
}

impl std::fmt::Display for AccountabilityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reminder => write!(f, "REMINDER"),
            Self::Warning => write!(f, "WARNING"),
            Self::Escalation => write!(f, "ESCALATION"),
        }
    }
}

/// A client contract; the trunk every request hangs from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    pub name: String,
    pub client_name: String,
    /// Service package sold to the client; keys the accountability policy
    pub client_package: String,
}

impl Contract {
    pub fn new(
        name: impl Into<String>,
        client_name: impl Into<String>,
        client_package: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            client_name: client_name.into(),
            client_package: client_package.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A trackable unit of obligation owed to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Unique request identifier
    pub id: RequestId,

    /// Contract this request is anchored to
    pub contract_id: ContractId,

    /// Optional milestone grouping
    pub milestone_id: Option<MilestoneId>,

    /// Responsible user
    pub owner_id: UserId,

    pub title: String,

    pub description: Option<String>,

    /// Category (TASK, DELIVERABLE, APPROVAL, ...)
    pub tag: String,

    pub priority: Priority,

    pub due_at: DateTime<Utc>,

    pub state: RequestState,

    pub escalation_level: EscalationLevel,

    pub started_at: Option<DateTime<Utc>>,

    pub completed_at: Option<DateTime<Utc>>,

    /// Red tag currently holding this request in BLOCKED
    pub blocked_by_red_tag_id: Option<RedTagId>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Create an open request with no escalation
    pub fn new(
        contract_id: impl Into<String>,
        owner_id: impl Into<String>,
        title: impl Into<String>,
        tag: impl Into<String>,
        due_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            contract_id: contract_id.into(),
            milestone_id: None,
            owner_id: owner_id.into(),
            title: title.into(),
            description: None,
            tag: tag.into(),
            priority: Priority::Normal,
            due_at,
            state: RequestState::Open,
            escalation_level: EscalationLevel::None,
            started_at: None,
            completed_at: None,
            blocked_by_red_tag_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_milestone(mut self, milestone_id: impl Into<String>) -> Self {
        self.milestone_id = Some(milestone_id.into());
        self
    }

    pub fn with_state(mut self, state: RequestState) -> Self {
        self.state = state;
        self
    }

    pub fn with_escalation_level(mut self, level: EscalationLevel) -> Self {
        self.escalation_level = level;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Blocked by the blocking engine, with a recorded cause
    pub fn is_blocked(&self) -> bool {
        self.state == RequestState::Blocked && self.blocked_by_red_tag_id.is_some()
    }
}

/// Immutable audit record of one escalation transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountabilityEvent {
    pub id: EventId,
    pub request_id: RequestId,
    #[serde(rename = "type")]
    pub event_type: AccountabilityEventType,
    pub from_level: EscalationLevel,
    pub to_level: EscalationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Red tag severity; decides the blast radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedTagSeverity {
    /// Single request (falls back to its milestone)
    Warning,
    /// Whole milestone (falls back to the contract)
    Critical,
    /// Whole contract
    Blocker,
}

impl std::fmt::Display for RedTagSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warning => write!(f, "WARNING"),
            Self::Critical => write!(f, "CRITICAL"),
            Self::Blocker => write!(f, "BLOCKER"),
        }
    }
}

impl std::str::FromStr for RedTagSeverity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WARNING" => Ok(Self::Warning),
            "CRITICAL" => Ok(Self::Critical),
            "BLOCKER" => Ok(Self::Blocker),
            other => Err(format!("unknown red tag severity: {}", other)),
        }
    }
}

/// Red tag lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedTagState {
    Open,
    Acknowledged,
    Resolved,
    Dismissed,
}

impl RedTagState {
    /// Open or acknowledged; the tag still holds its block
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Open | Self::Acknowledged)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for RedTagState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Dismissed => write!(f, "DISMISSED"),
        }
    }
}

impl std::str::FromStr for RedTagState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "OPEN" => Ok(Self::Open),
            "ACKNOWLEDGED" => Ok(Self::Acknowledged),
            "RESOLVED" => Ok(Self::Resolved),
            "DISMISSED" => Ok(Self::Dismissed),
            other => Err(format!("unknown red tag state: {}", other)),
        }
    }
}

/// A risk flag raised against a contract, milestone or request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedTag {
    pub id: RedTagId,
    pub contract_id: ContractId,
    pub milestone_id: Option<MilestoneId>,
    pub request_id: Option<RequestId>,
    pub severity: RedTagSeverity,
    pub state: RedTagState,
    pub title: String,
    pub description: Option<String>,
    pub created_by_id: Option<UserId>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RedTag {
    /// Create an open red tag scoped to a contract
    pub fn new(
        contract_id: impl Into<String>,
        severity: RedTagSeverity,
        title: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            contract_id: contract_id.into(),
            milestone_id: None,
            request_id: None,
            severity,
            state: RedTagState::Open,
            title: title.into(),
            description: None,
            created_by_id: None,
            resolution_notes: None,
            resolved_at: None,
            resolved_by_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_milestone(mut self, milestone_id: impl Into<String>) -> Self {
        self.milestone_id = Some(milestone_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}
