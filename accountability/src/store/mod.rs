//! Persistence layer for requests, red tags, policies and events
//!
//! The engines never talk to a storage technology directly; they go through
//! the repository traits below. Two backends ship with the crate:
//!
//! - [`MemoryStore`]: RwLock-guarded tables with JSON snapshot load/save
//! - `RocksStore` (feature `rocksdb-store`): column families in RocksDB
//!
//! # Atomicity
//!
//! Every operation that the engines rely on for consistency is a single
//! conditional unit of work inside the backend:
//!
//! - [`RequestRepository::apply_escalation`] updates the level *and* appends
//!   the event, but only if the stored level still equals the expected one
//! - [`RequestRepository::block_requests`] only touches rows that are OPEN or
//!   IN_PROGRESS at write time (first blocker wins)
//! - [`RequestRepository::set_request_state`] only applies when the stored
//!   state still equals the expected one

pub mod memory;
#[cfg(feature = "rocksdb-store")]
pub mod rocks;
#[cfg(feature = "rocksdb-store")]
pub mod schema;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::blocking::BlockScope;
use crate::model::{
    AccountabilityEvent, Contract, EscalationLevel, RedTag, RedTagId, RedTagState, Request,
    RequestId, RequestState,
};
use crate::policy::AccountabilityPolicy;

pub use memory::{MemoryStore, StoreSnapshot};
#[cfg(feature = "rocksdb-store")]
pub use rocks::RocksStore;

/// Error type for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[cfg(feature = "rocksdb-store")]
    #[error("RocksDB error: {0}")]
    RocksDb(rocksdb::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Key already exists: {0}")]
    AlreadyExists(String),

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("Column family not found: {0}")]
    ColumnFamilyNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Policy lookup keyed by client package
pub trait PolicyStore: Send + Sync {
    fn get_policy(&self, client_package: &str) -> StoreResult<Option<AccountabilityPolicy>>;

    /// Create or replace all three thresholds for a package
    fn upsert_policy(&self, policy: AccountabilityPolicy) -> StoreResult<AccountabilityPolicy>;

    /// All policies, ordered by client package
    fn list_policies(&self) -> StoreResult<Vec<AccountabilityPolicy>>;
}

/// Read-mostly contract lookup
pub trait ContractDirectory: Send + Sync {
    fn put_contract(&self, contract: &Contract) -> StoreResult<()>;

    fn get_contract(&self, contract_id: &str) -> StoreResult<Option<Contract>>;

    fn list_contracts(&self) -> StoreResult<Vec<Contract>>;
}

/// Request and accountability event storage
pub trait RequestRepository: Send + Sync {
    /// Insert a new request; fails if the id is taken
    fn create_request(&self, request: &Request) -> StoreResult<()>;

    fn get_request(&self, request_id: &str) -> StoreResult<Option<Request>>;

    /// All requests matching the filter, ordered by due date
    fn find_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<Request>>;

    /// Conditionally apply a state change.
    ///
    /// Returns `Ok(None)` when the stored state no longer equals
    /// `change.expected`, and `NotFound` when the request does not exist.
    fn set_request_state(&self, change: &StateChange) -> StoreResult<Option<Request>>;

    /// Advance the escalation level and append its event as one unit.
    ///
    /// Returns `Ok(false)` without writing anything when the request is no
    /// longer at `transition.expected_level` or no longer OPEN/IN_PROGRESS.
    fn apply_escalation(&self, transition: &EscalationTransition) -> StoreResult<bool>;

    /// Block every OPEN/IN_PROGRESS request inside `scope`.
    ///
    /// Returns the ids of the requests that were blocked by this call.
    fn block_requests(
        &self,
        scope: &BlockScope,
        red_tag_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<RequestId>>;

    /// Reopen every request blocked by `red_tag_id`.
    fn unblock_requests(&self, red_tag_id: &str, at: DateTime<Utc>)
        -> StoreResult<Vec<RequestId>>;

    /// Accountability events, newest first, optionally for one request
    fn list_events(&self, request_id: Option<&str>) -> StoreResult<Vec<AccountabilityEvent>>;
}

/// Red tag storage
pub trait RedTagRepository: Send + Sync {
    fn create_red_tag(&self, red_tag: &RedTag) -> StoreResult<()>;

    fn get_red_tag(&self, red_tag_id: &str) -> StoreResult<Option<RedTag>>;

    /// Replace a stored red tag if it is still in `expected` state.
    ///
    /// Returns `false` when another writer moved the tag first; fails with
    /// `NotFound` if absent.
    fn update_red_tag(&self, red_tag: &RedTag, expected: RedTagState) -> StoreResult<bool>;

    /// All red tags, newest first
    fn list_red_tags(&self) -> StoreResult<Vec<RedTag>>;
}

/// Everything the engines and lifecycle handlers need from a backend
pub trait Store: PolicyStore + ContractDirectory + RequestRepository + RedTagRepository {}

impl<T> Store for T where T: PolicyStore + ContractDirectory + RequestRepository + RedTagRepository
{}

/// Shared reference to a store backend
pub type SharedStore = Arc<dyn Store>;

/// Filter for request queries; empty filter matches everything
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub states: Option<Vec<RequestState>>,
    pub contract_id: Option<String>,
    pub milestone_id: Option<String>,
    pub blocked_by: Option<RedTagId>,
    pub tag: Option<String>,
}

impl RequestFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the engines operate on (OPEN or IN_PROGRESS)
    pub fn active() -> Self {
        Self::new().states(&RequestState::ACTIVE)
    }

    pub fn states(mut self, states: &[RequestState]) -> Self {
        self.states = Some(states.to_vec());
        self
    }

    pub fn contract(mut self, contract_id: &str) -> Self {
        self.contract_id = Some(contract_id.to_string());
        self
    }

    pub fn milestone(mut self, milestone_id: &str) -> Self {
        self.milestone_id = Some(milestone_id.to_string());
        self
    }

    pub fn blocked_by(mut self, red_tag_id: &str) -> Self {
        self.blocked_by = Some(red_tag_id.to_string());
        self
    }

    pub fn tag(mut self, tag: &str) -> Self {
        self.tag = Some(tag.to_string());
        self
    }

    /// Check if a request matches this filter
    pub fn matches(&self, request: &Request) -> bool {
        if let Some(ref states) = self.states {
            if !states.contains(&request.state) {
                return false;
            }
        }
        if let Some(ref cid) = self.contract_id {
            if &request.contract_id != cid {
                return false;
            }
        }
        if let Some(ref mid) = self.milestone_id {
            if request.milestone_id.as_ref() != Some(mid) {
                return false;
            }
        }
        if let Some(ref tid) = self.blocked_by {
            if request.blocked_by_red_tag_id.as_ref() != Some(tid) {
                return false;
            }
        }
        if let Some(ref tag) = self.tag {
            if &request.tag != tag {
                return false;
            }
        }
        true
    }
}

/// A single escalation step to be committed atomically
#[derive(Debug, Clone)]
pub struct EscalationTransition {
    pub request_id: RequestId,
    /// Level the caller observed before deciding to advance
    pub expected_level: EscalationLevel,
    /// Event to append; its `to_level` becomes the new level
    pub event: AccountabilityEvent,
}

/// A manual request state change guarded by the expected prior state
#[derive(Debug, Clone)]
pub struct StateChange {
    pub request_id: RequestId,
    pub expected: RequestState,
    pub state: RequestState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Drop the blocking reference along with the state change
    pub clear_block: bool,
    pub at: DateTime<Utc>,
}

impl StateChange {
    /// Apply the change to a request row in place
    pub(crate) fn apply_to(&self, request: &mut Request) {
        request.state = self.state;
        if self.started_at.is_some() {
            request.started_at = self.started_at;
        }
        if self.completed_at.is_some() {
            request.completed_at = self.completed_at;
        }
        if self.clear_block {
            request.blocked_by_red_tag_id = None;
        }
        request.updated_at = self.at;
    }
}

/// Order requests by due date, then id, for stable listings
pub(crate) fn sort_requests(requests: &mut [Request]) {
    requests.sort_by(|a, b| a.due_at.cmp(&b.due_at).then_with(|| a.id.cmp(&b.id)));
}

/// Order events newest first
pub(crate) fn sort_events(events: &mut [AccountabilityEvent]) {
    events.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}
