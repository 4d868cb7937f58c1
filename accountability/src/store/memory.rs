//! In-memory store with JSON snapshot persistence
//!
//! All tables live behind a single `RwLock`, so every conditional update
//! observes and writes the rows it touches under one write guard.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    sort_events, sort_requests, ContractDirectory, EscalationTransition, PolicyStore,
    RedTagRepository, RequestFilter, RequestRepository, StateChange, StoreError, StoreResult,
};
use crate::blocking::BlockScope;
use crate::model::{
    AccountabilityEvent, Contract, ContractId, RedTag, RedTagId, RedTagState, Request, RequestId,
    RequestState,
};
use crate::policy::AccountabilityPolicy;

/// Every table of the memory store, as written to a snapshot file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub policies: BTreeMap<String, AccountabilityPolicy>,
    #[serde(default)]
    pub contracts: BTreeMap<ContractId, Contract>,
    #[serde(default)]
    pub requests: BTreeMap<RequestId, Request>,
    #[serde(default)]
    pub red_tags: BTreeMap<RedTagId, RedTag>,
    #[serde(default)]
    pub events: Vec<AccountabilityEvent>,
}

/// RwLock-guarded in-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with existing tables
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            tables: RwLock::new(snapshot),
        }
    }

    /// Load a snapshot file; a missing file yields an empty store
    pub fn load(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No snapshot found, starting empty");
            return Ok(Self::new());
        }

        let bytes = std::fs::read(path)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        debug!(
            path = %path.display(),
            requests = snapshot.requests.len(),
            red_tags = snapshot.red_tags.len(),
            "Snapshot loaded"
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the current tables to a snapshot file
    ///
    /// The file is written next to its destination and renamed into place.
    pub fn save(&self, path: impl AsRef<Path>) -> StoreResult<()> {
        let path = path.as_ref();
        let bytes = {
            let tables = self.read()?;
            serde_json::to_vec_pretty(&*tables)
                .map_err(|e| StoreError::Serialization(e.to_string()))?
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Snapshot saved");
        Ok(())
    }

    /// Copy of all tables
    pub fn snapshot(&self) -> StoreResult<StoreSnapshot> {
        Ok(self.read()?.clone())
    }

    /// Create a shared reference to this store
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreSnapshot>> {
        self.tables.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreSnapshot>> {
        self.tables.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl PolicyStore for MemoryStore {
    fn get_policy(&self, client_package: &str) -> StoreResult<Option<AccountabilityPolicy>> {
        Ok(self.read()?.policies.get(client_package).cloned())
    }

    fn upsert_policy(&self, policy: AccountabilityPolicy) -> StoreResult<AccountabilityPolicy> {
        let mut tables = self.write()?;
        tables
            .policies
            .insert(policy.client_package.clone(), policy.clone());
        Ok(policy)
    }

    fn list_policies(&self) -> StoreResult<Vec<AccountabilityPolicy>> {
        // BTreeMap iteration is already ordered by package
        Ok(self.read()?.policies.values().cloned().collect())
    }
}

impl ContractDirectory for MemoryStore {
    fn put_contract(&self, contract: &Contract) -> StoreResult<()> {
        let mut tables = self.write()?;
        tables
            .contracts
            .insert(contract.id.clone(), contract.clone());
        Ok(())
    }

    fn get_contract(&self, contract_id: &str) -> StoreResult<Option<Contract>> {
        Ok(self.read()?.contracts.get(contract_id).cloned())
    }

    fn list_contracts(&self) -> StoreResult<Vec<Contract>> {
        Ok(self.read()?.contracts.values().cloned().collect())
    }
}

impl RequestRepository for MemoryStore {
    fn create_request(&self, request: &Request) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.requests.contains_key(&request.id) {
            return Err(StoreError::AlreadyExists(request.id.clone()));
        }
        tables.requests.insert(request.id.clone(), request.clone());
        Ok(())
    }

    fn get_request(&self, request_id: &str) -> StoreResult<Option<Request>> {
        Ok(self.read()?.requests.get(request_id).cloned())
    }

    fn find_requests(&self, filter: &RequestFilter) -> StoreResult<Vec<Request>> {
        let mut requests: Vec<Request> = self
            .read()?
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        sort_requests(&mut requests);
        Ok(requests)
    }

    fn set_request_state(&self, change: &StateChange) -> StoreResult<Option<Request>> {
        let mut tables = self.write()?;
        let request = tables
            .requests
            .get_mut(&change.request_id)
            .ok_or_else(|| StoreError::NotFound(change.request_id.clone()))?;

        if request.state != change.expected {
            return Ok(None);
        }
        change.apply_to(request);
        Ok(Some(request.clone()))
    }

    fn apply_escalation(&self, transition: &EscalationTransition) -> StoreResult<bool> {
        let mut guard = self.write()?;
        let tables = &mut *guard;
        let Some(request) = tables.requests.get_mut(&transition.request_id) else {
            return Ok(false);
        };

        if request.escalation_level != transition.expected_level || !request.state.is_active() {
            return Ok(false);
        }

        request.escalation_level = transition.event.to_level;
        request.updated_at = transition.event.created_at;
        tables.events.push(transition.event.clone());
        Ok(true)
    }

    fn block_requests(
        &self,
        scope: &BlockScope,
        red_tag_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<RequestId>> {
        let mut tables = self.write()?;
        let mut blocked = Vec::new();

        for request in tables.requests.values_mut() {
            if scope.matches(request) && request.state.is_active() {
                request.state = RequestState::Blocked;
                request.blocked_by_red_tag_id = Some(red_tag_id.to_string());
                request.updated_at = at;
                blocked.push(request.id.clone());
            }
        }

        Ok(blocked)
    }

    fn unblock_requests(
        &self,
        red_tag_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Vec<RequestId>> {
        let mut tables = self.write()?;
        let mut reopened = Vec::new();

        for request in tables.requests.values_mut() {
            if request.blocked_by_red_tag_id.as_deref() == Some(red_tag_id) {
                request.state = RequestState::Open;
                request.blocked_by_red_tag_id = None;
                request.updated_at = at;
                reopened.push(request.id.clone());
            }
        }

        Ok(reopened)
    }

    fn list_events(&self, request_id: Option<&str>) -> StoreResult<Vec<AccountabilityEvent>> {
        let mut events: Vec<AccountabilityEvent> = self
            .read()?
            .events
            .iter()
            .filter(|e| request_id.map_or(true, |id| e.request_id == id))
            .cloned()
            .collect();
        sort_events(&mut events);
        Ok(events)
    }
}

impl RedTagRepository for MemoryStore {
    fn create_red_tag(&self, red_tag: &RedTag) -> StoreResult<()> {
        let mut tables = self.write()?;
        if tables.red_tags.contains_key(&red_tag.id) {
            return Err(StoreError::AlreadyExists(red_tag.id.clone()));
        }
        tables.red_tags.insert(red_tag.id.clone(), red_tag.clone());
        Ok(())
    }

    fn get_red_tag(&self, red_tag_id: &str) -> StoreResult<Option<RedTag>> {
        Ok(self.read()?.red_tags.get(red_tag_id).cloned())
    }

    fn update_red_tag(&self, red_tag: &RedTag, expected: RedTagState) -> StoreResult<bool> {
        let mut tables = self.write()?;
        match tables.red_tags.get_mut(&red_tag.id) {
            Some(existing) if existing.state != expected => {
                debug!(red_tag_id = %red_tag.id, expected = %expected, "Stale red tag update");
                Ok(false)
            }
            Some(existing) => {
                *existing = red_tag.clone();
                Ok(true)
            }
            None => Err(StoreError::NotFound(red_tag.id.clone())),
        }
    }

    fn list_red_tags(&self) -> StoreResult<Vec<RedTag>> {
        let mut tags: Vec<RedTag> = self.read()?.red_tags.values().cloned().collect();
        tags.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AccountabilityEventType, EscalationLevel, RedTagSeverity};
    use chrono::Duration;
    use tempfile::tempdir;

    fn request(id: &str) -> Request {
        Request::new("c1", "u1", format!("Request {}", id), "TASK", Utc::now()).with_id(id)
    }

    fn reminder_event(request_id: &str) -> AccountabilityEvent {
        AccountabilityEvent {
            id: crate::model::new_id(),
            request_id: request_id.to_string(),
            event_type: AccountabilityEventType::Reminder,
            from_level: EscalationLevel::None,
            to_level: EscalationLevel::Reminder,
            message: "Reminder".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_request_crud() {
        let store = MemoryStore::new();
        store.create_request(&request("r1")).unwrap();

        let retrieved = store.get_request("r1").unwrap().unwrap();
        assert_eq!(retrieved.title, "Request r1");
        assert!(store.get_request("missing").unwrap().is_none());

        let dup = store.create_request(&request("r1"));
        assert!(matches!(dup, Err(StoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_find_requests_orders_by_due_date() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let mut late = request("a-late");
        late.due_at = now + Duration::hours(5);
        let mut early = request("z-early");
        early.due_at = now;
        store.create_request(&late).unwrap();
        store.create_request(&early).unwrap();

        let ids: Vec<String> = store
            .find_requests(&RequestFilter::new())
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["z-early", "a-late"]);
    }

    #[test]
    fn test_apply_escalation_is_compare_and_swap() {
        let store = MemoryStore::new();
        store.create_request(&request("r1")).unwrap();

        let transition = EscalationTransition {
            request_id: "r1".to_string(),
            expected_level: EscalationLevel::None,
            event: reminder_event("r1"),
        };

        assert!(store.apply_escalation(&transition).unwrap());
        // Same expected level again: stale, nothing written
        assert!(!store.apply_escalation(&transition).unwrap());

        let stored = store.get_request("r1").unwrap().unwrap();
        assert_eq!(stored.escalation_level, EscalationLevel::Reminder);
        assert_eq!(store.list_events(Some("r1")).unwrap().len(), 1);
    }

    #[test]
    fn test_apply_escalation_skips_inactive_requests() {
        let store = MemoryStore::new();
        store
            .create_request(&request("r1").with_state(RequestState::Blocked))
            .unwrap();

        let transition = EscalationTransition {
            request_id: "r1".to_string(),
            expected_level: EscalationLevel::None,
            event: reminder_event("r1"),
        };
        assert!(!store.apply_escalation(&transition).unwrap());
        assert!(store.list_events(None).unwrap().is_empty());
    }

    #[test]
    fn test_block_requests_first_blocker_wins() {
        let store = MemoryStore::new();
        store.create_request(&request("r1")).unwrap();
        store.create_request(&request("r2")).unwrap();

        let scope = BlockScope::Contract("c1".to_string());
        let first = store.block_requests(&scope, "t1", Utc::now()).unwrap();
        assert_eq!(first.len(), 2);

        let second = store.block_requests(&scope, "t2", Utc::now()).unwrap();
        assert!(second.is_empty());

        let r1 = store.get_request("r1").unwrap().unwrap();
        assert_eq!(r1.blocked_by_red_tag_id.as_deref(), Some("t1"));
    }

    #[test]
    fn test_unblock_only_touches_own_tag() {
        let store = MemoryStore::new();
        store.create_request(&request("r1")).unwrap();
        store.create_request(&request("r2")).unwrap();
        store
            .block_requests(&BlockScope::Request("r1".to_string()), "t1", Utc::now())
            .unwrap();
        store
            .block_requests(&BlockScope::Request("r2".to_string()), "t2", Utc::now())
            .unwrap();

        let reopened = store.unblock_requests("t1", Utc::now()).unwrap();
        assert_eq!(reopened, vec!["r1".to_string()]);
        assert_eq!(
            store.get_request("r2").unwrap().unwrap().state,
            RequestState::Blocked
        );
    }

    #[test]
    fn test_set_request_state_guards_expected_state() {
        let store = MemoryStore::new();
        store.create_request(&request("r1")).unwrap();

        let change = StateChange {
            request_id: "r1".to_string(),
            expected: RequestState::InProgress,
            state: RequestState::Completed,
            started_at: None,
            completed_at: Some(Utc::now()),
            clear_block: false,
            at: Utc::now(),
        };
        assert!(store.set_request_state(&change).unwrap().is_none());

        let change = StateChange {
            expected: RequestState::Open,
            ..change
        };
        let updated = store.set_request_state(&change).unwrap().unwrap();
        assert_eq!(updated.state, RequestState::Completed);
        assert!(updated.completed_at.is_some());

        let missing = StateChange {
            request_id: "nope".to_string(),
            ..change
        };
        assert!(matches!(
            store.set_request_state(&missing),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_red_tag_update_requires_existing() {
        let store = MemoryStore::new();
        let tag = RedTag::new("c1", RedTagSeverity::Blocker, "Vendor outage");
        assert!(matches!(
            store.update_red_tag(&tag, RedTagState::Open),
            Err(StoreError::NotFound(_))
        ));

        store.create_red_tag(&tag).unwrap();
        let mut acked = tag.clone();
        acked.state = RedTagState::Acknowledged;
        assert!(store.update_red_tag(&acked, RedTagState::Open).unwrap());
        assert_eq!(
            store.get_red_tag(&tag.id).unwrap().unwrap().state,
            RedTagState::Acknowledged
        );
    }

    #[test]
    fn test_red_tag_update_is_compare_and_swap() {
        let store = MemoryStore::new();
        let tag = RedTag::new("c1", RedTagSeverity::Blocker, "Vendor outage");
        store.create_red_tag(&tag).unwrap();

        let mut resolved = tag.clone();
        resolved.state = RedTagState::Resolved;
        assert!(store.update_red_tag(&resolved, RedTagState::Open).unwrap());

        // A writer that read the tag while it was still OPEN loses
        let mut acked = tag.clone();
        acked.state = RedTagState::Acknowledged;
        assert!(!store.update_red_tag(&acked, RedTagState::Open).unwrap());
        assert_eq!(
            store.get_red_tag(&tag.id).unwrap().unwrap().state,
            RedTagState::Resolved
        );
    }

    #[test]
    fn test_snapshot_round_trip_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data").join("tracker.json");

        let store = MemoryStore::new();
        store
            .upsert_policy(AccountabilityPolicy::new("GOLD", 48, 0, 24))
            .unwrap();
        store
            .put_contract(&Contract::new("Retainer", "Acme", "GOLD").with_id("c1"))
            .unwrap();
        store.create_request(&request("r1")).unwrap();
        store.save(&path).unwrap();

        let reloaded = MemoryStore::load(&path).unwrap();
        assert_eq!(reloaded.snapshot().unwrap(), store.snapshot().unwrap());
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::load(dir.path().join("absent.json")).unwrap();
        assert!(store.snapshot().unwrap().requests.is_empty());
    }
}
