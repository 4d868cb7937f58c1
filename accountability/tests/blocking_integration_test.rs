//! Integration tests for the Blocking Engine
//!
//! Tests verify the severity → scope table against a populated store:
//! - WARNING with a request id touches exactly that request
//! - CRITICAL falls back to the whole contract without a milestone
//! - BLOCKER blocks every active request of the contract, nothing else
//! - Removing a tag reopens only the requests it blocked
//! - `is_request_blocked` is true only for BLOCKED rows with a cause

use std::sync::Arc;

use accountability::{
    BlockScope, BlockingEngine, MemoryAuditLog, MemoryStore, RedTag, RedTagRepository,
    RedTagSeverity, Request, RequestRepository, RequestState,
};
use chrono::{Duration, Utc};

struct Fixture {
    store: Arc<MemoryStore>,
    engine: BlockingEngine,
}

/// Contract c1 with milestone m1 (r1, r2, r3 completed) and m2 (r4, r5
/// cancelled), plus r6 on another contract.
fn fixture() -> Fixture {
    let store = MemoryStore::new().shared();
    let due = Utc::now() + Duration::days(3);
    let rows = [
        ("r1", "c1", Some("m1"), RequestState::Open),
        ("r2", "c1", Some("m1"), RequestState::InProgress),
        ("r3", "c1", Some("m1"), RequestState::Completed),
        ("r4", "c1", Some("m2"), RequestState::Open),
        ("r5", "c1", Some("m2"), RequestState::Cancelled),
        ("r6", "c2", None, RequestState::Open),
    ];
    for (id, contract, milestone, state) in rows {
        let mut request = Request::new(contract, "u1", id, "TASK", due)
            .with_id(id)
            .with_state(state);
        request.milestone_id = milestone.map(str::to_string);
        store.create_request(&request).unwrap();
    }
    let engine = BlockingEngine::new(store.clone(), MemoryAuditLog::new().shared());
    Fixture { store, engine }
}

impl Fixture {
    fn raise(&self, red_tag: RedTag) -> String {
        let id = red_tag.id.clone();
        self.store.create_red_tag(&red_tag).unwrap();
        id
    }

    fn state(&self, id: &str) -> RequestState {
        self.store.get_request(id).unwrap().unwrap().state
    }

    fn blocked_ids(&self) -> Vec<String> {
        ["r1", "r2", "r3", "r4", "r5", "r6"]
            .into_iter()
            .filter(|id| self.state(id) == RequestState::Blocked)
            .map(str::to_string)
            .collect()
    }
}

#[test]
fn test_warning_blocks_only_linked_request() {
    let fx = fixture();
    let tag = fx.raise(
        RedTag::new("c1", RedTagSeverity::Warning, "Client unresponsive")
            .with_milestone("m1")
            .with_request("r2"),
    );

    let outcome = fx.engine.apply_blocking(&tag).unwrap();
    assert_eq!(outcome.scope, Some(BlockScope::Request("r2".to_string())));
    assert_eq!(fx.blocked_ids(), vec!["r2"]);

    let r2 = fx.store.get_request("r2").unwrap().unwrap();
    assert_eq!(r2.blocked_by_red_tag_id.as_deref(), Some(tag.as_str()));
}

#[test]
fn test_warning_without_request_falls_back_to_milestone() {
    let fx = fixture();
    let tag = fx.raise(RedTag::new("c1", RedTagSeverity::Warning, "Scope creep").with_milestone("m1"));

    fx.engine.apply_blocking(&tag).unwrap();
    assert_eq!(fx.blocked_ids(), vec!["r1", "r2"]);
}

#[test]
fn test_critical_scopes_to_milestone_or_contract() {
    let fx = fixture();
    let milestone = fx.raise(RedTag::new("c1", RedTagSeverity::Critical, "Asset gap").with_milestone("m2"));
    fx.engine.apply_blocking(&milestone).unwrap();
    assert_eq!(fx.blocked_ids(), vec!["r4"]);

    let fx = fixture();
    let contract = fx.raise(RedTag::new("c1", RedTagSeverity::Critical, "Budget frozen"));
    fx.engine.apply_blocking(&contract).unwrap();
    assert_eq!(fx.blocked_ids(), vec!["r1", "r2", "r4"]);
}

#[test]
fn test_blocker_blocks_contract_and_leaves_finished_alone() {
    let fx = fixture();
    let tag = fx.raise(RedTag::new("c1", RedTagSeverity::Blocker, "Payment overdue"));

    let outcome = fx.engine.apply_blocking(&tag).unwrap();
    assert_eq!(outcome.affected.len(), 3);
    assert_eq!(fx.blocked_ids(), vec!["r1", "r2", "r4"]);
    assert_eq!(fx.state("r3"), RequestState::Completed);
    assert_eq!(fx.state("r5"), RequestState::Cancelled);
    assert_eq!(fx.state("r6"), RequestState::Open);
}

#[test]
fn test_first_blocker_wins() {
    let fx = fixture();
    let first = fx.raise(RedTag::new("c1", RedTagSeverity::Warning, "First").with_request("r1"));
    let second = fx.raise(RedTag::new("c1", RedTagSeverity::Blocker, "Second"));

    fx.engine.apply_blocking(&first).unwrap();
    let outcome = fx.engine.apply_blocking(&second).unwrap();
    assert_eq!(outcome.affected, vec!["r2", "r4"]);

    let r1 = fx.store.get_request("r1").unwrap().unwrap();
    assert_eq!(r1.blocked_by_red_tag_id.as_deref(), Some(first.as_str()));
}

#[test]
fn test_remove_reopens_only_own_requests() {
    let fx = fixture();
    let first = fx.raise(RedTag::new("c1", RedTagSeverity::Warning, "First").with_request("r2"));
    let second = fx.raise(RedTag::new("c1", RedTagSeverity::Critical, "Second").with_milestone("m2"));
    fx.engine.apply_blocking(&first).unwrap();
    fx.engine.apply_blocking(&second).unwrap();

    let outcome = fx.engine.remove_blocking(&first).unwrap();
    assert_eq!(outcome.affected, vec!["r2"]);

    // IN_PROGRESS before the block, OPEN after it
    assert_eq!(fx.state("r2"), RequestState::Open);
    assert_eq!(fx.state("r4"), RequestState::Blocked);
    assert!(fx.engine.is_request_blocked("r4").unwrap());
}

#[test]
fn test_is_request_blocked_per_state() {
    let fx = fixture();
    for id in ["r1", "r2", "r3", "r5", "r6"] {
        assert!(!fx.engine.is_request_blocked(id).unwrap(), "{} should not be blocked", id);
    }

    // BLOCKED without a recorded cause does not count
    let orphan = Request::new("c3", "u1", "Orphan", "TASK", Utc::now())
        .with_id("r7")
        .with_state(RequestState::Blocked);
    fx.store.create_request(&orphan).unwrap();
    assert!(!fx.engine.is_request_blocked("r7").unwrap());

    let tag = fx.raise(RedTag::new("c1", RedTagSeverity::Warning, "Risk").with_request("r1"));
    fx.engine.apply_blocking(&tag).unwrap();
    assert!(fx.engine.is_request_blocked("r1").unwrap());
}
