//! Blocking Engine — propagates red tags into blocked requests
//!
//! Maintains the invariant that a request is BLOCKED exactly while an
//! active red tag's blast radius covers it, and records which tag owns the
//! block. All row selection happens inside the store's conditional bulk
//! updates.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::audit::{
    record_or_warn, AuditAction, AuditActor, AuditEntry, Component, EntityKind, SharedAuditSink,
};
use crate::blocking::scope::BlockScope;
use crate::error::{TrackerError, TrackerResult};
use crate::model::{RedTagId, RequestId, RequestState};
use crate::store::SharedStore;

/// Result of an apply/remove call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingOutcome {
    pub red_tag_id: RedTagId,
    /// Scope that was applied; `None` when nothing could be resolved
    pub scope: Option<BlockScope>,
    /// Requests whose state changed in this call
    pub affected: Vec<RequestId>,
}

/// The Blocking Engine
pub struct BlockingEngine {
    store: SharedStore,
    audit: SharedAuditSink,
}

impl BlockingEngine {
    pub fn new(store: SharedStore, audit: SharedAuditSink) -> Self {
        Self { store, audit }
    }

    /// Block every OPEN/IN_PROGRESS request inside the red tag's scope.
    ///
    /// Requests already blocked by another tag, completed or cancelled are
    /// left alone. A resolved/dismissed tag, or one whose scope cannot be
    /// resolved, is a no-op.
    pub fn apply_blocking(&self, red_tag_id: &str) -> TrackerResult<BlockingOutcome> {
        let red_tag = self
            .store
            .get_red_tag(red_tag_id)?
            .ok_or_else(|| TrackerError::not_found("Red tag", red_tag_id))?;

        let mut outcome = BlockingOutcome {
            red_tag_id: red_tag.id.clone(),
            scope: None,
            affected: Vec::new(),
        };

        if !red_tag.state.is_active() {
            debug!(red_tag_id, state = %red_tag.state, "Red tag inactive, not blocking");
            return Ok(outcome);
        }

        let Some(scope) = BlockScope::for_red_tag(&red_tag) else {
            warn!(
                red_tag_id,
                severity = %red_tag.severity,
                "Red tag has no resolvable scope, skipping block"
            );
            return Ok(outcome);
        };

        let now = Utc::now();
        let affected = self.store.block_requests(&scope, &red_tag.id, now)?;

        for request_id in &affected {
            record_or_warn(
                self.audit.as_ref(),
                AuditEntry::new(
                    AuditActor::System(Component::BlockingEngine),
                    AuditAction::Update,
                    EntityKind::Request,
                    request_id.clone(),
                )
                .with_details(json!({
                    "state": RequestState::Blocked,
                    "blockedByRedTagId": red_tag.id,
                    "severity": red_tag.severity,
                    "scope": scope,
                }))
                .at(now),
            );
        }

        info!(
            red_tag_id,
            scope = %scope,
            blocked = affected.len(),
            "Red tag blocking applied"
        );

        outcome.scope = Some(scope);
        outcome.affected = affected;
        Ok(outcome)
    }

    /// Reopen every request blocked by this red tag.
    ///
    /// Requests go back to OPEN regardless of their state before the block.
    pub fn remove_blocking(&self, red_tag_id: &str) -> TrackerResult<BlockingOutcome> {
        let now = Utc::now();
        let affected = self.store.unblock_requests(red_tag_id, now)?;

        for request_id in &affected {
            record_or_warn(
                self.audit.as_ref(),
                AuditEntry::new(
                    AuditActor::System(Component::BlockingEngine),
                    AuditAction::Update,
                    EntityKind::Request,
                    request_id.clone(),
                )
                .with_details(json!({
                    "state": RequestState::Open,
                    "unblockedFromRedTagId": red_tag_id,
                }))
                .at(now),
            );
        }

        info!(red_tag_id, reopened = affected.len(), "Red tag blocking removed");

        Ok(BlockingOutcome {
            red_tag_id: red_tag_id.to_string(),
            scope: None,
            affected,
        })
    }

    /// Whether a request is currently held by a red tag.
    ///
    /// Unknown requests are not blocked.
    pub fn is_request_blocked(&self, request_id: &str) -> TrackerResult<bool> {
        Ok(self
            .store
            .get_request(request_id)?
            .is_some_and(|request| request.is_blocked()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::model::{RedTag, RedTagSeverity, RedTagState, Request};
    use crate::store::{MemoryStore, RedTagRepository, RequestRepository};
    use std::sync::Arc;

    fn setup() -> (Arc<MemoryStore>, Arc<MemoryAuditLog>, BlockingEngine) {
        let store = MemoryStore::new().shared();
        let audit = MemoryAuditLog::new().shared();
        let engine = BlockingEngine::new(store.clone(), audit.clone());
        (store, audit, engine)
    }

    #[test]
    fn test_missing_red_tag_is_not_found() {
        let (_store, _audit, engine) = setup();
        let err = engine.apply_blocking("nope").unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_resolved_tag_does_not_block() {
        let (store, audit, engine) = setup();
        store
            .create_request(&Request::new("c1", "u1", "Draft", "TASK", Utc::now()))
            .unwrap();
        let mut red_tag = RedTag::new("c1", RedTagSeverity::Blocker, "Outage");
        red_tag.state = RedTagState::Resolved;
        store.create_red_tag(&red_tag).unwrap();

        let outcome = engine.apply_blocking(&red_tag.id).unwrap();
        assert!(outcome.affected.is_empty());
        assert!(outcome.scope.is_none());
        assert!(audit.is_empty());
    }

    #[test]
    fn test_unscoped_warning_is_noop() {
        let (store, _audit, engine) = setup();
        store
            .create_request(&Request::new("c1", "u1", "Draft", "TASK", Utc::now()))
            .unwrap();
        let red_tag = RedTag::new("c1", RedTagSeverity::Warning, "Vague risk");
        store.create_red_tag(&red_tag).unwrap();

        let outcome = engine.apply_blocking(&red_tag.id).unwrap();
        assert!(outcome.affected.is_empty());
        assert!(outcome.scope.is_none());
    }

    #[test]
    fn test_block_and_unblock_emit_audit_entries() {
        let (store, audit, engine) = setup();
        let request = Request::new("c1", "u1", "Draft", "TASK", Utc::now()).with_id("r1");
        store.create_request(&request).unwrap();
        let red_tag = RedTag::new("c1", RedTagSeverity::Warning, "Client silent")
            .with_request("r1");
        store.create_red_tag(&red_tag).unwrap();

        engine.apply_blocking(&red_tag.id).unwrap();
        assert!(engine.is_request_blocked("r1").unwrap());

        engine.remove_blocking(&red_tag.id).unwrap();
        assert!(!engine.is_request_blocked("r1").unwrap());

        let entries = audit.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.actor == AuditActor::System(Component::BlockingEngine)));
        assert_eq!(entries[0].details["state"], "BLOCKED");
        assert_eq!(entries[1].details["state"], "OPEN");
    }

    #[test]
    fn test_unknown_request_is_not_blocked() {
        let (_store, _audit, engine) = setup();
        assert!(!engine.is_request_blocked("ghost").unwrap());
    }
}
