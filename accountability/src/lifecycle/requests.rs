//! Request lifecycle — creation under the golden rule and manual state changes

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::audit::{
    record_or_warn, AuditAction, AuditActor, AuditEntry, Component, EntityKind, SharedAuditSink,
};
use crate::blocking::BlockingEngine;
use crate::error::{TrackerError, TrackerResult};
use crate::golden_rule::{self, GoldenRuleInput, Violation};
use crate::model::{AccountabilityEvent, Priority, Request, RequestState};
use crate::store::{RequestFilter, SharedStore, StateChange};

/// Reason returned when a blocked request is asked to start
pub const BLOCKED_START_REASON: &str = "Request is blocked by a red tag and cannot be started";

/// Caller-supplied fields for a new request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    #[serde(default)]
    pub contract_id: Option<String>,
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    /// RFC 3339 timestamp or `YYYY-MM-DD`
    #[serde(default)]
    pub due_at: Option<String>,
}

impl NewRequest {
    fn golden_rule_input(&self) -> GoldenRuleInput {
        GoldenRuleInput {
            contract_id: self.contract_id.clone(),
            title: self.title.clone(),
            tag: self.tag.clone(),
            owner_id: self.owner_id.clone(),
            due_at: self.due_at.clone(),
        }
    }
}

/// Parse a due date given as RFC 3339 or as a plain date (midnight UTC)
pub fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight))
}

/// Creates requests and moves them through their lifecycle
pub struct RequestService {
    store: SharedStore,
    audit: SharedAuditSink,
    blocking: Arc<BlockingEngine>,
}

impl RequestService {
    pub fn new(store: SharedStore, audit: SharedAuditSink, blocking: Arc<BlockingEngine>) -> Self {
        Self {
            store,
            audit,
            blocking,
        }
    }

    /// Create a request after it passes the golden rule.
    ///
    /// Nothing is persisted when validation fails.
    pub fn create(&self, input: NewRequest, actor: Option<&str>) -> TrackerResult<Request> {
        let report = golden_rule::validate(&input.golden_rule_input());
        if !report.valid {
            return Err(TrackerError::Validation {
                violations: report.violations,
            });
        }

        // Presence is guaranteed by the golden rule above
        let field = |value: Option<String>| value.unwrap_or_default();
        let raw_due = field(input.due_at);
        let due_at = parse_due_date(&raw_due).ok_or_else(|| TrackerError::Validation {
            violations: vec![Violation::new(
                "dueAt",
                "Due date must be an RFC 3339 timestamp or a YYYY-MM-DD date",
            )],
        })?;

        let contract_id = field(input.contract_id);
        if self.store.get_contract(&contract_id)?.is_none() {
            return Err(TrackerError::not_found("Contract", contract_id));
        }

        let mut request = Request::new(
            contract_id,
            field(input.owner_id),
            field(input.title),
            field(input.tag),
            due_at,
        )
        .with_priority(input.priority.unwrap_or_default());
        request.milestone_id = input.milestone_id.filter(|m| !m.trim().is_empty());
        request.description = input.description;

        self.store.create_request(&request)?;

        info!(
            request_id = %request.id,
            contract_id = %request.contract_id,
            due_at = %request.due_at,
            "Request created"
        );
        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditActor::resolve(actor, Component::RequestService),
                AuditAction::Create,
                EntityKind::Request,
                request.id.clone(),
            )
            .with_details(json!(request))
            .at(request.created_at),
        );

        Ok(request)
    }

    /// Move a request to `target`.
    ///
    /// BLOCKED belongs to the blocking engine and cannot be requested. While
    /// a request is blocked the only manual exit is CANCELLED, which also
    /// drops the blocking reference.
    pub fn transition(
        &self,
        request_id: &str,
        target: RequestState,
        actor: Option<&str>,
    ) -> TrackerResult<Request> {
        let request = self.get(request_id)?;

        if target == RequestState::Blocked {
            return Err(TrackerError::InvalidTransition {
                entity: "request",
                from: request.state.to_string(),
                to: target.to_string(),
            });
        }

        if target == RequestState::InProgress && self.blocking.is_request_blocked(request_id)? {
            return Err(TrackerError::conflict(BLOCKED_START_REASON));
        }

        let blocked = request.state == RequestState::Blocked;
        if blocked && target != RequestState::Cancelled {
            return Err(TrackerError::conflict(format!(
                "Request is blocked by a red tag and cannot move to {}",
                target
            )));
        }

        if request.state == target {
            debug!(request_id, state = %target, "Request already in target state");
            return Ok(request);
        }

        let now = Utc::now();
        let change = StateChange {
            request_id: request.id.clone(),
            expected: request.state,
            state: target,
            started_at: (target == RequestState::InProgress && request.started_at.is_none())
                .then_some(now),
            completed_at: (target == RequestState::Completed).then_some(now),
            clear_block: blocked,
            at: now,
        };

        let updated = self.store.set_request_state(&change)?.ok_or_else(|| {
            TrackerError::conflict("Request was modified concurrently; reload and retry")
        })?;

        let mut details = json!({
            "state": { "from": request.state, "to": updated.state },
        });
        if let Some(started_at) = change.started_at {
            details["startedAt"] = json!(started_at);
        }
        if let Some(completed_at) = change.completed_at {
            details["completedAt"] = json!(completed_at);
        }
        if blocked {
            details["blockedByRedTagId"] = json!({
                "from": request.blocked_by_red_tag_id,
                "to": null,
            });
        }

        info!(
            request_id,
            from = %request.state,
            to = %updated.state,
            "Request state changed"
        );
        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditActor::resolve(actor, Component::RequestService),
                AuditAction::Update,
                EntityKind::Request,
                updated.id.clone(),
            )
            .with_details(details)
            .at(now),
        );

        Ok(updated)
    }

    pub fn get(&self, request_id: &str) -> TrackerResult<Request> {
        self.store
            .get_request(request_id)?
            .ok_or_else(|| TrackerError::not_found("Request", request_id))
    }

    pub fn list(&self, filter: &RequestFilter) -> TrackerResult<Vec<Request>> {
        Ok(self.store.find_requests(filter)?)
    }

    /// Accountability events, newest first; all requests when `request_id` is `None`
    pub fn events(&self, request_id: Option<&str>) -> TrackerResult<Vec<AccountabilityEvent>> {
        if let Some(id) = request_id {
            self.get(id)?;
        }
        Ok(self.store.list_events(request_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::model::Contract;
    use crate::store::{ContractDirectory, MemoryStore, RequestRepository};
    use chrono::Timelike;

    fn service() -> (Arc<MemoryStore>, Arc<MemoryAuditLog>, RequestService) {
        let store = MemoryStore::new().shared();
        store
            .put_contract(&Contract::new("Retainer", "Acme", "GOLD").with_id("c1"))
            .unwrap();
        let audit = MemoryAuditLog::new().shared();
        let blocking = Arc::new(BlockingEngine::new(store.clone(), audit.clone()));
        let service = RequestService::new(store.clone(), audit.clone(), blocking);
        (store, audit, service)
    }

    fn input() -> NewRequest {
        NewRequest {
            contract_id: Some("c1".to_string()),
            owner_id: Some("u1".to_string()),
            title: Some("Quarterly report".to_string()),
            tag: Some("DELIVERABLE".to_string()),
            due_at: Some("2026-05-01".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_due_date_formats() {
        let date = parse_due_date("2026-05-01").unwrap();
        assert_eq!(date.to_rfc3339(), "2026-05-01T00:00:00+00:00");

        let ts = parse_due_date("2026-05-01T17:30:00+02:00").unwrap();
        assert_eq!(ts.hour(), 15);

        assert!(parse_due_date("next tuesday").is_none());
        assert!(parse_due_date("2026-13-40").is_none());
    }

    #[test]
    fn test_create_defaults() {
        let (store, audit, service) = service();
        let request = service.create(input(), Some("u9")).unwrap();

        assert_eq!(request.state, RequestState::Open);
        assert_eq!(request.priority, Priority::Normal);
        assert!(store.get_request(&request.id).unwrap().is_some());

        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::Create);
        assert_eq!(entries[0].actor, AuditActor::User("u9".to_string()));
    }

    #[test]
    fn test_create_rejects_unparsable_due_date() {
        let (store, _audit, service) = service();
        let mut bad = input();
        bad.due_at = Some("soon".to_string());

        match service.create(bad, None) {
            Err(TrackerError::Validation { violations }) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].field, "dueAt");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert!(store.find_requests(&RequestFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn test_create_unknown_contract() {
        let (_store, _audit, service) = service();
        let mut orphan = input();
        orphan.contract_id = Some("c404".to_string());
        let err = service.create(orphan, None).unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_start_and_complete_stamp_times() {
        let (_store, _audit, service) = service();
        let request = service.create(input(), None).unwrap();

        let started = service
            .transition(&request.id, RequestState::InProgress, None)
            .unwrap();
        assert!(started.started_at.is_some());
        assert!(started.completed_at.is_none());

        let done = service
            .transition(&request.id, RequestState::Completed, None)
            .unwrap();
        assert_eq!(done.started_at, started.started_at);
        assert!(done.completed_at.is_some());
    }

    #[test]
    fn test_manual_block_rejected() {
        let (_store, _audit, service) = service();
        let request = service.create(input(), None).unwrap();
        let err = service
            .transition(&request.id, RequestState::Blocked, None)
            .unwrap_err();
        assert!(matches!(err, TrackerError::InvalidTransition { .. }));
        assert_eq!(err.status(), 409);
    }

    #[test]
    fn test_events_for_unknown_request() {
        let (_store, _audit, service) = service();
        assert!(service.events(None).unwrap().is_empty());
        assert_eq!(service.events(Some("ghost")).unwrap_err().status(), 404);
    }
}
