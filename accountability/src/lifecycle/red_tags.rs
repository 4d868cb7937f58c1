//! Red tag lifecycle — raise, acknowledge, resolve, dismiss
//!
//! Every transition that changes whether a tag is active is paired with the
//! matching blocking call, so requests follow their red tags.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::audit::{
    record_or_warn, AuditAction, AuditActor, AuditEntry, Component, EntityKind, SharedAuditSink,
};
use crate::blocking::{BlockingEngine, BlockingOutcome};
use crate::error::{TrackerError, TrackerResult};
use crate::golden_rule::Violation;
use crate::model::{RedTag, RedTagSeverity, RedTagState};
use crate::store::SharedStore;

/// Caller-supplied fields for a new red tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRedTag {
    pub contract_id: String,
    #[serde(default)]
    pub milestone_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    pub severity: RedTagSeverity,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by_id: Option<String>,
}

/// A state change for an existing red tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedTagUpdate {
    pub state: RedTagState,
    #[serde(default)]
    pub resolution_notes: Option<String>,
    #[serde(default)]
    pub resolved_by_id: Option<String>,
}

impl RedTagUpdate {
    pub fn to(state: RedTagState) -> Self {
        Self {
            state,
            resolution_notes: None,
            resolved_by_id: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.resolution_notes = Some(notes.into());
        self
    }

    pub fn resolved_by(mut self, user_id: impl Into<String>) -> Self {
        self.resolved_by_id = Some(user_id.into());
        self
    }
}

/// A red tag after a lifecycle call, with the blocking it triggered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedTagOutcome {
    pub red_tag: RedTag,
    /// `None` when the transition does not touch blocking (acknowledge)
    pub blocking: Option<BlockingOutcome>,
}

pub struct RedTagService {
    store: SharedStore,
    audit: SharedAuditSink,
    blocking: Arc<BlockingEngine>,
}

impl RedTagService {
    pub fn new(store: SharedStore, audit: SharedAuditSink, blocking: Arc<BlockingEngine>) -> Self {
        Self {
            store,
            audit,
            blocking,
        }
    }

    /// Raise a new OPEN red tag and block everything in its scope
    pub fn raise(&self, input: NewRedTag, actor: Option<&str>) -> TrackerResult<RedTagOutcome> {
        let mut violations = Vec::new();
        if input.contract_id.trim().is_empty() {
            violations.push(Violation::new(
                "contractId",
                "Every red tag must be anchored to a contract",
            ));
        }
        if input.title.trim().is_empty() {
            violations.push(Violation::new("title", "Red tag title is required"));
        }
        if !violations.is_empty() {
            return Err(TrackerError::Validation { violations });
        }

        if self.store.get_contract(&input.contract_id)?.is_none() {
            return Err(TrackerError::not_found("Contract", input.contract_id));
        }
        if let Some(ref request_id) = input.request_id {
            let request = self
                .store
                .get_request(request_id)?
                .ok_or_else(|| TrackerError::not_found("Request", request_id.clone()))?;
            if request.contract_id != input.contract_id {
                return Err(TrackerError::InvalidInput {
                    message: format!(
                        "request {} belongs to contract {}, not {}",
                        request_id, request.contract_id, input.contract_id
                    ),
                });
            }
        }

        let mut red_tag = RedTag::new(input.contract_id, input.severity, input.title);
        red_tag.milestone_id = input.milestone_id.filter(|m| !m.trim().is_empty());
        red_tag.request_id = input.request_id;
        red_tag.description = input.description;
        red_tag.created_by_id = input.created_by_id.or_else(|| actor.map(str::to_string));

        self.store.create_red_tag(&red_tag)?;

        info!(
            red_tag_id = %red_tag.id,
            severity = %red_tag.severity,
            contract_id = %red_tag.contract_id,
            "Red tag raised"
        );
        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditActor::resolve(actor, Component::RedTagService),
                AuditAction::Create,
                EntityKind::RedTag,
                red_tag.id.clone(),
            )
            .with_details(json!(red_tag))
            .at(red_tag.created_at),
        );

        let blocking = self.blocking.apply_blocking(&red_tag.id)?;
        Ok(RedTagOutcome {
            red_tag,
            blocking: Some(blocking),
        })
    }

    /// Move a red tag to a new state.
    ///
    /// RESOLVED and DISMISSED are final; both stamp who resolved the tag and
    /// when. Requests are released before the final state is written, so a
    /// failed release leaves the tag active and the call can be retried.
    pub fn transition(
        &self,
        red_tag_id: &str,
        update: RedTagUpdate,
        actor: Option<&str>,
    ) -> TrackerResult<RedTagOutcome> {
        let mut red_tag = self.get(red_tag_id)?;
        let from = red_tag.state;

        if from.is_terminal() {
            return Err(TrackerError::InvalidTransition {
                entity: "red tag",
                from: from.to_string(),
                to: update.state.to_string(),
            });
        }

        let now = Utc::now();
        red_tag.state = update.state;
        red_tag.updated_at = now;
        if update.resolution_notes.is_some() {
            red_tag.resolution_notes = update.resolution_notes;
        }
        if update.state.is_terminal() {
            red_tag.resolved_at = Some(now);
            red_tag.resolved_by_id = update.resolved_by_id.or_else(|| actor.map(str::to_string));
        }

        let released = if red_tag.state.is_terminal() {
            Some(self.blocking.remove_blocking(&red_tag.id)?)
        } else {
            None
        };

        if !self.store.update_red_tag(&red_tag, from)? {
            if released.is_some() {
                self.restore_blocking(red_tag_id)?;
            }
            return Err(TrackerError::conflict(
                "Red tag was modified concurrently; reload and retry",
            ));
        }

        info!(red_tag_id, from = %from, to = %red_tag.state, "Red tag state changed");
        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditActor::resolve(actor, Component::RedTagService),
                AuditAction::Update,
                EntityKind::RedTag,
                red_tag.id.clone(),
            )
            .with_details(json!({
                "state": { "from": from, "to": red_tag.state },
                "resolutionNotes": red_tag.resolution_notes,
                "resolvedAt": red_tag.resolved_at,
                "resolvedById": red_tag.resolved_by_id,
            }))
            .at(now),
        );

        let blocking = match red_tag.state {
            RedTagState::Open => Some(self.blocking.apply_blocking(&red_tag.id)?),
            RedTagState::Acknowledged => None,
            RedTagState::Resolved | RedTagState::Dismissed => released,
        };

        Ok(RedTagOutcome { red_tag, blocking })
    }

    /// Re-block after losing a race, if the tag that won is still active
    fn restore_blocking(&self, red_tag_id: &str) -> TrackerResult<()> {
        let active = self
            .store
            .get_red_tag(red_tag_id)?
            .is_some_and(|tag| tag.state.is_active());
        if active {
            warn!(red_tag_id, "Red tag changed during release, blocking again");
            self.blocking.apply_blocking(red_tag_id)?;
        }
        Ok(())
    }

    pub fn get(&self, red_tag_id: &str) -> TrackerResult<RedTag> {
        self.store
            .get_red_tag(red_tag_id)?
            .ok_or_else(|| TrackerError::not_found("Red tag", red_tag_id))
    }

    /// All red tags, newest first
    pub fn list(&self) -> TrackerResult<Vec<RedTag>> {
        Ok(self.store.list_red_tags()?)
    }
}
