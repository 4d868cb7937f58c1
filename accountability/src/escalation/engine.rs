//! Escalation Engine — periodic accountability check
//!
//! Scans OPEN/IN_PROGRESS requests, resolves the policy for each request's
//! client package and advances its escalation level when a deadline has
//! passed. All decisions are deterministic given `now`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::audit::{
    record_or_warn, AuditAction, AuditActor, AuditEntry, Component, EntityKind, SharedAuditSink,
};
use crate::error::TrackerResult;
use crate::escalation::state::{EscalationDeadlines, EscalationStep};
use crate::model::{new_id, AccountabilityEvent, AccountabilityEventType, Request};
use crate::policy::AccountabilityPolicy;
use crate::store::{EscalationTransition, RequestFilter, SharedStore};

/// How far a request may climb in a single check
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EscalationMode {
    /// At most one level per request per check
    #[default]
    SingleStep,
    /// Keep climbing until no further deadline has passed, one event per level
    CatchUp,
}

impl std::fmt::Display for EscalationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SingleStep => write!(f, "single-step"),
            Self::CatchUp => write!(f, "catch-up"),
        }
    }
}

impl std::str::FromStr for EscalationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "single-step" | "single" => Ok(Self::SingleStep),
            "catch-up" | "catchup" => Ok(Self::CatchUp),
            other => Err(format!("unknown escalation mode: {}", other)),
        }
    }
}

/// Configuration for the Escalation Engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EscalationConfig {
    pub mode: EscalationMode,
}

/// Aggregate counts for one check run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummary {
    /// Requests with a resolvable policy
    pub processed: u32,
    pub reminders: u32,
    pub warnings: u32,
    pub escalations: u32,
}

impl CheckSummary {
    fn count(&mut self, event_type: AccountabilityEventType) {
        match event_type {
            AccountabilityEventType::Reminder => self.reminders += 1,
            AccountabilityEventType::Warning => self.warnings += 1,
            AccountabilityEventType::Escalation => self.escalations += 1,
        }
    }

    /// Total transitions committed in the run
    pub fn transitions(&self) -> u32 {
        self.reminders + self.warnings + self.escalations
    }
}

/// The Escalation Engine
pub struct EscalationEngine {
    store: SharedStore,
    audit: SharedAuditSink,
    config: EscalationConfig,
}

impl EscalationEngine {
    /// Create a new engine with default config
    pub fn new(store: SharedStore, audit: SharedAuditSink) -> Self {
        Self::with_config(store, audit, EscalationConfig::default())
    }

    /// Create with custom config
    pub fn with_config(
        store: SharedStore,
        audit: SharedAuditSink,
        config: EscalationConfig,
    ) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &EscalationConfig {
        &self.config
    }

    /// Run one accountability check as of `now`.
    ///
    /// Fails only if the request set or the policy table cannot be loaded.
    /// A failed write for one request is logged and the run moves on; the
    /// next check retries it.
    pub fn run_check(&self, now: DateTime<Utc>) -> TrackerResult<CheckSummary> {
        let mut summary = CheckSummary::default();

        let requests = self.store.find_requests(&RequestFilter::active())?;
        let policies: HashMap<String, AccountabilityPolicy> = self
            .store
            .list_policies()?
            .into_iter()
            .map(|p| (p.client_package.clone(), p))
            .collect();

        // contract id -> client package (None when the contract is unknown)
        let mut packages: HashMap<String, Option<String>> = HashMap::new();

        for request in &requests {
            let package = match packages.get(&request.contract_id) {
                Some(package) => package.clone(),
                None => match self.store.get_contract(&request.contract_id) {
                    Ok(contract) => {
                        let package = contract.map(|c| c.client_package);
                        if package.is_none() {
                            warn!(
                                request_id = %request.id,
                                contract_id = %request.contract_id,
                                "Contract not found, skipping request"
                            );
                        }
                        packages.insert(request.contract_id.clone(), package.clone());
                        package
                    }
                    Err(e) => {
                        warn!(
                            request_id = %request.id,
                            contract_id = %request.contract_id,
                            "Contract lookup failed: {}", e
                        );
                        continue;
                    }
                },
            };

            let Some(policy) = package.as_deref().and_then(|p| policies.get(p)) else {
                debug!(request_id = %request.id, "No accountability policy, skipping");
                continue;
            };

            summary.processed += 1;
            let deadlines = EscalationDeadlines::compute(request.due_at, policy);
            self.advance(request, &deadlines, now, &mut summary);
        }

        info!(
            processed = summary.processed,
            reminders = summary.reminders,
            warnings = summary.warnings,
            escalations = summary.escalations,
            mode = %self.config.mode,
            "Accountability check complete"
        );

        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditActor::System(Component::EscalationEngine),
                AuditAction::AccountabilityCheck,
                EntityKind::System,
                "accountability",
            )
            .with_details(json!(summary))
            .at(now),
        );

        Ok(summary)
    }

    /// Climb the ladder for one request, committing each step atomically
    fn advance(
        &self,
        request: &Request,
        deadlines: &EscalationDeadlines,
        now: DateTime<Utc>,
        summary: &mut CheckSummary,
    ) {
        let mut level = request.escalation_level;

        while let Some(step) = deadlines.next_step(level, now) {
            let event = self.build_event(request, &step, now);
            let transition = EscalationTransition {
                request_id: request.id.clone(),
                expected_level: step.from,
                event,
            };

            match self.store.apply_escalation(&transition) {
                Ok(true) => {
                    summary.count(step.event_type);
                    self.report(&transition, &step, now);
                    debug!(
                        request_id = %request.id,
                        from = %step.from,
                        to = %step.to,
                        "Escalation level advanced"
                    );
                    level = step.to;
                }
                Ok(false) => {
                    debug!(
                        request_id = %request.id,
                        expected = %step.from,
                        "Request changed since scan, transition skipped"
                    );
                    return;
                }
                Err(e) => {
                    warn!(
                        request_id = %request.id,
                        from = %step.from,
                        to = %step.to,
                        "Failed to persist escalation: {}", e
                    );
                    return;
                }
            }

            if self.config.mode == EscalationMode::SingleStep {
                return;
            }
        }
    }

    fn build_event(
        &self,
        request: &Request,
        step: &EscalationStep,
        now: DateTime<Utc>,
    ) -> AccountabilityEvent {
        AccountabilityEvent {
            id: new_id(),
            request_id: request.id.clone(),
            event_type: step.event_type,
            from_level: step.from,
            to_level: step.to,
            message: step.message(request),
            created_at: now,
        }
    }

    fn report(&self, transition: &EscalationTransition, step: &EscalationStep, now: DateTime<Utc>) {
        let actor = AuditActor::System(Component::EscalationEngine);

        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                actor.clone(),
                AuditAction::Update,
                EntityKind::Request,
                transition.request_id.clone(),
            )
            .with_details(json!({
                "escalationLevel": { "from": step.from, "to": step.to },
                "eventId": transition.event.id,
            }))
            .at(now),
        );

        record_or_warn(
            self.audit.as_ref(),
            AuditEntry::new(
                actor,
                AuditAction::Create,
                EntityKind::AccountabilityEvent,
                transition.event.id.clone(),
            )
            .with_details(json!(transition.event))
            .at(now),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!(
            "single-step".parse::<EscalationMode>().unwrap(),
            EscalationMode::SingleStep
        );
        assert_eq!(
            "CATCH_UP".parse::<EscalationMode>().unwrap(),
            EscalationMode::CatchUp
        );
        assert!("sometimes".parse::<EscalationMode>().is_err());
        assert_eq!(EscalationMode::default(), EscalationMode::SingleStep);
    }

    #[test]
    fn test_summary_wire_shape() {
        let summary = CheckSummary {
            processed: 4,
            reminders: 1,
            warnings: 2,
            escalations: 0,
        };
        let value = serde_json::to_value(summary).unwrap();
        assert_eq!(
            value,
            json!({ "processed": 4, "reminders": 1, "warnings": 2, "escalations": 0 })
        );
        assert_eq!(summary.transitions(), 3);
    }
}
