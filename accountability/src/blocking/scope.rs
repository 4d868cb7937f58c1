//! Blast radius of a red tag

use serde::{Deserialize, Serialize};

use crate::model::{ContractId, MilestoneId, RedTag, RedTagSeverity, Request, RequestId};

/// Set of requests a red tag holds in BLOCKED
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BlockScope {
    Request(RequestId),
    Milestone(MilestoneId),
    Contract(ContractId),
}

impl BlockScope {
    /// Resolve the scope of a red tag from its severity.
    ///
    /// | severity | primary   | fallback  |
    /// |----------|-----------|-----------|
    /// | WARNING  | request   | milestone |
    /// | CRITICAL | milestone | contract  |
    /// | BLOCKER  | contract  | —         |
    ///
    /// Returns `None` for a WARNING tag with neither a request nor a
    /// milestone.
    pub fn for_red_tag(red_tag: &RedTag) -> Option<Self> {
        match red_tag.severity {
            RedTagSeverity::Warning => red_tag
                .request_id
                .clone()
                .map(Self::Request)
                .or_else(|| red_tag.milestone_id.clone().map(Self::Milestone)),
            RedTagSeverity::Critical => Some(
                red_tag
                    .milestone_id
                    .clone()
                    .map(Self::Milestone)
                    .unwrap_or_else(|| Self::Contract(red_tag.contract_id.clone())),
            ),
            RedTagSeverity::Blocker => Some(Self::Contract(red_tag.contract_id.clone())),
        }
    }

    /// Whether a request falls inside this scope (regardless of its state)
    pub fn matches(&self, request: &Request) -> bool {
        match self {
            Self::Request(id) => &request.id == id,
            Self::Milestone(id) => request.milestone_id.as_ref() == Some(id),
            Self::Contract(id) => &request.contract_id == id,
        }
    }
}

impl std::fmt::Display for BlockScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request(id) => write!(f, "request {}", id),
            Self::Milestone(id) => write!(f, "milestone {}", id),
            Self::Contract(id) => write!(f, "contract {}", id),
        }
    }
}
