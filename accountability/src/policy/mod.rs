//! Accountability policies — per-client-package escalation timing
//!
//! A policy is a flat record keyed by client package. There is no
//! inheritance and no default: a package without a policy is simply not
//! escalated.
//!
//! Policies can be seeded from a TOML file:
//!
//! ```toml
//! [[policy]]
//! client_package = "GOLD"
//! reminder_hours = 48
//! warning_hours = 0
//! escalation_hours = 24
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::{PolicyStore, StoreResult};

/// Escalation thresholds for one client package
///
/// All offsets are in hours relative to a request's due date: the reminder
/// fires *before* the due date, warning and escalation fire *after* it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountabilityPolicy {
    /// Client package this policy applies to (unique key)
    pub client_package: String,
    /// Hours before due date at which a reminder fires
    pub reminder_hours: u32,
    /// Hours after due date at which a warning fires
    pub warning_hours: u32,
    /// Hours after due date at which the request is escalated
    pub escalation_hours: u32,
}

impl AccountabilityPolicy {
    pub fn new(
        client_package: impl Into<String>,
        reminder_hours: u32,
        warning_hours: u32,
        escalation_hours: u32,
    ) -> Self {
        Self {
            client_package: client_package.into(),
            reminder_hours,
            warning_hours,
            escalation_hours,
        }
    }
}

/// Error loading a policy file
#[derive(Debug, thiserror::Error)]
pub enum PolicyFileError {
    #[error("Failed to read policy file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Policy entry {index} has an empty client_package")]
    EmptyPackage { index: usize },

    #[error("Duplicate policy for client package {0}")]
    DuplicatePackage(String),
}

#[derive(Debug, Deserialize)]
struct RawPolicyEntry {
    client_package: String,
    reminder_hours: u32,
    warning_hours: u32,
    escalation_hours: u32,
}

#[derive(Debug, Deserialize)]
struct RawPolicyFile {
    #[serde(default)]
    policy: Vec<RawPolicyEntry>,
}

/// A set of policies parsed from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyFile {
    pub policies: Vec<AccountabilityPolicy>,
}

impl PolicyFile {
    /// Parse policies from TOML text
    pub fn parse(text: &str) -> Result<Self, PolicyFileError> {
        let raw: RawPolicyFile = toml::from_str(text)?;
        let mut policies: Vec<AccountabilityPolicy> = Vec::with_capacity(raw.policy.len());

        for (index, entry) in raw.policy.into_iter().enumerate() {
            let package = entry.client_package.trim().to_string();
            if package.is_empty() {
                return Err(PolicyFileError::EmptyPackage { index });
            }
            if policies.iter().any(|p| p.client_package == package) {
                return Err(PolicyFileError::DuplicatePackage(package));
            }
            policies.push(AccountabilityPolicy::new(
                package,
                entry.reminder_hours,
                entry.warning_hours,
                entry.escalation_hours,
            ));
        }

        Ok(Self { policies })
    }

    /// Read and parse a policy file from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyFileError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Upsert every policy into a store, returning how many were written
    pub fn apply<S: PolicyStore + ?Sized>(&self, store: &S) -> StoreResult<usize> {
        for policy in &self.policies {
            store.upsert_policy(policy.clone())?;
        }
        info!(count = self.policies.len(), "Accountability policies loaded");
        Ok(self.policies.len())
    }
}
