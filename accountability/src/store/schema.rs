//! Column family definitions for the RocksDB store
//!
//! Each column family holds one entity type while sharing the same RocksDB
//! instance.

/// Column family for accountability policies
pub const CF_POLICIES: &str = "policies";

/// Column family for contracts
pub const CF_CONTRACTS: &str = "contracts";

/// Column family for requests
pub const CF_REQUESTS: &str = "requests";

/// Column family for red tags
pub const CF_RED_TAGS: &str = "red_tags";

/// Column family for accountability events
pub const CF_EVENTS: &str = "events";

/// All column family names
pub const ALL_CFS: &[&str] = &[
    CF_POLICIES,
    CF_CONTRACTS,
    CF_REQUESTS,
    CF_RED_TAGS,
    CF_EVENTS,
];

/// Key prefixes for compound keys
pub mod keys {
    pub const POLICY_PREFIX: &str = "policy:";
    pub const CONTRACT_PREFIX: &str = "contract:";
    pub const REQUEST_PREFIX: &str = "req:";
    pub const RED_TAG_PREFIX: &str = "tag:";
    pub const EVENT_PREFIX: &str = "evt:";

    /// Policy key; lexical order of keys is client package order
    pub fn policy(client_package: &str) -> String {
        format!("{}{}", POLICY_PREFIX, client_package)
    }

    pub fn contract(contract_id: &str) -> String {
        format!("{}{}", CONTRACT_PREFIX, contract_id)
    }

    pub fn request(request_id: &str) -> String {
        format!("{}{}", REQUEST_PREFIX, request_id)
    }

    pub fn red_tag(red_tag_id: &str) -> String {
        format!("{}{}", RED_TAG_PREFIX, red_tag_id)
    }

    /// Prefix for every event of one request
    pub fn request_events(request_id: &str) -> String {
        format!("{}{}:", EVENT_PREFIX, request_id)
    }

    /// Event key (request, then timestamp for ordering)
    pub fn event(request_id: &str, timestamp_nanos: i64, event_id: &str) -> String {
        format!(
            "{}{:020}:{}",
            request_events(request_id),
            timestamp_nanos,
            event_id
        )
    }
}
