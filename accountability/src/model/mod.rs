//! Entity model shared by both policy engines

pub mod types;

pub use types::{
    new_id, AccountabilityEvent, AccountabilityEventType, Contract, ContractId, EscalationLevel,
    EventId, MilestoneId, Priority, RedTag, RedTagId, RedTagSeverity, RedTagState, Request,
    RequestId, RequestState, UserId,
};
