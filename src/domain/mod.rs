//! Domain models for seqmint.
//!
//! This module contains the core domain types: identifier logic definitions, the
//! allocation log, caller context and API contracts.

pub mod allocation;
pub mod context;
pub mod dto;
pub mod logic;

pub use allocation::{AllocationRecord, CalendarWindow, NewAllocation};
pub use context::{ContextData, ContextValue, context};
pub use dto::{
    AllocationResponse, ApiResponse, GenerateRequest, Generated, LogicRequest, LogicResponse,
};
pub use logic::{IdentifierLogic, ResetMode, is_reserved_slug};
