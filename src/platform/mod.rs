//! Platform access: entity model, state index, and the read-only API client.

mod client;
mod entity;

pub use client::{HomeAssistantClient, PlatformApi, FETCH_TIMEOUT};
pub use entity::{
    domain_of, is_offline_state, string_list, AutomationSummary, EntityState, StateIndex,
    OFFLINE_STATES,
};
