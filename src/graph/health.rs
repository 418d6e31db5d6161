//! Health signals per automation: unresolved trigger references, offline
//! group members, and staleness of the last run.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};

use super::resolver::AutomationConfig;
use crate::platform::{domain_of, string_list, StateIndex};

/// Offline members of every group, keyed by group entity id.
pub type OfflineIndex = HashMap<String, Vec<String>>;

/// Build the offline-members index once per build.
///
/// Members absent from the state index are not reported.
pub fn offline_members_by_group(states: &StateIndex) -> OfflineIndex {
    states
        .iter()
        .filter(|s| s.domain() == "group")
        .map(|group| {
            let offline = group
                .group_members()
                .into_iter()
                .filter(|member| states.get(member).is_some_and(|m| m.is_offline()))
                .collect();
            (group.entity_id.clone(), offline)
        })
        .collect()
}

/// Trigger-level entity ids that do not exist on the platform.
pub fn unknown_trigger_entities(config: &AutomationConfig, states: &StateIndex) -> BTreeSet<String> {
    config
        .triggers()
        .into_iter()
        .filter_map(|trigger| trigger.as_object())
        .flat_map(|trigger| string_list(trigger.get("entity_id")))
        .filter(|id| !states.contains(id))
        .collect()
}

/// Offline members reachable through referenced groups.
pub fn offline_members<'a>(
    references: impl IntoIterator<Item = &'a String>,
    offline_index: &OfflineIndex,
) -> BTreeSet<String> {
    references
        .into_iter()
        .filter(|id| domain_of(id) == "group")
        .filter_map(|id| offline_index.get(id))
        .flatten()
        .cloned()
        .collect()
}

/// Whole days between `last_triggered` and `now`.
///
/// `None` when there is no timestamp or it cannot be parsed; future timestamps
/// count as zero days.
pub fn stale_days(last_triggered: Option<&str>, now: DateTime<Utc>) -> Option<i64> {
    let raw = last_triggered?;
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| log::debug!("Unparseable last_triggered {:?}: {}", raw, e))
        .ok()?;
    Some((now - parsed).num_days().max(0))
}
