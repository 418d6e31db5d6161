//! Automation dependency graph: reference extraction, config resolution,
//! health annotation, and concurrent graph assembly.
//!
//! Each automation is linked to every entity its resolved configuration
//! mentions. Entries carry health signals (unknown trigger entities, offline
//! group members, staleness) and the graph carries a summary plus the set of
//! helpers no automation references.

mod builder;
mod extraction;
mod health;
mod resolver;

pub use builder::{GraphBuilder, GraphSource};
pub use extraction::{scan_entities, scan_text, KNOWN_DOMAINS};
pub use health::{offline_members, offline_members_by_group, stale_days, unknown_trigger_entities, OfflineIndex};
pub use resolver::{parse_config_body, synthesize_from_attributes, AutomationConfig, ConfigResolver, ConfigSource};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A referenced entity with its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    pub state: String,
    /// False when the state is `unavailable` or `unknown`.
    pub ok: bool,
}

/// One automation's node in the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEntry {
    pub friendly_name: String,
    pub enabled: bool,
    pub config_id: Option<String>,
    pub last_triggered: Option<String>,
    /// Referenced entities known to the platform, sorted by id.
    pub entities: Vec<EntityRef>,
    pub unknown_triggers: Vec<String>,
    pub offline_members: Vec<String>,
    pub stale_days: Option<i64>,
    pub stale_threshold: i64,
    /// Every id found in the resolved config, known to the platform or not.
    #[serde(skip)]
    pub references: BTreeSet<String>,
}

impl DependencyEntry {
    pub fn is_stale(&self) -> bool {
        self.stale_days
            .is_some_and(|days| days >= self.stale_threshold)
    }
}

/// Totals derived from the entry set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub total: usize,
    pub with_unknown: usize,
    pub with_offline: usize,
    pub stale: usize,
}

impl GraphSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a DependencyEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |mut acc, entry| {
            acc.total += 1;
            if !entry.unknown_triggers.is_empty() {
                acc.with_unknown += 1;
            }
            if !entry.offline_members.is_empty() {
                acc.with_offline += 1;
            }
            if entry.is_stale() {
                acc.stale += 1;
            }
            acc
        })
    }
}

/// The full dependency graph of one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub automations: BTreeMap<String, DependencyEntry>,
    pub summary: GraphSummary,
    /// Helpers referenced by no automation, sorted.
    pub orphans: Vec<String>,
    /// Automations skipped because their processing failed, sorted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl DependencyGraph {
    /// Assemble a graph, deriving the summary and orphan set from `automations`.
    pub fn assemble<'a>(
        automations: BTreeMap<String, DependencyEntry>,
        helper_ids: impl IntoIterator<Item = &'a str>,
        mut failed: Vec<String>,
    ) -> Self {
        let used: BTreeSet<&str> = automations
            .values()
            .flat_map(|entry| entry.references.iter().map(String::as_str))
            .collect();

        let orphans: BTreeSet<String> = helper_ids
            .into_iter()
            .filter(|id| !used.contains(id))
            .map(str::to_string)
            .collect();

        failed.sort();
        failed.dedup();

        Self {
            summary: GraphSummary::from_entries(automations.values()),
            automations,
            orphans: orphans.into_iter().collect(),
            failed,
        }
    }

    pub fn get(&self, automation_id: &str) -> Option<&DependencyEntry> {
        self.automations.get(automation_id)
    }
}
