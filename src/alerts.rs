//! Health alerts derived from a dependency graph, with user suppression.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::graph::DependencyGraph;

/// One alert about one automation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Alert {
    /// Trigger entities that do not exist
    Unknown { id: String, details: Vec<String> },
    /// Offline members of referenced groups
    Offline { id: String, details: Vec<String> },
    /// Not triggered for `days` (at or past the threshold)
    Stale { id: String, days: i64 },
}

impl Alert {
    pub fn automation_id(&self) -> &str {
        match self {
            Alert::Unknown { id, .. } | Alert::Offline { id, .. } | Alert::Stale { id, .. } => id,
        }
    }
}

/// Collect alerts for every automation not in `ignored`, in automation id order.
pub fn collect_alerts(graph: &DependencyGraph, ignored: &BTreeSet<String>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for (id, entry) in &graph.automations {
        if ignored.contains(id) {
            continue;
        }
        if !entry.unknown_triggers.is_empty() {
            alerts.push(Alert::Unknown {
                id: id.clone(),
                details: entry.unknown_triggers.clone(),
            });
        }
        if !entry.offline_members.is_empty() {
            alerts.push(Alert::Offline {
                id: id.clone(),
                details: entry.offline_members.clone(),
            });
        }
        if let Some(days) = entry.stale_days.filter(|_| entry.is_stale()) {
            alerts.push(Alert::Stale { id: id.clone(), days });
        }
    }

    alerts
}

/// Automation ids whose alerts the user has suppressed.
#[derive(Debug, Default)]
pub struct IgnoreList {
    ids: Mutex<BTreeSet<String>>,
}

impl IgnoreList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an id; returns the updated list.
    pub fn ignore(&self, id: &str) -> Vec<String> {
        let mut ids = self.ids.lock().unwrap();
        ids.insert(id.to_string());
        ids.iter().cloned().collect()
    }

    /// Remove an id (no-op if absent); returns the updated list.
    pub fn unignore(&self, id: &str) -> Vec<String> {
        let mut ids = self.ids.lock().unwrap();
        ids.remove(id);
        ids.iter().cloned().collect()
    }

    pub fn list(&self) -> Vec<String> {
        self.ids.lock().unwrap().iter().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.ids.lock().unwrap().clone()
    }
}
