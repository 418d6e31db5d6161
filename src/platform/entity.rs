//! Platform entity model and the per-build state index.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// States that mark an entity as offline.
pub const OFFLINE_STATES: &[&str] = &["unavailable", "unknown"];

/// One entity as reported by the platform's state listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// `<domain>.<slug>`, e.g. `sensor.kitchen_temp`
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: Map::new(),
        }
    }

    /// Builder-style attribute setter, mostly for fixtures.
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn domain(&self) -> &str {
        domain_of(&self.entity_id)
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(Value::as_str)
    }

    pub fn is_offline(&self) -> bool {
        is_offline_state(&self.state)
    }

    /// Member list of a group entity (`entity_id` attribute, list or single string).
    pub fn group_members(&self) -> Vec<String> {
        string_list(self.attributes.get("entity_id"))
    }
}

/// Domain part of an entity id (everything before the first dot).
pub fn domain_of(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(d, _)| d).unwrap_or(entity_id)
}

pub fn is_offline_state(state: &str) -> bool {
    OFFLINE_STATES.contains(&state)
}

/// Normalize a string-or-sequence value into a list of strings.
/// Non-string sequence items are ignored.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Read-only view of one `automation.*` entity.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationSummary {
    pub entity_id: String,
    pub friendly_name: String,
    pub enabled: bool,
    /// Internal configuration id (`id` attribute), rendered as a string.
    pub config_id: Option<String>,
    pub last_triggered: Option<String>,
    pub attributes: Map<String, Value>,
}

impl AutomationSummary {
    /// Returns `None` for entities outside the `automation` domain.
    pub fn from_state(state: &EntityState) -> Option<Self> {
        if state.domain() != "automation" {
            return None;
        }

        let config_id = match state.attributes.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let last_triggered = state
            .attributes
            .get("last_triggered")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(Self {
            entity_id: state.entity_id.clone(),
            friendly_name: state
                .friendly_name()
                .unwrap_or(&state.entity_id)
                .to_string(),
            enabled: state.state == "on",
            config_id,
            last_triggered,
            attributes: state.attributes.clone(),
        })
    }

    /// Identifier suffix after the `automation.` prefix.
    pub fn slug(&self) -> Option<&str> {
        self.entity_id
            .split_once('.')
            .map(|(_, slug)| slug)
            .filter(|slug| !slug.is_empty())
    }
}

/// All entity states of one build cycle, indexed by entity id.
#[derive(Debug, Clone, Default)]
pub struct StateIndex {
    states: HashMap<String, EntityState>,
}

impl StateIndex {
    pub fn from_states(states: Vec<EntityState>) -> Self {
        Self {
            states: states
                .into_iter()
                .map(|s| (s.entity_id.clone(), s))
                .collect(),
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<&EntityState> {
        self.states.get(entity_id)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.states.contains_key(entity_id)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityState> {
        self.states.values()
    }

    /// Summaries of every `automation.*` entity.
    pub fn automations(&self) -> Vec<AutomationSummary> {
        self.states
            .values()
            .filter_map(AutomationSummary::from_state)
            .collect()
    }

    /// Helper entities: every entity whose domain begins with `input_`.
    pub fn helper_ids(&self) -> impl Iterator<Item = &str> {
        self.states
            .keys()
            .filter(|id| domain_of(id).starts_with("input_"))
            .map(String::as_str)
    }
}
