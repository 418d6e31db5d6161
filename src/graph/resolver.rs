//! Per-automation configuration resolution with graceful fallback.

use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::InspectorError;
use crate::platform::PlatformApi;

/// Where a resolved configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Authoritative fetch by numeric config id
    ById,
    /// Authoritative fetch by entity slug
    BySlug,
    /// Reconstructed from the state attributes
    Attributes,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfigSource::ById => "by id",
            ConfigSource::BySlug => "by slug",
            ConfigSource::Attributes => "from attributes",
        };
        f.write_str(label)
    }
}

/// Trigger/condition/action tree for one automation.
#[derive(Debug, Clone, PartialEq)]
pub struct AutomationConfig {
    pub value: Value,
    pub source: ConfigSource,
}

impl AutomationConfig {
    /// Trigger definitions, read from `trigger` (or `triggers`), a single mapping
    /// counting as one trigger.
    pub fn triggers(&self) -> Vec<&Value> {
        let block = self
            .value
            .get("trigger")
            .or_else(|| self.value.get("triggers"));
        match block {
            Some(Value::Array(items)) => items.iter().collect(),
            Some(other @ Value::Object(_)) => vec![other],
            _ => Vec::new(),
        }
    }
}

/// Obtains automation configurations through the platform API.
///
/// Never fails: id fetch, then slug fetch, then a degraded configuration built
/// from the summary attributes.
#[derive(Clone)]
pub struct ConfigResolver {
    api: Arc<dyn PlatformApi>,
}

impl ConfigResolver {
    pub fn new(api: Arc<dyn PlatformApi>) -> Self {
        Self { api }
    }

    pub async fn resolve(
        &self,
        automation_id: &str,
        config_id: Option<&str>,
        attributes: &Map<String, Value>,
    ) -> AutomationConfig {
        if let Some(id) = config_id {
            if let Some(value) = self.fetch(automation_id, id).await {
                return AutomationConfig {
                    value,
                    source: ConfigSource::ById,
                };
            }
        }

        if let Some((_, slug)) = automation_id.split_once('.') {
            if !slug.is_empty() {
                if let Some(value) = self.fetch(automation_id, slug).await {
                    return AutomationConfig {
                        value,
                        source: ConfigSource::BySlug,
                    };
                }
            }
        }

        AutomationConfig {
            value: synthesize_from_attributes(attributes),
            source: ConfigSource::Attributes,
        }
    }

    /// One authoritative fetch; every failure mode collapses to `None`.
    async fn fetch(&self, automation_id: &str, key: &str) -> Option<Value> {
        match self.api.fetch_automation_config(key).await {
            Ok(Some(body)) if body.trim().is_empty() => {
                log::debug!("{}: empty config body for key {}", automation_id, key);
                None
            }
            Ok(Some(body)) => match parse_config_body(&body) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::warn!("{}: unparseable config for key {}: {}", automation_id, key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                log::debug!("{}: config fetch for key {} failed: {}", automation_id, key, e);
                None
            }
        }
    }
}

/// Parse a configuration payload (YAML, which also accepts JSON).
/// A null document is an empty mapping; anything else that is not a mapping
/// is rejected.
pub fn parse_config_body(body: &str) -> crate::Result<Value> {
    let value: Value = serde_yaml_ng::from_str(body)?;
    match value {
        Value::Null => Ok(Value::Object(Map::new())),
        Value::Object(map) => Ok(Value::Object(map)),
        other => Err(InspectorError::Platform(format!(
            "config payload is not a mapping (got {})",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

/// Build a degraded configuration from the automation's state attributes.
pub fn synthesize_from_attributes(attributes: &Map<String, Value>) -> Value {
    let block = |singular: &str, plural: &str| {
        attributes
            .get(singular)
            .or_else(|| attributes.get(plural))
            .cloned()
            .unwrap_or_else(|| json!([]))
    };

    json!({
        "trigger": block("trigger", "triggers"),
        "condition": block("condition", "conditions"),
        "action": block("action", "actions"),
    })
}
