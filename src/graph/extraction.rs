//! Entity reference extraction from configuration trees (regex-based).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

/// Platform domains recognised as entity id prefixes.
pub const KNOWN_DOMAINS: &[&str] = &[
    "alarm_control_panel",
    "automation",
    "binary_sensor",
    "button",
    "calendar",
    "camera",
    "climate",
    "counter",
    "cover",
    "date",
    "datetime",
    "device_tracker",
    "event",
    "fan",
    "group",
    "humidifier",
    "image",
    "input_boolean",
    "input_button",
    "input_datetime",
    "input_number",
    "input_select",
    "input_text",
    "lawn_mower",
    "light",
    "lock",
    "media_player",
    "number",
    "person",
    "remote",
    "scene",
    "schedule",
    "script",
    "select",
    "sensor",
    "siren",
    "sun",
    "switch",
    "text",
    "time",
    "timer",
    "todo",
    "update",
    "vacuum",
    "valve",
    "water_heater",
    "weather",
    "zone",
];

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    let domains = KNOWN_DOMAINS.join("|");
    Regex::new(&format!(r"\b(?i:{})\.[\w-]*\w\b", domains)).expect("entity id pattern is valid")
});

/// Collect every entity id mentioned anywhere in a configuration tree.
///
/// Strings are matched against the entity id grammar; sequences and mapping
/// values are walked recursively. Mapping keys carry no special meaning.
pub fn scan_entities(value: Option<&Value>) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    if let Some(value) = value {
        visit(value, &mut found);
    }
    found
}

/// Collect entity ids from a single text.
pub fn scan_text(text: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_from_text(text, &mut found);
    found
}

fn visit(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::String(s) => collect_from_text(s, found),
        Value::Array(items) => {
            for item in items {
                visit(item, found);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                visit(item, found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn collect_from_text(text: &str, found: &mut BTreeSet<String>) {
    for m in ENTITY_RE.find_iter(text) {
        // Platform domains are lower case; the slug is kept as written.
        let (domain, slug) = m.as_str().split_once('.').unwrap_or((m.as_str(), ""));
        found.insert(format!("{}.{}", domain.to_ascii_lowercase(), slug));
    }
}
