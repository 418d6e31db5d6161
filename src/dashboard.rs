//! Lovelace dashboard YAML rendered from a dependency graph.

use serde::Serialize;

use crate::error::Result;
use crate::graph::DependencyGraph;

#[derive(Serialize)]
struct Dashboard {
    views: Vec<View>,
}

#[derive(Serialize)]
struct View {
    title: &'static str,
    path: &'static str,
    icon: &'static str,
    cards: Vec<Card>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Card {
    Entities {
        title: String,
        entities: Vec<String>,
        footer: Footer,
    },
    Markdown {
        content: String,
    },
}

#[derive(Serialize)]
struct Footer {
    #[serde(rename = "type")]
    kind: &'static str,
    entities: Vec<FooterButton>,
}

#[derive(Serialize)]
struct FooterButton {
    name: &'static str,
    tap_action: TapAction,
    icon: &'static str,
}

#[derive(Serialize)]
struct TapAction {
    action: &'static str,
    navigation_path: String,
}

/// Render one dashboard view with an entities card and a status card per automation.
pub fn render_dashboard(graph: &DependencyGraph) -> Result<String> {
    let mut cards = Vec::with_capacity(graph.automations.len() * 2);

    for (automation_id, entry) in &graph.automations {
        let entities = std::iter::once(automation_id.clone())
            .chain(entry.entities.iter().map(|e| e.id.clone()))
            .collect();

        let edit_target = entry.config_id.as_deref().unwrap_or(automation_id);
        cards.push(Card::Entities {
            title: entry.friendly_name.clone(),
            entities,
            footer: Footer {
                kind: "buttons",
                entities: vec![FooterButton {
                    name: "Trace",
                    tap_action: TapAction {
                        action: "navigate",
                        navigation_path: format!("/config/automation/edit/{}", edit_target),
                    },
                    icon: "mdi:timeline-clock-outline",
                }],
            },
        });

        cards.push(Card::Markdown {
            content: format!(
                "**Last run:** {}  \n**Enabled:** {}",
                entry.last_triggered.as_deref().unwrap_or("never"),
                if entry.enabled { "yes" } else { "no" }
            ),
        });
    }

    let dashboard = Dashboard {
        views: vec![View {
            title: "Automation Inspector",
            path: "automation-inspector",
            icon: "mdi:robot-industrial",
            cards,
        }],
    };

    Ok(serde_yaml_ng::to_string(&dashboard)?)
}
