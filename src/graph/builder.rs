//! Graph assembly: one state snapshot, then a bounded concurrent fan-out of
//! per-automation resolve → scan → annotate units.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

use super::extraction::scan_entities;
use super::health::{offline_members, offline_members_by_group, stale_days, unknown_trigger_entities, OfflineIndex};
use super::resolver::ConfigResolver;
use super::{DependencyEntry, DependencyGraph, EntityRef};
use crate::config::Config;
use crate::error::{InspectorError, Result};
use crate::platform::{AutomationSummary, PlatformApi, StateIndex};

/// Anything that can produce a fresh dependency graph.
#[async_trait]
pub trait GraphSource: Send + Sync {
    async fn build(&self) -> Result<DependencyGraph>;
}

/// Builds dependency graphs from the platform API.
pub struct GraphBuilder {
    api: Arc<dyn PlatformApi>,
    resolver: ConfigResolver,
    stale_threshold_days: i64,
    max_concurrent: usize,
}

impl GraphBuilder {
    pub fn new(api: Arc<dyn PlatformApi>, stale_threshold_days: i64, max_concurrent: usize) -> Self {
        Self {
            resolver: ConfigResolver::new(Arc::clone(&api)),
            api,
            stale_threshold_days,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn from_config(api: Arc<dyn PlatformApi>, config: &Config) -> Self {
        Self::new(
            api,
            config.health.stale_threshold_days,
            config.platform.max_concurrent_fetches,
        )
    }

    /// Build the graph with `now` as the staleness reference time.
    ///
    /// Fails only when the state listing itself fails; a failing automation is
    /// logged, listed in `failed`, and left out of the graph.
    pub async fn build_at(&self, now: DateTime<Utc>) -> Result<DependencyGraph> {
        let start = Instant::now();

        let states = Arc::new(StateIndex::from_states(self.api.list_states().await?));
        let automations = states.automations();
        let offline_index = Arc::new(offline_members_by_group(&states));
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        let (ids, handles): (Vec<_>, Vec<_>) = automations
            .into_iter()
            .map(|summary| {
                let id = summary.entity_id.clone();
                let unit = AutomationUnit {
                    resolver: self.resolver.clone(),
                    states: Arc::clone(&states),
                    offline_index: Arc::clone(&offline_index),
                    stale_threshold: self.stale_threshold_days,
                    now,
                };
                let semaphore = Arc::clone(&semaphore);
                let handle = tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| InspectorError::Build(e.to_string()))?;
                    unit.inspect(summary).await
                });
                (id, handle)
            })
            .unzip();

        let results = join_all(handles).await;

        let mut entries = BTreeMap::new();
        let mut failed = Vec::new();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(Ok(entry)) => {
                    entries.insert(id, entry);
                }
                Ok(Err(e)) => {
                    log::warn!("Skipping {}: {}", id, e);
                    failed.push(id);
                }
                Err(e) => {
                    log::warn!("Skipping {}: task failed: {}", id, e);
                    failed.push(id);
                }
            }
        }

        let graph = DependencyGraph::assemble(entries, states.helper_ids(), failed);

        log::info!(
            "Built dependency map with {} automations ({} skipped, {} orphans) in {:?}",
            graph.summary.total,
            graph.failed.len(),
            graph.orphans.len(),
            start.elapsed()
        );

        Ok(graph)
    }
}

#[async_trait]
impl GraphSource for GraphBuilder {
    async fn build(&self) -> Result<DependencyGraph> {
        self.build_at(Utc::now()).await
    }
}

/// Everything one automation's unit of work needs, owned so it can be spawned.
struct AutomationUnit {
    resolver: ConfigResolver,
    states: Arc<StateIndex>,
    offline_index: Arc<OfflineIndex>,
    stale_threshold: i64,
    now: DateTime<Utc>,
}

impl AutomationUnit {
    async fn inspect(self, summary: AutomationSummary) -> Result<DependencyEntry> {
        if summary.slug().is_none() {
            return Err(InspectorError::InvalidInput(format!(
                "automation id {:?} has no slug",
                summary.entity_id
            )));
        }

        let config = self
            .resolver
            .resolve(
                &summary.entity_id,
                summary.config_id.as_deref(),
                &summary.attributes,
            )
            .await;

        let references = scan_entities(Some(&config.value));
        log::debug!(
            "{}: config {} ({} entities)",
            summary.entity_id,
            config.source,
            references.len()
        );

        let entities = references
            .iter()
            .filter_map(|id| self.states.get(id))
            .map(|state| EntityRef {
                id: state.entity_id.clone(),
                state: state.state.clone(),
                ok: !state.is_offline(),
            })
            .collect();

        let unknown_triggers = unknown_trigger_entities(&config, &self.states);
        let offline = offline_members(&references, &self.offline_index);

        Ok(DependencyEntry {
            friendly_name: summary.friendly_name,
            enabled: summary.enabled,
            config_id: summary.config_id,
            stale_days: stale_days(summary.last_triggered.as_deref(), self.now),
            last_triggered: summary.last_triggered,
            entities,
            unknown_triggers: unknown_triggers.into_iter().collect(),
            offline_members: offline.into_iter().collect(),
            stale_threshold: self.stale_threshold,
            references,
        })
    }
}
