//! On-demand refresh of a subset of an entity's work items.
//!
//! Items are grouped by owning scope and each scope is collected with the shared
//! batch primitive. One running progress counter spans all scopes. A failing
//! scope is recorded and the remaining scopes still run.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::collect_batch::{UnitCollector, UnitObserver};
use crate::common::CollectionProgress;
use crate::domains::collection::models::WorkItem;
use crate::kernel::progress_hub::{topics, ProgressHub, StreamEvent};
use crate::kernel::{BaseWorkItemSource, CollectorDeps, ProviderRegistry};

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("none of the requested providers are configured")]
    NoProviders,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemSelection {
    #[default]
    All,
    Subset(Vec<Uuid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Only collect pairs with no stored response
    #[default]
    Incremental,
    /// Overwrite every pair
    Full,
}

impl RefreshMode {
    pub fn skip_existing(&self) -> bool {
        matches!(self, RefreshMode::Incremental)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub items: ItemSelection,
    /// Provider keys the caller is entitled to; `None` means every configured provider
    #[serde(default)]
    pub providers: Option<Vec<String>>,
    #[serde(default)]
    pub mode: RefreshMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub items_processed: u32,
    pub responses_collected: u32,
    pub skipped: u32,
    pub errors: Vec<String>,
    pub progress: CollectionProgress,
}

pub struct OnDemandRefresh {
    work_items: Arc<dyn BaseWorkItemSource>,
    providers: ProviderRegistry,
    collector: UnitCollector,
    hub: ProgressHub,
}

impl OnDemandRefresh {
    pub fn new(deps: &CollectorDeps) -> Self {
        Self {
            work_items: deps.work_items.clone(),
            providers: deps.providers.clone(),
            collector: deps.unit_collector(),
            hub: deps.stream_hub.clone(),
        }
    }

    pub async fn run(&self, entity_id: Uuid, request: RefreshRequest) -> Result<RefreshReport> {
        let items = match &request.items {
            ItemSelection::All => self.work_items.for_entity(entity_id).await,
            ItemSelection::Subset(ids) => self.work_items.by_ids(entity_id, ids).await,
        }
        .context("failed to load work items")?;

        let mut errors = Vec::new();
        let providers = match &request.providers {
            None => self.providers.all(),
            Some(keys) => {
                let (found, missing) = self.providers.select(keys);
                for key in missing {
                    warn!(entity_id = %entity_id, provider = %key, "unknown provider requested");
                    errors.push(format!("unknown provider: {}", key));
                }
                found
            }
        };
        if providers.is_empty() {
            return Err(RefreshError::NoProviders.into());
        }

        let mut by_scope: BTreeMap<Uuid, Vec<WorkItem>> = BTreeMap::new();
        for item in &items {
            by_scope.entry(item.scope_id).or_default().push(item.clone());
        }

        let per_item = u32::try_from(providers.len()).unwrap_or(u32::MAX);
        let total = u32::try_from(items.len())
            .unwrap_or(u32::MAX)
            .saturating_mul(per_item);
        let mut progress = CollectionProgress::starting(total);
        let observer = RefreshObserver {
            topic: topics::entity(entity_id),
            hub: self.hub.clone(),
        };

        info!(
            entity_id = %entity_id,
            items = items.len(),
            scopes = by_scope.len(),
            providers = providers.len(),
            mode = ?request.mode,
            "refresh starting"
        );

        let mut offset: u32 = 0;
        let mut responses_collected: u32 = 0;
        let mut skipped: u32 = 0;

        for (scope_id, scope_items) in &by_scope {
            match self
                .collector
                .collect_batch(
                    scope_items,
                    &providers,
                    request.mode.skip_existing(),
                    &mut progress,
                    offset,
                    &observer,
                )
                .await
            {
                Ok(outcome) => {
                    responses_collected += outcome.collected;
                    skipped += outcome.skipped;
                    if let Some(summary) = outcome.failure_summary() {
                        warn!(scope_id = %scope_id, failures = %summary, "scope refresh incomplete");
                        errors.push(format!("scope {}: {}", scope_id, summary));
                    }
                }
                Err(e) => {
                    warn!(scope_id = %scope_id, error = %e, "scope refresh failed");
                    errors.push(format!("scope {}: {:#}", scope_id, e));
                }
            }
            offset = offset.saturating_add(
                u32::try_from(scope_items.len())
                    .unwrap_or(u32::MAX)
                    .saturating_mul(per_item),
            );
        }

        let label = if errors.is_empty() {
            "Complete".to_string()
        } else {
            format!("Incomplete ({})", progress.fraction_label())
        };
        self.hub
            .publish(
                &observer.topic,
                StreamEvent::Finished {
                    label,
                    progress: progress.clone(),
                },
            )
            .await;

        info!(
            entity_id = %entity_id,
            responses_collected,
            skipped,
            errors = errors.len(),
            "refresh finished"
        );

        Ok(RefreshReport {
            items_processed: u32::try_from(items.len()).unwrap_or(u32::MAX),
            responses_collected,
            skipped,
            errors,
            progress,
        })
    }
}

struct RefreshObserver {
    topic: String,
    hub: ProgressHub,
}

#[async_trait]
impl UnitObserver for RefreshObserver {
    async fn unit_done(&self, progress: &CollectionProgress) -> Result<()> {
        self.hub
            .publish(&self.topic, StreamEvent::progress("refresh", progress.clone()))
            .await;
        Ok(())
    }
}
