//! Batch executor the queue processor drives.
//!
//! Units are row-major over the scope's work items and the job's providers:
//! unit `u` is item `u / P`, provider `u % P`. Queue batches always overwrite
//! (no skip-existing); the upsert keeps one row per pair.

use std::ops::Range;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::debug;

use super::collect_batch::{UnitCollector, UnitResult};
use crate::kernel::jobs::{BatchExecutor, BatchSummary, QueueJob};
use crate::kernel::{BaseWorkItemSource, CollectorDeps, ProviderRegistry};

pub struct CollectionBatchExecutor {
    work_items: Arc<dyn BaseWorkItemSource>,
    providers: ProviderRegistry,
    collector: UnitCollector,
}

impl CollectionBatchExecutor {
    pub fn new(deps: &CollectorDeps) -> Self {
        Self {
            work_items: deps.work_items.clone(),
            providers: deps.providers.clone(),
            collector: deps.unit_collector(),
        }
    }
}

#[async_trait]
impl BatchExecutor for CollectionBatchExecutor {
    async fn execute(&self, job: &QueueJob, units: Range<i32>) -> Result<BatchSummary> {
        let scope = &job.scope.0;
        let batch_len = units.end - units.start;

        let (providers, missing) = self.providers.select(&scope.providers);
        if !missing.is_empty() {
            bail!("providers not configured: {}", missing.join(", "));
        }
        if providers.is_empty() {
            debug!(job_id = %job.id, "job scope has no providers, nothing to collect");
            return Ok(BatchSummary {
                units: batch_len,
                collected: 0,
            });
        }

        let per_item = i32::try_from(providers.len()).unwrap_or(i32::MAX);
        let items_needed = usize::try_from((units.end + per_item - 1) / per_item).unwrap_or(0);
        let items = self.work_items.for_scope(scope, items_needed).await?;

        let mut collected = 0;
        for unit in units {
            let item_index = usize::try_from(unit / per_item).unwrap_or(usize::MAX);
            let provider = &providers[usize::try_from(unit % per_item).unwrap_or(0)];

            let Some(item) = items.get(item_index) else {
                debug!(job_id = %job.id, unit, "no work item at this position, unit is empty");
                continue;
            };

            let result = self
                .collector
                .collect_unit(item, provider.as_ref(), false)
                .await
                .map_err(|e| {
                    e.context(format!(
                        "unit {} ({} / {})",
                        unit,
                        item.label,
                        provider.key()
                    ))
                })?;
            if let UnitResult::Collected(_) = result {
                collected += 1;
            }
        }

        Ok(BatchSummary {
            units: batch_len,
            collected,
        })
    }
}
