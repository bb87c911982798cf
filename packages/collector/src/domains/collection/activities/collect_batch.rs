//! The collect primitive shared by the queue, the session and refresh.
//!
//! For each `(work item, provider)` pair, in row-major order and strictly one call
//! at a time:
//! 1. With skip-existing, ask the sink whether a record exists and skip if so
//! 2. Invoke the provider under a per-call timeout
//! 3. Upsert the response with its derived metrics
//!
//! Provider failures and timeouts are unit failures. Sink errors on the
//! existence check or upsert are unit failures too; only observer errors abort.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::common::CollectionProgress;
use crate::domains::collection::models::{NewResponse, UpsertOutcome, WorkItem};
use crate::kernel::{BaseProvider, BaseResponseSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitResult {
    Collected(UpsertOutcome),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitFailure {
    pub work_item_id: Uuid,
    pub provider_key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub attempted: u32,
    pub collected: u32,
    pub skipped: u32,
    pub failures: Vec<UnitFailure>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// "N of M units failed"
    pub fn failure_summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(format!(
            "{} of {} units failed",
            self.failures.len(),
            self.attempted
        ))
    }
}

/// Called after every unit, whatever its result.
#[async_trait]
pub trait UnitObserver: Send + Sync {
    async fn unit_done(&self, progress: &CollectionProgress) -> Result<()>;
}

/// Observer that ignores progress.
pub struct NoopObserver;

#[async_trait]
impl UnitObserver for NoopObserver {
    async fn unit_done(&self, _progress: &CollectionProgress) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct UnitCollector {
    sink: Arc<dyn BaseResponseSink>,
    timeout: Duration,
}

impl UnitCollector {
    pub fn new(sink: Arc<dyn BaseResponseSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Collect one pair.
    pub async fn collect_unit(
        &self,
        item: &WorkItem,
        provider: &dyn BaseProvider,
        skip_existing: bool,
    ) -> Result<UnitResult> {
        let provider_key = provider.key();

        if skip_existing && self.sink.exists(item.id, provider_key).await? {
            debug!(work_item_id = %item.id, provider = %provider_key, "response exists, skipping");
            return Ok(UnitResult::Skipped);
        }

        let response = tokio::time::timeout(self.timeout, provider.invoke(&item.prompt))
            .await
            .map_err(|_| {
                anyhow!(
                    "provider {} timed out after {}s",
                    provider_key,
                    self.timeout.as_secs()
                )
            })??;

        let outcome = self
            .sink
            .upsert(NewResponse::from_provider(item, provider_key, response))
            .await?;

        debug!(work_item_id = %item.id, provider = %provider_key, outcome = ?outcome, "response stored");
        Ok(UnitResult::Collected(outcome))
    }

    /// Collect every `items × providers` pair.
    ///
    /// `progress.completed` is set to `offset + index + 1` after each unit, so
    /// callers can keep one running counter across several batches. The counter
    /// never moves backwards, which lets a resumed run revisit earlier units
    /// without rewinding it.
    pub async fn collect_batch(
        &self,
        items: &[WorkItem],
        providers: &[Arc<dyn BaseProvider>],
        skip_existing: bool,
        progress: &mut CollectionProgress,
        offset: u32,
        observer: &dyn UnitObserver,
    ) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        let mut index: u32 = 0;

        for item in items {
            for provider in providers {
                outcome.attempted += 1;

                match self.collect_unit(item, provider.as_ref(), skip_existing).await {
                    Ok(UnitResult::Collected(_)) => outcome.collected += 1,
                    Ok(UnitResult::Skipped) => outcome.skipped += 1,
                    Err(e) => {
                        warn!(
                            work_item_id = %item.id,
                            provider = %provider.key(),
                            error = %e,
                            "unit failed"
                        );
                        outcome.failures.push(UnitFailure {
                            work_item_id: item.id,
                            provider_key: provider.key().to_string(),
                            error: format!("{:#}", e),
                        });
                    }
                }

                index += 1;
                progress.record(offset + index, &item.label, provider.key());
                observer.unit_done(progress).await?;
            }
        }

        Ok(outcome)
    }
}
