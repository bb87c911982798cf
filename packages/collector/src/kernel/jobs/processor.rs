//! Queue processor: one bounded unit of work per tick.
//!
//! ```text
//! tick()
//!   ├─► claim oldest non-terminal job (lease + version bump)
//!   ├─► cursor at end?  → completed, no external call        (Healed)
//!   ├─► execute one batch [batch_index, batch_index + batch_size)
//!   │       ok  → cursor += units, processing | completed      (Advanced)
//!   │       err → retry_count += 1, pending | failed           (Retrying)
//!   └─► versioned write-back; lost race → nothing written      (Conflict)
//! ```
//!
//! Batch failures never escape `tick`; they become state transitions. Only
//! infrastructure errors on the queue itself are returned as `Err`.

use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::events::JobEvent;
use super::job::{JobStatus, QueueJob};
use super::queue::{QueueStore, WriteBack};
use crate::config::QueueSettings;
use crate::kernel::progress_hub::ProgressHub;

/// What a successful batch did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Units covered (collected or skipped).
    pub units: i32,
    /// Units that produced a new or overwritten response.
    pub collected: i32,
}

/// Executes the external work for a range of a job's units.
///
/// An `Err` means the batch failed as a whole and the cursor must not move.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, job: &QueueJob, units: Range<i32>) -> Result<BatchSummary>;
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub batch_size: i32,
    pub max_retries: i32,
    pub lease_duration: Duration,
    pub worker_id: String,
}

impl ProcessorConfig {
    pub fn from_settings(settings: &QueueSettings, worker_id: impl Into<String>) -> Self {
        Self {
            batch_size: settings.batch_size,
            max_retries: settings.max_retries,
            lease_duration: settings.lease_duration,
            worker_id: worker_id.into(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_settings(&QueueSettings::default(), format!("worker-{}", Uuid::new_v4()))
    }
}

/// Result of one processor tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Nothing claimable.
    Idle,
    /// Cursor was already at the end; marked completed without external calls.
    Healed { job_id: Uuid },
    /// A batch succeeded.
    Advanced {
        job_id: Uuid,
        batch_index: i32,
        total_units: i32,
        status: JobStatus,
    },
    /// A batch failed; `status` is `pending` (will retry) or `failed`.
    Retrying {
        job_id: Uuid,
        retry_count: i32,
        status: JobStatus,
    },
    /// The versioned write-back lost to another owner.
    Conflict { job_id: Uuid },
}

impl TickOutcome {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            TickOutcome::Idle => None,
            TickOutcome::Healed { job_id }
            | TickOutcome::Advanced { job_id, .. }
            | TickOutcome::Retrying { job_id, .. }
            | TickOutcome::Conflict { job_id } => Some(*job_id),
        }
    }

    /// Job status after the tick, when one was written.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            TickOutcome::Healed { .. } => Some(JobStatus::Completed),
            TickOutcome::Advanced { status, .. } | TickOutcome::Retrying { status, .. } => {
                Some(*status)
            }
            TickOutcome::Idle | TickOutcome::Conflict { .. } => None,
        }
    }
}

pub struct QueueProcessor {
    store: Arc<dyn QueueStore>,
    executor: Arc<dyn BatchExecutor>,
    hub: ProgressHub,
    config: ProcessorConfig,
}

impl QueueProcessor {
    pub fn new(
        store: Arc<dyn QueueStore>,
        executor: Arc<dyn BatchExecutor>,
        hub: ProgressHub,
        config: ProcessorConfig,
    ) -> Self {
        Self {
            store,
            executor,
            hub,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn worker_id(&self) -> &str {
        &self.config.worker_id
    }

    /// Process exactly one job for at most one batch.
    pub async fn tick(&self) -> Result<TickOutcome> {
        let Some(mut job) = self
            .store
            .claim_next(&self.config.worker_id, self.config.lease_duration)
            .await?
        else {
            debug!(worker_id = %self.config.worker_id, "no claimable jobs");
            return Ok(TickOutcome::Idle);
        };

        let job_id = job.id;
        self.hub
            .publish_job(JobEvent::Claimed {
                job_id,
                worker_id: self.config.worker_id.clone(),
                batch_index: job.batch_index,
                total_units: job.total_units,
            })
            .await;

        if job.is_exhausted() {
            job.mark_healed();
            if self.store.write_back(&job).await? == WriteBack::Conflict {
                return Ok(self.conflict(job_id).await);
            }
            info!(job_id = %job_id, total_units = job.total_units, "job cursor already at end, marked completed");
            self.hub.publish_job(JobEvent::Healed { job_id }).await;
            return Ok(TickOutcome::Healed { job_id });
        }

        let units = job.next_batch(self.config.batch_size);
        let batch_len = units.end - units.start;

        match self.executor.execute(&job, units.clone()).await {
            Ok(summary) => {
                let status = job.record_success(batch_len);
                if self.store.write_back(&job).await? == WriteBack::Conflict {
                    return Ok(self.conflict(job_id).await);
                }
                info!(
                    job_id = %job_id,
                    batch_start = units.start,
                    batch_index = job.batch_index,
                    total_units = job.total_units,
                    collected = summary.collected,
                    status = ?status,
                    "batch succeeded"
                );
                self.hub
                    .publish_job(JobEvent::BatchSucceeded {
                        job_id,
                        batch_index: job.batch_index,
                        total_units: job.total_units,
                        status,
                    })
                    .await;
                Ok(TickOutcome::Advanced {
                    job_id,
                    batch_index: job.batch_index,
                    total_units: job.total_units,
                    status,
                })
            }
            Err(e) => {
                let status = job.record_failure(&format!("{:#}", e), self.config.max_retries);
                if self.store.write_back(&job).await? == WriteBack::Conflict {
                    return Ok(self.conflict(job_id).await);
                }
                warn!(
                    job_id = %job_id,
                    batch_index = job.batch_index,
                    retry_count = job.retry_count,
                    status = ?status,
                    error = %e,
                    "batch failed"
                );
                self.hub
                    .publish_job(JobEvent::BatchFailed {
                        job_id,
                        retry_count: job.retry_count,
                        will_retry: status == JobStatus::Pending,
                    })
                    .await;
                Ok(TickOutcome::Retrying {
                    job_id,
                    retry_count: job.retry_count,
                    status,
                })
            }
        }
    }

    async fn conflict(&self, job_id: Uuid) -> TickOutcome {
        warn!(job_id = %job_id, worker_id = %self.config.worker_id, "job changed since claim, write-back dropped");
        self.hub.publish_job(JobEvent::LeaseConflict { job_id }).await;
        TickOutcome::Conflict { job_id }
    }
}
