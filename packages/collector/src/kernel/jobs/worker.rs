//! Queue worker: the long-running loop that drains the backlog.
//!
//! ```text
//! QueueWorker::run
//!     │
//!     ├─► wait for Notify (trigger enqueued work) or poll interval
//!     └─► drain()
//!             ├─► processor.tick()
//!             ├─► dispatcher.after_tick() → Continue | Stop
//!             └─► stop at max ticks / wake budget, then yield and re-drain
//! ```

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dispatcher::{ChainDecision, Dispatcher};
use super::job::JobStatus;
use super::processor::{QueueProcessor, TickOutcome};
use crate::config::WorkerSettings;

/// Summary of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub ticks: u32,
    pub batches_succeeded: u32,
    pub batches_failed: u32,
    pub jobs_completed: u32,
    pub jobs_failed: u32,
    pub healed: u32,
    pub conflicts: u32,
    /// The drain stopped on its tick/time budget with work still pending.
    pub budget_exhausted: bool,
}

impl DrainReport {
    fn record(&mut self, outcome: &TickOutcome) {
        self.ticks += 1;
        match outcome {
            TickOutcome::Idle => {}
            TickOutcome::Healed { .. } => {
                self.healed += 1;
                self.jobs_completed += 1;
            }
            TickOutcome::Advanced { status, .. } => {
                self.batches_succeeded += 1;
                if *status == JobStatus::Completed {
                    self.jobs_completed += 1;
                }
            }
            TickOutcome::Retrying { status, .. } => {
                self.batches_failed += 1;
                if *status == JobStatus::Failed {
                    self.jobs_failed += 1;
                }
            }
            TickOutcome::Conflict { .. } => self.conflicts += 1,
        }
    }
}

pub struct QueueWorker {
    processor: Arc<QueueProcessor>,
    dispatcher: Dispatcher,
    settings: WorkerSettings,
    wake: Arc<Notify>,
}

impl QueueWorker {
    pub fn new(processor: Arc<QueueProcessor>, settings: WorkerSettings) -> Self {
        let dispatcher = Dispatcher::new(processor.store().clone());
        Self {
            processor,
            dispatcher,
            settings,
            wake: Arc::new(Notify::new()),
        }
    }

    /// Handle used by producers to wake the loop after enqueuing.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Run ticks until the dispatcher stops or the wake budget runs out.
    pub async fn drain(&self) -> Result<DrainReport> {
        let started = Instant::now();
        let mut report = DrainReport::default();

        loop {
            let outcome = self.processor.tick().await?;
            report.record(&outcome);

            let decision = match self.dispatcher.after_tick(&outcome).await {
                Ok(decision) => decision,
                Err(e) => {
                    // The tick is already written back; only the chain is lost.
                    warn!(error = %e, "continuation check failed, stopping drain");
                    ChainDecision::Stop
                }
            };
            if decision == ChainDecision::Stop {
                break;
            }

            if report.ticks >= self.settings.max_ticks_per_wake
                || started.elapsed() >= self.settings.wake_budget
            {
                report.budget_exhausted = true;
                break;
            }
        }

        debug!(report = ?report, elapsed_ms = started.elapsed().as_millis() as u64, "drain finished");
        Ok(report)
    }

    /// Service loop. Returns when `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        info!(
            worker_id = %self.processor.worker_id(),
            max_ticks = self.settings.max_ticks_per_wake,
            poll_secs = self.settings.poll_interval.as_secs(),
            "queue worker starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            match self.drain().await {
                Ok(report) if report.budget_exhausted => {
                    info!(ticks = report.ticks, "wake budget exhausted, yielding");
                    tokio::task::yield_now().await;
                    continue;
                }
                Ok(report) if report.ticks > 1 => {
                    info!(
                        batches_succeeded = report.batches_succeeded,
                        batches_failed = report.batches_failed,
                        jobs_completed = report.jobs_completed,
                        "queue drained"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "queue drain failed"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.wake.notified() => debug!("queue worker woken"),
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        info!(worker_id = %self.processor.worker_id(), "queue worker stopped");
        Ok(())
    }
}
