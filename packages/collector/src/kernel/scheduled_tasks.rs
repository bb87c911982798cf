//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! ```text
//! Scheduler (every hour, minute 0 UTC)
//!     │
//!     └─► ScheduleTrigger::run(now)
//!             └─► due configs → queue jobs → wake QueueWorker
//!
//! Scheduler (every 10 minutes)
//!     │
//!     └─► ProgressHub::cleanup (drop topics nobody listens to)
//! ```

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::domains::schedules::{ScheduleTrigger, TriggerRequest};
use crate::kernel::progress_hub::ProgressHub;

/// Start all scheduled tasks
pub async fn start_scheduler(
    trigger: Arc<ScheduleTrigger>,
    hub: ProgressHub,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let hourly_trigger = trigger.clone();
    let trigger_job = Job::new_async("0 0 * * * *", move |_uuid, _lock| {
        let trigger = hourly_trigger.clone();
        Box::pin(async move {
            match trigger.run(TriggerRequest::default(), Utc::now()).await {
                Ok(report) => tracing::info!(
                    ran = report.ran.len(),
                    skipped = report.skipped.len(),
                    errors = report.errors.len(),
                    jobs_created = report.jobs_created(),
                    "Scheduled trigger finished"
                ),
                Err(e) => tracing::error!("Scheduled trigger failed: {}", e),
            }
        })
    })?;

    let cleanup_job = Job::new_async("0 */10 * * * *", move |_uuid, _lock| {
        let hub = hub.clone();
        Box::pin(async move {
            hub.cleanup().await;
        })
    })?;

    scheduler.add(trigger_job).await?;
    scheduler.add(cleanup_job).await?;
    scheduler.start().await?;

    tracing::info!("Scheduled tasks started (collection trigger every hour, stream cleanup every 10 minutes)");
    Ok(scheduler)
}
