use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::common::CollectionProgress;
use crate::kernel::jobs::{DrainReport, JobEvent, QueueJob};
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Serialize)]
pub struct JobView {
    #[serde(flatten)]
    pub job: QueueJob,
    pub label: String,
    pub progress: CollectionProgress,
}

impl From<QueueJob> for JobView {
    fn from(job: QueueJob) -> Self {
        Self {
            label: job.status_label(),
            progress: job.progress(),
            job,
        }
    }
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub job_id: Uuid,
    pub reset: bool,
}

/// POST /api/queue/drain
pub async fn drain_handler(
    Extension(state): Extension<AppState>,
) -> Result<Json<DrainReport>, ApiError> {
    Ok(Json(state.worker.drain().await?))
}

/// GET /api/queue/jobs/:id
pub async fn get_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobView>, ApiError> {
    let job = state
        .deps
        .queue
        .find_by_id(job_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("job {}", job_id)))?;
    Ok(Json(job.into()))
}

/// POST /api/queue/jobs/:id/reset
pub async fn reset_job_handler(
    Extension(state): Extension<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ResetResponse>, ApiError> {
    if state.deps.queue.find_by_id(job_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("job {}", job_id)));
    }

    if !state.deps.queue.reset_failed(job_id).await? {
        return Err(ApiError::Conflict(format!("job {} is not failed", job_id)));
    }

    state.deps.stream_hub.publish_job(JobEvent::Reset { job_id }).await;
    state.worker.wake();

    Ok(Json(ResetResponse {
        job_id,
        reset: true,
    }))
}

/// GET /api/configs/:id/jobs
///
/// Every job a configuration produced, oldest first.
pub async fn config_jobs_handler(
    Extension(state): Extension<AppState>,
    Path(config_id): Path<Uuid>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state.deps.queue.find_for_config(config_id).await?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}
