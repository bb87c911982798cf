//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::WorkerSettings;
use crate::domains::collection::activities::{
    CollectionBatchExecutor, CollectionSession, OnDemandRefresh,
};
use crate::domains::schedules::ScheduleTrigger;
use crate::kernel::jobs::{ProcessorConfig, QueueProcessor, QueueWorker};
use crate::kernel::CollectorDeps;
use crate::server::routes::{
    config_jobs_handler, drain_handler, entity_status_handler, get_job_handler, health_handler,
    refresh_handler, reset_job_handler, run_session_handler, stream_handler, trigger_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub deps: Arc<CollectorDeps>,
    pub worker: Arc<QueueWorker>,
    pub trigger: Arc<ScheduleTrigger>,
    pub session: Arc<CollectionSession>,
    pub refresh: Arc<OnDemandRefresh>,
}

impl AppState {
    /// Wire the processor, worker and trigger on top of `deps`.
    pub fn new(db_pool: PgPool, deps: CollectorDeps, worker_settings: WorkerSettings) -> Self {
        let worker_id = format!("collector-{}", Uuid::new_v4());
        let processor = Arc::new(QueueProcessor::new(
            deps.queue.clone(),
            Arc::new(CollectionBatchExecutor::new(&deps)),
            deps.stream_hub.clone(),
            ProcessorConfig::from_settings(&deps.queue_settings, worker_id),
        ));
        let worker = Arc::new(QueueWorker::new(processor, worker_settings));

        let trigger = Arc::new(
            ScheduleTrigger::new(
                deps.configs.clone(),
                deps.queue_settings.units_per_job,
            )
            .with_waker(worker.waker()),
        );

        Self {
            db_pool,
            session: Arc::new(CollectionSession::new(&deps)),
            refresh: Arc::new(OnDemandRefresh::new(&deps)),
            deps: Arc::new(deps),
            worker,
            trigger,
        }
    }
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/trigger", post(trigger_handler))
        .route("/api/queue/drain", post(drain_handler))
        .route("/api/queue/jobs/:id", get(get_job_handler))
        .route("/api/queue/jobs/:id/reset", post(reset_job_handler))
        .route("/api/configs/:id/jobs", get(config_jobs_handler))
        .route(
            "/api/entities/:id/collection",
            get(entity_status_handler).post(run_session_handler),
        )
        .route("/api/entities/:id/refresh", post(refresh_handler))
        .route("/api/streams/:topic", get(stream_handler))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
