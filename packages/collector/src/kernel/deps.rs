//! Collector dependencies (using traits for testability)
//!
//! Central container handed to the session, refresh, queue executor and trigger.
//! Every external collaborator sits behind a trait so tests can swap in the
//! in-memory versions from `test_dependencies`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;

use super::jobs::{PostgresQueueStore, QueueStore};
use super::progress_hub::ProgressHub;
use super::providers::{HttpInsightGatherer, NoopInsightGatherer, ProviderRegistry};
use super::{BaseInsightGatherer, BaseResponseSink, BaseWorkItemSource};
use crate::config::{Config, QueueSettings};
use crate::domains::collection::activities::UnitCollector;
use crate::domains::collection::models::{
    EntityStatusStore, PostgresEntityStatusStore, PostgresResponseSink, PostgresWorkItemSource,
};
use crate::domains::schedules::models::{ConfigStore, PostgresConfigStore};

#[derive(Clone)]
pub struct CollectorDeps {
    pub providers: ProviderRegistry,
    pub response_sink: Arc<dyn BaseResponseSink>,
    pub work_items: Arc<dyn BaseWorkItemSource>,
    pub insights: Arc<dyn BaseInsightGatherer>,
    pub statuses: Arc<dyn EntityStatusStore>,
    pub queue: Arc<dyn QueueStore>,
    pub configs: Arc<dyn ConfigStore>,
    /// In-process pub/sub hub for progress streaming to SSE endpoints
    pub stream_hub: ProgressHub,
    /// Per-call provider timeout; a timeout is a unit failure
    pub provider_timeout: Duration,
    pub queue_settings: QueueSettings,
}

impl CollectorDeps {
    /// Production wiring: Postgres stores and HTTP adapters.
    pub fn postgres(pool: PgPool, config: &Config) -> Result<Self> {
        let providers =
            ProviderRegistry::from_endpoints(&config.provider_endpoints, config.provider_timeout)?;

        let insights: Arc<dyn BaseInsightGatherer> = match &config.insights_url {
            Some(url) => Arc::new(HttpInsightGatherer::new(url, config.provider_timeout)?),
            None => Arc::new(NoopInsightGatherer),
        };

        Ok(Self {
            providers,
            response_sink: Arc::new(PostgresResponseSink::new(pool.clone())),
            work_items: Arc::new(PostgresWorkItemSource::new(pool.clone())),
            insights,
            statuses: Arc::new(PostgresEntityStatusStore::new(pool.clone())),
            queue: Arc::new(PostgresQueueStore::new(pool.clone())),
            configs: Arc::new(PostgresConfigStore::new(pool)),
            stream_hub: ProgressHub::new(),
            provider_timeout: config.provider_timeout,
            queue_settings: config.queue.clone(),
        })
    }

    pub fn unit_collector(&self) -> UnitCollector {
        UnitCollector::new(self.response_sink.clone(), self.provider_timeout)
    }
}
