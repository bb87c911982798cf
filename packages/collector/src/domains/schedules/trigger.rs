//! Schedule trigger: expand due configurations into queue jobs.
//!
//! ```text
//! run(now)
//!     ├─► active configs due this hour (or the forced one)
//!     ├─► skip: already ran this month (unless forced), empty scope lists
//!     ├─► one QueueJob per scope combination (batch_index = 0)
//!     ├─► claim the month (last_run_at = now) and insert the jobs atomically
//!     └─► wake the queue worker
//! ```
//!
//! No provider calls happen here.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::{CollectionConfiguration, ConfigStore};
use crate::kernel::jobs::QueueJob;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("collection configuration {0} not found")]
    ConfigNotFound(Uuid),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRequest {
    /// Run this configuration now, ignoring its schedule and monthly dedup
    #[serde(default)]
    pub force_config_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyRanThisMonth,
    EmptyScope,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigRun {
    pub config_id: Uuid,
    pub name: String,
    pub jobs_created: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigSkip {
    pub config_id: Uuid,
    pub name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigError {
    pub config_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TriggerReport {
    pub ran: Vec<ConfigRun>,
    pub skipped: Vec<ConfigSkip>,
    pub errors: Vec<ConfigError>,
}

impl TriggerReport {
    pub fn jobs_created(&self) -> usize {
        self.ran.iter().map(|r| r.jobs_created).sum()
    }
}

pub struct ScheduleTrigger {
    configs: Arc<dyn ConfigStore>,
    units_per_job: i32,
    waker: Option<Arc<Notify>>,
}

impl ScheduleTrigger {
    pub fn new(configs: Arc<dyn ConfigStore>, units_per_job: i32) -> Self {
        Self {
            configs,
            units_per_job,
            waker: None,
        }
    }

    /// Notify handle of the queue worker to wake after enqueuing.
    pub fn with_waker(mut self, waker: Arc<Notify>) -> Self {
        self.waker = Some(waker);
        self
    }

    pub async fn run(&self, request: TriggerRequest, now: DateTime<Utc>) -> Result<TriggerReport> {
        let forced = request.force_config_id.is_some();
        let candidates: Vec<CollectionConfiguration> = match request.force_config_id {
            Some(id) => {
                let config = self
                    .configs
                    .find_by_id(id)
                    .await?
                    .ok_or(TriggerError::ConfigNotFound(id))?;
                vec![config]
            }
            None => self
                .configs
                .find_active()
                .await?
                .into_iter()
                .filter(|c| c.is_due(now))
                .collect(),
        };

        info!(candidates = candidates.len(), forced, "schedule trigger running");

        let mut report = TriggerReport::default();
        for config in candidates {
            if !forced && config.ran_this_month(now) {
                info!(config_id = %config.id, name = %config.name, "already ran this month, skipping");
                report.skipped.push(ConfigSkip {
                    config_id: config.id,
                    name: config.name.clone(),
                    reason: SkipReason::AlreadyRanThisMonth,
                });
                continue;
            }

            let scopes = config.expand_scopes();
            if scopes.is_empty() {
                info!(config_id = %config.id, name = %config.name, "configuration has empty scope lists, skipping");
                report.skipped.push(ConfigSkip {
                    config_id: config.id,
                    name: config.name.clone(),
                    reason: SkipReason::EmptyScope,
                });
                continue;
            }

            let (full_items, leftover) = config.unit_coverage(self.units_per_job);
            if leftover > 0 {
                warn!(
                    config_id = %config.id,
                    units_per_job = self.units_per_job,
                    providers = config.providers.0.len(),
                    full_items,
                    leftover,
                    "units per job is not a multiple of the provider count; last item is collected for only some providers"
                );
            }

            let jobs: Vec<QueueJob> = scopes
                .into_iter()
                .map(|scope| QueueJob::for_scope(config.id, scope, self.units_per_job))
                .collect();

            match self
                .configs
                .claim_and_enqueue(config.id, now, forced, jobs)
                .await
            {
                Ok(Some(created)) => {
                    info!(config_id = %config.id, jobs_created = created.len(), "configuration expanded into jobs");
                    report.ran.push(ConfigRun {
                        config_id: config.id,
                        name: config.name.clone(),
                        jobs_created: created.len(),
                    });
                }
                Ok(None) => {
                    info!(config_id = %config.id, name = %config.name, "another run claimed this month first, skipping");
                    report.skipped.push(ConfigSkip {
                        config_id: config.id,
                        name: config.name.clone(),
                        reason: SkipReason::AlreadyRanThisMonth,
                    });
                }
                Err(e) => {
                    error!(config_id = %config.id, error = %e, "failed to expand configuration");
                    report.errors.push(ConfigError {
                        config_id: config.id,
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        if report.jobs_created() > 0 {
            if let Some(waker) = &self.waker {
                waker.notify_one();
            }
        }

        Ok(report)
    }
}
