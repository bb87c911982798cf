//! Resumable onboarding collection for one entity.
//!
//! Pipeline:
//! 1. Read the stored status; a non-terminal one is resumed, not restarted
//! 2. Phase 1: gather insights (failure is logged and tolerated)
//! 3. Phase 2: every work item × every provider, sequentially, skip-existing,
//!    persisting progress after each unit
//! 4. Completed (progress cleared) or Failed (progress kept for the label)

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::collect_batch::{UnitCollector, UnitObserver};
use crate::common::CollectionProgress;
use crate::domains::collection::models::{EntityCollectionStatus, EntityStatusStore, SessionStatus};
use crate::kernel::progress_hub::{topics, ProgressHub, StreamEvent};
use crate::kernel::{BaseInsightGatherer, BaseWorkItemSource, CollectorDeps, ProviderRegistry};

const PHASE_INSIGHTS: &str = "phase1";
const PHASE_RESPONSES: &str = "phase2";

#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub entity_id: Uuid,
    pub status: SessionStatus,
    pub label: String,
    pub progress: CollectionProgress,
    pub resumed: bool,
    pub insights_gathered: bool,
    pub collected: u32,
    pub skipped: u32,
    pub failed: u32,
}

pub struct CollectionSession {
    work_items: Arc<dyn BaseWorkItemSource>,
    providers: ProviderRegistry,
    insights: Arc<dyn BaseInsightGatherer>,
    statuses: Arc<dyn EntityStatusStore>,
    collector: UnitCollector,
    hub: ProgressHub,
}

impl CollectionSession {
    pub fn new(deps: &CollectorDeps) -> Self {
        Self {
            work_items: deps.work_items.clone(),
            providers: deps.providers.clone(),
            insights: deps.insights.clone(),
            statuses: deps.statuses.clone(),
            collector: deps.unit_collector(),
            hub: deps.stream_hub.clone(),
        }
    }

    pub async fn status(&self, entity_id: Uuid) -> Result<Option<EntityCollectionStatus>> {
        self.statuses.get(entity_id).await
    }

    /// Run the session to the end, resuming a previous interrupted run.
    pub async fn run(&self, entity_id: Uuid) -> Result<SessionReport> {
        let stored = self
            .statuses
            .get(entity_id)
            .await
            .context("failed to read entity collection status")?;
        let resume = stored.filter(|s| !s.status.is_terminal());

        let items = match self.work_items.for_entity(entity_id).await {
            Ok(items) => items,
            Err(e) => return Err(self.fail(entity_id, None, e).await),
        };
        let providers = self.providers.all();

        let resumed = resume.is_some();
        let mut progress = match resume.as_ref().and_then(|s| s.progress().cloned()) {
            // Total stays what it was when the session started
            Some(stored_progress) => stored_progress,
            None => CollectionProgress::starting(
                u32::try_from(items.len() * providers.len()).unwrap_or(u32::MAX),
            ),
        };

        let skip_insights = resume
            .as_ref()
            .is_some_and(|s| s.status == SessionStatus::CollectingPhase2);

        info!(
            entity_id = %entity_id,
            resumed,
            completed = progress.completed,
            total = progress.total,
            "collection session starting"
        );

        // Phase 1
        let mut insights_gathered = skip_insights;
        if !skip_insights {
            if let Err(e) = self
                .save(entity_id, SessionStatus::CollectingPhase1, Some(&progress))
                .await
            {
                return Err(self.fail(entity_id, Some(&progress), e).await);
            }
            self.publish(entity_id, StreamEvent::progress(PHASE_INSIGHTS, progress.clone()))
                .await;

            match self.insights.gather(entity_id).await {
                Ok(()) => insights_gathered = true,
                Err(e) => warn!(entity_id = %entity_id, error = %e, "insight gathering failed, continuing"),
            }
        }

        // Phase 2
        if let Err(e) = self
            .save(entity_id, SessionStatus::CollectingPhase2, Some(&progress))
            .await
        {
            return Err(self.fail(entity_id, Some(&progress), e).await);
        }

        let observer = SessionObserver {
            entity_id,
            statuses: self.statuses.clone(),
            hub: self.hub.clone(),
        };
        let outcome = match self
            .collector
            .collect_batch(&items, &providers, true, &mut progress, 0, &observer)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(entity_id, Some(&progress), e).await),
        };

        let status = if outcome.is_clean() {
            SessionStatus::Completed
        } else {
            warn!(
                entity_id = %entity_id,
                failed = outcome.failures.len(),
                "collection session finished with failed units"
            );
            SessionStatus::Failed
        };
        // Completion clears progress; a failed run keeps it for the label
        let kept_progress = (status == SessionStatus::Failed).then(|| progress.clone());
        if let Err(e) = self.save(entity_id, status, kept_progress.as_ref()).await {
            return Err(self.fail(entity_id, Some(&progress), e).await);
        }

        let label = EntityCollectionStatus::new(entity_id, status, kept_progress).label();

        self.publish(
            entity_id,
            StreamEvent::Finished {
                label: label.clone(),
                progress: progress.clone(),
            },
        )
        .await;

        info!(
            entity_id = %entity_id,
            status = ?status,
            collected = outcome.collected,
            skipped = outcome.skipped,
            "collection session finished"
        );

        Ok(SessionReport {
            entity_id,
            status,
            label,
            progress,
            resumed,
            insights_gathered,
            collected: outcome.collected,
            skipped: outcome.skipped,
            failed: u32::try_from(outcome.failures.len()).unwrap_or(u32::MAX),
        })
    }

    async fn save(
        &self,
        entity_id: Uuid,
        status: SessionStatus,
        progress: Option<&CollectionProgress>,
    ) -> Result<()> {
        self.statuses
            .save(entity_id, status, progress)
            .await
            .with_context(|| format!("failed to store {:?} status", status))
    }

    async fn publish(&self, entity_id: Uuid, event: StreamEvent) {
        self.hub.publish(&topics::entity(entity_id), event).await;
    }

    /// Mark the session failed and hand back the error.
    async fn fail(
        &self,
        entity_id: Uuid,
        progress: Option<&CollectionProgress>,
        err: anyhow::Error,
    ) -> anyhow::Error {
        error!(entity_id = %entity_id, error = %err, "collection session failed");
        if let Err(e) = self
            .statuses
            .save(entity_id, SessionStatus::Failed, progress)
            .await
        {
            error!(entity_id = %entity_id, error = %e, "failed to store failed status");
        }
        err
    }
}

/// Persists and broadcasts progress after each unit.
struct SessionObserver {
    entity_id: Uuid,
    statuses: Arc<dyn EntityStatusStore>,
    hub: ProgressHub,
}

#[async_trait]
impl UnitObserver for SessionObserver {
    async fn unit_done(&self, progress: &CollectionProgress) -> Result<()> {
        self.statuses
            .save(self.entity_id, SessionStatus::CollectingPhase2, Some(progress))
            .await
            .context("failed to store session progress")?;
        self.hub
            .publish(
                &topics::entity(self.entity_id),
                StreamEvent::progress(PHASE_RESPONSES, progress.clone()),
            )
            .await;
        Ok(())
    }
}
