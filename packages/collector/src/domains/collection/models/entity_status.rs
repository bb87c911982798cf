use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::CollectionProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "collection_session_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    CollectingPhase1,
    CollectingPhase2,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

/// Onboarding collection state of one entity. A missing row means "never started".
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EntityCollectionStatus {
    pub entity_id: Uuid,
    pub status: SessionStatus,
    pub progress: Option<Json<CollectionProgress>>,
    pub updated_at: DateTime<Utc>,
}

impl EntityCollectionStatus {
    pub fn new(entity_id: Uuid, status: SessionStatus, progress: Option<CollectionProgress>) -> Self {
        Self {
            entity_id,
            status,
            progress: progress.map(Json),
            updated_at: Utc::now(),
        }
    }

    pub fn progress(&self) -> Option<&CollectionProgress> {
        self.progress.as_ref().map(|p| &p.0)
    }

    /// User-facing label derived from the stored counters.
    pub fn label(&self) -> String {
        let fraction = self
            .progress()
            .map(CollectionProgress::fraction_label);
        match (self.status, fraction) {
            (SessionStatus::Pending, _) => "Queued".to_string(),
            (SessionStatus::CollectingPhase1, _) => "Gathering insights".to_string(),
            (SessionStatus::CollectingPhase2, Some(f)) => format!("Collecting ({})", f),
            (SessionStatus::CollectingPhase2, None) => "Collecting".to_string(),
            (SessionStatus::Completed, _) => "Complete".to_string(),
            (SessionStatus::Failed, Some(f)) => format!("Incomplete ({})", f),
            (SessionStatus::Failed, None) => "Incomplete".to_string(),
        }
    }
}

/// Label for an entity with no status row.
pub const NOT_STARTED_LABEL: &str = "Not started";

#[async_trait]
pub trait EntityStatusStore: Send + Sync {
    async fn get(&self, entity_id: Uuid) -> Result<Option<EntityCollectionStatus>>;

    /// Insert or replace the entity's status row.
    async fn save(
        &self,
        entity_id: Uuid,
        status: SessionStatus,
        progress: Option<&CollectionProgress>,
    ) -> Result<()>;
}

pub struct PostgresEntityStatusStore {
    pool: PgPool,
}

impl PostgresEntityStatusStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityStatusStore for PostgresEntityStatusStore {
    async fn get(&self, entity_id: Uuid) -> Result<Option<EntityCollectionStatus>> {
        sqlx::query_as::<_, EntityCollectionStatus>(
            "SELECT entity_id, status, progress, updated_at FROM entity_collection_status WHERE entity_id = $1",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn save(
        &self,
        entity_id: Uuid,
        status: SessionStatus,
        progress: Option<&CollectionProgress>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entity_collection_status (entity_id, status, progress, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (entity_id) DO UPDATE SET
                status = EXCLUDED.status,
                progress = EXCLUDED.progress,
                updated_at = NOW()
            "#,
        )
        .bind(entity_id)
        .bind(status)
        .bind(progress.map(Json))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
