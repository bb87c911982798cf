use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::kernel::jobs::JobScope;
use crate::kernel::BaseWorkItemSource;

/// A prompt to send to every provider. Owned by the dashboard; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WorkItem {
    pub id: Uuid,
    pub entity_id: Uuid,
    /// Owning scope (refresh groups by this)
    pub scope_id: Uuid,
    /// Canonical descriptor of the queue scope (see `JobScope::key`)
    pub scope_key: String,
    pub label: String,
    pub prompt: String,
    /// Employer name the prompt is about
    pub subject: Option<String>,
    pub position: i32,
}

pub struct PostgresWorkItemSource {
    pool: PgPool,
}

impl PostgresWorkItemSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseWorkItemSource for PostgresWorkItemSource {
    async fn for_scope(&self, scope: &JobScope, limit: usize) -> Result<Vec<WorkItem>> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT id, entity_id, scope_id, scope_key, label, prompt, subject, position
            FROM work_items
            WHERE scope_key = $1
            ORDER BY position ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(scope.key())
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn for_entity(&self, entity_id: Uuid) -> Result<Vec<WorkItem>> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT id, entity_id, scope_id, scope_key, label, prompt, subject, position
            FROM work_items
            WHERE entity_id = $1
            ORDER BY scope_id ASC, position ASC, id ASC
            "#,
        )
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn by_ids(&self, entity_id: Uuid, ids: &[Uuid]) -> Result<Vec<WorkItem>> {
        sqlx::query_as::<_, WorkItem>(
            r#"
            SELECT id, entity_id, scope_id, scope_key, label, prompt, subject, position
            FROM work_items
            WHERE entity_id = $1 AND id = ANY($2)
            ORDER BY scope_id ASC, position ASC, id ASC
            "#,
        )
        .bind(entity_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }
}
