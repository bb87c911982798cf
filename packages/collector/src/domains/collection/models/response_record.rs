use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::metrics::ResponseMetrics;
use super::work_item::WorkItem;
use crate::common::{Citation, ProviderResponse};
use crate::kernel::BaseResponseSink;

/// Upsert payload: the single record kept per `(work_item_id, provider_key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewResponse {
    pub work_item_id: Uuid,
    pub provider_key: String,
    pub response_text: String,
    pub citations: Vec<Citation>,
    pub metrics: ResponseMetrics,
}

impl NewResponse {
    pub fn from_provider(item: &WorkItem, provider_key: &str, response: ProviderResponse) -> Self {
        let metrics = ResponseMetrics::derive(
            &response.response_text,
            &response.citations,
            item.subject.as_deref(),
        );
        Self {
            work_item_id: item.id,
            provider_key: provider_key.to_string(),
            response_text: response.response_text,
            citations: response.citations,
            metrics,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

pub struct PostgresResponseSink {
    pool: PgPool,
}

impl PostgresResponseSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseResponseSink for PostgresResponseSink {
    async fn exists(&self, work_item_id: Uuid, provider_key: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM response_records
                WHERE work_item_id = $1 AND provider_key = $2
            )
            "#,
        )
        .bind(work_item_id)
        .bind(provider_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn upsert(&self, response: NewResponse) -> Result<UpsertOutcome> {
        // xmax is 0 only for a freshly inserted row
        let inserted = sqlx::query_scalar::<_, bool>(
            r#"
            INSERT INTO response_records (
                id, work_item_id, provider_key, response_text, citations, metrics
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (work_item_id, provider_key) DO UPDATE SET
                response_text = EXCLUDED.response_text,
                citations = EXCLUDED.citations,
                metrics = EXCLUDED.metrics,
                updated_at = NOW()
            RETURNING (xmax = 0)
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(response.work_item_id)
        .bind(&response.provider_key)
        .bind(&response.response_text)
        .bind(Json(&response.citations))
        .bind(Json(&response.metrics))
        .fetch_one(&self.pool)
        .await?;

        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }
}
