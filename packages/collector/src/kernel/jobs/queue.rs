//! PostgreSQL-backed job queue.
//!
//! Claims take a lease and bump the row version; write-backs only apply when the
//! version still matches, so two overlapping workers can never both advance the
//! same cursor.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};
use uuid::Uuid;

use super::job::QueueJob;

const JOB_COLUMNS: &str = r#"
    id, config_id, scope, status, batch_index, total_units, retry_count, error_log,
    lease_owner, lease_expires_at, version, created_at, updated_at
"#;

/// Result of a versioned write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteBack {
    /// The row still had the claimed version and was updated.
    Applied,
    /// Someone else changed the row since it was claimed; nothing was written.
    Conflict,
}

/// Trait for job queue operations.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist new jobs atomically. Returns the stored rows.
    async fn enqueue(&self, jobs: Vec<QueueJob>) -> Result<Vec<QueueJob>>;

    /// Claim the oldest non-terminal job whose lease is free.
    ///
    /// The claimed row is `processing`, leased to `worker_id`, and carries the
    /// version a later [`QueueStore::write_back`] must match.
    async fn claim_next(&self, worker_id: &str, lease: Duration) -> Result<Option<QueueJob>>;

    /// Write the job's state back if its version is unchanged, releasing the lease.
    async fn write_back(&self, job: &QueueJob) -> Result<WriteBack>;

    /// Jobs a worker could claim right now, optionally not counting one of them.
    async fn count_claimable(&self, excluding: Option<Uuid>) -> Result<i64>;

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<QueueJob>>;

    async fn find_for_config(&self, config_id: Uuid) -> Result<Vec<QueueJob>>;

    /// Manual intervention: move a failed job back to pending with a clean retry count.
    async fn reset_failed(&self, job_id: Uuid) -> Result<bool>;
}

/// Insert jobs on an open connection, usually inside the caller's transaction.
pub(crate) async fn insert_jobs(conn: &mut PgConnection, jobs: &[QueueJob]) -> Result<Vec<QueueJob>> {
    let mut inserted = Vec::with_capacity(jobs.len());
    for job in jobs {
        let row = sqlx::query_as::<_, QueueJob>(&format!(
            r#"
            INSERT INTO queue_jobs (
                id, config_id, scope, status, batch_index, total_units, retry_count,
                error_log, version, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job.id)
        .bind(job.config_id)
        .bind(&job.scope)
        .bind(job.status)
        .bind(job.batch_index)
        .bind(job.total_units)
        .bind(job.retry_count)
        .bind(&job.error_log)
        .bind(job.version)
        .bind(job.created_at)
        .bind(job.updated_at)
        .fetch_one(&mut *conn)
        .await?;
        inserted.push(row);
    }
    Ok(inserted)
}

/// PostgreSQL-backed queue implementation.
pub struct PostgresQueueStore {
    pool: PgPool,
}

impl PostgresQueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QueueStore for PostgresQueueStore {
    async fn enqueue(&self, jobs: Vec<QueueJob>) -> Result<Vec<QueueJob>> {
        let mut tx = self.pool.begin().await?;
        let inserted = insert_jobs(&mut *tx, &jobs).await?;
        tx.commit().await?;
        debug!(count = inserted.len(), "enqueued queue jobs");
        Ok(inserted)
    }

    async fn claim_next(&self, worker_id: &str, lease: Duration) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>(&format!(
            r#"
            WITH next_job AS (
                SELECT id
                FROM queue_jobs
                WHERE status IN ('pending', 'processing')
                  AND (lease_expires_at IS NULL OR lease_expires_at < NOW())
                ORDER BY updated_at ASC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE queue_jobs
            SET
                status = 'processing',
                lease_owner = $1,
                lease_expires_at = NOW() + ($2 || ' milliseconds')::INTERVAL,
                version = version + 1
            WHERE id IN (SELECT id FROM next_job)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(worker_id)
        .bind(lease.as_millis().to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn write_back(&self, job: &QueueJob) -> Result<WriteBack> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = $1,
                batch_index = $2,
                retry_count = $3,
                error_log = $4,
                lease_owner = NULL,
                lease_expires_at = NULL,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $5 AND version = $6
            "#,
        )
        .bind(job.status)
        .bind(job.batch_index)
        .bind(job.retry_count)
        .bind(&job.error_log)
        .bind(job.id)
        .bind(job.version)
        .execute(&self.pool)
        .await?;

        Ok(if result.rows_affected() == 1 {
            WriteBack::Applied
        } else {
            WriteBack::Conflict
        })
    }

    async fn count_claimable(&self, excluding: Option<Uuid>) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM queue_jobs
            WHERE status IN ('pending', 'processing')
              AND (lease_expires_at IS NULL OR lease_expires_at < NOW())
              AND ($1::uuid IS NULL OR id <> $1)
            "#,
        )
        .bind(excluding)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<QueueJob>> {
        let job = sqlx::query_as::<_, QueueJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM queue_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn find_for_config(&self, config_id: Uuid) -> Result<Vec<QueueJob>> {
        let jobs = sqlx::query_as::<_, QueueJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM queue_jobs WHERE config_id = $1 ORDER BY created_at ASC"
        ))
        .bind(config_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(jobs)
    }

    async fn reset_failed(&self, job_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE queue_jobs
            SET status = 'pending',
                retry_count = 0,
                error_log = NULL,
                lease_owner = NULL,
                lease_expires_at = NULL,
                version = version + 1,
                updated_at = NOW()
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;

        let reset = result.rows_affected() > 0;
        if reset {
            info!(job_id = %job_id, "failed job reset to pending");
        }
        Ok(reset)
    }
}
