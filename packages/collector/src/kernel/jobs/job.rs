//! Queue job model: one scope of one configuration run, drained batch by batch.

use std::ops::Range;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::common::CollectionProgress;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "queue_job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

// ============================================================================
// Scope
// ============================================================================

/// One value picked from one scope dimension (e.g. `industry = fintech`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeValue {
    pub dimension: String,
    pub value: String,
}

/// What a job collects: one combination of dimension values, across a fixed provider list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobScope {
    pub values: Vec<ScopeValue>,
    pub providers: Vec<String>,
}

impl JobScope {
    /// Canonical descriptor used to look up the scope's work items.
    pub fn key(&self) -> String {
        self.values
            .iter()
            .map(|v| format!("{}={}", v.dimension, v.value))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Human-readable descriptor for progress labels.
    pub fn describe(&self) -> String {
        if self.values.is_empty() {
            return "all".to_string();
        }
        self.values
            .iter()
            .map(|v| v.value.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

// ============================================================================
// Job Model
// ============================================================================

#[derive(FromRow, Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct QueueJob {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,

    pub config_id: Uuid,
    pub scope: Json<JobScope>,

    #[builder(default)]
    pub status: JobStatus,

    // Cursor
    #[builder(default = 0)]
    pub batch_index: i32,
    pub total_units: i32,

    // Failure tracking
    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default, setter(strip_option))]
    pub error_log: Option<String>,

    // Ownership
    #[builder(default, setter(strip_option))]
    pub lease_owner: Option<String>,
    #[builder(default, setter(strip_option))]
    pub lease_expires_at: Option<DateTime<Utc>>,
    #[builder(default = 0)]
    pub version: i64,

    // Timestamps
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl QueueJob {
    /// Create a fresh job for one scope combination.
    pub fn for_scope(config_id: Uuid, scope: JobScope, total_units: i32) -> Self {
        Self::builder()
            .config_id(config_id)
            .scope(Json(scope))
            .total_units(total_units)
            .build()
    }

    /// The cursor has reached (or passed) the end.
    pub fn is_exhausted(&self) -> bool {
        self.batch_index >= self.total_units
    }

    /// Unit indices the next batch covers.
    pub fn next_batch(&self, batch_size: i32) -> Range<i32> {
        let end = self
            .batch_index
            .saturating_add(batch_size.max(1))
            .min(self.total_units);
        self.batch_index..end.max(self.batch_index)
    }

    /// Self-healing for a cursor that already reached the end.
    pub fn mark_healed(&mut self) {
        self.status = JobStatus::Completed;
        self.error_log = None;
    }

    /// Advance the cursor after a batch of `units` succeeded.
    pub fn record_success(&mut self, units: i32) -> JobStatus {
        self.batch_index = self
            .batch_index
            .saturating_add(units.max(0))
            .min(self.total_units);
        self.retry_count = 0;
        self.error_log = None;
        self.status = if self.batch_index >= self.total_units {
            JobStatus::Completed
        } else {
            JobStatus::Processing
        };
        self.status
    }

    /// Record a failed batch. The cursor stays where it was.
    pub fn record_failure(&mut self, error: &str, max_retries: i32) -> JobStatus {
        self.retry_count += 1;
        self.error_log = Some(error.to_string());
        self.status = if self.retry_count > max_retries {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        self.status
    }

    /// Status label shown to users; computed from counters, never from error text.
    pub fn status_label(&self) -> String {
        let fraction = format!("{}/{}", self.batch_index.min(self.total_units), self.total_units);
        match self.status {
            JobStatus::Completed => "Complete".to_string(),
            JobStatus::Failed => format!("Incomplete ({})", fraction),
            JobStatus::Processing => format!("Collecting ({})", fraction),
            JobStatus::Pending if self.retry_count > 0 => format!("Retrying ({})", fraction),
            JobStatus::Pending => "Queued".to_string(),
        }
    }

    /// Progress derived from the cursor.
    pub fn progress(&self) -> CollectionProgress {
        let total = u32::try_from(self.total_units).unwrap_or(0);
        let completed = u32::try_from(self.batch_index).unwrap_or(0);
        let mut progress = CollectionProgress::starting(total);

        let providers = &self.scope.providers;
        let provider_label = if completed == 0 || providers.is_empty() {
            "none".to_string()
        } else {
            providers[(completed as usize - 1) % providers.len()].clone()
        };
        progress.record(completed, &self.scope.describe(), &provider_label);
        progress
    }
}
