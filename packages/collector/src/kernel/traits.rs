// Trait definitions for the collaborators the collector drives
//
// These are INFRASTRUCTURE seams only. The orchestration (skip-existing, cursors,
// retries) lives in the domains and in kernel::jobs and is written against these traits.
//
// Naming convention: Base* for trait names (e.g., BaseProvider, BaseResponseSink)

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::common::ProviderResponse;
use crate::domains::collection::models::{NewResponse, UpsertOutcome, WorkItem};
use crate::kernel::jobs::JobScope;

// =============================================================================
// Provider Adapter (one AI-model backend)
// =============================================================================

#[async_trait]
pub trait BaseProvider: Send + Sync {
    /// Stable key used for display and for existence lookups (e.g. "chatgpt")
    fn key(&self) -> &str;

    /// Send one prompt, get the answer text and its citations
    async fn invoke(&self, prompt: &str) -> Result<ProviderResponse>;
}

// =============================================================================
// Response Sink (idempotent by work item + provider)
// =============================================================================

#[async_trait]
pub trait BaseResponseSink: Send + Sync {
    /// Whether a result is already persisted for this pair
    async fn exists(&self, work_item_id: Uuid, provider_key: &str) -> Result<bool>;

    /// Insert or overwrite the single record for `(work_item_id, provider_key)`
    async fn upsert(&self, response: NewResponse) -> Result<UpsertOutcome>;
}

// =============================================================================
// Work item source (prompts owned by the dashboard)
// =============================================================================

#[async_trait]
pub trait BaseWorkItemSource: Send + Sync {
    /// Work items of a queue scope, ordered by position, at most `limit`
    async fn for_scope(&self, scope: &JobScope, limit: usize) -> Result<Vec<WorkItem>>;

    /// Every work item owned by an entity, ordered by scope then position
    async fn for_entity(&self, entity_id: Uuid) -> Result<Vec<WorkItem>>;

    /// The given items, restricted to those the entity owns
    async fn by_ids(&self, entity_id: Uuid, ids: &[Uuid]) -> Result<Vec<WorkItem>>;
}

// =============================================================================
// Insight gathering (session phase 1)
// =============================================================================

#[async_trait]
pub trait BaseInsightGatherer: Send + Sync {
    async fn gather(&self, entity_id: Uuid) -> Result<()>;
}
