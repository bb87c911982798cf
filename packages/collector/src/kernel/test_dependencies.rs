// TestDependencies - mock providers and in-memory stores for testing
//
// Every mock keeps its state behind Arc<Mutex<..>> so a test can hold a clone
// and inspect calls after handing another clone to the code under test.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::jobs::{JobStatus, QueueJob, QueueStore, WriteBack};
use super::progress_hub::ProgressHub;
use super::providers::ProviderRegistry;
use super::{BaseInsightGatherer, BaseProvider, BaseResponseSink, BaseWorkItemSource, CollectorDeps};
use crate::common::{Citation, CollectionProgress, ProviderResponse};
use crate::config::QueueSettings;
use crate::domains::collection::models::{
    EntityCollectionStatus, EntityStatusStore, NewResponse, SessionStatus, UpsertOutcome, WorkItem,
};
use crate::domains::schedules::models::{CollectionConfiguration, ConfigStore};
use crate::kernel::jobs::JobScope;

// =============================================================================
// Mock Provider
// =============================================================================

#[derive(Clone)]
pub struct MockProvider {
    key: String,
    calls: Arc<Mutex<Vec<String>>>,
    /// Number of upcoming calls that fail
    fail_next: Arc<Mutex<u32>>,
    always_fail: bool,
    responses: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_next: Arc::new(Mutex::new(0)),
            always_fail: false,
            responses: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Every call fails.
    pub fn failing(mut self) -> Self {
        self.always_fail = true;
        self
    }

    /// The next `count` calls fail, later ones succeed.
    pub fn fail_next(&self, count: u32) {
        *self.fail_next.lock().unwrap() = count;
    }

    /// Queue a response text (used before the default one).
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().unwrap().push(text.to_string());
        self
    }

    /// Sleep before answering, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts received, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseProvider for MockProvider {
    fn key(&self) -> &str {
        &self.key
    }

    async fn invoke(&self, prompt: &str) -> Result<ProviderResponse> {
        self.calls.lock().unwrap().push(prompt.to_string());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.always_fail {
            bail!("{} is unavailable", self.key);
        }
        {
            let mut remaining = self.fail_next.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                bail!("{} returned 502", self.key);
            }
        }

        let mut responses = self.responses.lock().unwrap();
        let response_text = if responses.is_empty() {
            format!("{} answer to: {}", self.key, prompt)
        } else {
            responses.remove(0)
        };

        Ok(ProviderResponse {
            response_text,
            citations: vec![Citation::new(format!("https://{}.example.com/source", self.key))],
        })
    }
}

// =============================================================================
// In-memory Response Sink
// =============================================================================

#[derive(Clone, Default)]
pub struct InMemoryResponseSink {
    records: Arc<Mutex<HashMap<(Uuid, String), NewResponse>>>,
    upserts: Arc<Mutex<Vec<(Uuid, String)>>>,
}

impl InMemoryResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a stored response for a pair.
    pub fn with_existing(self, work_item_id: Uuid, provider_key: &str) -> Self {
        self.records.lock().unwrap().insert(
            (work_item_id, provider_key.to_string()),
            NewResponse {
                work_item_id,
                provider_key: provider_key.to_string(),
                response_text: "previously collected".to_string(),
                citations: Vec::new(),
                metrics: Default::default(),
            },
        );
        self
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, work_item_id: Uuid, provider_key: &str) -> Option<NewResponse> {
        self.records
            .lock()
            .unwrap()
            .get(&(work_item_id, provider_key.to_string()))
            .cloned()
    }

    /// Every upsert call, in order
    pub fn upsert_calls(&self) -> Vec<(Uuid, String)> {
        self.upserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseResponseSink for InMemoryResponseSink {
    async fn exists(&self, work_item_id: Uuid, provider_key: &str) -> Result<bool> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .contains_key(&(work_item_id, provider_key.to_string())))
    }

    async fn upsert(&self, response: NewResponse) -> Result<UpsertOutcome> {
        let key = (response.work_item_id, response.provider_key.clone());
        self.upserts.lock().unwrap().push(key.clone());
        let previous = self.records.lock().unwrap().insert(key, response);
        Ok(match previous {
            Some(_) => UpsertOutcome::Updated,
            None => UpsertOutcome::Inserted,
        })
    }
}

// =============================================================================
// In-memory Work Item Source
// =============================================================================

#[derive(Clone, Default)]
pub struct InMemoryWorkItemSource {
    items: Arc<Mutex<Vec<WorkItem>>>,
    failing: bool,
}

impl InMemoryWorkItemSource {
    pub fn new(items: Vec<WorkItem>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            failing: false,
        }
    }

    /// Every lookup fails, like a lost database connection.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn sorted(&self, filter: impl Fn(&WorkItem) -> bool) -> Result<Vec<WorkItem>> {
        if self.failing {
            bail!("work item source unavailable");
        }
        let mut items: Vec<WorkItem> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|i| filter(i))
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.scope_id, i.position, i.id));
        Ok(items)
    }
}

#[async_trait]
impl BaseWorkItemSource for InMemoryWorkItemSource {
    async fn for_scope(&self, scope: &JobScope, limit: usize) -> Result<Vec<WorkItem>> {
        let key = scope.key();
        let mut items = self.sorted(|i| i.scope_key == key)?;
        items.sort_by_key(|i| (i.position, i.id));
        items.truncate(limit);
        Ok(items)
    }

    async fn for_entity(&self, entity_id: Uuid) -> Result<Vec<WorkItem>> {
        self.sorted(|i| i.entity_id == entity_id)
    }

    async fn by_ids(&self, entity_id: Uuid, ids: &[Uuid]) -> Result<Vec<WorkItem>> {
        self.sorted(|i| i.entity_id == entity_id && ids.contains(&i.id))
    }
}

/// `count` work items for one entity and scope, positions `0..count`.
pub fn work_items(entity_id: Uuid, scope_id: Uuid, scope_key: &str, count: usize) -> Vec<WorkItem> {
    (0..count)
        .map(|position| WorkItem {
            id: Uuid::new_v4(),
            entity_id,
            scope_id,
            scope_key: scope_key.to_string(),
            label: format!("Prompt {}", position + 1),
            prompt: format!("What is it like to work at Acme? ({})", position + 1),
            subject: Some("Acme".to_string()),
            position: i32::try_from(position).unwrap_or(i32::MAX),
        })
        .collect()
}

// =============================================================================
// In-memory Queue Store
// =============================================================================

#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    jobs: Arc<Mutex<Vec<QueueJob>>>,
}

impl InMemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a job as-is (any cursor, any status).
    pub fn insert(&self, job: QueueJob) {
        self.jobs.lock().unwrap().push(job);
    }

    pub fn jobs(&self) -> Vec<QueueJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn job(&self, job_id: Uuid) -> Option<QueueJob> {
        self.jobs.lock().unwrap().iter().find(|j| j.id == job_id).cloned()
    }

    /// Simulate another owner touching the row.
    pub fn bump_version(&self, job_id: Uuid) {
        if let Some(job) = self.jobs.lock().unwrap().iter_mut().find(|j| j.id == job_id) {
            job.version += 1;
        }
    }

    fn claimable(job: &QueueJob, now: DateTime<Utc>) -> bool {
        matches!(job.status, JobStatus::Pending | JobStatus::Processing)
            && job.lease_expires_at.map_or(true, |expires| expires < now)
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn enqueue(&self, jobs: Vec<QueueJob>) -> Result<Vec<QueueJob>> {
        self.jobs.lock().unwrap().extend(jobs.iter().cloned());
        Ok(jobs)
    }

    async fn claim_next(&self, worker_id: &str, lease: Duration) -> Result<Option<QueueJob>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().unwrap();
        let next = jobs
            .iter_mut()
            .filter(|j| Self::claimable(j, now))
            .min_by_key(|j| (j.updated_at, j.created_at));

        let Some(job) = next else {
            return Ok(None);
        };
        job.status = JobStatus::Processing;
        job.lease_owner = Some(worker_id.to_string());
        job.lease_expires_at = Some(now + chrono::Duration::from_std(lease)?);
        job.version += 1;
        Ok(Some(job.clone()))
    }

    async fn write_back(&self, job: &QueueJob) -> Result<WriteBack> {
        let mut jobs = self.jobs.lock().unwrap();
        let stored = jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| anyhow!("job {} not found", job.id))?;

        if stored.version != job.version {
            return Ok(WriteBack::Conflict);
        }
        stored.status = job.status;
        stored.batch_index = job.batch_index;
        stored.retry_count = job.retry_count;
        stored.error_log = job.error_log.clone();
        stored.lease_owner = None;
        stored.lease_expires_at = None;
        stored.version += 1;
        stored.updated_at = Utc::now();
        Ok(WriteBack::Applied)
    }

    async fn count_claimable(&self, excluding: Option<Uuid>) -> Result<i64> {
        let now = Utc::now();
        let count = self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| Some(j.id) != excluding && Self::claimable(j, now))
            .count();
        Ok(i64::try_from(count)?)
    }

    async fn find_by_id(&self, job_id: Uuid) -> Result<Option<QueueJob>> {
        Ok(self.job(job_id))
    }

    async fn find_for_config(&self, config_id: Uuid) -> Result<Vec<QueueJob>> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .iter()
            .filter(|j| j.config_id == config_id)
            .cloned()
            .collect())
    }

    async fn reset_failed(&self, job_id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs
            .iter_mut()
            .find(|j| j.id == job_id && j.status == JobStatus::Failed)
        else {
            return Ok(false);
        };
        job.status = JobStatus::Pending;
        job.retry_count = 0;
        job.error_log = None;
        job.lease_owner = None;
        job.lease_expires_at = None;
        job.version += 1;
        job.updated_at = Utc::now();
        Ok(true)
    }
}

// =============================================================================
// In-memory Config Store
// =============================================================================

/// Shares its queue with `TestDependencies::queue` so claims land where the
/// processor reads.
#[derive(Clone, Default)]
pub struct InMemoryConfigStore {
    configs: Arc<Mutex<Vec<CollectionConfiguration>>>,
    queue: InMemoryQueueStore,
    /// Sleep after taking the snapshot in `find_active`
    read_delay: Option<Duration>,
    /// Number of upcoming claims that fail before writing anything
    fail_next_claims: Arc<Mutex<u32>>,
}

impl InMemoryConfigStore {
    pub fn new(configs: Vec<CollectionConfiguration>) -> Self {
        Self {
            configs: Arc::new(Mutex::new(configs)),
            ..Self::default()
        }
    }

    /// Insert claimed jobs into `queue`.
    pub fn with_queue(mut self, queue: InMemoryQueueStore) -> Self {
        self.queue = queue;
        self
    }

    /// Hold every `find_active` snapshot for `delay`, so overlapping runs see
    /// the same stale state.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn fail_next_claims(&self, count: u32) {
        *self.fail_next_claims.lock().unwrap() = count;
    }

    pub fn get(&self, id: Uuid) -> Option<CollectionConfiguration> {
        self.configs.lock().unwrap().iter().find(|c| c.id == id).cloned()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn find_active(&self) -> Result<Vec<CollectionConfiguration>> {
        let snapshot: Vec<CollectionConfiguration> = self
            .configs
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.active)
            .cloned()
            .collect();
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CollectionConfiguration>> {
        Ok(self.get(id))
    }

    async fn claim_and_enqueue(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        forced: bool,
        jobs: Vec<QueueJob>,
    ) -> Result<Option<Vec<QueueJob>>> {
        {
            let mut remaining = self.fail_next_claims.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                bail!("config store unavailable");
            }
        }

        let mut configs = self.configs.lock().unwrap();
        let config = configs
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| anyhow!("configuration {} not found", id))?;
        if !forced && config.ran_this_month(at) {
            return Ok(None);
        }
        config.last_run_at = Some(at);
        self.queue.jobs.lock().unwrap().extend(jobs.iter().cloned());
        Ok(Some(jobs))
    }
}

// =============================================================================
// In-memory Entity Status Store
// =============================================================================

#[derive(Clone, Default)]
pub struct InMemoryStatusStore {
    statuses: Arc<Mutex<HashMap<Uuid, EntityCollectionStatus>>>,
    history: Arc<Mutex<Vec<SessionStatus>>>,
    failing: bool,
}

impl InMemoryStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes fail; reads still work.
    pub fn failing_writes(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Seed a stored status (e.g. an interrupted session).
    pub fn set(&self, entity_id: Uuid, status: SessionStatus, progress: Option<CollectionProgress>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(entity_id, EntityCollectionStatus::new(entity_id, status, progress));
    }

    pub fn current(&self, entity_id: Uuid) -> Option<EntityCollectionStatus> {
        self.statuses.lock().unwrap().get(&entity_id).cloned()
    }

    /// Every status written, in order
    pub fn history(&self) -> Vec<SessionStatus> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl EntityStatusStore for InMemoryStatusStore {
    async fn get(&self, entity_id: Uuid) -> Result<Option<EntityCollectionStatus>> {
        Ok(self.current(entity_id))
    }

    async fn save(
        &self,
        entity_id: Uuid,
        status: SessionStatus,
        progress: Option<&CollectionProgress>,
    ) -> Result<()> {
        if self.failing {
            bail!("status store unavailable");
        }
        self.history.lock().unwrap().push(status);
        self.set(entity_id, status, progress.cloned());
        Ok(())
    }
}

// =============================================================================
// Mock Insight Gatherer
// =============================================================================

#[derive(Clone, Default)]
pub struct MockInsightGatherer {
    calls: Arc<Mutex<Vec<Uuid>>>,
    failing: bool,
}

impl MockInsightGatherer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn calls(&self) -> Vec<Uuid> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseInsightGatherer for MockInsightGatherer {
    async fn gather(&self, entity_id: Uuid) -> Result<()> {
        self.calls.lock().unwrap().push(entity_id);
        if self.failing {
            bail!("insight service returned 500");
        }
        Ok(())
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Handles to every mock plus a builder for `CollectorDeps`.
#[derive(Clone)]
pub struct TestDependencies {
    pub providers: Vec<MockProvider>,
    pub sink: InMemoryResponseSink,
    pub work_items: InMemoryWorkItemSource,
    pub insights: MockInsightGatherer,
    pub statuses: InMemoryStatusStore,
    pub queue: InMemoryQueueStore,
    pub configs: InMemoryConfigStore,
    pub stream_hub: ProgressHub,
    pub provider_timeout: Duration,
    pub queue_settings: QueueSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        let queue = InMemoryQueueStore::new();
        Self {
            providers: Vec::new(),
            sink: InMemoryResponseSink::new(),
            work_items: InMemoryWorkItemSource::default(),
            insights: MockInsightGatherer::new(),
            statuses: InMemoryStatusStore::new(),
            configs: InMemoryConfigStore::default().with_queue(queue.clone()),
            queue,
            stream_hub: ProgressHub::new(),
            provider_timeout: Duration::from_secs(5),
            queue_settings: QueueSettings::default(),
        }
    }

    pub fn with_provider(mut self, provider: MockProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_work_items(mut self, items: Vec<WorkItem>) -> Self {
        self.work_items = InMemoryWorkItemSource::new(items);
        self
    }

    pub fn with_work_item_source(mut self, source: InMemoryWorkItemSource) -> Self {
        self.work_items = source;
        self
    }

    pub fn with_sink(mut self, sink: InMemoryResponseSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_insights(mut self, insights: MockInsightGatherer) -> Self {
        self.insights = insights;
        self
    }

    pub fn with_statuses(mut self, statuses: InMemoryStatusStore) -> Self {
        self.statuses = statuses;
        self
    }

    pub fn with_configs(mut self, configs: Vec<CollectionConfiguration>) -> Self {
        self.configs = InMemoryConfigStore::new(configs).with_queue(self.queue.clone());
        self
    }

    pub fn with_config_store(mut self, store: InMemoryConfigStore) -> Self {
        self.configs = store.with_queue(self.queue.clone());
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_queue_settings(mut self, settings: QueueSettings) -> Self {
        self.queue_settings = settings;
        self
    }

    /// Total provider calls across all mocks
    pub fn provider_calls(&self) -> usize {
        self.providers.iter().map(MockProvider::call_count).sum()
    }

    pub fn deps(&self) -> CollectorDeps {
        let providers: Vec<Arc<dyn BaseProvider>> = self
            .providers
            .iter()
            .map(|p| Arc::new(p.clone()) as Arc<dyn BaseProvider>)
            .collect();

        CollectorDeps {
            providers: ProviderRegistry::new(providers),
            response_sink: Arc::new(self.sink.clone()),
            work_items: Arc::new(self.work_items.clone()),
            insights: Arc::new(self.insights.clone()),
            statuses: Arc::new(self.statuses.clone()),
            queue: Arc::new(self.queue.clone()),
            configs: Arc::new(self.configs.clone()),
            stream_hub: self.stream_hub.clone(),
            provider_timeout: self.provider_timeout,
            queue_settings: self.queue_settings.clone(),
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
