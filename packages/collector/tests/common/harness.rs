//! Test harness wiring the queue processor, worker and trigger on top of
//! in-memory stores and mock providers.

use std::sync::Arc;
use std::time::Duration;

use test_context::AsyncTestContext;
use uuid::Uuid;

use collector_core::domains::collection::activities::CollectionBatchExecutor;
use collector_core::domains::schedules::ScheduleTrigger;
use collector_core::kernel::jobs::{
    BatchExecutor, ProcessorConfig, QueueJob, QueueProcessor, QueueWorker,
};
use collector_core::kernel::test_dependencies::{work_items, MockProvider};
use collector_core::kernel::{BaseProvider, TestDependencies};
use collector_core::WorkerSettings;

use super::fixtures::{industry_scope, CHATGPT, PERPLEXITY};

pub const WORKER_ID: &str = "test-worker";

pub fn init_tracing() {
    // Run tests with: RUST_LOG=debug cargo test -- --nocapture
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Worker settings large enough that only the dispatcher stops a drain.
pub fn unbounded_worker() -> WorkerSettings {
    WorkerSettings {
        max_ticks_per_wake: 1_000,
        wake_budget: Duration::from_secs(30),
        poll_interval: Duration::from_secs(1),
    }
}

pub struct TestHarness {
    pub deps: TestDependencies,
    pub processor: Arc<QueueProcessor>,
    pub worker: Arc<QueueWorker>,
    pub trigger: ScheduleTrigger,
    /// Entity owning the default work items
    pub entity_id: Uuid,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        let entity_id = Uuid::new_v4();
        let deps = TestDependencies::new()
            .with_provider(MockProvider::new(CHATGPT))
            .with_provider(MockProvider::new(PERPLEXITY))
            .with_work_items(work_items(
                entity_id,
                Uuid::new_v4(),
                &industry_scope("fintech", &[]).key(),
                8,
            ));
        let mut harness = Self::new(deps);
        harness.entity_id = entity_id;
        harness
    }

    async fn teardown(self) {}
}

impl TestHarness {
    pub fn new(deps: TestDependencies) -> Self {
        Self::with_settings(deps, unbounded_worker())
    }

    pub fn with_settings(deps: TestDependencies, settings: WorkerSettings) -> Self {
        let executor = Arc::new(CollectionBatchExecutor::new(&deps.deps()));
        Self::assemble(deps, executor, settings)
    }

    pub fn with_executor(deps: TestDependencies, executor: Arc<dyn BatchExecutor>) -> Self {
        Self::assemble(deps, executor, unbounded_worker())
    }

    fn assemble(
        deps: TestDependencies,
        executor: Arc<dyn BatchExecutor>,
        settings: WorkerSettings,
    ) -> Self {
        init_tracing();

        let collector_deps = deps.deps();
        let processor = Arc::new(QueueProcessor::new(
            collector_deps.queue.clone(),
            executor,
            collector_deps.stream_hub.clone(),
            ProcessorConfig::from_settings(&collector_deps.queue_settings, WORKER_ID),
        ));
        let worker = Arc::new(QueueWorker::new(processor.clone(), settings));
        let trigger = ScheduleTrigger::new(
            collector_deps.configs.clone(),
            collector_deps.queue_settings.units_per_job,
        )
        .with_waker(worker.waker());

        Self {
            deps,
            processor,
            worker,
            trigger,
            entity_id: Uuid::new_v4(),
        }
    }

    pub fn provider(&self, key: &str) -> &MockProvider {
        self.deps
            .providers
            .iter()
            .find(|p| p.key() == key)
            .expect("provider registered")
    }

    /// Insert a job directly into the queue.
    pub fn enqueue(&self, job: QueueJob) -> Uuid {
        let id = job.id;
        self.deps.queue.insert(job);
        id
    }

    pub fn job(&self, job_id: Uuid) -> QueueJob {
        self.deps.queue.job(job_id).expect("job exists")
    }
}
