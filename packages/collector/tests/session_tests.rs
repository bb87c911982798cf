//! Onboarding collection session: phases, resume, failure handling.

mod common;

use uuid::Uuid;

use collector_core::common::CollectionProgress;
use collector_core::domains::collection::activities::CollectionSession;
use collector_core::domains::collection::models::{SessionStatus, WorkItem};
use collector_core::kernel::progress_hub::topics;
use collector_core::kernel::test_dependencies::{
    work_items, InMemoryResponseSink, InMemoryStatusStore, InMemoryWorkItemSource,
    MockInsightGatherer, MockProvider,
};
use collector_core::kernel::{StreamEvent, TestDependencies};

use common::*;

struct SessionFixture {
    entity_id: Uuid,
    items: Vec<WorkItem>,
}

impl SessionFixture {
    fn new(item_count: usize) -> Self {
        let entity_id = Uuid::new_v4();
        let items = work_items(
            entity_id,
            Uuid::new_v4(),
            &industry_scope("fintech", &[]).key(),
            item_count,
        );
        Self { entity_id, items }
    }

    fn deps(&self) -> TestDependencies {
        init_tracing();
        TestDependencies::new()
            .with_provider(MockProvider::new(CHATGPT))
            .with_provider(MockProvider::new(PERPLEXITY))
            .with_work_items(self.items.clone())
    }
}

#[tokio::test]
async fn fresh_session_runs_both_phases_to_completion() {
    let fixture = SessionFixture::new(3);
    let deps = fixture.deps();
    let session = CollectionSession::new(&deps.deps());

    let report = session.run(fixture.entity_id).await.unwrap();

    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(report.label, "Complete");
    assert!(!report.resumed);
    assert!(report.insights_gathered);
    assert_eq!(report.collected, 6);
    assert_eq!(report.progress.completed, 6);
    assert_eq!(report.progress.total, 6);
    assert_eq!(deps.insights.calls(), vec![fixture.entity_id]);
    assert_eq!(deps.sink.len(), 6);

    let stored = deps.statuses.current(fixture.entity_id).unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert!(stored.progress.is_none());

    let history = deps.statuses.history();
    assert_eq!(history.first(), Some(&SessionStatus::CollectingPhase1));
    assert_eq!(history.last(), Some(&SessionStatus::Completed));
}

#[tokio::test]
async fn interrupted_session_resumes_without_repeating_work() {
    // 10 items x 2 providers = 20 units, 7 of them collected before the interruption
    let fixture = SessionFixture::new(10);
    let mut sink = InMemoryResponseSink::new();
    for unit in 0..7 {
        let item = &fixture.items[unit / 2];
        let provider = if unit % 2 == 0 { CHATGPT } else { PERPLEXITY };
        sink = sink.with_existing(item.id, provider);
    }
    let statuses = InMemoryStatusStore::new();
    let mut progress = CollectionProgress::starting(20);
    progress.record(7, "Prompt 4", CHATGPT);
    statuses.set(fixture.entity_id, SessionStatus::CollectingPhase2, Some(progress));

    let deps = fixture.deps().with_sink(sink).with_statuses(statuses);
    let session = CollectionSession::new(&deps.deps());

    let report = session.run(fixture.entity_id).await.unwrap();

    assert!(report.resumed);
    assert_eq!(deps.provider_calls(), 13);
    assert_eq!(report.skipped, 7);
    assert_eq!(report.collected, 13);
    assert_eq!(report.progress.total, 20);
    assert_eq!(report.progress.completed, 20);
    assert_eq!(report.status, SessionStatus::Completed);

    // Phase 1 had already finished
    assert!(deps.insights.calls().is_empty());
    assert!(!deps
        .statuses
        .history()
        .contains(&SessionStatus::CollectingPhase1));
}

#[tokio::test]
async fn resume_keeps_progress_counter_from_moving_backwards() {
    let fixture = SessionFixture::new(10);
    let statuses = InMemoryStatusStore::new();
    let mut progress = CollectionProgress::starting(20);
    progress.record(7, "Prompt 4", CHATGPT);
    statuses.set(fixture.entity_id, SessionStatus::CollectingPhase2, Some(progress));

    let deps = fixture.deps().with_statuses(statuses);
    let mut rx = deps
        .stream_hub
        .subscribe(&topics::entity(fixture.entity_id))
        .await;
    let session = CollectionSession::new(&deps.deps());

    session.run(fixture.entity_id).await.unwrap();

    let mut completed = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let StreamEvent::Progress { progress, .. } = event {
            completed.push(progress.completed);
        }
    }
    assert!(completed.iter().all(|c| *c >= 7));
    assert!(completed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(completed.last(), Some(&20));
}

#[tokio::test]
async fn session_interrupted_in_phase_one_gathers_insights_again() {
    let fixture = SessionFixture::new(2);
    let statuses = InMemoryStatusStore::new();
    statuses.set(
        fixture.entity_id,
        SessionStatus::CollectingPhase1,
        Some(CollectionProgress::starting(4)),
    );
    let deps = fixture.deps().with_statuses(statuses);
    let session = CollectionSession::new(&deps.deps());

    let report = session.run(fixture.entity_id).await.unwrap();

    assert!(report.resumed);
    assert_eq!(deps.insights.calls().len(), 1);
    assert_eq!(report.status, SessionStatus::Completed);
}

#[tokio::test]
async fn terminal_status_starts_a_new_session() {
    let fixture = SessionFixture::new(2);
    let statuses = InMemoryStatusStore::new();
    statuses.set(fixture.entity_id, SessionStatus::Completed, None);
    let deps = fixture.deps().with_statuses(statuses);
    let session = CollectionSession::new(&deps.deps());

    let report = session.run(fixture.entity_id).await.unwrap();

    assert!(!report.resumed);
    assert_eq!(report.progress.total, 4);
    assert_eq!(deps.provider_calls(), 4);
}

#[tokio::test]
async fn insight_failure_does_not_stop_collection() {
    let fixture = SessionFixture::new(2);
    let deps = fixture
        .deps()
        .with_insights(MockInsightGatherer::new().failing());
    let session = CollectionSession::new(&deps.deps());

    let report = session.run(fixture.entity_id).await.unwrap();

    assert!(!report.insights_gathered);
    assert_eq!(report.status, SessionStatus::Completed);
    assert_eq!(deps.sink.len(), 4);
}

#[tokio::test]
async fn failed_units_mark_session_incomplete_and_keep_progress() {
    let fixture = SessionFixture::new(3);
    let deps = TestDependencies::new()
        .with_provider(MockProvider::new(CHATGPT))
        .with_provider(MockProvider::new(PERPLEXITY).failing())
        .with_work_items(fixture.items.clone());
    let session = CollectionSession::new(&deps.deps());

    let report = session.run(fixture.entity_id).await.unwrap();

    assert_eq!(report.status, SessionStatus::Failed);
    assert_eq!(report.failed, 3);
    assert_eq!(report.collected, 3);
    assert_eq!(report.label, "Incomplete (6/6)");

    let stored = deps.statuses.current(fixture.entity_id).unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);
    assert_eq!(stored.progress().map(|p| p.completed), Some(6));
}

#[tokio::test]
async fn work_item_lookup_failure_marks_session_failed() {
    let fixture = SessionFixture::new(2);
    let deps = fixture
        .deps()
        .with_work_item_source(InMemoryWorkItemSource::new(fixture.items.clone()).failing());
    let session = CollectionSession::new(&deps.deps());

    let result = session.run(fixture.entity_id).await;

    assert!(result.is_err());
    assert_eq!(deps.provider_calls(), 0);
    let stored = deps.statuses.current(fixture.entity_id).unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);
}

#[tokio::test]
async fn status_store_failure_aborts_session() {
    let fixture = SessionFixture::new(2);
    let deps = fixture
        .deps()
        .with_statuses(InMemoryStatusStore::new().failing_writes());
    let session = CollectionSession::new(&deps.deps());

    let result = session.run(fixture.entity_id).await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("status store unavailable"));
    assert_eq!(deps.provider_calls(), 0);
}

#[tokio::test]
async fn session_streams_phase_two_progress_then_finishes() {
    let fixture = SessionFixture::new(2);
    let deps = fixture.deps();
    let mut rx = deps
        .stream_hub
        .subscribe(&topics::entity(fixture.entity_id))
        .await;
    let session = CollectionSession::new(&deps.deps());

    session.run(fixture.entity_id).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let phase_two = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Progress { phase, .. } if phase == "phase2"))
        .count();
    assert_eq!(phase_two, 4);
    assert!(matches!(
        events.last(),
        Some(StreamEvent::Finished { label, .. }) if label == "Complete"
    ));
}
