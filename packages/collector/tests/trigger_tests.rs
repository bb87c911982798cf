//! Schedule trigger: due checks, monthly dedup, forced runs, scope expansion.

mod common;

use std::time::Duration;

use uuid::Uuid;

use collector_core::config::QueueSettings;
use collector_core::domains::schedules::models::{CollectionConfiguration, ScopeDimension};
use collector_core::domains::schedules::{SkipReason, TriggerError, TriggerRequest};
use collector_core::kernel::jobs::JobStatus;
use collector_core::kernel::test_dependencies::{work_items, InMemoryConfigStore, MockProvider};
use collector_core::kernel::TestDependencies;

use common::*;

fn two_by_two() -> Vec<ScopeDimension> {
    vec![
        dimension("industry", &["fintech", "retail"]),
        dimension("region", &["us", "eu"]),
    ]
}

fn trigger_harness(configs: Vec<CollectionConfiguration>) -> TestHarness {
    let deps = TestDependencies::new()
        .with_provider(MockProvider::new(CHATGPT))
        .with_provider(MockProvider::new(PERPLEXITY))
        .with_configs(configs);
    TestHarness::new(deps)
}

#[tokio::test]
async fn due_configuration_expands_into_one_job_per_combination() {
    let config = monthly_config(15, 9, two_by_two(), &[CHATGPT, PERPLEXITY]);
    let config_id = config.id;
    let harness = trigger_harness(vec![config]);
    let now = at(2026, 3, 15, 9);

    let report = harness
        .trigger
        .run(TriggerRequest::default(), now)
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 4);
    assert_eq!(report.ran.len(), 1);
    assert_eq!(report.ran[0].config_id, config_id);

    let jobs = harness.deps.queue.jobs();
    assert_eq!(jobs.len(), 4);
    for job in &jobs {
        assert_eq!(job.config_id, config_id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.batch_index, 0);
        assert_eq!(job.total_units, 16);
        assert_eq!(job.scope.providers, vec![CHATGPT, PERPLEXITY]);
    }

    let mut keys: Vec<String> = jobs.iter().map(|j| j.scope.key()).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec![
            "industry=fintech|region=eu",
            "industry=fintech|region=us",
            "industry=retail|region=eu",
            "industry=retail|region=us",
        ]
    );

    let stored = harness.deps.configs.get(config_id).unwrap();
    assert_eq!(stored.last_run_at, Some(now));
}

#[tokio::test]
async fn configuration_outside_its_hour_is_ignored() {
    let harness = trigger_harness(vec![monthly_config(15, 9, two_by_two(), &[CHATGPT])]);

    let report = harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 3, 15, 10))
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 0);
    assert!(report.skipped.is_empty());
    assert!(harness.deps.queue.jobs().is_empty());
}

#[tokio::test]
async fn inactive_configuration_is_ignored() {
    let mut config = monthly_config(15, 9, two_by_two(), &[CHATGPT]);
    config.active = false;
    let harness = trigger_harness(vec![config]);

    let report = harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 3, 15, 9))
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 0);
}

#[tokio::test]
async fn second_run_in_the_same_month_is_skipped() {
    let config = monthly_config(15, 9, two_by_two(), &[CHATGPT]);
    let config_id = config.id;
    let harness = trigger_harness(vec![config]);
    let now = at(2026, 3, 15, 9);

    harness
        .trigger
        .run(TriggerRequest::default(), now)
        .await
        .unwrap();
    let report = harness
        .trigger
        .run(TriggerRequest::default(), now)
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 0);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].config_id, config_id);
    assert_eq!(report.skipped[0].reason, SkipReason::AlreadyRanThisMonth);
    assert_eq!(harness.deps.queue.jobs().len(), 4);

    // Next month it is due again
    let report = harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 4, 15, 9))
        .await
        .unwrap();
    assert_eq!(report.jobs_created(), 4);
}

#[tokio::test]
async fn overlapping_runs_expand_a_configuration_once() {
    let config = monthly_config(15, 9, two_by_two(), &[CHATGPT]);
    let config_id = config.id;
    let store = InMemoryConfigStore::new(vec![config]).with_read_delay(Duration::from_millis(20));
    let deps = TestDependencies::new()
        .with_provider(MockProvider::new(CHATGPT))
        .with_config_store(store);
    let harness = TestHarness::new(deps);
    let now = at(2026, 3, 15, 9);

    // Both runs read the configuration before either records the run
    let (first, second) = tokio::join!(
        harness.trigger.run(TriggerRequest::default(), now),
        harness.trigger.run(TriggerRequest::default(), now),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.jobs_created() + second.jobs_created(), 4);
    let skips: Vec<_> = first.skipped.iter().chain(&second.skipped).collect();
    assert_eq!(skips.len(), 1);
    assert_eq!(skips[0].config_id, config_id);
    assert_eq!(skips[0].reason, SkipReason::AlreadyRanThisMonth);
    assert_eq!(harness.deps.queue.jobs().len(), 4);
}

#[tokio::test]
async fn failed_claim_leaves_nothing_queued_and_can_be_retried() {
    let config = monthly_config(15, 9, two_by_two(), &[CHATGPT]);
    let config_id = config.id;
    let harness = trigger_harness(vec![config]);
    harness.deps.configs.fail_next_claims(1);
    let now = at(2026, 3, 15, 9);

    let report = harness
        .trigger
        .run(TriggerRequest::default(), now)
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 0);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].config_id, config_id);
    assert!(harness.deps.queue.jobs().is_empty());
    assert!(harness.deps.configs.get(config_id).unwrap().last_run_at.is_none());

    // Same hour, store healthy again: exactly one set of jobs
    let report = harness
        .trigger
        .run(TriggerRequest::default(), now)
        .await
        .unwrap();
    assert_eq!(report.jobs_created(), 4);
    assert_eq!(harness.deps.queue.jobs().len(), 4);
}

#[tokio::test]
async fn forced_run_ignores_schedule_and_dedup() {
    let config = monthly_config(15, 9, two_by_two(), &[CHATGPT]);
    let config_id = config.id;
    let harness = trigger_harness(vec![config]);
    let forced = TriggerRequest {
        force_config_id: Some(config_id),
    };

    harness
        .trigger
        .run(forced.clone(), at(2026, 3, 2, 17))
        .await
        .unwrap();
    let report = harness
        .trigger
        .run(forced, at(2026, 3, 2, 18))
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 4);
    assert_eq!(harness.deps.queue.jobs().len(), 8);
    let for_config = harness
        .processor
        .store()
        .find_for_config(config_id)
        .await
        .unwrap();
    assert_eq!(for_config.len(), 8);
}

#[tokio::test]
async fn forcing_an_unknown_configuration_is_an_error() {
    let harness = trigger_harness(Vec::new());
    let missing = Uuid::new_v4();

    let err = harness
        .trigger
        .run(
            TriggerRequest {
                force_config_id: Some(missing),
            },
            at(2026, 3, 2, 17),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<TriggerError>(),
        Some(TriggerError::ConfigNotFound(id)) if *id == missing
    ));
}

#[tokio::test]
async fn empty_dimension_skips_configuration_without_marking_it_run() {
    let config = monthly_config(
        15,
        9,
        vec![dimension("industry", &["fintech"]), dimension("region", &[])],
        &[CHATGPT],
    );
    let config_id = config.id;
    let harness = trigger_harness(vec![config]);

    let report = harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 3, 15, 9))
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 0);
    assert_eq!(report.skipped[0].reason, SkipReason::EmptyScope);
    assert!(harness.deps.configs.get(config_id).unwrap().last_run_at.is_none());
}

#[tokio::test]
async fn day_past_month_end_fires_on_last_day() {
    let harness = trigger_harness(vec![monthly_config(31, 6, two_by_two(), &[CHATGPT])]);

    let report = harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 2, 28, 6))
        .await
        .unwrap();

    assert_eq!(report.jobs_created(), 4);
}

#[tokio::test]
async fn enqueuing_wakes_the_worker() {
    let harness = trigger_harness(vec![monthly_config(15, 9, two_by_two(), &[CHATGPT])]);
    let waker = harness.worker.waker();

    harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 3, 15, 9))
        .await
        .unwrap();

    let woken = tokio::time::timeout(Duration::from_millis(100), waker.notified()).await;
    assert!(woken.is_ok());
}

#[tokio::test]
async fn triggered_jobs_drain_to_completion() {
    let entity_id = Uuid::new_v4();
    let config = monthly_config(
        15,
        9,
        vec![dimension("industry", &["fintech", "retail"])],
        &[CHATGPT, PERPLEXITY],
    );
    let mut items = work_items(entity_id, Uuid::new_v4(), &industry_scope("fintech", &[]).key(), 3);
    items.extend(work_items(entity_id, Uuid::new_v4(), &industry_scope("retail", &[]).key(), 3));
    let deps = TestDependencies::new()
        .with_provider(MockProvider::new(CHATGPT))
        .with_provider(MockProvider::new(PERPLEXITY))
        .with_work_items(items)
        .with_configs(vec![config])
        .with_queue_settings(QueueSettings {
            units_per_job: 6,
            batch_size: 2,
            ..QueueSettings::default()
        });
    let harness = TestHarness::new(deps);

    harness
        .trigger
        .run(TriggerRequest::default(), at(2026, 3, 15, 9))
        .await
        .unwrap();
    let report = harness.worker.drain().await.unwrap();

    assert_eq!(report.jobs_completed, 2);
    assert_eq!(report.batches_succeeded, 6);
    assert!(harness
        .deps
        .queue
        .jobs()
        .iter()
        .all(|j| j.status == JobStatus::Completed && j.batch_index == 6));
    assert_eq!(harness.deps.sink.len(), 12);
}
