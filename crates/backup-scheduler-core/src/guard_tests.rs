use super::*;
use crate::testing::{wait_until_running, MockBackupCreator};
use crate::trigger::TriggerCallback;
use chrono_tz::Tz;
use futures::FutureExt;

fn registry() -> Arc<JobRegistry> {
    let noop: TriggerCallback = Arc::new(|_name: String| async {}.boxed());
    let registry = JobRegistry::new(Tz::UTC, noop);
    registry
        .register("daily", "0 0 2 * * *", ExecutionProfile::default())
        .unwrap();
    let mut weekly = ExecutionProfile::default();
    weekly.cloud_storage_enabled = true;
    registry.register("weekly", "0 0 3 * * SUN", weekly).unwrap();
    Arc::new(registry)
}

fn guard_with(creator: Arc<MockBackupCreator>) -> Arc<ExecutionGuard> {
    Arc::new(ExecutionGuard::new(
        registry(),
        creator,
        Arc::new(HealthReporter::disabled()),
    ))
}

#[tokio::test]
async fn test_initial_state_idle() {
    let guard = guard_with(Arc::new(MockBackupCreator::succeeding()));
    assert!(!guard.is_running());
    assert!(guard.current_run().is_none());

    let stats = guard.stats();
    assert_eq!(stats.total_backups, 0);
    assert!(stats.last_backup.is_none());
}

#[tokio::test]
async fn test_successful_run_recorded() {
    let creator = Arc::new(MockBackupCreator::succeeding());
    let guard = guard_with(creator.clone());

    guard.run_job("daily").await;

    let stats = guard.stats();
    assert_eq!(stats.total_backups, 1);
    assert_eq!(stats.successful_backups, 1);
    assert_eq!(stats.failed_backups, 0);

    let last = stats.last_backup.unwrap();
    assert_eq!(last.status, RunStatus::Success);
    assert_eq!(last.backup_type, "daily");
    assert_eq!(last.trigger, JobTrigger::Scheduled);
    assert_eq!(last.backup_id.as_deref(), Some("daily-1"));
    assert_eq!(last.size, Some(1024));
    assert!(last.error.is_none());
    assert!(!guard.is_running());
}

#[tokio::test]
async fn test_failed_run_recorded_and_swallowed() {
    let guard = guard_with(Arc::new(MockBackupCreator::failing("database unreachable")));

    guard.run_job("daily").await;

    let stats = guard.stats();
    assert_eq!(stats.total_backups, 1);
    assert_eq!(stats.successful_backups, 0);
    assert_eq!(stats.failed_backups, 1);

    let last = stats.last_backup.unwrap();
    assert_eq!(last.status, RunStatus::Failed);
    assert_eq!(last.error.as_deref(), Some("database unreachable"));
    assert!(last.backup_id.is_none());
    assert!(!guard.is_running());
}

#[tokio::test]
async fn test_failure_leaves_success_count_unchanged() {
    let creator = Arc::new(MockBackupCreator::succeeding());
    let guard = guard_with(creator);
    guard.run_job("daily").await;

    // Swap in a failing collaborator against the same registry
    let failing = Arc::new(ExecutionGuard::new(
        guard.registry().clone(),
        Arc::new(MockBackupCreator::failing("boom")),
        Arc::new(HealthReporter::disabled()),
    ));
    failing.run_job("daily").await;
    failing.run_job("weekly").await;

    assert_eq!(guard.stats().successful_backups, 1);
    let stats = failing.stats();
    assert_eq!(stats.successful_backups, 0);
    assert_eq!(stats.failed_backups, 2);
}

#[tokio::test]
async fn test_profile_and_request_passed_to_creator() {
    let creator = Arc::new(MockBackupCreator::succeeding());
    let guard = guard_with(creator.clone());

    guard.run_job("weekly").await;
    guard.run_now("daily").await.unwrap();

    let requests = creator.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].0.backup_type, "weekly");
    assert_eq!(requests[0].0.trigger, JobTrigger::Scheduled);
    assert!(requests[0].1.cloud_storage_enabled);
    assert_eq!(requests[1].0.backup_type, "daily");
    assert_eq!(requests[1].0.trigger, JobTrigger::Manual);
    assert!(!requests[1].1.cloud_storage_enabled);
}

#[tokio::test]
async fn test_scheduled_trigger_skipped_while_running() {
    let (creator, gate) = MockBackupCreator::gated();
    let creator = Arc::new(creator);
    let guard = guard_with(creator.clone());

    let first = tokio::spawn({
        let guard = guard.clone();
        async move { guard.run_job("daily").await }
    });
    wait_until_running(&guard).await;
    let before = guard.current_run().unwrap();

    // Overlapping triggers are dropped, not queued
    guard.run_job("weekly").await;
    guard.run_job("daily").await;

    assert_eq!(guard.current_run().unwrap(), before);
    assert_eq!(guard.stats().total_backups, 1);
    assert_eq!(creator.call_count(), 1);

    gate.add_permits(1);
    first.await.unwrap();

    let stats = guard.stats();
    assert_eq!(stats.total_backups, 1);
    assert_eq!(stats.successful_backups, 1);
    assert!(!guard.is_running());
}

#[tokio::test]
async fn test_run_now_rejected_while_running() {
    let (creator, gate) = MockBackupCreator::gated();
    let creator = Arc::new(creator);
    let guard = guard_with(creator.clone());

    let first = tokio::spawn({
        let guard = guard.clone();
        async move { guard.run_job("daily").await }
    });
    wait_until_running(&guard).await;
    let before = guard.current_run().unwrap();
    let stats_before = guard.stats();

    let result = guard.run_now("weekly").await;
    match result {
        Err(SchedulerError::AlreadyRunning { backup_type, .. }) => {
            assert_eq!(backup_type, "daily");
        }
        other => panic!("expected AlreadyRunning, got {:?}", other),
    }

    // No state mutation from the rejected request
    assert_eq!(guard.current_run().unwrap(), before);
    assert_eq!(guard.stats().total_backups, stats_before.total_backups);
    assert_eq!(creator.call_count(), 1);

    gate.add_permits(1);
    first.await.unwrap();
}

#[tokio::test]
async fn test_run_now_returns_outcome() {
    let guard = guard_with(Arc::new(MockBackupCreator::succeeding()));

    let outcome = guard.run_now("weekly").await.unwrap();
    assert!(outcome.is_success());
    assert_eq!(outcome.trigger, JobTrigger::Manual);
    assert_eq!(guard.stats().last_by_type["weekly"], outcome);
}

#[tokio::test]
async fn test_run_now_returns_failure() {
    let guard = guard_with(Arc::new(MockBackupCreator::failing("no space left")));

    let result = guard.run_now("daily").await;
    match result {
        Err(SchedulerError::JobExecutionFailure { backup_type, message }) => {
            assert_eq!(backup_type, "daily");
            assert_eq!(message, "no space left");
        }
        other => panic!("expected JobExecutionFailure, got {:?}", other),
    }
    assert_eq!(guard.stats().failed_backups, 1);
    assert!(!guard.is_running());
}

#[tokio::test]
async fn test_unknown_schedule() {
    let creator = Arc::new(MockBackupCreator::succeeding());
    let guard = guard_with(creator.clone());

    guard.run_job("hourly").await;
    assert!(matches!(
        guard.run_now("hourly").await,
        Err(SchedulerError::UnknownSchedule(_))
    ));
    assert_eq!(guard.stats().total_backups, 0);
    assert_eq!(creator.call_count(), 0);
}

#[tokio::test]
async fn test_last_by_type_tracks_each_schedule() {
    let guard = guard_with(Arc::new(MockBackupCreator::succeeding()));

    guard.run_job("daily").await;
    guard.run_job("weekly").await;

    let stats = guard.stats();
    assert_eq!(stats.last_by_type.len(), 2);
    assert_eq!(stats.last_backup.unwrap().backup_type, "weekly");
    assert_eq!(stats.last_by_type["daily"].backup_id.as_deref(), Some("daily-1"));
}

#[tokio::test]
async fn test_wait_idle() {
    let (creator, gate) = MockBackupCreator::gated();
    let guard = guard_with(Arc::new(creator));

    // Idle guard resolves immediately
    guard.wait_idle().await;

    let run = tokio::spawn({
        let guard = guard.clone();
        async move { guard.run_job("daily").await }
    });
    wait_until_running(&guard).await;

    let waiter = tokio::spawn({
        let guard = guard.clone();
        async move { guard.wait_idle().await }
    });
    tokio::task::yield_now().await;
    assert!(!waiter.is_finished());

    gate.add_permits(1);
    waiter.await.unwrap();
    run.await.unwrap();
    assert!(!guard.is_running());
}

#[tokio::test]
async fn test_closed_guard_drops_scheduled_runs() {
    let creator = Arc::new(MockBackupCreator::succeeding());
    let guard = guard_with(creator.clone());

    guard.close();
    assert!(guard.is_closed());
    guard.run_job("daily").await;
    assert_eq!(creator.call_count(), 0);
    assert_eq!(guard.stats().total_backups, 0);

    // Manual runs ignore the closed flag
    let outcome = guard.run_now("weekly").await.unwrap();
    assert!(outcome.is_success());

    guard.open();
    guard.run_job("daily").await;
    assert_eq!(creator.call_count(), 2);
    assert_eq!(guard.stats().last_backup.unwrap().backup_type, "daily");
}
