//! Integration tests for compensation execution against the in-memory gateway.

use std::sync::Arc;
use std::time::Duration;

use callback::InMemoryEventPublisher;
use common::{CompensationId, ProjectId, RepositoryId};
use compensation::{
    CompensationAction, CompensationConfig, CompensationError, CompensationManager,
    CompensationStatus,
};
use gateway::{InMemoryGatewayClient, Repository, Visibility};
use serde_json::json;
use tokio_util::sync::CancellationToken;

type TestManager = CompensationManager<InMemoryGatewayClient, InMemoryEventPublisher>;

struct TestHarness {
    manager: Arc<TestManager>,
    gateway: InMemoryGatewayClient,
    publisher: InMemoryEventPublisher,
    cancel: CancellationToken,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_config(CompensationConfig::default())
    }

    fn with_config(config: CompensationConfig) -> Self {
        let gateway = InMemoryGatewayClient::new();
        let publisher = InMemoryEventPublisher::new();
        let manager = Arc::new(CompensationManager::with_config(
            gateway.clone(),
            publisher.clone(),
            config,
        ));

        Self {
            manager,
            gateway,
            publisher,
            cancel: CancellationToken::new(),
        }
    }

    fn seed_repository(&self, name: &str) -> RepositoryId {
        let repository = Repository {
            id: RepositoryId::new(),
            project_id: ProjectId::new(),
            name: name.to_string(),
            description: None,
            visibility: Visibility::Private,
            default_branch: "main".to_string(),
            created_at: None,
        };
        let id = repository.id;
        self.gateway.insert_repository(repository);
        id
    }

    async fn enrol_delete(&self, repository_id: RepositoryId) -> CompensationId {
        self.manager
            .add_compensation(
                CompensationAction::DeleteRepository,
                repository_id.to_string(),
                json!({ "reason": "confirm failed" }),
            )
            .await
    }

    async fn execute(&self, id: CompensationId) -> compensation::Result<()> {
        self.manager.execute_compensation(&self.cancel, id).await
    }
}

#[tokio::test]
async fn test_delete_succeeds_after_transient_failures() {
    let harness = TestHarness::new();
    let repository_id = harness.seed_repository("core");
    let id = harness.enrol_delete(repository_id).await;
    harness.gateway.fail_next_deletes(2);

    for attempt in 1..=2 {
        let err = harness.execute(id).await.unwrap_err();
        assert!(matches!(err, CompensationError::ExecutionFailed { .. }));
        let entry = harness.manager.get(id).await.unwrap();
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert_eq!(entry.retry_count, attempt);
        assert!(entry.last_error.is_some());
    }

    harness.execute(id).await.unwrap();

    let entry = harness.manager.get(id).await.unwrap();
    assert_eq!(entry.status, CompensationStatus::Executed);
    assert_eq!(entry.retry_count, 3);
    assert!(entry.executed_at.is_some());
    assert!(entry.last_error.is_none());
    assert!(!harness.gateway.has_repository(repository_id));
    assert_eq!(harness.gateway.delete_calls(), 3);
}

#[tokio::test]
async fn test_retries_exhausted_marks_failed() {
    let harness = TestHarness::new();
    let repository_id = harness.seed_repository("core");
    let id = harness.enrol_delete(repository_id).await;
    harness.gateway.fail_next_deletes(10);

    for _ in 0..3 {
        assert!(matches!(
            harness.execute(id).await,
            Err(CompensationError::ExecutionFailed { .. })
        ));
    }

    let err = harness.execute(id).await.unwrap_err();
    assert!(matches!(
        err,
        CompensationError::RetriesExhausted { max_retries: 3, .. }
    ));
    assert!(!err.is_retryable());

    let entry = harness.manager.get(id).await.unwrap();
    assert_eq!(entry.status, CompensationStatus::Failed);
    assert_eq!(entry.retry_count, 3);
    assert_eq!(harness.gateway.delete_calls(), 3);
    assert_eq!(harness.manager.list_failed().await.len(), 1);
    assert!(harness.manager.list_pending().await.is_empty());

    // Failed is terminal: no further gateway traffic
    assert!(harness.execute(id).await.is_err());
    assert_eq!(harness.gateway.delete_calls(), 3);
}

#[tokio::test]
async fn test_executed_entry_is_not_run_again() {
    let harness = TestHarness::new();
    let id = harness.enrol_delete(harness.seed_repository("core")).await;

    harness.execute(id).await.unwrap();
    harness.execute(id).await.unwrap();
    harness.execute(id).await.unwrap();

    assert_eq!(harness.gateway.delete_calls(), 1);
    assert_eq!(harness.manager.get(id).await.unwrap().retry_count, 1);
}

#[tokio::test]
async fn test_already_deleted_repository_counts_as_compensated() {
    let harness = TestHarness::new();
    let id = harness.enrol_delete(RepositoryId::new()).await;

    harness.execute(id).await.unwrap();
    assert_eq!(
        harness.manager.get_status(id).await.unwrap(),
        CompensationStatus::Executed
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_execution_runs_action_once() {
    let harness = TestHarness::new();
    let id = harness.enrol_delete(harness.seed_repository("core")).await;
    harness.gateway.set_latency(Duration::from_millis(50));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let manager = Arc::clone(&harness.manager);
        let cancel = harness.cancel.clone();
        handles.push(tokio::spawn(async move {
            manager.execute_compensation(&cancel, id).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(harness.gateway.delete_calls(), 1);
    let entry = harness.manager.get(id).await.unwrap();
    assert_eq!(entry.status, CompensationStatus::Executed);
    assert_eq!(entry.retry_count, 1);
}

#[tokio::test]
async fn test_execute_all_pending_continues_past_failures() {
    let harness = TestHarness::new();
    let first = harness
        .manager
        .add_compensation(CompensationAction::DeleteRepository, "garbage", json!({}))
        .await;
    let second = harness.enrol_delete(harness.seed_repository("a")).await;
    let third = harness
        .manager
        .add_compensation(CompensationAction::RollbackProject, "p-1", json!({}))
        .await;

    let err = harness
        .manager
        .execute_all_pending(&harness.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CompensationError::ExecutionFailed { id, .. } if id == first));

    assert_eq!(
        harness.manager.get_status(first).await.unwrap(),
        CompensationStatus::Pending
    );
    assert_eq!(
        harness.manager.get_status(second).await.unwrap(),
        CompensationStatus::Executed
    );
    assert_eq!(
        harness.manager.get_status(third).await.unwrap(),
        CompensationStatus::Executed
    );

    let stats = harness.manager.stats().await;
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.executed, 2);
    assert_eq!(stats.total(), 3);
}

#[tokio::test]
async fn test_execute_all_pending_with_nothing_pending() {
    let harness = TestHarness::new();
    harness.manager.execute_all_pending(&harness.cancel).await.unwrap();
}

#[tokio::test]
async fn test_cancelled_drain_leaves_entries_pending() {
    let harness = TestHarness::new();
    let a = harness.enrol_delete(harness.seed_repository("a")).await;
    let b = harness.enrol_delete(harness.seed_repository("b")).await;

    harness.cancel.cancel();
    let err = harness
        .manager
        .execute_all_pending(&harness.cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, CompensationError::Cancelled));
    assert!(err.is_retryable());

    for id in [a, b] {
        let entry = harness.manager.get(id).await.unwrap();
        assert_eq!(entry.status, CompensationStatus::Pending);
        assert_eq!(entry.retry_count, 0);
    }
    assert_eq!(harness.gateway.delete_calls(), 0);
}

#[tokio::test]
async fn test_execute_many_runs_only_named_entries() {
    let harness = TestHarness::new();
    let a = harness.enrol_delete(harness.seed_repository("a")).await;
    let b = harness.enrol_delete(harness.seed_repository("b")).await;

    harness
        .manager
        .execute_many(&harness.cancel, &[b])
        .await
        .unwrap();

    assert_eq!(
        harness.manager.get_status(a).await.unwrap(),
        CompensationStatus::Pending
    );
    assert_eq!(
        harness.manager.get_status(b).await.unwrap(),
        CompensationStatus::Executed
    );
}

#[tokio::test]
async fn test_clear_executed_keeps_pending_and_failed() {
    let harness = TestHarness::new();
    let done = harness.enrol_delete(harness.seed_repository("a")).await;
    let pending = harness.enrol_delete(harness.seed_repository("b")).await;
    let failed = harness
        .manager
        .add_compensation(CompensationAction::DeleteRepository, "garbage", json!({}))
        .await;

    harness.execute(done).await.unwrap();
    for _ in 0..4 {
        let _ = harness.execute(failed).await;
    }

    assert_eq!(harness.manager.clear_executed().await, 1);
    assert!(harness.manager.get(done).await.is_none());
    assert!(harness.manager.get(pending).await.is_some());
    assert_eq!(
        harness.manager.get_status(failed).await.unwrap(),
        CompensationStatus::Failed
    );
}

#[tokio::test]
async fn test_custom_retry_budget() {
    let harness = TestHarness::with_config(CompensationConfig {
        max_retries: 1,
        ..Default::default()
    });
    let id = harness.enrol_delete(harness.seed_repository("a")).await;
    harness.gateway.fail_next_deletes(1);

    assert!(harness.execute(id).await.is_err());
    assert!(matches!(
        harness.execute(id).await,
        Err(CompensationError::RetriesExhausted { max_retries: 1, .. })
    ));
}

#[tokio::test]
async fn test_notify_failure_reaches_publisher() {
    let harness = TestHarness::new();
    let project_id = ProjectId::new();
    let id = harness
        .manager
        .add_compensation(
            CompensationAction::NotifyFailure,
            "repo-1",
            json!({ "project_id": project_id, "name": "core" }),
        )
        .await;

    harness.execute(id).await.unwrap();

    let events = harness.publisher.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].key(), "compensation.notify_failure");
    assert_eq!(events[0].resource["name"], "core");
    assert_eq!(harness.gateway.delete_calls(), 0);
}
