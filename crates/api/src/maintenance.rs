//! Background upkeep: draining compensations and expiring transactions.

use std::sync::Arc;
use std::time::Duration;

use callback::EventPublisher;
use gateway::GatewayClient;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// Runs one upkeep pass.
///
/// Re-drives armed compensations, then drops settled compensations and
/// finished transactions past their retention. Compensations held by an
/// undecided or confirmed transaction are never run.
pub async fn run_once<G, E>(state: &AppState<G, E>, cancel: &CancellationToken)
where
    G: GatewayClient + Clone,
    E: EventPublisher + Clone,
{
    if let Err(e) = state.compensations.execute_all_pending(cancel).await {
        tracing::warn!(error = %e, "compensation drain finished with errors");
    }
    let cleared = state.compensations.clear_executed().await;
    let removed = state.transactions.cleanup_completed().await;

    let stats = state.compensations.stats().await;
    metrics::gauge!("compensations_pending").set(stats.pending as f64);
    metrics::gauge!("compensations_failed").set(stats.failed as f64);
    tracing::debug!(cleared, removed, pending = stats.pending, failed = stats.failed, "maintenance pass done");
}

/// Runs [`run_once`] every `interval` until `shutdown` is cancelled.
pub async fn run<G, E>(state: Arc<AppState<G, E>>, interval: Duration, shutdown: CancellationToken)
where
    G: GatewayClient + Clone,
    E: EventPublisher + Clone,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("maintenance loop stopped");
                return;
            }
            _ = ticker.tick() => run_once(&state, &shutdown).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callback::InMemoryEventPublisher;
    use common::{ActorId, TenantId};
    use compensation::CompensationAction;
    use gateway::{CreateRepositoryRequest, InMemoryGatewayClient};
    use project::Project;
    use tcc::TransactionManagerConfig;

    #[tokio::test]
    async fn test_run_once_drains_pending() {
        let state = AppState::new(
            InMemoryGatewayClient::new(),
            InMemoryEventPublisher::new(),
            TransactionManagerConfig::default(),
            CancellationToken::new(),
        );
        let id = state
            .compensations
            .add_compensation(CompensationAction::RollbackProject, "p-1", serde_json::json!({}))
            .await;

        run_once(&state, &CancellationToken::new()).await;

        // Executed, then cleared with the default zero retention
        assert!(state.compensations.get(id).await.is_none());
        assert_eq!(state.compensations.stats().await.total(), 0);
    }

    #[tokio::test]
    async fn test_run_once_keeps_confirmed_repositories() {
        let gateway = InMemoryGatewayClient::new();
        let publisher = InMemoryEventPublisher::new();
        let state = AppState::new(
            gateway.clone(),
            publisher.clone(),
            TransactionManagerConfig::default(),
            CancellationToken::new(),
        );
        let (tenant_id, owner_id) = (TenantId::new(), ActorId::new());
        let project = Project::new(tenant_id, owner_id, "platform");
        let project_id = project.id;
        state.projects.insert_project(project).await;

        let cancel = CancellationToken::new();
        let kept = state
            .transactions
            .create_repository_transaction(
                &cancel,
                project_id,
                owner_id,
                tenant_id,
                CreateRepositoryRequest::new(project_id, "kept"),
            )
            .await
            .unwrap();
        let removed = state
            .transactions
            .create_repository_transaction(
                &cancel,
                project_id,
                owner_id,
                tenant_id,
                CreateRepositoryRequest::new(project_id, "removed"),
            )
            .await
            .unwrap();
        state
            .transactions
            .delete_repository_transaction(&cancel, project_id, owner_id, tenant_id, removed.id)
            .await
            .unwrap();

        run_once(&state, &cancel).await;

        assert!(gateway.has_repository(kept.id));
        assert_eq!(gateway.delete_calls(), 1);
        assert!(publisher
            .events_of("compensation", "notify_failure")
            .await
            .is_empty());
        // Retired entries are gone with the default zero retention
        assert_eq!(state.compensations.stats().await.total(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let state = Arc::new(AppState::new(
            InMemoryGatewayClient::new(),
            InMemoryEventPublisher::new(),
            TransactionManagerConfig::default(),
            CancellationToken::new(),
        ));
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(state, Duration::from_secs(5), shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
