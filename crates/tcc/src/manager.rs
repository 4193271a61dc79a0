//! Transaction orchestration.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use callback::{CallbackEvent, EventPublisher, EventSource};
use chrono::{TimeDelta, Utc};
use common::{ActorId, ProjectId, RepositoryId, TenantId, TransactionId};
use compensation::{CompensationAction, CompensationManager};
use gateway::{CreateRepositoryRequest, GatewayClient, Repository};
use project::{Project, ProjectRepository};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Phase, Result, TransactionError};
use crate::transaction::{Transaction, TransactionKind};
use crate::validation;

/// Tuning for a [`TransactionManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionManagerConfig {
    /// How long terminal transactions are kept before `cleanup_completed` drops them.
    pub retention: Duration,
}

impl Default for TransactionManagerConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(60 * 60),
        }
    }
}

/// Drives repository operations through validation, execution, compensation
/// enrolment and confirmation.
///
/// The working copy of a transaction is owned by the call that runs it;
/// the shared map only ever receives snapshots taken after each transition.
pub struct TransactionManager<G, P, E> {
    gateway: G,
    projects: P,
    publisher: E,
    compensations: Arc<CompensationManager<G, E>>,
    transactions: Mutex<HashMap<TransactionId, Transaction>>,
    config: TransactionManagerConfig,
}

impl<G, P, E> TransactionManager<G, P, E>
where
    G: GatewayClient,
    P: ProjectRepository,
    E: EventPublisher,
{
    /// Creates a manager with the default configuration.
    pub fn new(
        gateway: G,
        projects: P,
        publisher: E,
        compensations: Arc<CompensationManager<G, E>>,
    ) -> Self {
        Self::with_config(
            gateway,
            projects,
            publisher,
            compensations,
            TransactionManagerConfig::default(),
        )
    }

    pub fn with_config(
        gateway: G,
        projects: P,
        publisher: E,
        compensations: Arc<CompensationManager<G, E>>,
        config: TransactionManagerConfig,
    ) -> Self {
        Self {
            gateway,
            projects,
            publisher,
            compensations,
            transactions: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// The compensation manager transactions enrol into.
    pub fn compensations(&self) -> &Arc<CompensationManager<G, E>> {
        &self.compensations
    }

    /// Creates a repository and confirms it is visible at the gateway.
    ///
    /// Returns the confirmed repository. If confirmation fails the repository
    /// is deleted again through its enrolled compensation and the
    /// transaction ends `cancelled`.
    #[tracing::instrument(
        skip(self, cancel, req),
        fields(repository_name = %req.name, transaction_id = tracing::field::Empty)
    )]
    pub async fn create_repository_transaction(
        &self,
        cancel: &CancellationToken,
        project_id: ProjectId,
        actor_id: ActorId,
        tenant_id: TenantId,
        req: CreateRepositoryRequest,
    ) -> Result<Repository> {
        let started = Instant::now();
        let mut tx = Transaction::new(
            TransactionKind::CreateRepository,
            actor_id,
            tenant_id,
            project_id,
            to_record(&req),
        );
        tracing::Span::current().record("transaction_id", tracing::field::display(tx.id));
        self.record(&tx).await;

        // 1. Validation
        if let Err(e) = self.validate_create(cancel, &tx, &req).await {
            return Err(self.fail(&mut tx, e, started).await);
        }
        tx.mark_validated()?;
        self.record(&tx).await;

        // 2. Execution. Runs to completion: a dropped call may still commit at
        // the gateway with nothing enrolled to undo it.
        let repository = match self.gateway.create_repository(&req).await {
            Ok(repository) => repository,
            Err(e) => return Err(self.fail(&mut tx, TransactionError::Execution(e), started).await),
        };

        // 3. Enrolment
        let compensation_id = self
            .compensations
            .enrol_compensation(
                CompensationAction::DeleteRepository,
                repository.id.to_string(),
                json!({
                    "repository_name": repository.name,
                    "project_id": project_id,
                    "actor_id": actor_id,
                    "created_at": repository.created_at.unwrap_or_else(Utc::now),
                    "transaction_id": tx.id,
                }),
            )
            .await;
        tx.enrol(compensation_id)?;
        tx.mark_executed(to_record(&repository))?;
        self.record(&tx).await;
        tracing::debug!(repository_id = %repository.id, %compensation_id, "repository created, confirming");

        if cancel.is_cancelled() {
            let err = TransactionError::Cancelled { phase: Phase::Confirm };
            return Err(self.cancel(&mut tx, err, started).await);
        }

        // 4. Confirmation
        let confirmed = match guarded(cancel, Phase::Confirm, self.gateway.get_repository(repository.id)).await {
            Ok(Ok(found)) if found.id == repository.id => Ok(found),
            Ok(Ok(found)) => Err(TransactionError::Confirmation {
                reason: format!(
                    "gateway returned repository {} when asked for {}",
                    found.id, repository.id
                ),
            }),
            Ok(Err(e)) if e.is_not_found() => Err(TransactionError::Confirmation {
                reason: format!("repository {} is not visible after create", repository.id),
            }),
            Ok(Err(e)) => Err(TransactionError::Confirmation {
                reason: format!("could not re-fetch repository {}: {e}", repository.id),
            }),
            Err(e) => Err(e),
        };

        match confirmed {
            Ok(found) => {
                self.confirm(&mut tx, started).await?;
                self.publish(
                    CallbackEvent::repository_event(
                        "created",
                        project_id,
                        &found,
                        EventSource::ProjectService,
                    )
                    .map(|event| with_transaction(event, &tx)),
                )
                .await;
                Ok(found)
            }
            Err(e) => Err(self.cancel(&mut tx, e, started).await),
        }
    }

    /// Deletes a repository and confirms the gateway no longer has it.
    ///
    /// Returns the snapshot of the deleted repository. If the deletion cannot
    /// be confirmed a failure notice is published through the enrolled
    /// compensation and the transaction ends `cancelled`.
    #[tracing::instrument(skip(self, cancel), fields(transaction_id = tracing::field::Empty))]
    pub async fn delete_repository_transaction(
        &self,
        cancel: &CancellationToken,
        project_id: ProjectId,
        actor_id: ActorId,
        tenant_id: TenantId,
        repository_id: RepositoryId,
    ) -> Result<Repository> {
        let started = Instant::now();
        let mut tx = Transaction::new(
            TransactionKind::DeleteRepository,
            actor_id,
            tenant_id,
            project_id,
            json!({ "repository_id": repository_id }),
        );
        tracing::Span::current().record("transaction_id", tracing::field::display(tx.id));
        self.record(&tx).await;

        // 1. Validation
        let repository = match self.validate_delete(cancel, &tx, repository_id).await {
            Ok(repository) => repository,
            Err(e) => return Err(self.fail(&mut tx, e, started).await),
        };
        tx.mark_validated()?;
        self.record(&tx).await;

        // 2. Execution, run to completion like the create path
        if let Err(e) = self.gateway.delete_repository(repository_id).await {
            return Err(self.fail(&mut tx, TransactionError::Execution(e), started).await);
        }

        // 3. Enrolment
        let compensation_id = self
            .compensations
            .enrol_compensation(
                CompensationAction::NotifyFailure,
                repository_id.to_string(),
                json!({
                    "reason": "repository deletion could not be confirmed",
                    "project_id": project_id,
                    "actor_id": actor_id,
                    "transaction_id": tx.id,
                    "repository": repository,
                }),
            )
            .await;
        tx.enrol(compensation_id)?;
        tx.mark_executed(to_record(&repository))?;
        self.record(&tx).await;

        if cancel.is_cancelled() {
            let err = TransactionError::Cancelled { phase: Phase::Confirm };
            return Err(self.cancel(&mut tx, err, started).await);
        }

        // 4. Confirmation
        let confirmed = match guarded(cancel, Phase::Confirm, self.gateway.get_repository(repository_id)).await {
            Ok(Err(e)) if e.is_not_found() => Ok(()),
            Ok(Ok(_)) => Err(TransactionError::Confirmation {
                reason: format!("repository {repository_id} is still present after delete"),
            }),
            Ok(Err(e)) => Err(TransactionError::Confirmation {
                reason: format!("could not verify deletion of repository {repository_id}: {e}"),
            }),
            Err(e) => Err(e),
        };

        match confirmed {
            Ok(()) => {
                self.confirm(&mut tx, started).await?;
                self.publish(
                    CallbackEvent::repository_event(
                        "deleted",
                        project_id,
                        &repository,
                        EventSource::ProjectService,
                    )
                    .map(|event| with_transaction(event, &tx)),
                )
                .await;
                Ok(repository)
            }
            Err(e) => Err(self.cancel(&mut tx, e, started).await),
        }
    }

    /// Returns a snapshot of a transaction.
    pub async fn get_transaction(&self, id: TransactionId) -> Option<Transaction> {
        self.transactions.lock().await.get(&id).cloned()
    }

    /// Non-terminal transactions, oldest first.
    pub async fn list_active(&self) -> Vec<Transaction> {
        self.sorted(|tx| !tx.status.is_terminal()).await
    }

    /// Every retained transaction, oldest first.
    pub async fn list_all(&self) -> Vec<Transaction> {
        self.sorted(|_| true).await
    }

    /// Drops terminal transactions that completed longer ago than the retention.
    pub async fn cleanup_completed(&self) -> usize {
        let Ok(retention) = TimeDelta::from_std(self.config.retention) else {
            return 0;
        };
        let now = Utc::now();

        let mut transactions = self.transactions.lock().await;
        let before = transactions.len();
        transactions.retain(|_, tx| {
            !(tx.status.is_terminal()
                && tx
                    .completed_at
                    .is_some_and(|at| now.signed_duration_since(at) >= retention))
        });
        let removed = before - transactions.len();
        if removed > 0 {
            tracing::info!(removed, "cleaned up completed transactions");
        }
        removed
    }

    async fn sorted(&self, keep: impl Fn(&Transaction) -> bool) -> Vec<Transaction> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .lock()
            .await
            .values()
            .filter(|&tx| keep(tx))
            .cloned()
            .collect();
        transactions.sort_by_key(|tx| tx.started_at);
        transactions
    }

    async fn record(&self, tx: &Transaction) {
        self.transactions.lock().await.insert(tx.id, tx.clone());
    }

    async fn validate_access(&self, cancel: &CancellationToken, tx: &Transaction) -> Result<Project> {
        let project = guarded(
            cancel,
            Phase::Validation,
            self.projects.find_project(tx.tenant_id, tx.project_id),
        )
        .await?
        .map_err(TransactionError::ProjectLookup)?
        .ok_or(TransactionError::ProjectNotFound {
            project_id: tx.project_id,
        })?;

        let allowed = guarded(
            cancel,
            Phase::Validation,
            self.projects.has_access(&project, tx.actor_id),
        )
        .await?
        .map_err(TransactionError::ProjectLookup)?;

        if !allowed {
            return Err(TransactionError::AccessDenied {
                actor_id: tx.actor_id,
                project_id: tx.project_id,
            });
        }
        Ok(project)
    }

    async fn validate_create(
        &self,
        cancel: &CancellationToken,
        tx: &Transaction,
        req: &CreateRepositoryRequest,
    ) -> Result<()> {
        self.validate_access(cancel, tx).await?;
        validation::validate_create_request(tx.project_id, req)?;
        Ok(())
    }

    async fn validate_delete(
        &self,
        cancel: &CancellationToken,
        tx: &Transaction,
        repository_id: RepositoryId,
    ) -> Result<Repository> {
        self.validate_access(cancel, tx).await?;

        let not_found = || TransactionError::RepositoryNotFound {
            repository_id,
            project_id: tx.project_id,
        };
        match guarded(cancel, Phase::Validation, self.gateway.get_repository(repository_id)).await? {
            Ok(repository) if repository.project_id == tx.project_id => Ok(repository),
            Ok(_) => Err(not_found()),
            Err(e) if e.is_not_found() => Err(not_found()),
            Err(e) => Err(TransactionError::RepositoryLookup(e)),
        }
    }

    async fn confirm(&self, tx: &mut Transaction, started: Instant) -> Result<()> {
        tx.mark_confirmed()?;
        self.compensations.retire(&tx.compensation_ids).await;
        self.record(tx).await;
        tracing::info!(transaction_id = %tx.id, kind = %tx.kind, "transaction confirmed");
        observe(tx, started);
        Ok(())
    }

    /// Ends a transaction that committed nothing.
    async fn fail(&self, tx: &mut Transaction, err: TransactionError, started: Instant) -> TransactionError {
        if let Err(e) = tx.mark_failed(&err) {
            tracing::error!(transaction_id = %tx.id, error = %e, "could not mark transaction failed");
        }
        self.record(tx).await;
        tracing::warn!(
            transaction_id = %tx.id,
            kind = %tx.kind,
            phase = %err.phase(),
            error = %err,
            "transaction failed"
        );

        if err.phase() == Phase::Execution {
            self.publish_outcome(tx, "failed", err.phase()).await;
        }
        observe(tx, started);
        err
    }

    /// Rolls back a committed side effect and ends the transaction `cancelled`.
    ///
    /// The enrolled compensations are armed first, so any that fail here are
    /// re-driven by later drains. They run on a detached token so each one is
    /// attempted even when the caller has given up.
    async fn cancel(&self, tx: &mut Transaction, cause: TransactionError, started: Instant) -> TransactionError {
        tracing::warn!(
            transaction_id = %tx.id,
            kind = %tx.kind,
            error = %cause,
            compensations = tx.compensation_ids.len(),
            "confirmation failed, compensating"
        );
        self.compensations.arm(&tx.compensation_ids).await;

        let err = match self
            .compensations
            .execute_many(&CancellationToken::new(), &tx.compensation_ids)
            .await
        {
            Ok(()) => cause,
            Err(source) => {
                tracing::error!(
                    transaction_id = %tx.id,
                    error = %source,
                    "compensation failed; pending entries remain with the compensation manager"
                );
                TransactionError::Compensation {
                    reason: cause.to_string(),
                    source,
                }
            }
        };

        if let Err(e) = tx.mark_cancelled(&err) {
            tracing::error!(transaction_id = %tx.id, error = %e, "could not mark transaction cancelled");
        }
        self.record(tx).await;
        metrics::counter!("tcc_transactions_cancelled_total", "kind" => tx.kind.as_str()).increment(1);

        self.publish_outcome(tx, "cancelled", err.phase()).await;
        observe(tx, started);
        err
    }

    async fn publish_outcome(&self, tx: &Transaction, action: &str, phase: Phase) {
        self.publish(
            CallbackEvent::transaction_event(action, tx.project_id, tx)
                .map(|event| with_transaction(event, tx).with_metadata("phase", phase.as_str())),
        )
        .await;
    }

    async fn publish(&self, event: callback::Result<CallbackEvent>) {
        match event {
            Ok(event) => self.publisher.publish(event).await,
            Err(e) => tracing::warn!(error = %e, "could not build callback event"),
        }
    }
}

/// Races a collaborator call against cancellation.
async fn guarded<T>(
    cancel: &CancellationToken,
    phase: Phase,
    fut: impl Future<Output = T>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransactionError::Cancelled { phase }),
        out = fut => Ok(out),
    }
}

fn with_transaction(event: CallbackEvent, tx: &Transaction) -> CallbackEvent {
    event
        .with_metadata("transaction_id", tx.id.to_string())
        .with_metadata("actor_id", tx.actor_id.to_string())
}

fn to_record<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "could not record value on transaction");
        serde_json::Value::Null
    })
}

fn observe(tx: &Transaction, started: Instant) {
    metrics::counter!(
        "tcc_transactions_total",
        "kind" => tx.kind.as_str(),
        "status" => tx.status.as_str()
    )
    .increment(1);
    metrics::histogram!("tcc_transaction_duration_seconds", "kind" => tx.kind.as_str())
        .record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionStatus;
    use callback::InMemoryEventPublisher;
    use gateway::InMemoryGatewayClient;
    use project::InMemoryProjectRepository;

    type TestManager =
        TransactionManager<InMemoryGatewayClient, InMemoryProjectRepository, InMemoryEventPublisher>;

    fn manager(config: TransactionManagerConfig) -> TestManager {
        let gateway = InMemoryGatewayClient::new();
        let publisher = InMemoryEventPublisher::new();
        let compensations = Arc::new(CompensationManager::new(gateway.clone(), publisher.clone()));
        TransactionManager::with_config(
            gateway,
            InMemoryProjectRepository::new(),
            publisher,
            compensations,
            config,
        )
    }

    #[tokio::test]
    async fn test_guarded_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = guarded(&cancel, Phase::Confirm, async { 1 }).await;
        assert!(matches!(out, Err(TransactionError::Cancelled { phase: Phase::Confirm })));

        let out = guarded(&CancellationToken::new(), Phase::Confirm, async { 1 }).await;
        assert_eq!(out.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_validation_is_recorded() {
        let manager = manager(TransactionManagerConfig::default());
        let project_id = ProjectId::new();
        let err = manager
            .create_repository_transaction(
                &CancellationToken::new(),
                project_id,
                ActorId::new(),
                TenantId::new(),
                CreateRepositoryRequest::new(project_id, "abc"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransactionError::ProjectNotFound { .. }));

        let all = manager.list_all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TransactionStatus::Failed);
        assert!(manager.list_active().await.is_empty());
        assert_eq!(manager.get_transaction(all[0].id).await.unwrap(), all[0]);
    }

    #[tokio::test]
    async fn test_cleanup_respects_retention() {
        let keep = manager(TransactionManagerConfig::default());
        let purge = manager(TransactionManagerConfig {
            retention: Duration::ZERO,
        });

        for manager in [&keep, &purge] {
            let project_id = ProjectId::new();
            let _ = manager
                .create_repository_transaction(
                    &CancellationToken::new(),
                    project_id,
                    ActorId::new(),
                    TenantId::new(),
                    CreateRepositoryRequest::new(project_id, "abc"),
                )
                .await;
        }

        assert_eq!(keep.cleanup_completed().await, 0);
        assert_eq!(keep.list_all().await.len(), 1);
        assert_eq!(purge.cleanup_completed().await, 1);
        assert!(purge.list_all().await.is_empty());
    }
}
